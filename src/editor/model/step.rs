use crate::error::ValidationError;
use crate::registry::{self, MAX_NOZZLE_ANGLE, StepKind};
use crate::scenario::Step;

/// Step 입력 화면의 값을 보관한다.
///
/// 종류와 무관하게 모든 입력 칸을 유지하고, 확정할 때 선택된 종류의 값만
/// 골라 [`Step`]을 만든다.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInput {
    /// 선택된 Step 종류.
    pub kind: StepKind,
    /// 이동할 위치 이름.
    pub base_name: String,
    /// 중심을 맞출 단어.
    pub word: String,
    /// 대기 시간(초).
    pub seconds: f64,
    /// Z 좌표(mm).
    pub z: f64,
    /// 측정 횟수. 음수 입력도 그대로 받아 검증에서 거부한다.
    pub test_count: i64,
    /// 노즐 각도.
    pub angle: f64,
}

impl StepInput {
    /// 지정한 종류의 기본 입력값을 반환한다.
    pub fn new(kind: StepKind) -> Self {
        Self {
            kind,
            base_name: String::new(),
            word: String::new(),
            seconds: 1.0,
            z: 0.0,
            test_count: 1,
            angle: 0.0,
        }
    }

    /// 기존 Step의 파라미터로 입력 화면을 채운다.
    pub fn from_step(step: &Step) -> Self {
        let mut input = Self::new(step.kind());
        match step {
            Step::GotoBase { base_name } => input.base_name = base_name.clone(),
            Step::AutoCenter { word } => input.word = word.clone(),
            Step::Delay { seconds } => input.seconds = *seconds,
            Step::MoveZ { z } => input.z = *z,
            Step::ResistanceTest { test_count } | Step::DiodeTest { test_count } => {
                input.test_count = i64::from(*test_count)
            }
            Step::NozzleGoto { angle } => input.angle = *angle,
            Step::PumpOn | Step::PumpOff | Step::Home | Step::Verify | Step::NozzleHome => {}
        }
        input
    }

    /// 입력값으로 Step을 만들고 등록된 규칙으로 검증한다.
    pub fn to_step(&self) -> Result<Step, ValidationError> {
        let step = match self.kind {
            StepKind::GotoBase => Step::GotoBase {
                base_name: self.base_name.trim().to_string(),
            },
            StepKind::AutoCenter => Step::AutoCenter {
                word: self.word.trim().to_uppercase(),
            },
            StepKind::PumpOn => Step::PumpOn,
            StepKind::PumpOff => Step::PumpOff,
            StepKind::Delay => Step::Delay {
                seconds: self.seconds,
            },
            StepKind::MoveZ => Step::MoveZ { z: self.z },
            StepKind::Home => Step::Home,
            StepKind::Verify => Step::Verify,
            StepKind::ResistanceTest => Step::ResistanceTest {
                test_count: self.checked_test_count()?,
            },
            StepKind::DiodeTest => Step::DiodeTest {
                test_count: self.checked_test_count()?,
            },
            // NaN은 clamp 후에도 NaN으로 남아 검증에서 거부된다.
            StepKind::NozzleGoto => Step::NozzleGoto {
                angle: self.angle.clamp(0.0, MAX_NOZZLE_ANGLE),
            },
            StepKind::NozzleHome => Step::NozzleHome,
        };
        registry::validate(&step)?;
        Ok(step)
    }

    fn checked_test_count(&self) -> Result<u32, ValidationError> {
        u32::try_from(self.test_count)
            .ok()
            .filter(|count| *count >= 1)
            .ok_or_else(|| ValidationError::InvalidParameter {
                kind: self.kind.as_str(),
                field: "test_count",
                reason: format!("1 이상의 정수여야 합니다 (입력값 {}).", self.test_count),
            })
    }
}

impl Default for StepInput {
    fn default() -> Self {
        Self::new(StepKind::GotoBase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_is_trimmed_and_upper_cased() {
        let mut input = StepInput::new(StepKind::AutoCenter);
        input.word = "  r12 ".into();
        assert_eq!(
            input.to_step().unwrap(),
            Step::AutoCenter { word: "R12".into() }
        );
    }

    #[test]
    fn nozzle_angle_is_clamped() {
        let mut input = StepInput::new(StepKind::NozzleGoto);
        input.angle = 270.0;
        assert_eq!(input.to_step().unwrap(), Step::NozzleGoto { angle: 180.0 });
        input.angle = -5.0;
        assert_eq!(input.to_step().unwrap(), Step::NozzleGoto { angle: 0.0 });
        input.angle = f64::NAN;
        assert!(input.to_step().is_err());
    }

    #[test]
    fn negative_test_count_is_rejected_not_coerced() {
        let mut input = StepInput::new(StepKind::DiodeTest);
        input.test_count = -3;
        assert!(matches!(
            input.to_step(),
            Err(ValidationError::InvalidParameter {
                field: "test_count",
                ..
            })
        ));
    }

    #[test]
    fn only_the_selected_kind_parameters_are_kept() {
        let mut input = StepInput::new(StepKind::Delay);
        input.base_name = "TRAY".into();
        input.seconds = 2.5;
        assert_eq!(input.to_step().unwrap(), Step::Delay { seconds: 2.5 });
    }

    #[test]
    fn from_step_preloads_parameters() {
        let step = Step::ResistanceTest { test_count: 4 };
        let input = StepInput::from_step(&step);
        assert_eq!(input.kind, StepKind::ResistanceTest);
        assert_eq!(input.test_count, 4);
        assert_eq!(input.to_step().unwrap(), step);
    }
}
