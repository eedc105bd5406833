//! Step 종류별 파라미터 스키마, 검증, 표시 문구를 한곳에서 관리한다.
//!
//! 새로운 Step 종류는 [`Step`]과 이 모듈에만 추가하면 된다. 시나리오, 마스터
//! 시나리오, 실행 모니터는 종류를 직접 구분하지 않는다.

use crate::error::ValidationError;
use crate::scenario::Step;
use std::fmt;

/// 노즐 서보가 허용하는 최대 각도이다.
pub const MAX_NOZZLE_ANGLE: f64 = 180.0;

/// Step 종류를 파라미터 없이 표현한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepKind {
    GotoBase,
    AutoCenter,
    PumpOn,
    PumpOff,
    Delay,
    MoveZ,
    Home,
    Verify,
    ResistanceTest,
    DiodeTest,
    NozzleGoto,
    NozzleHome,
}

/// 파라미터 값의 입력 형식이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// 자유 문자열.
    Text,
    /// 실수 값.
    Number,
    /// 정수 값.
    Integer,
}

/// 단일 파라미터 정의이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    /// 직렬화 필드 이름.
    pub name: &'static str,
    /// 입력 형식.
    pub ty: ParamType,
    /// 입력 화면에 표시할 이름.
    pub label: &'static str,
}

/// Step 종류별 등록 정보이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSpec {
    /// 직렬화 태그 값.
    pub tag: &'static str,
    /// 종류 선택 목록에 표시할 이름.
    pub title: &'static str,
    /// 종류가 요구하는 파라미터 목록.
    pub params: &'static [ParamSpec],
}

const BASE_NAME: ParamSpec = ParamSpec {
    name: "base_name",
    ty: ParamType::Text,
    label: "위치 이름",
};
const WORD: ParamSpec = ParamSpec {
    name: "word",
    ty: ParamType::Text,
    label: "단어",
};
const SECONDS: ParamSpec = ParamSpec {
    name: "seconds",
    ty: ParamType::Number,
    label: "대기 시간(초)",
};
const Z: ParamSpec = ParamSpec {
    name: "z",
    ty: ParamType::Number,
    label: "Z 좌표(mm)",
};
const TEST_COUNT: ParamSpec = ParamSpec {
    name: "test_count",
    ty: ParamType::Integer,
    label: "측정 횟수",
};
const ANGLE: ParamSpec = ParamSpec {
    name: "angle",
    ty: ParamType::Number,
    label: "각도(0~180)",
};

impl StepKind {
    /// 등록된 모든 종류를 선택 목록 순서대로 반환한다.
    pub const ALL: [StepKind; 12] = [
        StepKind::GotoBase,
        StepKind::AutoCenter,
        StepKind::PumpOn,
        StepKind::PumpOff,
        StepKind::Delay,
        StepKind::MoveZ,
        StepKind::Home,
        StepKind::Verify,
        StepKind::ResistanceTest,
        StepKind::DiodeTest,
        StepKind::NozzleGoto,
        StepKind::NozzleHome,
    ];

    /// 종류의 등록 정보를 반환한다.
    pub fn spec(self) -> KindSpec {
        let (tag, title, params): (&'static str, &'static str, &'static [ParamSpec]) = match self
        {
            StepKind::GotoBase => ("goto_base", "위치로 이동", &[BASE_NAME]),
            StepKind::AutoCenter => ("auto_center", "단어 중심 맞추기", &[WORD]),
            StepKind::PumpOn => ("pump_on", "펌프 켜기", &[]),
            StepKind::PumpOff => ("pump_off", "펌프 끄기", &[]),
            StepKind::Delay => ("delay", "대기", &[SECONDS]),
            StepKind::MoveZ => ("move_z", "Z 이동", &[Z]),
            StepKind::Home => ("home", "원점 복귀", &[]),
            StepKind::Verify => ("verify", "정확도 검증", &[]),
            StepKind::ResistanceTest => ("resistance_test", "저항 측정", &[TEST_COUNT]),
            StepKind::DiodeTest => ("diode_test", "다이오드 측정", &[TEST_COUNT]),
            StepKind::NozzleGoto => ("nozzle_goto", "노즐 회전", &[ANGLE]),
            StepKind::NozzleHome => ("nozzle_home", "노즐 원위치", &[]),
        };
        KindSpec { tag, title, params }
    }

    /// 직렬화 태그 문자열을 반환한다.
    pub fn as_str(self) -> &'static str {
        self.spec().tag
    }

    /// 태그 문자열로 종류를 찾는다.
    pub fn from_tag(tag: &str) -> Option<StepKind> {
        StepKind::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Step {
    /// Step의 종류를 반환한다.
    pub fn kind(&self) -> StepKind {
        match self {
            Step::GotoBase { .. } => StepKind::GotoBase,
            Step::AutoCenter { .. } => StepKind::AutoCenter,
            Step::PumpOn => StepKind::PumpOn,
            Step::PumpOff => StepKind::PumpOff,
            Step::Delay { .. } => StepKind::Delay,
            Step::MoveZ { .. } => StepKind::MoveZ,
            Step::Home => StepKind::Home,
            Step::Verify => StepKind::Verify,
            Step::ResistanceTest { .. } => StepKind::ResistanceTest,
            Step::DiodeTest { .. } => StepKind::DiodeTest,
            Step::NozzleGoto { .. } => StepKind::NozzleGoto,
            Step::NozzleHome => StepKind::NozzleHome,
        }
    }
}

/// Step 파라미터의 형식과 범위를 검증한다.
///
/// 위치 이름이나 단어가 실제로 존재하는지는 확인하지 않는다. 존재 여부는 실행
/// 시점에 판단한다.
pub fn validate(step: &Step) -> Result<(), ValidationError> {
    let kind = step.kind().as_str();
    match step {
        Step::GotoBase { base_name } => require_text(kind, "base_name", base_name),
        Step::AutoCenter { word } => {
            require_text(kind, "word", word)?;
            if word.as_str() != word.trim() || *word != word.to_uppercase() {
                return Err(invalid(kind, "word", "대문자로 정규화되어야 합니다."));
            }
            Ok(())
        }
        Step::Delay { seconds } => {
            if !seconds.is_finite() || *seconds <= 0.0 {
                return Err(invalid(kind, "seconds", "0보다 큰 값이어야 합니다."));
            }
            Ok(())
        }
        Step::MoveZ { z } => {
            if !z.is_finite() {
                return Err(invalid(kind, "z", "유한한 숫자여야 합니다."));
            }
            Ok(())
        }
        Step::ResistanceTest { test_count } | Step::DiodeTest { test_count } => {
            if *test_count < 1 {
                return Err(invalid(kind, "test_count", "1 이상이어야 합니다."));
            }
            Ok(())
        }
        Step::NozzleGoto { angle } => {
            if !angle.is_finite() || !(0.0..=MAX_NOZZLE_ANGLE).contains(angle) {
                return Err(invalid(kind, "angle", "0~180 범위여야 합니다."));
            }
            Ok(())
        }
        Step::PumpOn | Step::PumpOff | Step::Home | Step::Verify | Step::NozzleHome => Ok(()),
    }
}

/// Step 목록 전체를 검증한다.
pub fn validate_all(steps: &[Step]) -> Result<(), ValidationError> {
    steps.iter().try_for_each(validate)
}

/// 로그와 목록에 표시할 Step 설명을 생성한다.
pub fn describe(step: &Step) -> String {
    match step {
        Step::GotoBase { base_name } => format!("📍 '{base_name}' 위치로 이동"),
        Step::AutoCenter { word } => format!("🎯 '{word}' 단어에 중심 맞추기"),
        Step::PumpOn => "💨 펌프 켜기".into(),
        Step::PumpOff => "🛑 펌프 끄기".into(),
        Step::Delay { seconds } => format!("⏳ {seconds}초 대기"),
        Step::MoveZ { z } => format!("↕️ Z {z}mm 위치로 이동"),
        Step::Home => "🏠 원점 복귀".into(),
        Step::Verify => "👁️ 정확도 검증".into(),
        Step::ResistanceTest { test_count } => format!("Ω 저항 측정 {test_count}회"),
        Step::DiodeTest { test_count } => format!("⚡ 다이오드 측정 {test_count}회"),
        Step::NozzleGoto { angle } => format!("🔄 노즐 {angle}° 회전"),
        Step::NozzleHome => "🔄 노즐 원위치".into(),
    }
}

fn require_text(kind: &'static str, field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(invalid(kind, field, "비어 있을 수 없습니다."));
    }
    Ok(())
}

fn invalid(kind: &'static str, field: &'static str, reason: &str) -> ValidationError {
    ValidationError::InvalidParameter {
        kind,
        field,
        reason: reason.to_string(),
    }
}
