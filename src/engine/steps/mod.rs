use super::events::{RunEvent, RunStatus};
use super::runner::RunEmitter;
use crate::config::RunSettings;
use crate::executor::SharedExecutor;
use crate::registry::StepKind;
use crate::scenario::Step;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

/// 단일 Step 실행 결과를 표현한다.
#[derive(Debug, PartialEq)]
pub(super) enum StepOutcome {
    /// 정상 완료.
    Completed,
    /// 중단 요청으로 멈춤.
    Stopped,
    /// 제한 시간 초과.
    TimedOut(String),
    /// 장비 오류와 함께 실패.
    Failed(String),
}

/// Step 종류별 장비 동작을 수행한다.
pub(super) async fn execute_step(
    step: &Step,
    index: usize,
    executor: SharedExecutor,
    settings: &RunSettings,
    emitter: &RunEmitter,
    cancel: &CancellationToken,
) -> StepOutcome {
    let kind = step.kind();
    match step {
        Step::GotoBase { base_name } => guarded(cancel, None, executor.goto_base(base_name)).await,
        Step::AutoCenter { word } => {
            emitter.step(kind, index, format!("'{word}' 단어에 중심 맞추는 중..."));
            let outcome = guarded(
                cancel,
                Some(settings.auto_center_timeout()),
                executor.auto_center(word),
            )
            .await;
            with_timeout_message(outcome, format!("'{word}' 중심 맞추기 시간 초과"))
        }
        Step::PumpOn | Step::PumpOff => {
            let on = matches!(step, Step::PumpOn);
            let outcome = guarded(cancel, None, executor.set_pump(on)).await;
            if outcome == StepOutcome::Completed {
                let message = if on {
                    "펌프가 켜졌습니다."
                } else {
                    "펌프가 꺼졌습니다."
                };
                emitter.step(kind, index, message);
            }
            outcome
        }
        Step::Delay { seconds } => {
            let Ok(wait) = Duration::try_from_secs_f64(*seconds) else {
                return StepOutcome::Failed(format!("대기 시간을 사용할 수 없습니다: {seconds}초"));
            };
            emitter.step(kind, index, format!("{seconds}초 대기 중..."));
            tokio::select! {
                _ = cancel.cancelled() => StepOutcome::Stopped,
                _ = sleep(wait) => StepOutcome::Completed,
            }
        }
        Step::MoveZ { z } => {
            emitter.step(kind, index, format!("Z {z}mm 위치로 이동 중..."));
            guarded(cancel, None, executor.move_z(*z)).await
        }
        Step::Home => guarded(cancel, None, executor.home()).await,
        Step::Verify => {
            emitter.step(kind, index, "정확도 검증 중...");
            let result = guarded(cancel, Some(settings.verify_timeout()), executor.verify()).await;
            let outcome = report(emitter, kind, index, "정확도 검증 완료".into(), result);
            with_timeout_message(outcome, "정확도 검증 시간 초과".into())
        }
        Step::ResistanceTest { test_count } => {
            let result = guarded(cancel, None, executor.resistance_test(*test_count)).await;
            report(
                emitter,
                kind,
                index,
                format!("저항 측정 {test_count}회 완료"),
                result,
            )
        }
        Step::DiodeTest { test_count } => {
            let result = guarded(cancel, None, executor.diode_test(*test_count)).await;
            report(
                emitter,
                kind,
                index,
                format!("다이오드 측정 {test_count}회 완료"),
                result,
            )
        }
        Step::NozzleGoto { angle } => guarded(cancel, None, executor.nozzle_goto(*angle)).await,
        Step::NozzleHome => guarded(cancel, None, executor.nozzle_home()).await,
    }
}

/// 장비 동작 결과를 Step 결과로 바꾸기 위한 변환이다.
trait IntoOutcome: Sized {
    type Output;

    fn outcome(result: anyhow::Result<Self>) -> Self::Output;
    fn stopped() -> Self::Output;
    fn timed_out() -> Self::Output;
}

impl IntoOutcome for () {
    type Output = StepOutcome;

    fn outcome(result: anyhow::Result<()>) -> StepOutcome {
        match result {
            Ok(()) => StepOutcome::Completed,
            Err(err) => StepOutcome::Failed(format!("{err:#}")),
        }
    }

    fn stopped() -> StepOutcome {
        StepOutcome::Stopped
    }

    fn timed_out() -> StepOutcome {
        StepOutcome::TimedOut(String::new())
    }
}

impl IntoOutcome for serde_json::Value {
    type Output = Result<serde_json::Value, StepOutcome>;

    fn outcome(result: anyhow::Result<serde_json::Value>) -> Self::Output {
        result.map_err(|err| StepOutcome::Failed(format!("{err:#}")))
    }

    fn stopped() -> Self::Output {
        Err(StepOutcome::Stopped)
    }

    fn timed_out() -> Self::Output {
        Err(StepOutcome::TimedOut(String::new()))
    }
}

/// 중단 요청과 선택적 제한 시간을 걸고 장비 동작을 수행한다.
async fn guarded<T, F>(cancel: &CancellationToken, limit: Option<Duration>, future: F) -> T::Output
where
    T: IntoOutcome,
    F: Future<Output = anyhow::Result<T>>,
{
    match limit {
        Some(limit) => tokio::select! {
            _ = cancel.cancelled() => T::stopped(),
            result = timeout(limit, future) => match result {
                Ok(result) => T::outcome(result),
                Err(_) => T::timed_out(),
            },
        },
        None => tokio::select! {
            _ = cancel.cancelled() => T::stopped(),
            result = future => T::outcome(result),
        },
    }
}

/// 시간 초과 결과에 메시지를 채운다.
fn with_timeout_message(outcome: StepOutcome, message: String) -> StepOutcome {
    match outcome {
        StepOutcome::TimedOut(_) => StepOutcome::TimedOut(message),
        other => other,
    }
}

/// 결과 데이터를 진행 이벤트로 전달한다.
fn report(
    emitter: &RunEmitter,
    kind: StepKind,
    index: usize,
    message: String,
    result: Result<serde_json::Value, StepOutcome>,
) -> StepOutcome {
    match result {
        Ok(data) => {
            emitter.emit(
                RunEvent::new(RunStatus::Running, message)
                    .at_step(kind, index)
                    .with_data(data),
            );
            StepOutcome::Completed
        }
        Err(outcome) => outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::MachineExecutor;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// 중심 맞추기와 검증이 끝나지 않는 장비를 흉내 낸다.
    struct StuckMachine;

    #[async_trait]
    impl MachineExecutor for StuckMachine {
        async fn goto_base(&self, _base_name: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn auto_center(&self, _word: &str) -> anyhow::Result<()> {
            std::future::pending().await
        }
        async fn set_pump(&self, _on: bool) -> anyhow::Result<()> {
            Ok(())
        }
        async fn move_z(&self, _z: f64) -> anyhow::Result<()> {
            Ok(())
        }
        async fn home(&self) -> anyhow::Result<()> {
            Ok(())
        }
        async fn verify(&self) -> anyhow::Result<serde_json::Value> {
            std::future::pending().await
        }
        async fn resistance_test(&self, test_count: u32) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::json!({ "count": test_count }))
        }
        async fn diode_test(&self, _test_count: u32) -> anyhow::Result<serde_json::Value> {
            anyhow::bail!("프로브 접촉 불량")
        }
        async fn nozzle_goto(&self, _angle: f64) -> anyhow::Result<()> {
            Ok(())
        }
        async fn nozzle_home(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn settings() -> RunSettings {
        RunSettings {
            step_pause_ms: 0,
            auto_center_timeout_secs: 1,
            verify_timeout_secs: 1,
        }
    }

    async fn run_one(step: Step) -> (StepOutcome, Vec<RunEvent>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = RunEmitter::new(tx, "test", 1);
        let outcome = execute_step(
            &step,
            0,
            Arc::new(StuckMachine),
            &settings(),
            &emitter,
            &CancellationToken::new(),
        )
        .await;
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        (outcome, events)
    }

    #[tokio::test]
    async fn stuck_centering_times_out() {
        let (outcome, _) = run_one(Step::AutoCenter { word: "R12".into() }).await;
        assert_eq!(
            outcome,
            StepOutcome::TimedOut("'R12' 중심 맞추기 시간 초과".into())
        );
    }

    #[tokio::test]
    async fn stuck_verification_times_out() {
        let (outcome, _) = run_one(Step::Verify).await;
        assert_eq!(outcome, StepOutcome::TimedOut("정확도 검증 시간 초과".into()));
    }

    #[tokio::test]
    async fn measurement_data_is_passed_through() {
        let (outcome, events) = run_one(Step::ResistanceTest { test_count: 3 }).await;
        assert_eq!(outcome, StepOutcome::Completed);
        let last = events.last().unwrap();
        assert_eq!(last.data, Some(serde_json::json!({ "count": 3 })));
        assert!(last.is_step(StepKind::ResistanceTest));
    }

    #[tokio::test]
    async fn unrepresentable_delay_fails_instead_of_panicking() {
        let (outcome, events) = run_one(Step::Delay { seconds: 1e300 }).await;
        assert!(matches!(outcome, StepOutcome::Failed(message) if message.contains("대기 시간")));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn executor_failure_carries_its_message() {
        let (outcome, events) = run_one(Step::DiodeTest { test_count: 1 }).await;
        assert_eq!(outcome, StepOutcome::Failed("프로브 접촉 불량".into()));
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_pending_operation() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let emitter = RunEmitter::new(tx, "test", 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = execute_step(
            &Step::AutoCenter { word: "R12".into() },
            0,
            Arc::new(StuckMachine),
            &settings(),
            &emitter,
            &cancel,
        )
        .await;
        assert_eq!(outcome, StepOutcome::Stopped);
    }
}
