use super::events::{RunEvent, RunStatus};
use super::steps::{StepOutcome, execute_step};
use crate::config::RunSettings;
use crate::executor::SharedExecutor;
use crate::registry::{self, StepKind};
use crate::scenario::{MasterScenario, Scenario, Step};
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 한 번의 실행에서 순서대로 수행할 Step 묶음이다.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    /// 이벤트에 표시할 실행 이름.
    pub name: String,
    /// 실행할 Step 목록.
    pub steps: Vec<Step>,
}

impl RunPlan {
    /// 단일 시나리오 실행 계획을 만든다.
    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            name: scenario.name.clone(),
            steps: scenario.steps.clone(),
        }
    }

    /// 마스터 시나리오 실행 이름을 만든다.
    pub fn master_name(master: &MasterScenario) -> String {
        format!("[M] {}", master.name)
    }
}

/// 마스터 시나리오의 참조를 실행 시점의 시나리오 목록으로 풀어 하나의 계획으로 합친다.
///
/// 찾을 수 없는 이름이 하나라도 있으면 누락된 이름 목록을 반환한다.
pub fn expand_master(
    master: &MasterScenario,
    scenarios: &[Scenario],
) -> Result<RunPlan, Vec<String>> {
    let mut steps = Vec::new();
    let mut missing = Vec::new();
    for name in &master.sequence {
        match scenarios.iter().find(|s| &s.name == name) {
            Some(scenario) => steps.extend(scenario.steps.iter().cloned()),
            None => missing.push(name.clone()),
        }
    }
    if !missing.is_empty() {
        return Err(missing);
    }
    Ok(RunPlan {
        name: RunPlan::master_name(master),
        steps,
    })
}

/// 실행 이름과 Step 수를 모든 이벤트에 채워 송신한다.
#[derive(Debug, Clone)]
pub struct RunEmitter {
    sender: UnboundedSender<RunEvent>,
    name: String,
    total: usize,
}

impl RunEmitter {
    pub fn new(sender: UnboundedSender<RunEvent>, name: impl Into<String>, total: usize) -> Self {
        Self {
            sender,
            name: name.into(),
            total,
        }
    }

    /// 실행 정보를 채운 이벤트를 만든다. 송신하지는 않는다.
    pub fn decorate(&self, mut event: RunEvent) -> RunEvent {
        event.scenario_name = Some(self.name.clone());
        event.total_steps = Some(self.total);
        event
    }

    /// 이벤트를 송신한다. 수신측이 사라졌으면 무시한다.
    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(self.decorate(event));
    }

    /// Step 진행 이벤트를 송신한다.
    pub fn step(&self, kind: StepKind, index: usize, message: impl Into<String>) {
        self.emit(RunEvent::new(RunStatus::Running, message).at_step(kind, index));
    }

    pub fn total(&self) -> usize {
        self.total
    }
}

/// 계획의 Step을 순서대로 실행하고 종료 이벤트를 반환한다.
///
/// 종료 이벤트는 송신하지 않는다. 호출자가 실행 슬롯을 정리한 뒤 보낸다.
pub async fn run_plan(
    plan: &RunPlan,
    executor: SharedExecutor,
    settings: &RunSettings,
    emitter: &RunEmitter,
    cancel: CancellationToken,
) -> RunEvent {
    let total = plan.steps.len();
    emitter.emit(RunEvent::new(
        RunStatus::Started,
        format!("'{}' 시작 ({total} 단계)", plan.name),
    ));
    info!(name = %plan.name, total, "시나리오 실행 시작");

    for (index, step) in plan.steps.iter().enumerate() {
        let kind = step.kind();
        if cancel.is_cancelled() {
            info!(name = %plan.name, index, "시나리오 중단");
            return emitter.decorate(
                RunEvent::new(
                    RunStatus::Stopped,
                    format!("중단되었습니다 (단계 {}/{total}).", index + 1),
                )
                .at_step(kind, index),
            );
        }
        emitter.step(
            kind,
            index,
            format!("단계 {}/{total}: {}", index + 1, registry::describe(step)),
        );

        let terminal = match execute_step(step, index, executor.clone(), settings, emitter, &cancel)
            .await
        {
            StepOutcome::Completed => None,
            StepOutcome::Stopped => Some(RunEvent::new(
                RunStatus::Stopped,
                format!("중단되었습니다 (단계 {}/{total} 실행 중).", index + 1),
            )),
            StepOutcome::TimedOut(message) => Some(RunEvent::new(RunStatus::Timeout, message)),
            StepOutcome::Failed(message) => {
                warn!(name = %plan.name, index, %message, "Step 실패");
                Some(RunEvent::new(
                    RunStatus::Error,
                    format!("시나리오 오류: {message}"),
                ))
            }
        };
        if let Some(event) = terminal {
            return emitter.decorate(event.at_step(kind, index));
        }

        if index + 1 < total && !settings.step_pause().is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = sleep(settings.step_pause()) => {}
            }
        }
    }

    info!(name = %plan.name, "시나리오 완료");
    emitter.decorate(RunEvent::new(
        RunStatus::Done,
        format!("'{}' 완료 ✓", plan.name),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BasePosition;
    use crate::executor::SimulatedMachine;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc::{self, UnboundedReceiver};

    fn settings() -> RunSettings {
        RunSettings {
            step_pause_ms: 0,
            auto_center_timeout_secs: 1,
            verify_timeout_secs: 1,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<RunEvent>) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    fn machine() -> SimulatedMachine {
        SimulatedMachine::new()
            .with_base(BasePosition {
                name: "TRAY".into(),
                x: 1.0,
                y: 2.0,
                z: 3.0,
            })
            .with_word("R12")
    }

    #[tokio::test]
    async fn successful_run_emits_started_running_and_done() {
        let machine = machine();
        let plan = RunPlan {
            name: "pick".into(),
            steps: vec![
                Step::GotoBase {
                    base_name: "TRAY".into(),
                },
                Step::AutoCenter { word: "R12".into() },
                Step::PumpOn,
            ],
        };
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = RunEmitter::new(tx, &plan.name, plan.steps.len());
        let terminal = run_plan(
            &plan,
            Arc::new(machine.clone()),
            &settings(),
            &emitter,
            CancellationToken::new(),
        )
        .await;

        assert_eq!(terminal.status, RunStatus::Done);
        assert_eq!(terminal.scenario_name.as_deref(), Some("pick"));
        let events = drain(&mut rx);
        assert_eq!(events[0].status, RunStatus::Started);
        let headers: Vec<Option<usize>> = events[1..]
            .iter()
            .filter(|e| e.message.starts_with("단계 "))
            .map(|e| e.step_index)
            .collect();
        assert_eq!(headers, vec![Some(0), Some(1), Some(2)]);
        // 중심 맞추기와 펌프 Step은 진행 문구를 하나 더 보낸다.
        let all: Vec<Option<usize>> = events[1..].iter().map(|e| e.step_index).collect();
        assert_eq!(all, vec![Some(0), Some(1), Some(1), Some(2), Some(2)]);
        assert!(events[1..].iter().all(|e| e.status == RunStatus::Running));
        assert!(events.iter().all(|e| e.total_steps == Some(3)));
        assert_eq!(
            machine.commands().await,
            vec!["move z=3", "move x=1 y=2", "center R12", "pump on"]
        );
    }

    #[tokio::test]
    async fn unknown_base_is_a_run_time_error() {
        let plan = RunPlan {
            name: "pick".into(),
            steps: vec![
                Step::Home,
                Step::GotoBase {
                    base_name: "MISSING".into(),
                },
                Step::PumpOn,
            ],
        };
        let machine = machine();
        let (tx, _rx) = mpsc::unbounded_channel();
        let emitter = RunEmitter::new(tx, &plan.name, plan.steps.len());
        let terminal = run_plan(
            &plan,
            Arc::new(machine.clone()),
            &settings(),
            &emitter,
            CancellationToken::new(),
        )
        .await;
        assert_eq!(terminal.status, RunStatus::Error);
        assert_eq!(terminal.step_index, Some(1));
        assert!(terminal.message.contains("MISSING"));
        assert_eq!(machine.commands().await, vec!["home"]);
    }

    #[tokio::test]
    async fn cancelling_during_delay_stops_the_run() {
        let plan = RunPlan {
            name: "wait".into(),
            steps: vec![Step::Delay { seconds: 30.0 }, Step::Home],
        };
        let machine = machine();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let emitter = RunEmitter::new(tx, &plan.name, plan.steps.len());
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(20)).await;
            stopper.cancel();
        });
        let terminal = run_plan(
            &plan,
            Arc::new(machine.clone()),
            &settings(),
            &emitter,
            cancel,
        )
        .await;
        assert_eq!(terminal.status, RunStatus::Stopped);
        assert_eq!(terminal.step_index, Some(0));
        assert!(machine.commands().await.is_empty());
        let events = drain(&mut rx);
        assert!(
            events
                .iter()
                .filter(|e| e.status == RunStatus::Running)
                .all(|e| e.is_step(StepKind::Delay))
        );
    }

    #[tokio::test]
    async fn cancelled_before_first_step_reports_position() {
        let plan = RunPlan {
            name: "pick".into(),
            steps: vec![Step::Home],
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let emitter = RunEmitter::new(tx, &plan.name, 1);
        let cancel = CancellationToken::new();
        cancel.cancel();
        let terminal = run_plan(&plan, Arc::new(machine()), &settings(), &emitter, cancel).await;
        assert_eq!(terminal.status, RunStatus::Stopped);
        assert_eq!(terminal.message, "중단되었습니다 (단계 1/1).");
    }

    #[test]
    fn master_expansion_concatenates_in_sequence_order() {
        let scenarios = vec![
            Scenario::new("a", vec![Step::Home]),
            Scenario::new("b", vec![Step::PumpOn, Step::PumpOff]),
        ];
        let master = MasterScenario::new("shift", vec!["b".into(), "a".into(), "b".into()]);
        let plan = expand_master(&master, &scenarios).unwrap();
        assert_eq!(plan.name, "[M] shift");
        assert_eq!(
            plan.steps,
            vec![
                Step::PumpOn,
                Step::PumpOff,
                Step::Home,
                Step::PumpOn,
                Step::PumpOff
            ]
        );
    }

    #[test]
    fn master_expansion_reports_missing_names() {
        let scenarios = vec![Scenario::new("a", vec![Step::Home])];
        let master = MasterScenario::new("shift", vec!["a".into(), "x".into(), "y".into()]);
        assert_eq!(
            expand_master(&master, &scenarios),
            Err(vec!["x".to_string(), "y".to_string()])
        );
    }
}
