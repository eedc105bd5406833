use crate::config::{RunSettings, Settings};
use crate::engine::{RunEmitter, RunEvent, RunPlan, RunStatus, expand_master, run_plan};
use crate::error::{EntityKind, GatewayError, ValidationError};
use crate::executor::SharedExecutor;
use crate::registry;
use crate::scenario::{MasterScenario, Scenario, Step};
use crate::store::EntityStore;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 저장/삭제 후 갱신된 전체 목록을 담은 응답이다.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreReply<T> {
    pub message: String,
    pub items: Vec<T>,
}

/// 요청이 받아들여졌음을 알리는 응답이다.
#[derive(Debug, Clone, PartialEq)]
pub struct Ack {
    pub message: String,
}

/// 받아들여진 실행 요청이다. 진행 이벤트는 `events`로 순서대로 도착한다.
///
/// 종료 이벤트를 보낸 뒤 송신측이 닫힌다.
#[derive(Debug)]
pub struct RunTicket {
    pub run_id: u64,
    pub message: String,
    pub events: UnboundedReceiver<RunEvent>,
}

/// 시나리오 저장과 실행을 담당하는 외부 협력자와의 경계이다.
#[async_trait]
pub trait ScenarioGateway: Send + Sync {
    async fn list_scenarios(&self) -> Result<Vec<Scenario>, GatewayError>;
    async fn save_scenario(
        &self,
        name: &str,
        steps: Vec<Step>,
    ) -> Result<StoreReply<Scenario>, GatewayError>;
    async fn delete_scenario(&self, name: &str) -> Result<StoreReply<Scenario>, GatewayError>;
    /// 실행을 시작하고 즉시 반환한다.
    async fn run_scenario(&self, name: &str) -> Result<RunTicket, GatewayError>;
    /// 실행 중인 시나리오에 중단을 요청한다. 실제 중단은 `stopped` 이벤트로 확인한다.
    async fn stop_run(&self) -> Result<Ack, GatewayError>;

    async fn list_master_scenarios(&self) -> Result<Vec<MasterScenario>, GatewayError>;
    async fn save_master_scenario(
        &self,
        name: &str,
        sequence: Vec<String>,
    ) -> Result<StoreReply<MasterScenario>, GatewayError>;
    async fn delete_master_scenario(
        &self,
        name: &str,
    ) -> Result<StoreReply<MasterScenario>, GatewayError>;
    /// 참조된 시나리오는 실행 시점에 해석된다.
    async fn run_master_scenario(&self, name: &str) -> Result<RunTicket, GatewayError>;
}

/// 실행 중인 작업 정보.
#[derive(Debug)]
struct ActiveRun {
    run_id: u64,
    name: String,
    cancel: CancellationToken,
}

/// 파일 저장소와 MachineExecutor로 동작하는 프로세스 내 Gateway이다.
///
/// 한 번에 하나의 실행만 허용한다.
pub struct LocalGateway {
    scenarios: Mutex<EntityStore<Scenario>>,
    masters: Mutex<EntityStore<MasterScenario>>,
    executor: SharedExecutor,
    settings: RunSettings,
    active: Arc<Mutex<Option<ActiveRun>>>,
    next_run_id: AtomicU64,
}

impl LocalGateway {
    pub fn new(
        scenarios: EntityStore<Scenario>,
        masters: EntityStore<MasterScenario>,
        executor: SharedExecutor,
        settings: RunSettings,
    ) -> Self {
        Self {
            scenarios: Mutex::new(scenarios),
            masters: Mutex::new(masters),
            executor,
            settings,
            active: Arc::new(Mutex::new(None)),
            next_run_id: AtomicU64::new(1),
        }
    }

    /// 설정의 저장 경로에서 목록을 읽어 Gateway를 연다.
    pub fn open(settings: &Settings, executor: SharedExecutor) -> anyhow::Result<Self> {
        let scenarios = EntityStore::open(EntityKind::Scenario, settings.store.scenarios_path())?;
        let masters = EntityStore::open(
            EntityKind::MasterScenario,
            settings.store.master_scenarios_path(),
        )?;
        Ok(Self::new(scenarios, masters, executor, settings.run.clone()))
    }

    /// 메모리 저장소를 사용하는 Gateway를 생성한다.
    pub fn in_memory(executor: SharedExecutor, settings: RunSettings) -> Self {
        Self::new(
            EntityStore::in_memory(EntityKind::Scenario),
            EntityStore::in_memory(EntityKind::MasterScenario),
            executor,
            settings,
        )
    }

    /// 현재 실행 중인 이름을 반환한다.
    pub async fn active_run(&self) -> Option<String> {
        self.active.lock().await.as_ref().map(|run| run.name.clone())
    }

    /// 실행 슬롯을 차지하고 백그라운드 작업을 시작한다.
    ///
    /// `plan`이 `Err`이면 `started` 다음에 `error`를 보내고 Step은 실행하지 않는다.
    async fn launch(
        &self,
        name: String,
        plan: Result<RunPlan, String>,
    ) -> Result<RunTicket, GatewayError> {
        let mut slot = self.active.lock().await;
        if let Some(current) = slot.as_ref() {
            warn!(requested = %name, running = %current.name, "실행 요청 거부");
            return Err(GatewayError::Rejected(
                "이미 실행 중인 시나리오가 있습니다.".into(),
            ));
        }
        let run_id = self.next_run_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        *slot = Some(ActiveRun {
            run_id,
            name: name.clone(),
            cancel: cancel.clone(),
        });
        drop(slot);

        let (tx, rx) = mpsc::unbounded_channel();
        let total = plan.as_ref().map(|p| p.steps.len()).unwrap_or(0);
        let emitter = RunEmitter::new(tx, name.clone(), total);
        let executor = self.executor.clone();
        let settings = self.settings.clone();
        let active = self.active.clone();
        let message = format!("'{name}' 실행을 시작합니다.");
        info!(run_id, %name, "실행 시작");

        let worker = {
            let emitter = emitter.clone();
            tokio::spawn(async move {
                match plan {
                    Ok(plan) => run_plan(&plan, executor, &settings, &emitter, cancel).await,
                    Err(message) => {
                        emitter.emit(RunEvent::new(
                            RunStatus::Started,
                            format!("'{name}' 시작 ({total} 단계)"),
                        ));
                        emitter.decorate(RunEvent::new(RunStatus::Error, message))
                    }
                }
            })
        };

        // 실행 작업이 비정상 종료되어도 슬롯을 비우고 종료 이벤트를 보낸다.
        tokio::spawn(async move {
            let terminal = match worker.await {
                Ok(terminal) => terminal,
                Err(err) => {
                    error!(run_id, error = %err, "실행 작업 비정상 종료");
                    emitter.decorate(RunEvent::new(
                        RunStatus::Error,
                        format!("실행 작업이 비정상 종료되었습니다: {err}"),
                    ))
                }
            };
            {
                let mut slot = active.lock().await;
                if slot.as_ref().is_some_and(|run| run.run_id == run_id) {
                    *slot = None;
                }
            }
            info!(run_id, status = %terminal.status, "실행 종료");
            emitter.emit(terminal);
        });

        Ok(RunTicket {
            run_id,
            message,
            events: rx,
        })
    }
}

fn checked_name(name: &str, kind: EntityKind) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName(kind));
    }
    Ok(name.to_string())
}

#[async_trait]
impl ScenarioGateway for LocalGateway {
    async fn list_scenarios(&self) -> Result<Vec<Scenario>, GatewayError> {
        Ok(self.scenarios.lock().await.list().to_vec())
    }

    async fn save_scenario(
        &self,
        name: &str,
        steps: Vec<Step>,
    ) -> Result<StoreReply<Scenario>, GatewayError> {
        let name = checked_name(name, EntityKind::Scenario)?;
        if steps.is_empty() {
            return Err(ValidationError::EmptyItems(EntityKind::Scenario).into());
        }
        registry::validate_all(&steps)?;
        let mut store = self.scenarios.lock().await;
        store.upsert(Scenario::new(name.clone(), steps))?;
        info!(%name, "시나리오 저장");
        Ok(StoreReply {
            message: format!("'{name}' 시나리오가 저장되었습니다."),
            items: store.list().to_vec(),
        })
    }

    async fn delete_scenario(&self, name: &str) -> Result<StoreReply<Scenario>, GatewayError> {
        let name = name.trim();
        let mut store = self.scenarios.lock().await;
        store.remove(name)?;
        info!(%name, "시나리오 삭제");
        Ok(StoreReply {
            message: format!("'{name}' 시나리오가 삭제되었습니다."),
            items: store.list().to_vec(),
        })
    }

    async fn run_scenario(&self, name: &str) -> Result<RunTicket, GatewayError> {
        let name = name.trim();
        let plan = {
            let store = self.scenarios.lock().await;
            let scenario = store
                .get(name)
                .ok_or_else(|| GatewayError::not_found(EntityKind::Scenario, name))?;
            RunPlan::from_scenario(scenario)
        };
        self.launch(plan.name.clone(), Ok(plan)).await
    }

    async fn stop_run(&self) -> Result<Ack, GatewayError> {
        let slot = self.active.lock().await;
        let Some(run) = slot.as_ref() else {
            return Err(GatewayError::Rejected(
                "실행 중인 시나리오가 없습니다.".into(),
            ));
        };
        run.cancel.cancel();
        info!(run_id = run.run_id, name = %run.name, "중단 요청");
        Ok(Ack {
            message: "중단을 요청했습니다.".into(),
        })
    }

    async fn list_master_scenarios(&self) -> Result<Vec<MasterScenario>, GatewayError> {
        Ok(self.masters.lock().await.list().to_vec())
    }

    async fn save_master_scenario(
        &self,
        name: &str,
        sequence: Vec<String>,
    ) -> Result<StoreReply<MasterScenario>, GatewayError> {
        let name = checked_name(name, EntityKind::MasterScenario)?;
        if sequence.is_empty() {
            return Err(ValidationError::EmptyItems(EntityKind::MasterScenario).into());
        }
        if sequence.iter().any(|reference| reference.trim().is_empty()) {
            return Err(ValidationError::EmptyReference.into());
        }
        let mut store = self.masters.lock().await;
        store.upsert(MasterScenario::new(name.clone(), sequence))?;
        info!(%name, "마스터 시나리오 저장");
        Ok(StoreReply {
            message: format!("'{name}' 마스터 시나리오가 저장되었습니다."),
            items: store.list().to_vec(),
        })
    }

    async fn delete_master_scenario(
        &self,
        name: &str,
    ) -> Result<StoreReply<MasterScenario>, GatewayError> {
        let name = name.trim();
        let mut store = self.masters.lock().await;
        store.remove(name)?;
        info!(%name, "마스터 시나리오 삭제");
        Ok(StoreReply {
            message: format!("'{name}' 마스터 시나리오가 삭제되었습니다."),
            items: store.list().to_vec(),
        })
    }

    async fn run_master_scenario(&self, name: &str) -> Result<RunTicket, GatewayError> {
        let name = name.trim();
        let master = self
            .masters
            .lock()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(EntityKind::MasterScenario, name))?;
        let plan = {
            let scenarios = self.scenarios.lock().await;
            expand_master(&master, scenarios.list())
        };
        let plan = plan.map_err(|missing| {
            warn!(master = %master.name, ?missing, "참조된 시나리오 없음");
            format!("시나리오를 찾을 수 없습니다: {}", missing.join(", "))
        });
        self.launch(RunPlan::master_name(&master), plan).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BasePosition;
    use crate::executor::SimulatedMachine;
    use std::time::Duration;

    fn settings() -> RunSettings {
        RunSettings {
            step_pause_ms: 0,
            auto_center_timeout_secs: 1,
            verify_timeout_secs: 1,
        }
    }

    fn gateway_with(machine: SimulatedMachine) -> LocalGateway {
        LocalGateway::in_memory(Arc::new(machine), settings())
    }

    fn gateway() -> LocalGateway {
        gateway_with(SimulatedMachine::new().with_base(BasePosition {
            name: "TRAY".into(),
            x: 0.0,
            y: 0.0,
            z: 0.0,
        }))
    }

    async fn collect(mut ticket: RunTicket) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Some(event) = ticket.events.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn save_is_an_idempotent_upsert() {
        let gateway = gateway();
        let steps = vec![Step::Home, Step::PumpOn];
        gateway.save_scenario("pick", steps.clone()).await.unwrap();
        let reply = gateway.save_scenario("pick", steps.clone()).await.unwrap();
        assert_eq!(reply.items, vec![Scenario::new("pick", steps)]);
        assert_eq!(gateway.list_scenarios().await.unwrap(), reply.items);
    }

    #[tokio::test]
    async fn save_rejects_empty_steps_and_accepts_home() {
        let gateway = gateway();
        let err = gateway.save_scenario("pick", vec![]).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Validation(ValidationError::EmptyItems(EntityKind::Scenario))
        ));
        let err = gateway.save_scenario("  ", vec![Step::Home]).await.unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Validation(ValidationError::EmptyName(_))
        ));
        assert!(gateway.save_scenario("pick", vec![Step::Home]).await.is_ok());
    }

    #[tokio::test]
    async fn save_rejects_out_of_range_parameters() {
        let gateway = gateway();
        let err = gateway
            .save_scenario("wait", vec![Step::Delay { seconds: 0.0 }])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            GatewayError::Validation(ValidationError::InvalidParameter { .. })
        ));
        assert!(gateway.list_scenarios().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn deleting_unknown_names_is_not_found() {
        let gateway = gateway();
        assert!(matches!(
            gateway.delete_scenario("ghost").await.unwrap_err(),
            GatewayError::NotFound { .. }
        ));
        assert!(matches!(
            gateway.delete_master_scenario("ghost").await.unwrap_err(),
            GatewayError::NotFound { .. }
        ));
        gateway.save_scenario("pick", vec![Step::Home]).await.unwrap();
        let reply = gateway.delete_scenario("pick").await.unwrap();
        assert!(reply.items.is_empty());
    }

    #[tokio::test]
    async fn run_streams_events_and_closes_after_terminal() {
        let gateway = gateway();
        gateway
            .save_scenario(
                "pick",
                vec![
                    Step::GotoBase {
                        base_name: "TRAY".into(),
                    },
                    Step::Home,
                ],
            )
            .await
            .unwrap();
        let ticket = gateway.run_scenario("pick").await.unwrap();
        let statuses: Vec<RunStatus> = collect(ticket).await.into_iter().map(|e| e.status).collect();
        assert_eq!(
            statuses,
            vec![
                RunStatus::Started,
                RunStatus::Running,
                RunStatus::Running,
                RunStatus::Done
            ]
        );
        assert_eq!(gateway.active_run().await, None);
    }

    #[tokio::test]
    async fn unknown_scenario_cannot_be_run() {
        let gateway = gateway();
        assert!(matches!(
            gateway.run_scenario("ghost").await.unwrap_err(),
            GatewayError::NotFound { .. }
        ));
    }

    #[tokio::test]
    async fn second_run_is_rejected_and_stop_needs_a_run() {
        let gateway = gateway();
        assert!(matches!(
            gateway.stop_run().await.unwrap_err(),
            GatewayError::Rejected(_)
        ));
        gateway
            .save_scenario("wait", vec![Step::Delay { seconds: 30.0 }])
            .await
            .unwrap();
        let ticket = gateway.run_scenario("wait").await.unwrap();
        assert!(matches!(
            gateway.run_scenario("wait").await.unwrap_err(),
            GatewayError::Rejected(_)
        ));
        assert_eq!(gateway.active_run().await.as_deref(), Some("wait"));

        gateway.stop_run().await.unwrap();
        let events = tokio::time::timeout(Duration::from_secs(5), collect(ticket))
            .await
            .unwrap();
        assert_eq!(events.last().unwrap().status, RunStatus::Stopped);
        assert!(gateway.run_scenario("wait").await.is_ok());
    }

    #[tokio::test]
    async fn master_with_missing_reference_fails_only_at_run_time() {
        let gateway = gateway();
        gateway.save_scenario("a", vec![Step::Home]).await.unwrap();
        let reply = gateway
            .save_master_scenario("shift", vec!["a".into(), "ghost".into()])
            .await
            .unwrap();
        assert_eq!(reply.items.len(), 1);

        let ticket = gateway.run_master_scenario("shift").await.unwrap();
        let events = collect(ticket).await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].status, RunStatus::Started);
        assert_eq!(events[1].status, RunStatus::Error);
        assert!(events[1].message.contains("ghost"));
        assert_eq!(events[1].scenario_name.as_deref(), Some("[M] shift"));
    }

    #[tokio::test]
    async fn master_runs_referenced_steps_in_order() {
        let machine = SimulatedMachine::new();
        let gateway = gateway_with(machine.clone());
        gateway.save_scenario("a", vec![Step::Home]).await.unwrap();
        gateway
            .save_scenario("b", vec![Step::PumpOn, Step::PumpOff])
            .await
            .unwrap();
        gateway
            .save_master_scenario("shift", vec!["b".into(), "a".into()])
            .await
            .unwrap();
        let events = collect(gateway.run_master_scenario("shift").await.unwrap()).await;
        assert_eq!(events.last().unwrap().status, RunStatus::Done);
        assert!(events.iter().all(|e| e.total_steps == Some(3)));
        assert_eq!(machine.commands().await, vec!["pump on", "pump off", "home"]);
    }

    #[tokio::test]
    async fn oversized_delay_fails_and_frees_the_slot() {
        let gateway = gateway();
        gateway
            .save_scenario("wait", vec![Step::Delay { seconds: 1e300 }])
            .await
            .unwrap();
        let events = collect(gateway.run_scenario("wait").await.unwrap()).await;
        let last = events.last().unwrap();
        assert_eq!(last.status, RunStatus::Error);
        assert_eq!(last.step_index, Some(0));
        assert_eq!(gateway.active_run().await, None);
        assert!(gateway.run_scenario("wait").await.is_ok());
    }

    /// 원점 복귀 중 패닉하는 장비.
    struct PanickingMachine;

    #[async_trait]
    impl crate::executor::MachineExecutor for PanickingMachine {
        async fn goto_base(&self, _base_name: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn auto_center(&self, _word: &str) -> anyhow::Result<()> {
            Ok(())
        }
        async fn set_pump(&self, _on: bool) -> anyhow::Result<()> {
            Ok(())
        }
        async fn move_z(&self, _z: f64) -> anyhow::Result<()> {
            Ok(())
        }
        async fn home(&self) -> anyhow::Result<()> {
            panic!("드라이버 내부 오류")
        }
        async fn verify(&self) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn resistance_test(&self, _test_count: u32) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn diode_test(&self, _test_count: u32) -> anyhow::Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn nozzle_goto(&self, _angle: f64) -> anyhow::Result<()> {
            Ok(())
        }
        async fn nozzle_home(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn crashed_run_task_still_ends_with_error() {
        let gateway = LocalGateway::in_memory(Arc::new(PanickingMachine), settings());
        gateway.save_scenario("pick", vec![Step::Home]).await.unwrap();
        let events = collect(gateway.run_scenario("pick").await.unwrap()).await;
        let last = events.last().unwrap();
        assert_eq!(last.status, RunStatus::Error);
        assert_eq!(last.scenario_name.as_deref(), Some("pick"));
        assert_eq!(gateway.active_run().await, None);
        assert!(gateway.run_scenario("pick").await.is_ok());
    }

    #[tokio::test]
    async fn lookups_ignore_surrounding_whitespace() {
        let gateway = gateway();
        gateway.save_scenario(" pick ", vec![Step::Home]).await.unwrap();
        gateway
            .save_master_scenario(" shift", vec!["pick".into()])
            .await
            .unwrap();

        let events = collect(gateway.run_scenario(" pick").await.unwrap()).await;
        assert_eq!(events.last().unwrap().status, RunStatus::Done);
        let events = collect(gateway.run_master_scenario("shift ").await.unwrap()).await;
        assert_eq!(events.last().unwrap().status, RunStatus::Done);

        assert!(gateway.delete_master_scenario(" shift").await.is_ok());
        let reply = gateway.delete_scenario(" pick").await.unwrap();
        assert!(reply.items.is_empty());
    }
}
