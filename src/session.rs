use crate::config::MonitorSettings;
use crate::editor::{
    MasterBuilder, StepBuilder, builder_to_master, builder_to_scenario, copy_name,
    master_to_builder, scenario_to_builder,
};
use crate::engine::{RunEvent, RunStatus};
use crate::error::{EntityKind, GatewayError, ValidationError};
use crate::gateway::{RunTicket, ScenarioGateway};
use crate::monitor::ExecutionMonitor;
use crate::scenario::{MasterScenario, Scenario};
use std::time::Instant;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::{info, warn};

/// 세션 작업에서 발생하는 오류이다.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Gateway 호출 전에 로컬에서 거부됨.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Gateway가 요청을 거부하거나 실패함.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}

/// 삭제 확인을 기다리는 요청이다. `Session::confirm_delete`에 넘겨야 실제로 삭제된다.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct PendingDelete {
    kind: EntityKind,
    name: String,
}

impl PendingDelete {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 사용자에게 보여줄 확인 문구.
    pub fn prompt(&self) -> String {
        format!("'{}' {}를 삭제하시겠습니까?", self.name, self.kind)
    }
}

/// 한 사용자 세션의 작성 상태, 실행 모니터, 목록 캐시를 묶는다.
///
/// 작성 상태와 모니터는 서로 필드를 공유하지 않으므로 실행 중에도 편집할 수 있다.
pub struct Session<G> {
    gateway: G,
    builder: StepBuilder,
    master_builder: MasterBuilder,
    monitor: ExecutionMonitor,
    scenarios: Vec<Scenario>,
    masters: Vec<MasterScenario>,
    events: Option<UnboundedReceiver<RunEvent>>,
    saw_terminal: bool,
}

impl<G: ScenarioGateway> Session<G> {
    pub fn new(gateway: G, monitor: MonitorSettings) -> Self {
        Self {
            gateway,
            builder: StepBuilder::new(),
            master_builder: MasterBuilder::new(),
            monitor: ExecutionMonitor::new(monitor),
            scenarios: Vec::new(),
            masters: Vec::new(),
            events: None,
            saw_terminal: false,
        }
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn builder(&self) -> &StepBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut StepBuilder {
        &mut self.builder
    }

    pub fn master_builder(&self) -> &MasterBuilder {
        &self.master_builder
    }

    pub fn master_builder_mut(&mut self) -> &mut MasterBuilder {
        &mut self.master_builder
    }

    pub fn monitor(&self) -> &ExecutionMonitor {
        &self.monitor
    }

    /// 마지막으로 받은 시나리오 목록.
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// 마지막으로 받은 마스터 시나리오 목록.
    pub fn masters(&self) -> &[MasterScenario] {
        &self.masters
    }

    /// 두 목록을 Gateway에서 다시 읽는다.
    pub async fn refresh(&mut self) -> Result<(), SessionError> {
        self.scenarios = self.gateway.list_scenarios().await?;
        self.masters = self.gateway.list_master_scenarios().await?;
        Ok(())
    }

    /// 저장된 시나리오를 작성 상태로 불러온다.
    pub fn edit_scenario(&mut self, name: &str) -> Result<(), SessionError> {
        let scenario = self
            .scenarios
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| GatewayError::not_found(EntityKind::Scenario, name))?;
        self.builder = scenario_to_builder(scenario);
        Ok(())
    }

    /// 저장된 마스터 시나리오를 작성 상태로 불러온다.
    pub fn edit_master(&mut self, name: &str) -> Result<(), SessionError> {
        let master = self
            .masters
            .iter()
            .find(|m| m.name == name)
            .ok_or_else(|| GatewayError::not_found(EntityKind::MasterScenario, name))?;
        self.master_builder = master_to_builder(master);
        Ok(())
    }

    /// 시나리오 초안을 저장한다. 성공하면 초안을 비운다.
    ///
    /// 로컬 검증에 실패하면 Gateway를 호출하지 않고 초안을 그대로 둔다.
    pub async fn save_scenario(&mut self) -> Result<String, SessionError> {
        let scenario = builder_to_scenario(&self.builder)?;
        let reply = self
            .gateway
            .save_scenario(&scenario.name, scenario.steps)
            .await?;
        self.scenarios = reply.items;
        self.builder.clear();
        Ok(reply.message)
    }

    /// 마스터 시나리오 초안을 저장한다. 참조 이름의 존재 여부는 확인하지 않는다.
    pub async fn save_master(&mut self) -> Result<String, SessionError> {
        let master = builder_to_master(&self.master_builder)?;
        let reply = self
            .gateway
            .save_master_scenario(&master.name, master.sequence)
            .await?;
        self.masters = reply.items;
        self.master_builder.clear();
        Ok(reply.message)
    }

    /// 삭제 확인 요청을 만든다. 이 단계에서는 아무것도 삭제하지 않는다.
    pub fn request_delete(&self, kind: EntityKind, name: impl Into<String>) -> PendingDelete {
        PendingDelete {
            kind,
            name: name.into(),
        }
    }

    /// 확인된 삭제를 수행한다.
    ///
    /// 대상이 이미 없으면 목록을 다시 읽어 캐시를 맞춘 뒤 NotFound를 반환한다.
    pub async fn confirm_delete(&mut self, pending: PendingDelete) -> Result<String, SessionError> {
        let result = match pending.kind {
            EntityKind::Scenario => self
                .gateway
                .delete_scenario(&pending.name)
                .await
                .map(|reply| {
                    self.scenarios = reply.items;
                    reply.message
                }),
            EntityKind::MasterScenario => self
                .gateway
                .delete_master_scenario(&pending.name)
                .await
                .map(|reply| {
                    self.masters = reply.items;
                    reply.message
                }),
        };
        match result {
            Ok(message) => Ok(message),
            Err(err @ GatewayError::NotFound { .. }) => {
                warn!(name = %pending.name, "삭제 대상 없음, 목록 재동기화");
                if let Err(refresh_err) = self.refresh().await {
                    warn!(error = %refresh_err, "목록 재동기화 실패");
                }
                Err(err.into())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// 시나리오를 고유한 "(Copy)" 이름으로 복제하고 새 이름을 반환한다.
    pub async fn duplicate_scenario(&mut self, name: &str) -> Result<String, SessionError> {
        let source = self
            .scenarios
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| GatewayError::not_found(EntityKind::Scenario, name))?;
        let new_name = copy_name(&source.name, self.scenarios.iter().map(|s| s.name.as_str()));
        let steps = source.steps.clone();
        let reply = self.gateway.save_scenario(&new_name, steps).await?;
        self.scenarios = reply.items;
        info!(from = %name, to = %new_name, "시나리오 복제");
        Ok(new_name)
    }

    /// 시나리오 실행을 요청한다. 모니터 상태는 이벤트가 도착해야 바뀐다.
    pub async fn run_scenario(&mut self, name: &str) -> Result<String, SessionError> {
        let ticket = self.gateway.run_scenario(name).await?;
        Ok(self.attach(ticket))
    }

    /// 마스터 시나리오 실행을 요청한다.
    pub async fn run_master(&mut self, name: &str) -> Result<String, SessionError> {
        let ticket = self.gateway.run_master_scenario(name).await?;
        Ok(self.attach(ticket))
    }

    /// 중단을 요청한다. 모니터는 `stopped` 이벤트를 받을 때까지 실행 상태를 유지한다.
    pub async fn stop(&mut self) -> Result<String, SessionError> {
        let ack = self.gateway.stop_run().await?;
        Ok(ack.message)
    }

    /// 실행 이벤트 채널이 열려 있는지 여부.
    pub fn is_watching(&self) -> bool {
        self.events.is_some()
    }

    /// 지금까지 도착한 이벤트를 기다리지 않고 모두 반영하고 처리한 수를 반환한다.
    pub fn pump_events(&mut self, now: Instant) -> usize {
        let mut applied = 0;
        while let Some(events) = self.events.as_mut() {
            match events.try_recv() {
                Ok(event) => {
                    self.observe(&event, now);
                    applied += 1;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.close_stream(),
            }
        }
        self.monitor.tick(now);
        applied
    }

    /// 채널이 닫힐 때까지 이벤트를 반영하고 종료 상태를 반환한다.
    ///
    /// 이벤트마다 `on_event`가 호출된다.
    pub async fn watch<F>(&mut self, mut on_event: F) -> Option<RunStatus>
    where
        F: FnMut(&RunEvent, &ExecutionMonitor),
    {
        let mut terminal = None;
        while let Some(events) = self.events.as_mut() {
            match events.recv().await {
                Some(event) => {
                    self.observe(&event, Instant::now());
                    if event.status.is_terminal() {
                        terminal = Some(event.status.clone());
                    }
                    on_event(&event, &self.monitor);
                }
                None => self.close_stream(),
            }
        }
        terminal
    }

    fn attach(&mut self, ticket: RunTicket) -> String {
        info!(run_id = ticket.run_id, "실행 이벤트 구독");
        self.events = Some(ticket.events);
        self.saw_terminal = false;
        ticket.message
    }

    fn observe(&mut self, event: &RunEvent, now: Instant) {
        if event.status.is_terminal() {
            self.saw_terminal = true;
        }
        self.monitor.apply(event, now);
    }

    fn close_stream(&mut self) {
        self.events = None;
        if !self.saw_terminal {
            let err = GatewayError::Transport("종료 이벤트 전에 이벤트 스트림이 끊어졌습니다.".into());
            warn!(error = %err, "이벤트 스트림 종료");
            self.monitor.report_local_error(err.to_string());
        }
    }
}
