use crate::config::MonitorSettings;
use crate::engine::{RunEvent, RunStatus};
use crate::registry::StepKind;
use std::collections::VecDeque;
use std::time::Instant;
use tracing::debug;

/// 실행 제어 상태이다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorState {
    /// 실행 중인 작업이 없다.
    Idle,
    /// 실행이 진행 중이다.
    Running,
    /// 종료 이벤트를 받았고 표시 유예 시간이 남아 있다.
    Finished { status: RunStatus, until: Instant },
}

/// 로그 줄의 표시 등급이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    fn of(status: &RunStatus) -> Self {
        match status {
            RunStatus::Done => Severity::Success,
            RunStatus::Error | RunStatus::Timeout => Severity::Error,
            RunStatus::Stopped | RunStatus::Warning => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// 모니터 로그 한 줄.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub status: RunStatus,
    pub severity: Severity,
    pub text: String,
    pub step_index: Option<usize>,
}

/// 진행 이벤트 스트림을 받아 실행 제어 상태와 로그를 유지한다.
///
/// 시간은 호출자가 넘겨준다. 이벤트는 받은 순서대로 처리하며 재정렬하지 않는다.
#[derive(Debug, Clone)]
pub struct ExecutionMonitor {
    settings: MonitorSettings,
    state: MonitorState,
    log: VecDeque<LogEntry>,
    overlay: Option<String>,
    overlay_hide_at: Option<Instant>,
    current_step: Option<usize>,
    total_steps: Option<usize>,
    last_data: Option<serde_json::Value>,
}

impl ExecutionMonitor {
    pub fn new(settings: MonitorSettings) -> Self {
        Self {
            settings,
            state: MonitorState::Idle,
            log: VecDeque::new(),
            overlay: None,
            overlay_hide_at: None,
            current_step: None,
            total_steps: None,
            last_data: None,
        }
    }

    pub fn state(&self) -> &MonitorState {
        &self.state
    }

    /// 실행 버튼 활성화 여부.
    pub fn run_enabled(&self) -> bool {
        self.state == MonitorState::Idle
    }

    /// 중단 버튼 활성화 여부. 종료 후 유예 시간 동안은 켜진 채로 남는다.
    pub fn stop_enabled(&self) -> bool {
        !self.run_enabled()
    }

    /// 오래된 줄부터 순서대로 로그를 반환한다.
    pub fn log(&self) -> impl Iterator<Item = &LogEntry> {
        self.log.iter()
    }

    pub fn log_len(&self) -> usize {
        self.log.len()
    }

    /// 현재 오버레이 문구.
    pub fn overlay(&self) -> Option<&str> {
        self.overlay.as_deref()
    }

    /// 현재 Step 위치(0 기반)와 총 Step 수.
    pub fn current_step(&self) -> Option<(usize, Option<usize>)> {
        self.current_step.map(|index| (index, self.total_steps))
    }

    /// 마지막으로 받은 부가 데이터.
    pub fn last_data(&self) -> Option<&serde_json::Value> {
        self.last_data.as_ref()
    }

    /// 이벤트 하나를 반영한다.
    pub fn apply(&mut self, event: &RunEvent, now: Instant) {
        self.tick(now);
        self.push_log(event);
        if let Some(data) = &event.data {
            self.last_data = Some(data.clone());
        }

        match &event.status {
            status if status.is_active() => {
                if event.step_index.is_some() {
                    self.current_step = event.step_index;
                }
                if event.total_steps.is_some() {
                    self.total_steps = event.total_steps;
                }
                if self.state != MonitorState::Running {
                    debug!(status = %status, "모니터 실행 상태 진입");
                    self.state = MonitorState::Running;
                }
                // 대기 Step은 직전 Step의 오버레이를 그대로 둔다.
                if !event.is_step(StepKind::Delay) {
                    self.overlay = Some(event.message.clone());
                    self.overlay_hide_at = None;
                }
            }
            status if status.is_terminal() => {
                if self.state != MonitorState::Running {
                    debug!(status = %status, "실행 중이 아닐 때 받은 종료 이벤트");
                    return;
                }
                let grace = if *status == RunStatus::Done {
                    self.settings.done_grace()
                } else {
                    self.settings.error_grace()
                };
                let until = now + grace;
                self.state = MonitorState::Finished {
                    status: status.clone(),
                    until,
                };
                self.overlay = Some(match status {
                    RunStatus::Error => format!("오류: {}", event.message),
                    _ => event.message.clone(),
                });
                self.overlay_hide_at = Some(until);
            }
            _ => {}
        }
    }

    /// 유예 시간이 지난 종료 상태를 정리한다.
    pub fn tick(&mut self, now: Instant) {
        if let MonitorState::Finished { until, .. } = &self.state {
            if now >= *until {
                self.state = MonitorState::Idle;
                self.current_step = None;
                self.total_steps = None;
            }
        }
        if self.overlay_hide_at.is_some_and(|at| now >= at) {
            self.overlay = None;
            self.overlay_hide_at = None;
        }
    }

    /// 스트림 구독 실패처럼 Gateway 밖에서 생긴 오류를 로그에 남긴다.
    ///
    /// 실행 제어 상태는 바꾸지 않는다.
    pub fn report_local_error(&mut self, message: impl Into<String>) {
        let entry = LogEntry {
            status: RunStatus::Error,
            severity: Severity::Error,
            text: format!("[local] {}", message.into()),
            step_index: None,
        };
        self.push_entry(entry);
    }

    /// 모든 상태를 초기화한다.
    pub fn reset(&mut self) {
        *self = Self::new(self.settings.clone());
    }

    fn push_log(&mut self, event: &RunEvent) {
        let mut text = format!("[{}] {}", event.status, event.message);
        if let (Some(index), Some(total)) = (event.step_index, event.total_steps) {
            text = format!("({}/{total}) {text}", index + 1);
        }
        self.push_entry(LogEntry {
            status: event.status.clone(),
            severity: Severity::of(&event.status),
            text,
            step_index: event.step_index,
        });
    }

    fn push_entry(&mut self, entry: LogEntry) {
        if self.settings.log_capacity == 0 {
            return;
        }
        while self.log.len() >= self.settings.log_capacity {
            self.log.pop_front();
        }
        self.log.push_back(entry);
    }
}

impl Default for ExecutionMonitor {
    fn default() -> Self {
        Self::new(MonitorSettings::default())
    }
}
