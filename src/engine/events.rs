use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::registry::StepKind;

/// 실행 진행 이벤트의 상태 값이다.
///
/// 알 수 없는 상태 문자열은 [`RunStatus::Other`]로 그대로 보존한다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// 실행 시작.
    Started,
    /// 실행 중(대기 Step 포함).
    Running,
    /// 정상 완료.
    Done,
    /// 실패로 중단.
    Error,
    /// 사용자 요청으로 중단.
    Stopped,
    /// 제한 시간 안에 완료되지 않음.
    Timeout,
    /// 실행 상태에 영향을 주지 않는 경고.
    Warning,
    /// 알 수 없는 상태 문자열.
    Other(String),
}

impl RunStatus {
    /// 상태 문자열을 반환한다.
    pub fn as_str(&self) -> &str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Running => "running",
            RunStatus::Done => "done",
            RunStatus::Error => "error",
            RunStatus::Stopped => "stopped",
            RunStatus::Timeout => "timeout",
            RunStatus::Warning => "warning",
            RunStatus::Other(value) => value,
        }
    }

    /// 문자열을 상태 값으로 변환한다.
    pub fn parse(value: &str) -> Self {
        match value {
            "started" => RunStatus::Started,
            "running" => RunStatus::Running,
            "done" => RunStatus::Done,
            "error" => RunStatus::Error,
            "stopped" => RunStatus::Stopped,
            "timeout" => RunStatus::Timeout,
            "warning" => RunStatus::Warning,
            other => RunStatus::Other(other.to_string()),
        }
    }

    /// 실행이 진행 중임을 나타내는지 여부.
    pub fn is_active(&self) -> bool {
        matches!(self, RunStatus::Started | RunStatus::Running)
    }

    /// 실행 종료 상태인지 여부.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Done | RunStatus::Error | RunStatus::Stopped | RunStatus::Timeout
        )
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for RunStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RunStatus {
    /// 알 수 없는 값도 실패 없이 보존하도록 역직렬화한다.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(RunStatus::parse(&value))
    }
}

/// 실행 중 Gateway가 보내는 진행 이벤트이다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// 상태 값.
    pub status: RunStatus,
    /// 사람이 읽을 메시지.
    pub message: String,
    /// 현재 Step 종류 태그.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_type: Option<String>,
    /// 현재 Step 위치(0 기반).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    /// 실행 중인 Step 총 수.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_steps: Option<usize>,
    /// 실행 이름.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_name: Option<String>,
    /// 화면 표시용 부가 데이터. 내용은 해석하지 않는다.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RunEvent {
    /// 상태와 메시지만 가진 이벤트를 생성한다.
    pub fn new(status: RunStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            step_type: None,
            step_index: None,
            total_steps: None,
            scenario_name: None,
            data: None,
        }
    }

    /// Step 위치 정보를 붙인다.
    pub fn at_step(mut self, kind: StepKind, index: usize) -> Self {
        self.step_type = Some(kind.as_str().to_string());
        self.step_index = Some(index);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Step 종류가 지정한 종류인지 확인한다.
    pub fn is_step(&self, kind: StepKind) -> bool {
        self.step_type.as_deref() == Some(kind.as_str())
    }
}
