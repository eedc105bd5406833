use std::fmt;

/// 저장 가능한 엔티티 종류를 구분한다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// 단일 시나리오.
    Scenario,
    /// 시나리오 이름 목록으로 구성된 마스터 시나리오.
    MasterScenario,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Scenario => f.write_str("시나리오"),
            EntityKind::MasterScenario => f.write_str("마스터 시나리오"),
        }
    }
}

/// 작성 단계에서 거부되는 형식/범위 오류이다.
///
/// 저장 호출 이전에 로컬에서 검출되며, 초안은 변경되지 않는다.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// 이름이 비어 있다.
    #[error("{0} 이름이 필요합니다.")]
    EmptyName(EntityKind),
    /// 항목 목록이 비어 있다.
    #[error("{0}에 최소 한 개의 항목이 필요합니다.")]
    EmptyItems(EntityKind),
    /// Step 파라미터가 허용 범위를 벗어났다.
    #[error("'{kind}' 단계의 {field} 값이 올바르지 않습니다: {reason}")]
    InvalidParameter {
        kind: &'static str,
        field: &'static str,
        reason: String,
    },
    /// 마스터 시나리오에 추가할 시나리오 이름이 비어 있다.
    #[error("추가할 시나리오 이름이 비어 있습니다.")]
    EmptyReference,
    /// 초안 인덱스가 범위를 벗어났다.
    #[error("인덱스 {index}가 범위를 벗어났습니다 (길이 {len}).")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Gateway 호출에서 발생하는 오류이다.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// 형식/범위 검증 실패.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// 지정한 이름의 엔티티가 없다.
    #[error("{kind}를 찾을 수 없습니다: {name}")]
    NotFound { kind: EntityKind, name: String },
    /// 실행/중단 요청이 거부되었다.
    #[error("{0}")]
    Rejected(String),
    /// 저장소 읽기/쓰기 실패.
    #[error("저장소 오류: {0:#}")]
    Storage(#[from] anyhow::Error),
    /// 통신 계층 실패.
    #[error("통신 오류: {0}")]
    Transport(String),
}

impl GatewayError {
    /// NotFound 오류를 생성한다.
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        GatewayError::NotFound {
            kind,
            name: name.into(),
        }
    }
}
