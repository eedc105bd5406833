use super::model::{MasterBuilder, StepBuilder};
use crate::error::{EntityKind, ValidationError};
use crate::registry;
use crate::scenario::{MasterScenario, Scenario};

/// Scenario를 작성 상태로 변환한다.
pub fn scenario_to_builder(scenario: &Scenario) -> StepBuilder {
    StepBuilder::with_steps(scenario.name.clone(), scenario.steps.clone())
}

/// 작성 상태를 저장 가능한 Scenario로 변환한다.
///
/// 이름과 Step 목록이 비어 있으면 거부한다. 작성 상태는 변경하지 않는다.
pub fn builder_to_scenario(builder: &StepBuilder) -> Result<Scenario, ValidationError> {
    let name = builder.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName(EntityKind::Scenario));
    }
    if builder.steps().is_empty() {
        return Err(ValidationError::EmptyItems(EntityKind::Scenario));
    }
    registry::validate_all(builder.steps())?;
    Ok(Scenario::new(name, builder.steps().to_vec()))
}

/// MasterScenario를 작성 상태로 변환한다.
pub fn master_to_builder(master: &MasterScenario) -> MasterBuilder {
    MasterBuilder::with_sequence(master.name.clone(), master.sequence.clone())
}

/// 작성 상태를 저장 가능한 MasterScenario로 변환한다.
///
/// 참조 이름이 실제로 존재하는지는 확인하지 않는다.
pub fn builder_to_master(builder: &MasterBuilder) -> Result<MasterScenario, ValidationError> {
    let name = builder.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName(EntityKind::MasterScenario));
    }
    if builder.sequence().is_empty() {
        return Err(ValidationError::EmptyItems(EntityKind::MasterScenario));
    }
    Ok(MasterScenario::new(name, builder.sequence().to_vec()))
}

/// 복제본에 사용할 고유 이름을 생성한다.
///
/// `"X (Copy)"`가 비어 있으면 그대로 쓰고, 아니면 `"X (Copy 2)"`부터 번호를 올린다.
pub fn copy_name<'a>(name: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let taken: std::collections::HashSet<&str> = existing.into_iter().collect();
    let first = format!("{name} (Copy)");
    if !taken.contains(first.as_str()) {
        return first;
    }
    let mut idx = 2;
    loop {
        let candidate = format!("{name} (Copy {idx})");
        if !taken.contains(candidate.as_str()) {
            return candidate;
        }
        idx += 1;
    }
}
