use crate::error::ValidationError;
use crate::registry::StepKind;
use crate::scenario::Step;

use super::draft::{Direction, Draft, EditState};
use super::step::StepInput;

/// 시나리오 작성 상태를 보관한다.
///
/// 저장되지 않으며 저장, 취소, 화면 이탈 시 버려진다.
#[derive(Debug, Clone, Default)]
pub struct StepBuilder {
    /// 시나리오 이름 입력값.
    pub name: String,
    /// Step 작업 목록.
    draft: Draft<Step>,
    /// 현재 Step 입력 화면 값.
    input: StepInput,
}

impl StepBuilder {
    /// 빈 작성 상태를 생성한다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기존 시나리오 내용으로 작성 상태를 채운다.
    pub fn with_steps(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            draft: Draft::from_items(steps),
            input: StepInput::default(),
        }
    }

    /// 작업 중인 Step 목록.
    pub fn steps(&self) -> &[Step] {
        self.draft.items()
    }

    /// 현재 편집 상태.
    pub fn state(&self) -> EditState {
        self.draft.state()
    }

    /// 현재 입력값.
    pub fn input(&self) -> &StepInput {
        &self.input
    }

    /// 입력값을 수정할 수 있도록 반환한다.
    pub fn input_mut(&mut self) -> &mut StepInput {
        &mut self.input
    }

    /// 입력 화면의 Step 종류를 바꾼다. 다른 칸의 값은 유지한다.
    pub fn select_kind(&mut self, kind: StepKind) {
        self.input.kind = kind;
    }

    /// 지정 Step을 편집 대상으로 잡고 입력 화면을 해당 값으로 채운다.
    pub fn begin_edit(&mut self, index: usize) -> Result<(), ValidationError> {
        let step = self.draft.begin_edit(index)?;
        self.input = StepInput::from_step(step);
        Ok(())
    }

    /// 입력값을 검증해 반영하고 반영된 위치를 반환한다.
    ///
    /// 검증에 실패하면 목록과 편집 상태를 그대로 둔다.
    pub fn commit(&mut self) -> Result<usize, ValidationError> {
        let step = self.input.to_step()?;
        let index = self.draft.commit(step);
        self.input = StepInput::new(self.input.kind);
        Ok(index)
    }

    /// 편집을 취소하고 입력 중이던 값을 버린다.
    pub fn cancel_edit(&mut self) {
        if self.draft.state() == EditState::Idle {
            return;
        }
        self.draft.cancel_edit();
        self.input = StepInput::new(self.input.kind);
    }

    /// 지정 Step을 삭제한다.
    pub fn remove(&mut self, index: usize) -> Result<Step, ValidationError> {
        let was_target = self.draft.editing_index() == Some(index);
        let removed = self.draft.remove(index)?;
        if was_target {
            self.input = StepInput::new(self.input.kind);
        }
        Ok(removed)
    }

    /// Step 위치를 이웃과 바꾼다.
    pub fn reorder(&mut self, index: usize, direction: Direction) -> bool {
        self.draft.reorder(index, direction)
    }

    /// 목록, 편집 상태, 이름을 모두 초기화한다.
    pub fn clear(&mut self) {
        self.draft.clear();
        self.name.clear();
        self.input = StepInput::default();
    }
}

/// 마스터 시나리오 작성 상태를 보관한다.
#[derive(Debug, Clone, Default)]
pub struct MasterBuilder {
    /// 마스터 시나리오 이름 입력값.
    pub name: String,
    /// 시나리오 이름 작업 목록.
    draft: Draft<String>,
    /// 추가 또는 교체할 시나리오 이름 선택값.
    selection: String,
}

impl MasterBuilder {
    /// 빈 작성 상태를 생성한다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기존 마스터 시나리오 내용으로 작성 상태를 채운다.
    pub fn with_sequence(name: impl Into<String>, sequence: Vec<String>) -> Self {
        Self {
            name: name.into(),
            draft: Draft::from_items(sequence),
            selection: String::new(),
        }
    }

    /// 작업 중인 시나리오 이름 목록.
    pub fn sequence(&self) -> &[String] {
        self.draft.items()
    }

    pub fn state(&self) -> EditState {
        self.draft.state()
    }

    pub fn selection(&self) -> &str {
        &self.selection
    }

    /// 추가할 시나리오 이름을 선택한다. 존재 여부는 실행 시점에 확인한다.
    pub fn select(&mut self, scenario_name: impl Into<String>) {
        self.selection = scenario_name.into();
    }

    /// 지정 항목을 편집 대상으로 잡고 선택값을 해당 이름으로 채운다.
    pub fn begin_edit(&mut self, index: usize) -> Result<(), ValidationError> {
        let name = self.draft.begin_edit(index)?;
        self.selection = name.clone();
        Ok(())
    }

    /// 선택값을 반영하고 반영된 위치를 반환한다.
    pub fn commit(&mut self) -> Result<usize, ValidationError> {
        let name = self.selection.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyReference);
        }
        let index = self.draft.commit(name.to_string());
        self.selection.clear();
        Ok(index)
    }

    /// 편집을 취소하고 선택값을 버린다.
    pub fn cancel_edit(&mut self) {
        if self.draft.state() == EditState::Idle {
            return;
        }
        self.draft.cancel_edit();
        self.selection.clear();
    }

    pub fn remove(&mut self, index: usize) -> Result<String, ValidationError> {
        let was_target = self.draft.editing_index() == Some(index);
        let removed = self.draft.remove(index)?;
        if was_target {
            self.selection.clear();
        }
        Ok(removed)
    }

    pub fn reorder(&mut self, index: usize, direction: Direction) -> bool {
        self.draft.reorder(index, direction)
    }

    /// 목록, 편집 상태, 이름을 모두 초기화한다.
    pub fn clear(&mut self) {
        self.draft.clear();
        self.name.clear();
        self.selection.clear();
    }
}
