use crate::error::ValidationError;

/// 초안 편집 상태이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditState {
    /// 편집 대상 없음. 확정 시 항목을 끝에 추가한다.
    #[default]
    Idle,
    /// 지정 위치의 항목을 제자리 교체 대상으로 잡고 있다.
    Editing(usize),
}

/// 항목 이동 방향이다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// 앞쪽(인덱스 감소)으로 이동.
    Up,
    /// 뒤쪽(인덱스 증가)으로 이동.
    Down,
}

/// 저장되지 않은 작업 목록과 편집 인덱스를 함께 관리한다.
///
/// 시나리오의 Step 목록과 마스터 시나리오의 이름 목록이 같은 규칙을 공유한다.
/// 한 번에 하나의 항목만 편집 대상이 될 수 있다.
#[derive(Debug, Clone, PartialEq)]
pub struct Draft<T> {
    /// 순서가 있는 작업 목록.
    items: Vec<T>,
    /// 현재 편집 상태.
    state: EditState,
}

impl<T> Draft<T> {
    /// 빈 초안을 생성한다.
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            state: EditState::Idle,
        }
    }

    /// 기존 항목으로 초안을 채운다.
    pub fn from_items(items: Vec<T>) -> Self {
        Self {
            items,
            state: EditState::Idle,
        }
    }

    /// 현재 항목 목록을 반환한다.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// 현재 편집 상태를 반환한다.
    pub fn state(&self) -> EditState {
        self.state
    }

    /// 편집 중인 인덱스를 반환한다.
    pub fn editing_index(&self) -> Option<usize> {
        match self.state {
            EditState::Idle => None,
            EditState::Editing(index) => Some(index),
        }
    }

    /// 지정 항목을 편집 대상으로 잡고 해당 항목을 반환한다.
    pub fn begin_edit(&mut self, index: usize) -> Result<&T, ValidationError> {
        let len = self.items.len();
        let item = self
            .items
            .get(index)
            .ok_or(ValidationError::IndexOutOfRange { index, len })?;
        self.state = EditState::Editing(index);
        Ok(item)
    }

    /// 편집을 취소한다. 목록은 변경하지 않는다.
    pub fn cancel_edit(&mut self) {
        self.state = EditState::Idle;
    }

    /// 검증을 마친 항목을 반영하고 반영된 위치를 반환한다.
    ///
    /// 편집 중이면 제자리에서 교체하고, 아니면 끝에 추가한다. 항상 Idle로 돌아간다.
    pub fn commit(&mut self, item: T) -> usize {
        let index = match self.state {
            EditState::Editing(index) if index < self.items.len() => {
                self.items[index] = item;
                index
            }
            _ => {
                self.items.push(item);
                self.items.len() - 1
            }
        };
        self.state = EditState::Idle;
        index
    }

    /// 지정 항목을 삭제하고 편집 인덱스를 보정한다.
    pub fn remove(&mut self, index: usize) -> Result<T, ValidationError> {
        let len = self.items.len();
        if index >= len {
            return Err(ValidationError::IndexOutOfRange { index, len });
        }
        let removed = self.items.remove(index);
        if let EditState::Editing(editing) = self.state {
            if editing == index {
                self.state = EditState::Idle;
            } else if editing > index {
                self.state = EditState::Editing(editing - 1);
            }
        }
        Ok(removed)
    }

    /// 이웃 항목과 위치를 바꾼다. 이동 대상이 범위 밖이면 `false`를 반환한다.
    pub fn reorder(&mut self, index: usize, direction: Direction) -> bool {
        if index >= self.items.len() {
            return false;
        }
        let target = match direction {
            Direction::Up => match index.checked_sub(1) {
                Some(target) => target,
                None => return false,
            },
            Direction::Down => index + 1,
        };
        if target >= self.items.len() {
            return false;
        }
        self.items.swap(index, target);
        if let EditState::Editing(editing) = self.state {
            if editing == index {
                self.state = EditState::Editing(target);
            } else if editing == target {
                self.state = EditState::Editing(index);
            }
        }
        true
    }

    /// 목록을 비우고 Idle로 돌아간다.
    pub fn clear(&mut self) {
        self.items.clear();
        self.state = EditState::Idle;
    }
}

impl<T> Default for Draft<T> {
    fn default() -> Self {
        Self::new()
    }
}
