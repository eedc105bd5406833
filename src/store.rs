use crate::error::{EntityKind, GatewayError};
use crate::scenario::Named;
use anyhow::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 이름을 키로 하는 엔티티 목록을 JSON 파일에 보관한다.
///
/// 경로가 없으면 메모리에만 보관한다. 목록 순서는 처음 저장된 순서를 따른다.
#[derive(Debug, Clone)]
pub struct EntityStore<T> {
    kind: EntityKind,
    path: Option<PathBuf>,
    items: Vec<T>,
}

impl<T> EntityStore<T>
where
    T: Named + Clone + Serialize + DeserializeOwned,
{
    /// 파일에 기록하지 않는 저장소를 생성한다.
    pub fn in_memory(kind: EntityKind) -> Self {
        Self {
            kind,
            path: None,
            items: Vec::new(),
        }
    }

    /// JSON 파일에서 목록을 읽어 저장소를 연다.
    ///
    /// 파일이 없거나 비어 있으면 빈 목록으로 시작한다.
    pub fn open(kind: EntityKind, path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        let items = load_items(&path)?;
        info!(path = %path.display(), count = items.len(), "{kind} 목록 로드");
        Ok(Self {
            kind,
            path: Some(path),
            items,
        })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// 전체 목록을 반환한다.
    pub fn list(&self) -> &[T] {
        &self.items
    }

    /// 이름으로 엔티티를 찾는다.
    pub fn get(&self, name: &str) -> Option<&T> {
        self.items.iter().find(|item| item.name() == name)
    }

    /// 같은 이름이 있으면 그 자리에서 교체하고, 없으면 끝에 추가한다.
    pub fn upsert(&mut self, item: T) -> anyhow::Result<()> {
        let mut next = self.items.clone();
        match next.iter_mut().find(|existing| existing.name() == item.name()) {
            Some(existing) => *existing = item,
            None => next.push(item),
        }
        self.persist(&next)?;
        self.items = next;
        Ok(())
    }

    /// 이름으로 엔티티를 삭제한다.
    pub fn remove(&mut self, name: &str) -> Result<T, GatewayError> {
        let position = self
            .items
            .iter()
            .position(|item| item.name() == name)
            .ok_or_else(|| GatewayError::not_found(self.kind, name))?;
        let mut next = self.items.clone();
        let removed = next.remove(position);
        self.persist(&next)?;
        self.items = next;
        Ok(removed)
    }

    fn persist(&self, items: &[T]) -> anyhow::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(items)?;
        atomic_write(path, json.as_bytes())
            .with_context(|| format!("{} 목록을 저장하지 못했습니다", self.kind))?;
        debug!(path = %path.display(), count = items.len(), "목록 저장");
        Ok(())
    }
}

fn load_items<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("파일을 읽지 못했습니다: {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content)
        .with_context(|| format!("파일 형식이 올바르지 않습니다: {}", path.display()))
}

/// 임시 파일에 쓴 뒤 이름을 바꿔 원자적으로 교체한다.
fn atomic_write(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let tmp_path = {
        let mut name = path.as_os_str().to_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("디렉터리를 만들지 못했습니다: {}", parent.display()))?;
    }

    let mut file = fs::File::create(&tmp_path)
        .with_context(|| format!("임시 파일을 만들지 못했습니다: {}", tmp_path.display()))?;
    file.write_all(contents)
        .with_context(|| format!("임시 파일에 쓰지 못했습니다: {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("임시 파일을 동기화하지 못했습니다: {}", tmp_path.display()))?;
    drop(file);

    fs::rename(&tmp_path, path).with_context(|| {
        format!(
            "임시 파일 {}을 {}로 옮기지 못했습니다",
            tmp_path.display(),
            path.display()
        )
    })?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{MasterScenario, Scenario, Step};

    fn scenario(name: &str, steps: Vec<Step>) -> Scenario {
        Scenario::new(name, steps)
    }

    #[test]
    fn upsert_replaces_in_place_and_appends_new_names() {
        let mut store = EntityStore::in_memory(EntityKind::Scenario);
        store.upsert(scenario("a", vec![Step::Home])).unwrap();
        store.upsert(scenario("b", vec![Step::PumpOn])).unwrap();
        store.upsert(scenario("a", vec![Step::PumpOff])).unwrap();

        let names: Vec<&str> = store.list().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(store.get("a").unwrap().steps, vec![Step::PumpOff]);
    }

    #[test]
    fn removing_an_unknown_name_is_not_found() {
        let mut store: EntityStore<MasterScenario> =
            EntityStore::in_memory(EntityKind::MasterScenario);
        let err = store.remove("ghost").unwrap_err();
        assert!(matches!(
            err,
            GatewayError::NotFound {
                kind: EntityKind::MasterScenario,
                ..
            }
        ));
    }

    #[test]
    fn saved_entities_survive_reopening() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenarios.json");
        {
            let mut store = EntityStore::open(EntityKind::Scenario, &path).unwrap();
            store
                .upsert(scenario("pick", vec![Step::Delay { seconds: 0.5 }]))
                .unwrap();
            store.upsert(scenario("drop", vec![Step::PumpOff])).unwrap();
            store.remove("drop").unwrap();
        }
        let reopened: EntityStore<Scenario> = EntityStore::open(EntityKind::Scenario, &path).unwrap();
        assert_eq!(
            reopened.list(),
            &[scenario("pick", vec![Step::Delay { seconds: 0.5 }])]
        );
        assert!(!dir.path().join("scenarios.json.tmp").exists());
    }

    #[test]
    fn missing_or_empty_file_is_an_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let missing: EntityStore<Scenario> =
            EntityStore::open(EntityKind::Scenario, dir.path().join("none.json")).unwrap();
        assert!(missing.list().is_empty());

        let empty = dir.path().join("empty.json");
        fs::write(&empty, "  \n").unwrap();
        let store: EntityStore<Scenario> = EntityStore::open(EntityKind::Scenario, &empty).unwrap();
        assert!(store.list().is_empty());
    }

    #[test]
    fn corrupt_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scenarios.json");
        fs::write(&path, "{ not json").unwrap();
        let result: anyhow::Result<EntityStore<Scenario>> =
            EntityStore::open(EntityKind::Scenario, &path);
        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("scenarios.json"));
    }
}
