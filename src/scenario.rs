use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Step은 Scenario 내 최소 실행 단위를 표현한다.
///
/// 파라미터는 종류에 따라 결정되며 다른 종류의 파라미터를 함께 가질 수 없다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// 저장된 위치(베이스)로 이동한다.
    GotoBase {
        /// 이동할 위치 이름.
        base_name: String,
    },
    /// OCR로 찾은 단어에 카메라 중심을 맞춘다.
    AutoCenter {
        /// 대문자로 정규화된 대상 단어.
        word: String,
    },
    /// 진공 펌프를 켠다.
    PumpOn,
    /// 진공 펌프를 끈다.
    PumpOff,
    /// 지정 시간 동안 대기한다.
    Delay {
        /// 대기 시간(초).
        seconds: f64,
    },
    /// Z 축을 절대 좌표로 이동한다.
    MoveZ {
        /// 목표 Z 좌표(mm).
        z: f64,
    },
    /// 원점 복귀를 수행한다.
    Home,
    /// 정확도 검증을 수행한다.
    Verify,
    /// 노즐 저항 측정을 반복한다.
    ResistanceTest {
        /// 측정 횟수.
        test_count: u32,
    },
    /// 노즐 다이오드 측정을 반복한다.
    DiodeTest {
        /// 측정 횟수.
        test_count: u32,
    },
    /// 노즐 서보를 지정 각도로 돌린다.
    NozzleGoto {
        /// 0~180 범위의 각도.
        angle: f64,
    },
    /// 노즐 서보를 기준 위치로 되돌린다.
    NozzleHome,
}

/// Scenario는 이름이 붙은 Step 순서 목록이다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    /// 고유한 시나리오 이름.
    pub name: String,
    /// 실행 순서대로 나열된 Step 목록.
    pub steps: Vec<Step>,
}

impl Scenario {
    /// 이름과 Step 목록으로 Scenario를 생성한다.
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// 전체 Step 수를 반환한다.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Step 수가 비었는지 여부를 확인한다.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// MasterScenario는 Scenario 이름을 순서대로 참조한다.
///
/// 참조는 복사본이 아니라 이름이므로 실행 시점의 Scenario 내용이 사용된다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterScenario {
    /// 고유한 마스터 시나리오 이름.
    pub name: String,
    /// 실행할 Scenario 이름 목록.
    pub sequence: Vec<String>,
}

impl MasterScenario {
    /// 이름과 참조 목록으로 MasterScenario를 생성한다.
    pub fn new(name: impl Into<String>, sequence: Vec<String>) -> Self {
        Self {
            name: name.into(),
            sequence,
        }
    }
}

/// 이름으로 식별되는 저장 엔티티이다.
pub trait Named {
    /// 엔티티의 고유 이름을 반환한다.
    fn name(&self) -> &str;
}

impl Named for Scenario {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for MasterScenario {
    fn name(&self) -> &str {
        &self.name
    }
}

/// 가져오기 파일에 담길 수 있는 문서 형태이다.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ScenarioDocument {
    /// `steps` 필드를 가진 일반 시나리오.
    Scenario(Scenario),
    /// `sequence` 필드를 가진 마스터 시나리오.
    Master(MasterScenario),
}

/// YAML 파일을 읽어 시나리오 문서로 역직렬화한다.
pub fn load_document_from_file(path: &Path) -> anyhow::Result<ScenarioDocument> {
    let mut file = File::open(path)?;
    load_document_from_reader(&mut file)
}

/// Reader에서 YAML을 읽어 시나리오 문서로 파싱한다.
pub fn load_document_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<ScenarioDocument> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    let document: ScenarioDocument = serde_yaml::from_str(&buf)?;
    Ok(document)
}
