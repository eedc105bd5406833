use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 애플리케이션 전체 설정이다. 모든 항목은 기본값을 가진다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 시나리오 저장 위치.
    pub store: StoreSettings,
    /// 실행 엔진 설정.
    pub run: RunSettings,
    /// 실행 모니터 설정.
    pub monitor: MonitorSettings,
    /// 시뮬레이션 장비 설정.
    pub simulation: SimulationSettings,
}

/// 시나리오 파일 위치 설정이다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// 저장 파일이 위치할 디렉터리.
    pub dir: PathBuf,
    /// 시나리오 목록 파일 이름.
    pub scenarios_file: String,
    /// 마스터 시나리오 목록 파일 이름.
    pub master_scenarios_file: String,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            scenarios_file: "scenarios.json".into(),
            master_scenarios_file: "master_scenarios.json".into(),
        }
    }
}

impl StoreSettings {
    /// 시나리오 파일 경로.
    pub fn scenarios_path(&self) -> PathBuf {
        self.dir.join(&self.scenarios_file)
    }

    /// 마스터 시나리오 파일 경로.
    pub fn master_scenarios_path(&self) -> PathBuf {
        self.dir.join(&self.master_scenarios_file)
    }
}

/// 실행 엔진 설정이다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Step 사이 휴지 시간(ms).
    pub step_pause_ms: u64,
    /// 단어 중심 맞추기 제한 시간(초).
    pub auto_center_timeout_secs: u64,
    /// 정확도 검증 제한 시간(초).
    pub verify_timeout_secs: u64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            step_pause_ms: 300,
            auto_center_timeout_secs: 30,
            verify_timeout_secs: 120,
        }
    }
}

impl RunSettings {
    pub fn step_pause(&self) -> Duration {
        Duration::from_millis(self.step_pause_ms)
    }

    pub fn auto_center_timeout(&self) -> Duration {
        Duration::from_secs(self.auto_center_timeout_secs.max(1))
    }

    pub fn verify_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_timeout_secs.max(1))
    }
}

/// 실행 모니터 설정이다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    /// 화면에 유지할 최대 로그 줄 수.
    pub log_capacity: usize,
    /// 정상 종료 후 실행 버튼을 다시 켜기까지의 표시 시간(ms).
    pub done_grace_ms: u64,
    /// 오류/중단/시간 초과 후 표시 시간(ms).
    pub error_grace_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            log_capacity: 300,
            done_grace_ms: 2000,
            error_grace_ms: 3000,
        }
    }
}

impl MonitorSettings {
    pub fn done_grace(&self) -> Duration {
        Duration::from_millis(self.done_grace_ms)
    }

    pub fn error_grace(&self) -> Duration {
        Duration::from_millis(self.error_grace_ms)
    }
}

/// 시뮬레이션 장비가 알고 있는 위치와 단어 목록이다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    /// 이름이 붙은 위치 목록.
    pub bases: Vec<BasePosition>,
    /// OCR로 찾을 수 있는 단어 목록.
    pub words: Vec<String>,
}

/// 이름이 붙은 장비 좌표이다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasePosition {
    pub name: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// YAML 설정 파일을 읽는다.
pub fn load_settings_from_file(path: &Path) -> anyhow::Result<Settings> {
    let mut file = File::open(path)?;
    load_settings_from_reader(&mut file)
}

/// Reader에서 YAML 설정을 읽는다. 빈 문서는 기본값이다.
pub fn load_settings_from_reader<R: Read>(reader: &mut R) -> anyhow::Result<Settings> {
    let mut buf = String::new();
    reader.read_to_string(&mut buf)?;
    if buf.trim().is_empty() {
        return Ok(Settings::default());
    }
    let settings: Settings = serde_yaml::from_str(&buf)?;
    Ok(settings)
}
