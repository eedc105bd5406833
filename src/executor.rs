use crate::config::{BasePosition, SimulationSettings};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// MachineExecutor는 Step을 실제 장비 동작으로 옮기는 추상 계층을 정의한다.
///
/// 이동, 비전, 노즐 측정은 이 경계 뒤에서 처리된다. 측정/검증 결과는 화면 표시용
/// JSON으로 반환하며 엔진은 그 내용을 해석하지 않는다.
#[async_trait]
pub trait MachineExecutor: Send + Sync {
    /// 이름이 붙은 위치로 이동한다. 알 수 없는 이름이면 오류를 반환한다.
    async fn goto_base(&self, base_name: &str) -> anyhow::Result<()>;
    /// OCR로 찾은 단어에 중심을 맞춘다.
    async fn auto_center(&self, word: &str) -> anyhow::Result<()>;
    /// 진공 펌프를 켜거나 끈다.
    async fn set_pump(&self, on: bool) -> anyhow::Result<()>;
    /// Z 축을 절대 좌표로 이동한다.
    async fn move_z(&self, z: f64) -> anyhow::Result<()>;
    /// 원점 복귀를 수행한다.
    async fn home(&self) -> anyhow::Result<()>;
    /// 정확도 검증을 수행하고 결과를 반환한다.
    async fn verify(&self) -> anyhow::Result<serde_json::Value>;
    /// 노즐 저항 측정을 반복하고 결과를 반환한다.
    async fn resistance_test(&self, test_count: u32) -> anyhow::Result<serde_json::Value>;
    /// 노즐 다이오드 측정을 반복하고 결과를 반환한다.
    async fn diode_test(&self, test_count: u32) -> anyhow::Result<serde_json::Value>;
    /// 노즐 서보를 지정 각도로 돌린다.
    async fn nozzle_goto(&self, angle: f64) -> anyhow::Result<()>;
    /// 노즐 서보를 기준 위치로 되돌린다.
    async fn nozzle_home(&self) -> anyhow::Result<()>;
}

/// MachineExecutor를 공유하기 위한 Arc 타입 별칭이다.
pub type SharedExecutor = Arc<dyn MachineExecutor>;

/// SimulatedMachine은 실제 장비 없이 명령을 기록만 하는 기본 구현이다.
#[derive(Debug, Clone, Default)]
pub struct SimulatedMachine {
    /// 이름별 위치 좌표.
    bases: HashMap<String, BasePosition>,
    /// 화면에서 찾을 수 있는 단어 목록.
    words: HashSet<String>,
    /// 명령마다 흉내 낼 동작 시간.
    latency: Duration,
    /// 내부 상태와 명령 기록.
    state: Arc<Mutex<SimulatedState>>,
}

#[derive(Debug, Default)]
struct SimulatedState {
    z: f64,
    commands: Vec<String>,
}

impl SimulatedMachine {
    /// 위치와 단어가 없는 시뮬레이터를 생성한다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정 파일의 위치/단어 목록으로 시뮬레이터를 구성한다.
    pub fn from_settings(settings: &SimulationSettings) -> Self {
        let mut machine = Self::new();
        for base in &settings.bases {
            machine = machine.with_base(base.clone());
        }
        for word in &settings.words {
            machine = machine.with_word(word);
        }
        machine
    }

    pub fn with_base(mut self, base: BasePosition) -> Self {
        self.bases.insert(base.name.clone(), base);
        self
    }

    pub fn with_word(mut self, word: &str) -> Self {
        self.words.insert(word.to_uppercase());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// 지금까지 받은 명령 목록을 반환한다.
    pub async fn commands(&self) -> Vec<String> {
        self.state.lock().await.commands.clone()
    }

    async fn record(&self, command: String) {
        debug!(%command, "시뮬레이션 명령");
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.state.lock().await.commands.push(command);
    }
}

#[async_trait]
impl MachineExecutor for SimulatedMachine {
    async fn goto_base(&self, base_name: &str) -> anyhow::Result<()> {
        let base = self
            .bases
            .get(base_name)
            .ok_or_else(|| anyhow::anyhow!("위치를 찾을 수 없습니다: {base_name}"))?;
        let current_z = self.state.lock().await.z;
        // 내려가는 이동은 XY를 먼저, 올라가는 이동은 Z를 먼저 움직인다.
        if base.z < current_z {
            self.record(format!("move x={} y={}", base.x, base.y)).await;
            self.record(format!("move z={}", base.z)).await;
        } else {
            self.record(format!("move z={}", base.z)).await;
            self.record(format!("move x={} y={}", base.x, base.y)).await;
        }
        self.state.lock().await.z = base.z;
        Ok(())
    }

    async fn auto_center(&self, word: &str) -> anyhow::Result<()> {
        if !self.words.contains(word) {
            anyhow::bail!("화면에서 '{word}' 단어를 찾을 수 없습니다.");
        }
        self.record(format!("center {word}")).await;
        Ok(())
    }

    async fn set_pump(&self, on: bool) -> anyhow::Result<()> {
        self.record(format!("pump {}", if on { "on" } else { "off" }))
            .await;
        Ok(())
    }

    async fn move_z(&self, z: f64) -> anyhow::Result<()> {
        self.record(format!("move z={z}")).await;
        self.state.lock().await.z = z;
        Ok(())
    }

    async fn home(&self) -> anyhow::Result<()> {
        self.record("home".into()).await;
        self.state.lock().await.z = 0.0;
        Ok(())
    }

    async fn verify(&self) -> anyhow::Result<serde_json::Value> {
        self.record("verify".into()).await;
        Ok(json!({ "checked": 0, "failed": 0 }))
    }

    async fn resistance_test(&self, test_count: u32) -> anyhow::Result<serde_json::Value> {
        self.record(format!("resistance x{test_count}")).await;
        let readings: Vec<f64> = (0..test_count).map(|_| 100.0).collect();
        Ok(json!({ "test": "resistance", "readings": readings }))
    }

    async fn diode_test(&self, test_count: u32) -> anyhow::Result<serde_json::Value> {
        self.record(format!("diode x{test_count}")).await;
        let readings: Vec<f64> = (0..test_count).map(|_| 0.6).collect();
        Ok(json!({ "test": "diode", "readings": readings }))
    }

    async fn nozzle_goto(&self, angle: f64) -> anyhow::Result<()> {
        self.record(format!("nozzle {angle}")).await;
        Ok(())
    }

    async fn nozzle_home(&self) -> anyhow::Result<()> {
        self.record("nozzle home".into()).await;
        Ok(())
    }
}
