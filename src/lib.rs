//! 픽앤플레이스 장비의 시나리오 작성, 저장, 실행 모니터링을 담당한다.

pub mod config;
pub mod editor;
pub mod engine;
pub mod error;
pub mod executor;
pub mod gateway;
pub mod monitor;
pub mod registry;
pub mod scenario;
pub mod session;
pub mod store;
