//! authwatch 공통 크레이트
//!
//! 서버(감시 데몬)와 클라이언트(CLI)가 함께 사용하는 도메인 타입, 에러,
//! 설정, 모듈 생명주기 trait, 메트릭 이름을 정의합니다.

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;
pub mod pipeline;

// --- 주요 타입 re-export ---

// 에러
pub use error::{AuthWatchError, ConfigError, PipelineError};

// 설정
pub use config::AuthWatchConfig;

// 이벤트
pub use event::{AuthEvent, HostInfo, HostInfoMap, HostMessages, SubscriberKey};

// 파이프라인 trait
pub use pipeline::{BoxFuture, DynPipeline, HealthStatus, Pipeline};
