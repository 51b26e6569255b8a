//! auth.log 감시 파이프라인
//!
//! sshd 인증 로그를 실시간으로 따라가며 원격 호스트별 메시지 빈도를 집계하고,
//! 호스트 정보를 보강한 [`AuthEvent`](authwatch_core::AuthEvent)를 구독자에게 전달합니다.
//!
//! # 모듈 구성
//!
//! - [`tailer`]: 부모 디렉토리 감시 기반 `tail -f` (로테이션 대응)
//! - [`parser`]: sshd 라인 파서 및 사설 대역 필터
//! - [`cache`]: 호스트 정보 캐시 (JSON 파일 영속화)
//! - [`enrich`]: 호스트 정보 조회 (ipinfo 형식 HTTP)
//! - [`history`]: 크기 제한 이벤트 히스토리
//! - [`registry`]: 구독자 레지스트리와 팬아웃
//! - [`pipeline`]: 라인 처리 파이프라인과 조회 핸들
//! - [`service`]: 생명주기 관리 (Pipeline trait 구현)
//! - [`config`]: 실행 시점 설정
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! FileTailer -> AuthLineParser -> AddressFilter -> host_messages
//!     |                                               |
//!  notify(dir)                          HostInfoCache / IpInfoClient
//!                                                     |
//!                               EventHistory <- AuthEvent -> SubscriberRegistry
//! ```

pub mod cache;
pub mod config;
pub mod enrich;
pub mod error;
pub mod history;
pub mod parser;
pub mod pipeline;
pub mod registry;
pub mod service;
pub mod tailer;

// --- 주요 타입 re-export ---

// 서비스
pub use service::{AuthWatcher, AuthWatcherBuilder};

// 파이프라인
pub use pipeline::{EventPipeline, WatcherHandle, WatcherState};

// 설정
pub use config::{WatcherSettings, WatcherSettingsBuilder};

// 에러
pub use error::{LookupError, WatcherError};

// 파서
pub use parser::{AddressFilter, AuthLineParser, ParsedLine};

// tailer
pub use tailer::{ChannelSink, FileTailer, LineSink, RawLine, TailerState};

// 보강
pub use cache::HostInfoCache;
pub use enrich::{HostInfoLookup, IpInfoClient};

// 히스토리 / 구독자
pub use history::EventHistory;
pub use registry::{Delivery, DeliveryResult, DynDelivery, SubscriberRegistry};
