//! authwatch RPC 계층
//!
//! 감시 데몬의 상태 조회/구독 API와, 구독 이벤트를 여러 로컬 소비자에게
//! 나눠 주는 클라이언트 측 멀티플렉서를 제공합니다.
//!
//! # 모듈 구성
//!
//! - [`protocol`]: JSON 요청/응답 봉투와 푸시 메시지
//! - [`server`]: RPC 서버 (Pipeline trait 구현)
//! - [`client`]: 타입 있는 RPC 클라이언트
//! - [`push`]: 구독자 콜백 엔드포인트로의 HTTP 푸시 전달
//! - [`multiplexer`]: 구독 하나를 소비자별 큐로 분배
//! - [`config`]: 실행 시점 설정
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! daemon:  RpcServer --subscribe--> SubscriberRegistry --HttpDelivery--+
//!                                                                      | POST /rpc {"method":"event"}
//! client:  ClientMultiplexer <--callback server <----------------------+
//!              |-> ConsumerStream (queue 1)
//!              |-> ConsumerStream (queue 2)
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod multiplexer;
pub mod protocol;
pub mod push;
pub mod server;

// --- 주요 타입 re-export ---

// 서버 / 클라이언트
pub use client::RpcClient;
pub use server::{RpcServer, RpcState};

// 멀티플렉서
pub use multiplexer::{ClientMultiplexer, ConsumerStream};

// 프로토콜
pub use protocol::{PushRequest, RpcRequest, RpcResponse};

// 푸시
pub use push::HttpDelivery;

// 설정
pub use config::{MultiplexerSettings, RpcSettings};

// 에러
pub use error::RpcError;
