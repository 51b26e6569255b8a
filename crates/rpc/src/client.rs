//! RPC 클라이언트
//!
//! 서버의 `POST /rpc` 엔드포인트를 호출하는 타입 있는 래퍼입니다.

use std::time::Duration;

use serde::de::DeserializeOwned;

use authwatch_core::event::{AuthEvent, HostInfoMap, HostMessages};

use crate::error::RpcError;
use crate::protocol::{RPC_PATH, RpcRequest, RpcResponse};

/// RPC 클라이언트
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
}

impl RpcClient {
    /// `server_url`(`http://host:port`)의 서버에 연결하는 클라이언트를 생성합니다.
    pub fn new(server_url: &str, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: format!("{}{RPC_PATH}", server_url.trim_end_matches('/')),
        })
    }

    /// 호출 URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// 요청을 보내고 결과를 `T`로 디코딩합니다.
    pub async fn call<T: DeserializeOwned>(&self, request: &RpcRequest) -> Result<T, RpcError> {
        let response = self
            .http
            .post(&self.url)
            .json(request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let status = response.status();
        // 400 응답도 에러 본문을 담고 있으므로 먼저 디코딩을 시도한다
        let body = response
            .json::<RpcResponse>()
            .await
            .map_err(|e| {
                if status.is_success() {
                    RpcError::Decode(e.to_string())
                } else {
                    RpcError::Status(status.as_u16())
                }
            })?;
        let value = body.into_result()?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode(e.to_string()))
    }

    /// 생존 확인. 서버 응답 문자열을 반환합니다.
    pub async fn ping(&self) -> Result<String, RpcError> {
        self.call(&RpcRequest::Ping).await
    }

    /// 발행된 이벤트 수
    pub async fn event_count(&self) -> Result<u64, RpcError> {
        self.call(&RpcRequest::GetEventCount).await
    }

    /// 호스트별 메시지 빈도
    pub async fn host_messages(&self) -> Result<HostMessages, RpcError> {
        self.call(&RpcRequest::GetHostMessages).await
    }

    /// 호스트 정보
    pub async fn host_info(&self) -> Result<HostInfoMap, RpcError> {
        self.call(&RpcRequest::GetHostInfo).await
    }

    /// 최근 `limit`개 이벤트
    pub async fn event_history(&self, limit: usize) -> Result<Vec<AuthEvent>, RpcError> {
        self.call(&RpcRequest::GetEventHistory { limit }).await
    }

    /// 콜백 엔드포인트를 구독자로 등록합니다.
    pub async fn subscribe(&self, host: &str, port: u16) -> Result<(), RpcError> {
        let _: bool = self
            .call(&RpcRequest::Subscribe {
                host: host.to_owned(),
                port,
            })
            .await?;
        Ok(())
    }

    /// 구독을 해제합니다. 등록되어 있었으면 `true`입니다.
    pub async fn unsubscribe(&self, host: &str, port: u16) -> Result<bool, RpcError> {
        self.call(&RpcRequest::Unsubscribe {
            host: host.to_owned(),
            port,
        })
        .await
    }
}
