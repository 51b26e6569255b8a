//! RPC 프로토콜 -- JSON 요청/응답 봉투
//!
//! 모든 호출은 `POST /rpc`로 전달되며 본문은 `method`/`params` 형식입니다.
//!
//! ```text
//! -> {"method":"getEventHistory","params":{"limit":2}}
//! <- {"result":[{...},{...}]}
//! <- {"error":"invalid params: ..."}
//! ```
//!
//! 서버가 구독자 엔드포인트로 보내는 푸시도 같은 봉투를 사용합니다.
//!
//! ```text
//! -> {"method":"event","params":{"data":{...AuthEvent...}}}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use authwatch_core::event::AuthEvent;

use crate::error::RpcError;

/// RPC 요청/푸시 경로
pub const RPC_PATH: &str = "/rpc";

/// 서버가 처리하는 RPC 요청
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum RpcRequest {
    /// 생존 확인 (`"pong"`)
    Ping,
    /// 발행된 이벤트 수
    GetEventCount,
    /// 호스트별 메시지 빈도
    GetHostMessages,
    /// 호스트 정보 캐시
    GetHostInfo,
    /// 최근 `limit`개 이벤트
    GetEventHistory {
        /// 최대 개수
        limit: usize,
    },
    /// 푸시 대상 등록
    Subscribe {
        /// 콜백 호스트
        host: String,
        /// 콜백 포트
        port: u16,
    },
    /// 푸시 대상 제거
    Unsubscribe {
        /// 콜백 호스트
        host: String,
        /// 콜백 포트
        port: u16,
    },
}

impl RpcRequest {
    /// 메서드 이름 (메트릭 레이블)
    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::GetEventCount => "getEventCount",
            Self::GetHostMessages => "getHostMessages",
            Self::GetHostInfo => "getHostInfo",
            Self::GetEventHistory { .. } => "getEventHistory",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
        }
    }
}

/// 서버가 구독자 엔드포인트로 보내는 푸시
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub enum PushRequest {
    /// 새 이벤트
    Event {
        /// 이벤트 본문
        data: AuthEvent,
    },
}

/// RPC 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// 성공 결과
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// 실패 사유
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RpcResponse {
    /// 성공 응답을 만듭니다. 직렬화에 실패하면 에러 응답이 됩니다.
    pub fn ok<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(result) => Self {
                result: Some(result),
                error: None,
            },
            Err(e) => Self::error(format!("failed to encode result: {e}")),
        }
    }

    /// 에러 응답을 만듭니다.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            result: None,
            error: Some(reason.into()),
        }
    }

    /// 응답을 결과 값으로 변환합니다.
    pub fn into_result(self) -> Result<Value, RpcError> {
        if let Some(reason) = self.error {
            return Err(RpcError::Remote(reason));
        }
        self.result
            .ok_or_else(|| RpcError::Decode("response carries neither result nor error".to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_method_has_no_params() {
        let encoded = serde_json::to_value(RpcRequest::Ping).unwrap();
        assert_eq!(encoded, json!({"method": "ping"}));
        let decoded: RpcRequest = serde_json::from_value(json!({"method": "getEventCount"})).unwrap();
        assert_eq!(decoded, RpcRequest::GetEventCount);
    }

    #[test]
    fn params_are_named() {
        let encoded = serde_json::to_value(RpcRequest::Subscribe {
            host: "localhost".to_owned(),
            port: 5000,
        })
        .unwrap();
        assert_eq!(
            encoded,
            json!({"method": "subscribe", "params": {"host": "localhost", "port": 5000}})
        );

        let decoded: RpcRequest =
            serde_json::from_value(json!({"method": "getEventHistory", "params": {"limit": 2}}))
                .unwrap();
        assert_eq!(decoded, RpcRequest::GetEventHistory { limit: 2 });
        assert_eq!(decoded.method_name(), "getEventHistory");
    }

    #[test]
    fn unknown_method_is_rejected() {
        let result = serde_json::from_value::<RpcRequest>(json!({"method": "shutdown"}));
        assert!(result.is_err());
    }

    #[test]
    fn error_response_becomes_remote_error() {
        let err = RpcResponse::error("boom").into_result().unwrap_err();
        assert!(matches!(err, RpcError::Remote(reason) if reason == "boom"));
    }

    #[test]
    fn ok_response_omits_error_field() {
        let encoded = serde_json::to_string(&RpcResponse::ok("pong")).unwrap();
        assert_eq!(encoded, r#"{"result":"pong"}"#);
    }

    #[test]
    fn empty_response_is_decode_error() {
        let response: RpcResponse = serde_json::from_str("{}").unwrap();
        assert!(matches!(response.into_result(), Err(RpcError::Decode(_))));
    }
}
