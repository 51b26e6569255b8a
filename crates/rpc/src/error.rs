//! RPC 에러 타입
//!
//! [`RpcError`]는 RPC 서버/클라이언트, 푸시 전달, 멀티플렉서의 에러를 표현합니다.
//! `From<RpcError> for AuthWatchError` 변환으로 상위 레이어에 전파됩니다.

use authwatch_core::error::{AuthWatchError, ConfigError, PipelineError};

/// RPC 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 리슨 소켓 바인드 실패
    #[error("bind error: {addr}: {reason}")]
    Bind {
        /// 바인드 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// 연결/전송 실패
    #[error("transport error: {0}")]
    Transport(String),

    /// 200이 아닌 HTTP 응답
    #[error("unexpected http status: {0}")]
    Status(u16),

    /// 응답 디코딩 실패
    #[error("decode error: {0}")]
    Decode(String),

    /// 서버가 반환한 에러
    #[error("remote error: {0}")]
    Remote(String),

    /// 기대와 다른 응답
    #[error("unexpected reply: expected {expected}, got {got}")]
    UnexpectedReply {
        /// 기대한 값
        expected: String,
        /// 받은 값
        got: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RpcError {
    /// 서버에 연결할 수 없는 종류의 에러인지 확인합니다.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<RpcError> for AuthWatchError {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Config { field, reason } => {
                AuthWatchError::Config(ConfigError::InvalidValue { field, reason })
            }
            RpcError::Bind { .. } => {
                AuthWatchError::Pipeline(PipelineError::InitFailed(err.to_string()))
            }
            RpcError::Io(e) => AuthWatchError::Io(e),
            other => AuthWatchError::Rpc(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_maps_to_invalid_value() {
        let err: AuthWatchError = RpcError::Config {
            field: "rpc.port".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            AuthWatchError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn bind_error_maps_to_init_failed() {
        let err: AuthWatchError = RpcError::Bind {
            addr: "127.0.0.1:7080".to_owned(),
            reason: "address in use".to_owned(),
        }
        .into();
        assert!(err.to_string().contains("127.0.0.1:7080"));
        assert!(matches!(
            err,
            AuthWatchError::Pipeline(PipelineError::InitFailed(_))
        ));
    }

    #[test]
    fn remote_error_maps_to_rpc() {
        let err: AuthWatchError = RpcError::Remote("unknown method".to_owned()).into();
        assert!(matches!(err, AuthWatchError::Rpc(_)));
    }

    #[test]
    fn transport_is_unreachable() {
        assert!(RpcError::Transport("refused".to_owned()).is_unreachable());
        assert!(!RpcError::Status(500).is_unreachable());
    }
}
