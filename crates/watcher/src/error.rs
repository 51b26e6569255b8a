//! 감시 파이프라인 에러 타입
//!
//! [`WatcherError`]는 auth.log 감시, 파싱, 캐시, 조회 과정의 에러를 표현합니다.
//! `From<WatcherError> for AuthWatchError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use authwatch_core::error::{AuthWatchError, ConfigError, PipelineError};

/// 감시 파이프라인 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum WatcherError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 파일 감시 등록 실패
    #[error("watch error: {path}: {reason}")]
    Watch {
        /// 감시 대상 디렉토리
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 라인 싱크가 더 이상 라인을 받을 수 없음
    #[error("line sink closed: {0}")]
    SinkClosed(String),

    /// 캐시 저장 실패
    #[error("cache error: {path}: {reason}")]
    Cache {
        /// 캐시 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// HTTP 클라이언트 생성 실패
    #[error("http client error: {0}")]
    HttpClient(String),

    /// 백그라운드 태스크 실패
    #[error("task error: {0}")]
    Task(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<WatcherError> for AuthWatchError {
    fn from(err: WatcherError) -> Self {
        match err {
            WatcherError::Config { field, reason } => {
                AuthWatchError::Config(ConfigError::InvalidValue { field, reason })
            }
            WatcherError::Io(e) => AuthWatchError::Io(e),
            WatcherError::SinkClosed(reason) => {
                AuthWatchError::Pipeline(PipelineError::ChannelClosed(reason))
            }
            other => AuthWatchError::Pipeline(PipelineError::InitFailed(other.to_string())),
        }
    }
}

/// 호스트 정보 조회 에러
///
/// 조회 실패는 파이프라인을 멈추지 않습니다. 호출자는 경고를 남기고
/// 해당 라인의 이벤트를 발행하지 않습니다.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// 200이 아닌 HTTP 응답
    #[error("non-200 response: {0}")]
    Status(u16),

    /// 네트워크/타임아웃 에러
    #[error("transport error: {0}")]
    Transport(String),

    /// 응답 본문 디코딩 실패
    #[error("decode error: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_maps_to_invalid_value() {
        let err: AuthWatchError = WatcherError::Config {
            field: "private_filters".to_owned(),
            reason: "bad cidr".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            AuthWatchError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn sink_closed_maps_to_channel_closed() {
        let err: AuthWatchError = WatcherError::SinkClosed("receiver dropped".to_owned()).into();
        assert!(matches!(
            err,
            AuthWatchError::Pipeline(PipelineError::ChannelClosed(_))
        ));
    }

    #[test]
    fn watch_error_display() {
        let err = WatcherError::Watch {
            path: "/var/log".to_owned(),
            reason: "permission denied".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/var/log"));
        assert!(msg.contains("permission denied"));
    }

    #[test]
    fn lookup_status_display() {
        assert_eq!(LookupError::Status(429).to_string(), "non-200 response: 429");
    }
}
