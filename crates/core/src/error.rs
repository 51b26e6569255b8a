//! 에러 타입 -- 도메인별 에러 정의
//!
//! 각 크레이트(watcher, rpc)는 자체 에러 타입을 정의하고
//! `From<...> for AuthWatchError` 변환을 구현하여 상위 레이어로 전파합니다.

/// authwatch 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum AuthWatchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인(감시/발행/RPC 모듈) 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 원격 호출(RPC, 푸시) 에러
    #[error("rpc error: {0}")]
    Rpc(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 채널이 닫힘
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: AuthWatchError = ConfigError::InvalidValue {
            field: "watcher.history_len".to_owned(),
            reason: "must be greater than 0".to_owned(),
        }
        .into();
        assert!(matches!(err, AuthWatchError::Config(_)));
        assert!(err.to_string().contains("watcher.history_len"));
    }

    #[test]
    fn pipeline_error_display() {
        let err: AuthWatchError = PipelineError::AlreadyRunning.into();
        assert_eq!(err.to_string(), "pipeline error: pipeline already running");
    }
}
