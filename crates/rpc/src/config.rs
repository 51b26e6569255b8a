//! RPC 서버/클라이언트 실행 시점 설정
//!
//! core의 [`RpcConfig`]와 [`ClientConfig`]를 `Duration` 등 실행 시점 타입으로 변환합니다.

use std::time::Duration;

use authwatch_core::config::{ClientConfig, RpcConfig};

use crate::error::RpcError;

/// RPC 요청 기본 타임아웃
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// RPC 서버 설정
#[derive(Debug, Clone)]
pub struct RpcSettings {
    /// 바인드 주소
    pub listen_addr: String,
    /// 리슨 포트 (0이면 임의 포트)
    pub port: u16,
    /// 구독자 푸시 타임아웃
    pub push_timeout: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        let core = RpcConfig::default();
        Self {
            listen_addr: core.listen_addr,
            port: core.port,
            push_timeout: Duration::from_millis(core.push_timeout_ms),
        }
    }
}

impl RpcSettings {
    /// core 설정에서 생성합니다.
    pub fn from_core(core: &RpcConfig) -> Result<Self, RpcError> {
        let settings = Self {
            listen_addr: core.listen_addr.clone(),
            port: core.port,
            push_timeout: Duration::from_millis(core.push_timeout_ms),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RpcError> {
        if self.listen_addr.is_empty() {
            return Err(config_err("rpc.listen_addr", "must not be empty"));
        }
        if self.push_timeout.is_zero() {
            return Err(config_err("rpc.push_timeout_ms", "must be greater than 0"));
        }
        Ok(())
    }

    /// `addr:port` 형식의 바인드 주소
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen_addr, self.port)
    }
}

/// 구독 멀티플렉서 설정
#[derive(Debug, Clone)]
pub struct MultiplexerSettings {
    /// 서버 URL (`http://host:port`)
    pub server_url: String,
    /// 콜백 서버 호스트
    pub callback_host: String,
    /// 소비자 큐 대기 타임아웃 (취소 확인 간격)
    pub poll_timeout: Duration,
    /// 로컬 히스토리 최대 길이
    pub history_len: usize,
    /// RPC 요청 타임아웃
    pub request_timeout: Duration,
}

impl Default for MultiplexerSettings {
    fn default() -> Self {
        let core = ClientConfig::default();
        Self {
            server_url: core.server_url,
            callback_host: core.callback_host,
            poll_timeout: Duration::from_millis(core.poll_timeout_ms),
            history_len: core.history_len,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl MultiplexerSettings {
    /// core 설정에서 생성합니다.
    pub fn from_core(core: &ClientConfig) -> Result<Self, RpcError> {
        let settings = Self {
            server_url: core.server_url.clone(),
            callback_host: core.callback_host.clone(),
            poll_timeout: Duration::from_millis(core.poll_timeout_ms),
            history_len: core.history_len,
            ..Self::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RpcError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(config_err(
                "client.server_url",
                "must start with http:// or https://",
            ));
        }
        if self.callback_host.is_empty() {
            return Err(config_err("client.callback_host", "must not be empty"));
        }
        if self.poll_timeout.is_zero() {
            return Err(config_err("client.poll_timeout_ms", "must be greater than 0"));
        }
        if self.history_len == 0 {
            return Err(config_err("client.history_len", "must be greater than 0"));
        }
        Ok(())
    }
}

fn config_err(field: &str, reason: &str) -> RpcError {
    RpcError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_core_config() {
        let rpc = RpcSettings::default();
        assert_eq!(rpc.port, 7080);
        assert_eq!(rpc.bind_addr(), "127.0.0.1:7080");

        let client = MultiplexerSettings::default();
        assert_eq!(client.history_len, 500);
        assert_eq!(client.poll_timeout, Duration::from_secs(1));
    }

    #[test]
    fn from_core_rejects_bad_server_url() {
        let core = ClientConfig {
            server_url: "localhost:7080".to_owned(),
            ..Default::default()
        };
        let err = MultiplexerSettings::from_core(&core).unwrap_err();
        assert!(matches!(err, RpcError::Config { field, .. } if field == "client.server_url"));
    }

    #[test]
    fn zero_push_timeout_rejected() {
        let settings = RpcSettings {
            push_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
