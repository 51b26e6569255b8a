//! 설정 관리 -- authwatch.toml 파싱 및 런타임 설정
//!
//! [`AuthWatchConfig`]는 서버 데몬과 클라이언트 CLI가 공유하는 최상위 설정 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`AUTHWATCH_WATCHER_WATCH_PATH=/var/log/secure` 형식)
//! 3. 설정 파일 (`authwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), authwatch_core::error::AuthWatchError> {
//! use authwatch_core::config::AuthWatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = AuthWatchConfig::load("authwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = AuthWatchConfig::parse("[watcher]\nhistory_len = 1000")?;
//! # Ok(())
//! # }
//! ```

use std::net::Ipv4Addr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AuthWatchError, ConfigError};

/// 히스토리 길이 상한
const MAX_HISTORY_LEN: usize = 1_000_000;

/// authwatch 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthWatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// auth.log 감시 설정
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// RPC 서버 설정
    #[serde(default)]
    pub rpc: RpcConfig,
    /// 구독 클라이언트 설정
    #[serde(default)]
    pub client: ClientConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AuthWatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AuthWatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, AuthWatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AuthWatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                AuthWatchError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, AuthWatchError> {
        toml::from_str(toml_str).map_err(|e| {
            AuthWatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `AUTHWATCH_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "AUTHWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "AUTHWATCH_GENERAL_LOG_FORMAT");

        // Watcher
        override_string(&mut self.watcher.watch_path, "AUTHWATCH_WATCHER_WATCH_PATH");
        override_string(&mut self.watcher.cache_path, "AUTHWATCH_WATCHER_CACHE_PATH");
        override_usize(&mut self.watcher.history_len, "AUTHWATCH_WATCHER_HISTORY_LEN");
        override_bool(
            &mut self.watcher.replay_on_start,
            "AUTHWATCH_WATCHER_REPLAY_ON_START",
        );
        override_csv(
            &mut self.watcher.private_filters,
            "AUTHWATCH_WATCHER_PRIVATE_FILTERS",
        );
        override_string(&mut self.watcher.lookup_url, "AUTHWATCH_WATCHER_LOOKUP_URL");
        override_u64(
            &mut self.watcher.lookup_timeout_secs,
            "AUTHWATCH_WATCHER_LOOKUP_TIMEOUT_SECS",
        );

        // RPC
        override_string(&mut self.rpc.listen_addr, "AUTHWATCH_RPC_LISTEN_ADDR");
        override_u16(&mut self.rpc.port, "AUTHWATCH_RPC_PORT");
        override_u64(&mut self.rpc.push_timeout_ms, "AUTHWATCH_RPC_PUSH_TIMEOUT_MS");

        // Client
        override_string(&mut self.client.server_url, "AUTHWATCH_CLIENT_SERVER_URL");
        override_string(&mut self.client.callback_host, "AUTHWATCH_CLIENT_CALLBACK_HOST");
        override_u64(
            &mut self.client.poll_timeout_ms,
            "AUTHWATCH_CLIENT_POLL_TIMEOUT_MS",
        );
        override_usize(&mut self.client.history_len, "AUTHWATCH_CLIENT_HISTORY_LEN");

        // Metrics
        override_bool(&mut self.metrics.enabled, "AUTHWATCH_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "AUTHWATCH_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "AUTHWATCH_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "AUTHWATCH_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), AuthWatchError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.watcher.validate()?;
        self.rpc.validate()?;
        self.client.validate()?;
        self.metrics.validate()?;

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> AuthWatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// auth.log 감시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// 감시할 인증 로그 경로
    pub watch_path: String,
    /// 호스트 정보 캐시 파일 경로
    pub cache_path: String,
    /// 이벤트 히스토리 최대 길이
    pub history_len: usize,
    /// 시작 시 기존 로그 내용을 재생할지 여부
    pub replay_on_start: bool,
    /// 원격으로 취급하지 않을 주소 필터 (CIDR 또는 텍스트 접두사)
    pub private_filters: Vec<String>,
    /// 호스트 정보 조회 서비스 기본 URL
    pub lookup_url: String,
    /// 조회 요청 타임아웃 (초)
    pub lookup_timeout_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            watch_path: "/var/log/auth.log".to_owned(),
            cache_path: "/var/lib/authwatch/host_info.json".to_owned(),
            history_len: 4000,
            replay_on_start: false,
            private_filters: vec![
                "10.0.0.0/8".to_owned(),
                "172.16.0.0/12".to_owned(),
                "192.168.0.0/16".to_owned(),
                "127.0.0.0/8".to_owned(),
            ],
            lookup_url: "http://ipinfo.io".to_owned(),
            lookup_timeout_secs: 10,
        }
    }
}

impl WatcherConfig {
    fn validate(&self) -> Result<(), AuthWatchError> {
        let path = Path::new(&self.watch_path);
        if !path.is_absolute() {
            return Err(invalid("watcher.watch_path", "must be an absolute path"));
        }
        if path
            .components()
            .any(|c| matches!(c, std::path::Component::ParentDir))
        {
            return Err(invalid("watcher.watch_path", "must not contain '..'"));
        }
        if path.parent().is_none() {
            return Err(invalid(
                "watcher.watch_path",
                "must name a file inside a directory",
            ));
        }

        if self.cache_path.is_empty() {
            return Err(invalid("watcher.cache_path", "must not be empty"));
        }

        if self.history_len == 0 || self.history_len > MAX_HISTORY_LEN {
            return Err(invalid(
                "watcher.history_len",
                format!("must be between 1 and {MAX_HISTORY_LEN}"),
            ));
        }

        for filter in &self.private_filters {
            validate_filter(filter)?;
        }

        if self.lookup_url.is_empty() {
            return Err(invalid("watcher.lookup_url", "must not be empty"));
        }

        if self.lookup_timeout_secs == 0 {
            return Err(invalid("watcher.lookup_timeout_secs", "must be greater than 0"));
        }

        Ok(())
    }
}

/// 사설 대역 필터 항목 하나를 검증합니다.
///
/// `/`가 포함되면 `a.b.c.d/n` 형식의 CIDR이어야 하고,
/// 그렇지 않으면 비어 있지 않은 텍스트 접두사로 취급합니다.
fn validate_filter(filter: &str) -> Result<(), AuthWatchError> {
    let field = "watcher.private_filters";
    match filter.split_once('/') {
        Some((network, prefix_len)) => {
            if network.parse::<Ipv4Addr>().is_err() {
                return Err(invalid(field, format!("invalid CIDR network: '{filter}'")));
            }
            match prefix_len.parse::<u8>() {
                Ok(len) if len <= 32 => Ok(()),
                _ => Err(invalid(field, format!("invalid CIDR prefix length: '{filter}'"))),
            }
        }
        None if filter.trim().is_empty() => Err(invalid(field, "filter must not be empty")),
        None => Ok(()),
    }
}

/// RPC 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// 바인드 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 구독자 푸시 타임아웃 (밀리초)
    pub push_timeout_ms: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1".to_owned(),
            port: 7080,
            push_timeout_ms: 5000,
        }
    }
}

impl RpcConfig {
    fn validate(&self) -> Result<(), AuthWatchError> {
        if self.listen_addr.is_empty() {
            return Err(invalid("rpc.listen_addr", "must not be empty"));
        }
        if self.port == 0 {
            return Err(invalid("rpc.port", "must be greater than 0"));
        }
        if self.push_timeout_ms == 0 {
            return Err(invalid("rpc.push_timeout_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

/// 구독 클라이언트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// 서버 RPC URL
    pub server_url: String,
    /// 콜백 서버를 바인드할 호스트 (서버가 이 주소로 푸시합니다)
    pub callback_host: String,
    /// 소비자 큐 폴링 타임아웃 (밀리초)
    pub poll_timeout_ms: u64,
    /// 로컬 히스토리 최대 길이
    pub history_len: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://localhost:7080".to_owned(),
            callback_host: "127.0.0.1".to_owned(),
            poll_timeout_ms: 1000,
            history_len: 500,
        }
    }
}

impl ClientConfig {
    fn validate(&self) -> Result<(), AuthWatchError> {
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(invalid(
                "client.server_url",
                "must start with http:// or https://",
            ));
        }
        if self.callback_host.is_empty() {
            return Err(invalid("client.callback_host", "must not be empty"));
        }
        if self.poll_timeout_ms == 0 {
            return Err(invalid("client.poll_timeout_ms", "must be greater than 0"));
        }
        if self.history_len == 0 || self.history_len > MAX_HISTORY_LEN {
            return Err(invalid(
                "client.history_len",
                format!("must be between 1 and {MAX_HISTORY_LEN}"),
            ));
        }
        Ok(())
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 메트릭 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 리슨 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9180,
            endpoint: "/metrics".to_owned(),
        }
    }
}

impl MetricsConfig {
    fn validate(&self) -> Result<(), AuthWatchError> {
        if !self.enabled {
            return Ok(());
        }
        if self.port == 0 {
            return Err(invalid("metrics.port", "must be greater than 0"));
        }
        if !self.endpoint.starts_with('/') {
            return Err(invalid("metrics.endpoint", "must start with '/'"));
        }
        Ok(())
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
