//! 감시 파이프라인 설정
//!
//! [`WatcherSettings`]는 core의 [`WatcherConfig`](authwatch_core::config::WatcherConfig)를
//! 실행 시점 타입(경로, `Duration`)으로 변환한 설정입니다.
//!
//! # 사용 예시
//! ```ignore
//! use authwatch_core::config::AuthWatchConfig;
//! use authwatch_watcher::config::WatcherSettings;
//!
//! let core_config = AuthWatchConfig::default();
//! let settings = WatcherSettings::from_core(&core_config.watcher)?;
//! ```

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::error::WatcherError;

/// 라인 채널 기본 용량 (tailer -> pipeline)
const DEFAULT_LINE_CHANNEL_CAPACITY: usize = 1024;

/// 감시 파이프라인 설정
#[derive(Debug, Clone)]
pub struct WatcherSettings {
    /// 감시할 인증 로그 경로
    pub watch_path: PathBuf,
    /// 호스트 정보 캐시 파일 경로
    pub cache_path: PathBuf,
    /// 이벤트 히스토리 최대 길이
    pub history_len: usize,
    /// 시작 시 기존 로그 내용 재생 여부
    pub replay_on_start: bool,
    /// 사설 대역 필터 (CIDR 또는 텍스트 접두사)
    pub private_filters: Vec<String>,
    /// 호스트 정보 조회 서비스 기본 URL
    pub lookup_url: String,
    /// 조회 요청 타임아웃
    pub lookup_timeout: Duration,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// tailer -> pipeline 라인 채널 용량
    pub line_channel_capacity: usize,
    /// 파일 시스템 이벤트 대기 주기 (취소 확인 간격)
    pub poll_interval: Duration,
}

impl Default for WatcherSettings {
    fn default() -> Self {
        let core = authwatch_core::config::WatcherConfig::default();
        Self {
            watch_path: PathBuf::from(core.watch_path),
            cache_path: PathBuf::from(core.cache_path),
            history_len: core.history_len,
            replay_on_start: core.replay_on_start,
            private_filters: core.private_filters,
            lookup_url: core.lookup_url,
            lookup_timeout: Duration::from_secs(core.lookup_timeout_secs),
            line_channel_capacity: DEFAULT_LINE_CHANNEL_CAPACITY,
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl WatcherSettings {
    /// core의 `WatcherConfig`에서 설정을 생성하고 검증합니다.
    pub fn from_core(core: &authwatch_core::config::WatcherConfig) -> Result<Self, WatcherError> {
        let settings = Self {
            watch_path: PathBuf::from(&core.watch_path),
            cache_path: PathBuf::from(&core.cache_path),
            history_len: core.history_len,
            replay_on_start: core.replay_on_start,
            private_filters: core.private_filters.clone(),
            lookup_url: core.lookup_url.clone(),
            lookup_timeout: Duration::from_secs(core.lookup_timeout_secs),
            ..Self::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    /// 새 빌더를 생성합니다.
    pub fn builder() -> WatcherSettingsBuilder {
        WatcherSettingsBuilder::new()
    }

    /// 감시 대상 파일이 위치한 디렉토리를 반환합니다.
    pub fn watch_dir(&self) -> Option<&Path> {
        self.watch_path.parent().filter(|p| !p.as_os_str().is_empty())
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), WatcherError> {
        if !self.watch_path.is_absolute() {
            return Err(config_err("watch_path", "must be an absolute path"));
        }
        if self
            .watch_path
            .components()
            .any(|c| c == Component::ParentDir)
        {
            return Err(config_err(
                "watch_path",
                "contains path traversal pattern '..'",
            ));
        }
        if self.watch_dir().is_none() || self.watch_path.file_name().is_none() {
            return Err(config_err(
                "watch_path",
                "must name a file inside a directory",
            ));
        }
        if self.history_len == 0 {
            return Err(config_err("history_len", "must be greater than 0"));
        }
        if self.line_channel_capacity == 0 {
            return Err(config_err("line_channel_capacity", "must be greater than 0"));
        }
        if self.poll_interval.is_zero() {
            return Err(config_err("poll_interval", "must be greater than 0"));
        }
        if self.lookup_timeout.is_zero() {
            return Err(config_err("lookup_timeout", "must be greater than 0"));
        }
        Ok(())
    }
}

fn config_err(field: &str, reason: &str) -> WatcherError {
    WatcherError::Config {
        field: field.to_owned(),
        reason: reason.to_owned(),
    }
}

/// 감시 파이프라인 설정 빌더
#[derive(Debug, Default)]
pub struct WatcherSettingsBuilder {
    settings: WatcherSettings,
}

impl WatcherSettingsBuilder {
    /// 기본값으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 감시할 파일 경로를 지정합니다.
    pub fn watch_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.watch_path = path.into();
        self
    }

    /// 캐시 파일 경로를 지정합니다.
    pub fn cache_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.settings.cache_path = path.into();
        self
    }

    /// 히스토리 길이를 지정합니다.
    pub fn history_len(mut self, len: usize) -> Self {
        self.settings.history_len = len;
        self
    }

    /// 시작 시 재생 여부를 지정합니다.
    pub fn replay_on_start(mut self, replay: bool) -> Self {
        self.settings.replay_on_start = replay;
        self
    }

    /// 사설 대역 필터를 지정합니다.
    pub fn private_filters<I, S>(mut self, filters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.private_filters = filters.into_iter().map(Into::into).collect();
        self
    }

    /// 조회 서비스 URL을 지정합니다.
    pub fn lookup_url(mut self, url: impl Into<String>) -> Self {
        self.settings.lookup_url = url.into();
        self
    }

    /// 조회 타임아웃을 지정합니다.
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.settings.lookup_timeout = timeout;
        self
    }

    /// 파일 시스템 이벤트 대기 주기를 지정합니다.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.settings.poll_interval = interval;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    pub fn build(self) -> Result<WatcherSettings, WatcherError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        let settings = WatcherSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.watch_dir(), Some(Path::new("/var/log")));
    }

    #[test]
    fn from_core_converts_units() {
        let mut core = authwatch_core::config::WatcherConfig::default();
        core.lookup_timeout_secs = 3;
        core.history_len = 10;
        let settings = WatcherSettings::from_core(&core).unwrap();
        assert_eq!(settings.lookup_timeout, Duration::from_secs(3));
        assert_eq!(settings.history_len, 10);
        assert_eq!(settings.line_channel_capacity, DEFAULT_LINE_CHANNEL_CAPACITY);
    }

    #[test]
    fn builder_rejects_relative_path() {
        let err = WatcherSettings::builder()
            .watch_path("auth.log")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("absolute"));
    }

    #[test]
    fn builder_rejects_traversal() {
        let err = WatcherSettings::builder()
            .watch_path("/var/log/../../etc/auth.log")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains(".."));
    }

    #[test]
    fn builder_rejects_root_as_watch_path() {
        let err = WatcherSettings::builder().watch_path("/").build().unwrap_err();
        assert!(err.to_string().contains("watch_path"));
    }

    #[test]
    fn builder_sets_fields() {
        let settings = WatcherSettings::builder()
            .watch_path("/tmp/test/auth.log")
            .history_len(5)
            .replay_on_start(true)
            .private_filters(["10.0.0.0/8"])
            .build()
            .unwrap();
        assert_eq!(settings.history_len, 5);
        assert!(settings.replay_on_start);
        assert_eq!(settings.private_filters, vec!["10.0.0.0/8"]);
    }
}
