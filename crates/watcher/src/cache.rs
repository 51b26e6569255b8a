//! 호스트 정보 캐시 -- 주소별 지리 정보의 영속 저장소
//!
//! 시작 시 한 번 로드하고 종료 시 저장합니다. 로드된 항목은 무효화하지 않습니다.
//! 파일이 없거나 손상된 경우 빈 캐시로 시작합니다.

use std::net::IpAddr;
use std::path::Path;

use tracing::{debug, info, warn};

use authwatch_core::event::{HostInfo, HostInfoMap};

use crate::error::WatcherError;

/// 주소 -> 호스트 정보 캐시
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostInfoCache {
    entries: HostInfoMap,
}

impl HostInfoCache {
    /// 빈 캐시를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 파일에서 캐시를 로드합니다.
    ///
    /// 파일이 없거나 읽기/디코딩에 실패하면 경고를 남기고 빈 캐시를 반환합니다.
    pub async fn load(path: &Path) -> Self {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no host info cache found, starting empty");
                return Self::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unable to read host info cache, starting empty");
                return Self::new();
            }
        };

        match serde_json::from_slice::<HostInfoMap>(&content) {
            Ok(entries) => {
                info!(path = %path.display(), hosts = entries.len(), "host info cache loaded");
                Self { entries }
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "host info cache is corrupt, starting empty");
                Self::new()
            }
        }
    }

    /// 캐시 전체를 파일에 저장합니다.
    ///
    /// 임시 파일에 쓴 뒤 rename하여 중간에 실패해도 기존 파일이 깨지지 않게 합니다.
    pub async fn save(&self, path: &Path) -> Result<(), WatcherError> {
        let cache_err = |reason: String| WatcherError::Cache {
            path: path.display().to_string(),
            reason,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| cache_err(e.to_string()))?;
        }

        let content =
            serde_json::to_vec_pretty(&self.entries).map_err(|e| cache_err(e.to_string()))?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| cache_err(e.to_string()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| cache_err(e.to_string()))?;

        debug!(path = %path.display(), hosts = self.entries.len(), "host info cache saved");
        Ok(())
    }

    /// 주소의 호스트 정보를 반환합니다.
    pub fn get(&self, addr: &IpAddr) -> Option<&HostInfo> {
        self.entries.get(addr)
    }

    /// 주소가 캐시에 있는지 확인합니다.
    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.entries.contains_key(addr)
    }

    /// 호스트 정보를 추가합니다.
    pub fn insert(&mut self, addr: IpAddr, info: HostInfo) {
        self.entries.insert(addr, info);
    }

    /// 캐시된 주소 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 캐시가 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 전체 매핑을 반환합니다.
    pub fn entries(&self) -> &HostInfoMap {
        &self.entries
    }
}
