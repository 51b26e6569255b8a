//! 이벤트 및 도메인 타입 -- 서버와 구독자가 공유하는 데이터 모델
//!
//! [`AuthEvent`]는 원격 호스트의 인증 로그 한 줄에서 만들어지는 불변 이벤트이며,
//! 서버의 히스토리, 구독자 푸시, 클라이언트 소비자 큐 모두 이 타입을 값으로 공유합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- 모듈명 상수 ---

/// auth.log 감시 모듈명
pub const MODULE_WATCHER: &str = "auth-watcher";
/// RPC 서버 모듈명
pub const MODULE_RPC: &str = "rpc-server";

/// 호스트별 메시지 빈도: 주소 -> (정제된 메시지 -> 횟수)
pub type HostMessages = BTreeMap<IpAddr, BTreeMap<String, u64>>;

/// 호스트 정보 캐시의 직렬화 형태: 주소 -> 지리 정보
pub type HostInfoMap = BTreeMap<IpAddr, HostInfo>;

/// 외부 조회 서비스(ipinfo 형식)가 돌려주는 호스트 지리 정보
///
/// 알려진 필드는 명시적으로 두고, 나머지 필드는 `extra`에 보존하여
/// 캐시 저장/복원 시 정보가 유실되지 않게 합니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    /// 위경도 ("lat,lon")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<String>,
    /// 소속 조직 (AS 번호 포함)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postal: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timezone: Option<String>,
    /// 알려지지 않은 나머지 필드
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl HostInfo {
    /// `"city, region (country)"` 형식의 위치 문자열을 반환합니다.
    ///
    /// 세 필드 중 하나라도 없으면 `None`을 반환합니다.
    pub fn location(&self) -> Option<String> {
        let city = self.city.as_deref()?;
        let region = self.region.as_deref()?;
        let country = self.country.as_deref()?;
        Some(format!("{city}, {region} ({country})"))
    }
}

impl fmt::Display for HostInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.location(), self.org.as_deref()) {
            (Some(location), Some(org)) => write!(f, "{location}: {org}"),
            _ => write!(f, "No info."),
        }
    }
}

/// 원격 호스트 인증 이벤트
///
/// 파이프라인이 원격(사설 대역이 아닌) 주소를 포함한 sshd 라인을 파싱하고
/// 지리 정보 보강에 성공했을 때만 생성됩니다. 생성 후에는 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthEvent {
    /// 이벤트 생성 시각
    pub timestamp: DateTime<Utc>,
    /// 원격 주소
    pub remote_address: IpAddr,
    /// 원격 포트 (라인에 있을 때만)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_port: Option<u16>,
    /// sshd 원본 메시지
    pub message: String,
    /// 주소/포트/인용 문자열이 제거된 메시지 (빈도 집계 키)
    pub sanitized_message: String,
    /// 원격 주소의 지리 정보
    pub host_info: HostInfo,
}

/// 구독자 식별자 -- 구독자가 이벤트를 수신하는 콜백 엔드포인트
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriberKey {
    /// 콜백 호스트
    pub host: String,
    /// 콜백 포트
    pub port: u16,
}

impl SubscriberKey {
    /// 새 구독자 키를 생성합니다.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for SubscriberKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
