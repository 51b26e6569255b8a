//! 호스트 정보 조회 -- 외부 지리 정보 서비스 클라이언트
//!
//! [`HostInfoLookup`] trait으로 조회 방식을 추상화하여 파이프라인이
//! 테스트에서 가짜 조회기를 쓸 수 있게 합니다. 기본 구현은 ipinfo 형식의
//! `GET {base_url}/{ip}/json` 엔드포인트를 호출하는 [`IpInfoClient`]입니다.

use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;

use authwatch_core::event::HostInfo;

use crate::error::{LookupError, WatcherError};

/// 주소에 대한 호스트 정보 조회
pub trait HostInfoLookup: Send + Sync + 'static {
    /// 주소의 호스트 정보를 조회합니다.
    fn lookup(&self, addr: IpAddr) -> impl Future<Output = Result<HostInfo, LookupError>> + Send;
}

/// ipinfo 형식 HTTP 조회 클라이언트
#[derive(Debug, Clone)]
pub struct IpInfoClient {
    client: reqwest::Client,
    base_url: String,
}

impl IpInfoClient {
    /// 새 클라이언트를 생성합니다.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, WatcherError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WatcherError::HttpClient(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    /// 주소에 대한 조회 URL을 반환합니다.
    pub fn url_for(&self, addr: IpAddr) -> String {
        format!("{}/{addr}/json", self.base_url)
    }
}

impl HostInfoLookup for IpInfoClient {
    async fn lookup(&self, addr: IpAddr) -> Result<HostInfo, LookupError> {
        let response = self
            .client
            .get(self.url_for(addr))
            .send()
            .await
            .map_err(|e| LookupError::Transport(e.to_string()))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(LookupError::Status(status.as_u16()));
        }

        response
            .json::<HostInfo>()
            .await
            .map_err(|e| LookupError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::extract::Path;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn url_for_trims_trailing_slash() {
        let client = IpInfoClient::new("http://ipinfo.io/", Duration::from_secs(1)).unwrap();
        assert_eq!(
            client.url_for("8.8.8.8".parse().unwrap()),
            "http://ipinfo.io/8.8.8.8/json"
        );
    }

    #[tokio::test]
    async fn lookup_decodes_host_info() {
        let router = Router::new().route(
            "/{ip}/json",
            get(|Path(ip): Path<String>| async move {
                Json(serde_json::json!({
                    "ip": ip,
                    "city": "Mountain View",
                    "region": "California",
                    "country": "US",
                    "org": "AS15169 Google LLC",
                    "anycast": true
                }))
            }),
        );
        let base = serve(router).await;

        let client = IpInfoClient::new(base, Duration::from_secs(5)).unwrap();
        let info = client.lookup("8.8.8.8".parse().unwrap()).await.unwrap();
        assert_eq!(info.ip.as_deref(), Some("8.8.8.8"));
        assert_eq!(
            info.to_string(),
            "Mountain View, California (US): AS15169 Google LLC"
        );
    }

    #[tokio::test]
    async fn lookup_reports_non_200() {
        let router = Router::new().route(
            "/{ip}/json",
            get(|| async { (StatusCode::TOO_MANY_REQUESTS, "rate limited") }),
        );
        let base = serve(router).await;

        let client = IpInfoClient::new(base, Duration::from_secs(5)).unwrap();
        let err = client.lookup("8.8.8.8".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, LookupError::Status(429)));
    }

    #[tokio::test]
    async fn lookup_reports_transport_error() {
        // 바인드 후 즉시 닫아 연결이 거부되는 포트를 얻음
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = IpInfoClient::new(format!("http://{addr}"), Duration::from_secs(2)).unwrap();
        let err = client.lookup("8.8.8.8".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, LookupError::Transport(_)));
    }
}
