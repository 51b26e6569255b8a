//! 구독자 푸시 전달
//!
//! [`HttpDelivery`]는 구독자의 콜백 엔드포인트로 `event` 푸시를 보내고
//! 결과를 [`DeliveryResult`]로 돌려줍니다. 실패 처리는 레지스트리가 담당합니다.

use authwatch_core::event::{AuthEvent, SubscriberKey};
use authwatch_watcher::registry::{Delivery, DeliveryResult};

use crate::protocol::{PushRequest, RPC_PATH, RpcResponse};

/// HTTP 푸시 전달 핸들
#[derive(Debug, Clone)]
pub struct HttpDelivery {
    client: reqwest::Client,
    url: String,
}

impl HttpDelivery {
    /// 구독자 키의 콜백 엔드포인트로 보내는 핸들을 생성합니다.
    ///
    /// `client`의 타임아웃이 푸시 타임아웃으로 쓰입니다.
    pub fn new(client: reqwest::Client, key: &SubscriberKey) -> Self {
        Self {
            client,
            url: callback_url(key),
        }
    }

    /// 푸시 URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// 구독자 키에 대한 콜백 URL을 만듭니다.
pub fn callback_url(key: &SubscriberKey) -> String {
    if key.host.contains(':') && !key.host.starts_with('[') {
        format!("http://[{}]:{}{RPC_PATH}", key.host, key.port)
    } else {
        format!("http://{}:{}{RPC_PATH}", key.host, key.port)
    }
}

impl Delivery for HttpDelivery {
    async fn deliver(&self, event: &AuthEvent) -> DeliveryResult {
        let push = PushRequest::Event {
            data: event.clone(),
        };
        let response = match self.client.post(&self.url).json(&push).send().await {
            Ok(response) => response,
            Err(e) => return DeliveryResult::Failed(e.to_string()),
        };
        if !response.status().is_success() {
            return DeliveryResult::Failed(format!("http status {}", response.status().as_u16()));
        }
        match response.json::<RpcResponse>().await {
            Ok(RpcResponse { error: Some(reason), .. }) => DeliveryResult::Failed(reason),
            Ok(_) => DeliveryResult::Delivered,
            Err(e) => DeliveryResult::Failed(format!("invalid push reply: {e}")),
        }
    }
}
