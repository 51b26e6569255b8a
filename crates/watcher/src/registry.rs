//! 구독자 레지스트리 -- 서버 측 이벤트 팬아웃
//!
//! 구독자는 [`SubscriberKey`](콜백 엔드포인트)로 식별되며 키당 최대 하나의
//! 전달 핸들을 가집니다. 같은 키로 다시 구독하면 기존 항목을 교체합니다.
//!
//! 전달 결과는 [`DeliveryResult`]로 명시적으로 반환됩니다. 실패한 구독자는
//! 경고 로그와 함께 자동 제거되며 나머지 구독자 전달에는 영향을 주지 않습니다.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use metrics::{counter, gauge};
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tracing::{info, warn};

use authwatch_core::event::{AuthEvent, SubscriberKey};
use authwatch_core::metrics as m;
use authwatch_core::pipeline::BoxFuture;

/// 전달 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryResult {
    /// 전달 성공
    Delivered,
    /// 전달 실패 (사유)
    Failed(String),
}

impl DeliveryResult {
    /// 전달에 성공했는지 확인합니다.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }
}

/// 구독자 하나에게 이벤트를 전달하는 전송 계층
pub trait Delivery: Send + Sync + 'static {
    /// 이벤트를 전달합니다.
    fn deliver(&self, event: &AuthEvent) -> impl Future<Output = DeliveryResult> + Send;
}

/// dyn-compatible 전달 trait
///
/// `Delivery`는 RPITIT를 사용하므로 레지스트리는 이 trait으로 핸들을 보관합니다.
pub trait DynDelivery: Send + Sync + 'static {
    /// 이벤트를 전달합니다.
    fn deliver<'a>(&'a self, event: &'a AuthEvent) -> BoxFuture<'a, DeliveryResult>;
}

impl<T: Delivery> DynDelivery for T {
    fn deliver<'a>(&'a self, event: &'a AuthEvent) -> BoxFuture<'a, DeliveryResult> {
        Box::pin(Delivery::deliver(self, event))
    }
}

/// 구독자 레지스트리
#[derive(Default)]
pub struct SubscriberRegistry {
    entries: Mutex<HashMap<SubscriberKey, Arc<dyn DynDelivery>>>,
}

impl SubscriberRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 구독자를 등록합니다. 같은 키의 기존 항목은 교체됩니다.
    pub async fn subscribe(&self, key: SubscriberKey, handle: Arc<dyn DynDelivery>) {
        let mut entries = self.entries.lock().await;
        if entries.insert(key.clone(), handle).is_some() {
            info!(subscriber = %key, "subscriber replaced");
        } else {
            info!(subscriber = %key, "new subscriber");
        }
        gauge!(m::RPC_ACTIVE_SUBSCRIBERS).set(entries.len() as f64);
    }

    /// 구독자를 제거합니다. 없으면 아무 일도 하지 않습니다.
    ///
    /// 제거되었으면 `true`를 반환합니다.
    pub async fn unsubscribe(&self, key: &SubscriberKey) -> bool {
        let mut entries = self.entries.lock().await;
        let removed = entries.remove(key).is_some();
        if removed {
            info!(subscriber = %key, "lost subscriber");
            gauge!(m::RPC_ACTIVE_SUBSCRIBERS).set(entries.len() as f64);
        }
        removed
    }

    /// 현재 구독자 수를 반환합니다.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// 구독자가 없는지 확인합니다.
    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// 현재 구독자 키 목록을 반환합니다.
    pub async fn keys(&self) -> Vec<SubscriberKey> {
        self.entries.lock().await.keys().cloned().collect()
    }

    /// 모든 구독자에게 이벤트를 전달합니다.
    ///
    /// 구독자별 전달은 동시에 진행되며, 실패한 구독자는 제거됩니다.
    /// 전달 도중 같은 키로 재구독한 경우 새 핸들은 제거하지 않습니다.
    /// 성공적으로 전달된 구독자 수를 반환합니다.
    pub async fn fanout(&self, event: &AuthEvent) -> usize {
        let targets: Vec<(SubscriberKey, Arc<dyn DynDelivery>)> = {
            let entries = self.entries.lock().await;
            entries
                .iter()
                .map(|(key, handle)| (key.clone(), Arc::clone(handle)))
                .collect()
        };
        if targets.is_empty() {
            return 0;
        }

        let event = Arc::new(event.clone());
        let mut deliveries = JoinSet::new();
        for (key, handle) in targets {
            let event = Arc::clone(&event);
            deliveries.spawn(async move {
                let result = handle.deliver(&event).await;
                (key, handle, result)
            });
        }

        let mut delivered = 0;
        let mut failed = Vec::new();
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, _, DeliveryResult::Delivered)) => delivered += 1,
                Ok((key, handle, DeliveryResult::Failed(reason))) => {
                    warn!(subscriber = %key, reason = %reason, "dead subscriber, unsubscribing");
                    failed.push((key, handle));
                }
                Err(e) => warn!(error = %e, "delivery task failed"),
            }
        }

        if !failed.is_empty() {
            let mut entries = self.entries.lock().await;
            for (key, handle) in failed {
                let same_entry = entries
                    .get(&key)
                    .is_some_and(|current| Arc::ptr_eq(current, &handle));
                if same_entry {
                    entries.remove(&key);
                    counter!(m::RPC_SUBSCRIBERS_EVICTED_TOTAL).increment(1);
                    info!(subscriber = %key, "lost subscriber");
                }
            }
            gauge!(m::RPC_ACTIVE_SUBSCRIBERS).set(entries.len() as f64);
        }

        delivered
    }
}
