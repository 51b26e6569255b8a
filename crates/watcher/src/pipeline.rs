//! 이벤트 파이프라인 -- 파싱, 빈도 집계, 호스트 정보 보강, 히스토리, 팬아웃
//!
//! ```text
//! RawLine -> AuthLineParser -> AddressFilter -> host_messages[addr][msg] += 1
//!         -> HostInfoCache / HostInfoLookup -> AuthEvent
//!         -> publish: EventHistory + event_count -> SubscriberRegistry::fanout
//! ```
//!
//! 라인 처리는 한 태스크에서 순차적으로 이루어지므로 빈도 집계와 히스토리는
//! 도착 순서를 따릅니다. 공유 상태는 RPC 조회와 함께 쓰이므로 `Mutex`로 보호합니다.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::{counter, gauge, histogram};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use authwatch_core::event::{AuthEvent, HostInfo, HostInfoMap, HostMessages, SubscriberKey};
use authwatch_core::metrics as m;

use crate::cache::HostInfoCache;
use crate::enrich::HostInfoLookup;
use crate::error::WatcherError;
use crate::history::EventHistory;
use crate::parser::{AddressFilter, AuthLineParser};
use crate::registry::{DynDelivery, SubscriberRegistry};
use crate::tailer::RawLine;

/// 파이프라인이 소유하는 공유 상태
#[derive(Debug)]
pub struct WatcherState {
    /// 호스트별 메시지 빈도
    pub host_messages: HostMessages,
    /// 호스트 정보 캐시
    pub cache: HostInfoCache,
    /// 최근 이벤트 히스토리
    pub history: EventHistory,
    /// 발행된 이벤트 수 (단조 증가)
    pub event_count: u64,
}

impl WatcherState {
    /// 캐시와 히스토리 용량으로 상태를 생성합니다.
    pub fn new(cache: HostInfoCache, history_len: usize) -> Self {
        Self {
            host_messages: HostMessages::new(),
            cache,
            history: EventHistory::new(history_len),
            event_count: 0,
        }
    }
}

/// 이벤트 파이프라인
pub struct EventPipeline<L> {
    parser: AuthLineParser,
    filter: AddressFilter,
    lookup: L,
    state: Arc<Mutex<WatcherState>>,
    registry: Arc<SubscriberRegistry>,
}

impl<L: HostInfoLookup> EventPipeline<L> {
    /// 새 파이프라인을 생성합니다.
    pub fn new(
        filter: AddressFilter,
        lookup: L,
        state: WatcherState,
        registry: Arc<SubscriberRegistry>,
    ) -> Result<Self, WatcherError> {
        Ok(Self {
            parser: AuthLineParser::new()?,
            filter,
            lookup,
            state: Arc::new(Mutex::new(state)),
            registry,
        })
    }

    /// RPC 계층에 넘길 조회 핸들을 반환합니다.
    pub fn handle(&self) -> WatcherHandle {
        WatcherHandle {
            state: Arc::clone(&self.state),
            registry: Arc::clone(&self.registry),
        }
    }

    /// 라인 하나를 처리합니다.
    ///
    /// 원격 주소가 있는 sshd 라인이면 빈도를 집계하고 호스트 정보를 보강하여
    /// 이벤트를 반환합니다. 주소가 없거나 사설 대역이면 `None`입니다.
    /// 호스트 정보 조회에 실패하면 빈도는 집계되지만 이벤트는 만들지 않습니다.
    pub async fn handle_line(&self, line: &RawLine) -> Option<AuthEvent> {
        let Some(parsed) = self.parser.parse(&line.text) else {
            counter!(m::PIPELINE_LINES_DISCARDED_TOTAL).increment(1);
            return None;
        };
        let Some(v4) = parsed.address else {
            debug!(seq = line.seq, "sshd line without remote address");
            counter!(m::PIPELINE_LINES_DISCARDED_TOTAL).increment(1);
            return None;
        };
        if self.filter.is_private(v4) {
            debug!(seq = line.seq, address = %v4, "private address, skipping");
            counter!(m::PIPELINE_LINES_DISCARDED_TOTAL).increment(1);
            return None;
        }
        let addr = IpAddr::V4(v4);

        let cached = {
            let mut state = self.state.lock().await;
            *state
                .host_messages
                .entry(addr)
                .or_default()
                .entry(parsed.sanitized.clone())
                .or_insert(0) += 1;
            gauge!(m::PIPELINE_KNOWN_HOSTS).set(state.host_messages.len() as f64);
            state.cache.get(&addr).cloned()
        };

        let host_info = match cached {
            Some(info) => info,
            None => self.enrich(addr).await?,
        };

        info!(
            seq = line.seq,
            address = %addr,
            host = %host_info,
            message = %parsed.message,
            "processed line"
        );

        Some(AuthEvent {
            timestamp: Utc::now(),
            remote_address: addr,
            remote_port: parsed.port,
            message: parsed.message,
            sanitized_message: parsed.sanitized,
            host_info,
        })
    }

    /// 처음 보는 주소의 호스트 정보를 조회하여 캐시에 넣습니다.
    async fn enrich(&self, addr: IpAddr) -> Option<HostInfo> {
        let started = Instant::now();
        let result = self.lookup.lookup(addr).await;
        histogram!(m::PIPELINE_LOOKUP_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match result {
            Ok(info) => {
                counter!(m::PIPELINE_LOOKUPS_TOTAL, m::LABEL_RESULT => "success").increment(1);
                info!(address = %addr, host = %info, "new host");
                self.state.lock().await.cache.insert(addr, info.clone());
                Some(info)
            }
            Err(e) => {
                counter!(m::PIPELINE_LOOKUPS_TOTAL, m::LABEL_RESULT => "failure").increment(1);
                warn!(address = %addr, error = %e, "host info lookup failed, event not emitted");
                None
            }
        }
    }

    /// 이벤트를 히스토리에 추가하고 모든 구독자에게 전달합니다.
    ///
    /// 구독자 전달 실패는 이 호출을 실패시키지 않습니다.
    pub async fn publish(&self, event: AuthEvent) {
        {
            let mut state = self.state.lock().await;
            state.history.push(event.clone());
            state.event_count += 1;
            gauge!(m::PIPELINE_HISTORY_SIZE).set(state.history.len() as f64);
        }
        counter!(m::PIPELINE_EVENTS_PUBLISHED_TOTAL).increment(1);
        self.registry.fanout(&event).await;
    }

    /// 라인을 처리하고 이벤트가 만들어지면 발행합니다.
    pub async fn process(&self, line: &RawLine) -> Option<AuthEvent> {
        let event = self.handle_line(line).await?;
        self.publish(event.clone()).await;
        Some(event)
    }

    /// 캐시를 파일에 저장합니다.
    pub async fn save_cache(&self, path: &std::path::Path) -> Result<(), WatcherError> {
        let cache = self.state.lock().await.cache.clone();
        cache.save(path).await
    }
}

/// 파이프라인 상태에 대한 조회/구독 핸들
///
/// RPC 서버가 보유하며 복제 비용이 작습니다.
#[derive(Clone)]
pub struct WatcherHandle {
    state: Arc<Mutex<WatcherState>>,
    registry: Arc<SubscriberRegistry>,
}

impl WatcherHandle {
    /// 발행된 이벤트 수
    pub async fn event_count(&self) -> u64 {
        self.state.lock().await.event_count
    }

    /// 호스트별 메시지 빈도 스냅샷
    pub async fn host_messages(&self) -> HostMessages {
        self.state.lock().await.host_messages.clone()
    }

    /// 호스트 정보 캐시 스냅샷
    pub async fn host_info(&self) -> HostInfoMap {
        self.state.lock().await.cache.entries().clone()
    }

    /// 최근 `limit`개 이벤트 (도착 순서)
    pub async fn event_history(&self, limit: usize) -> Vec<AuthEvent> {
        self.state.lock().await.history.last(limit)
    }

    /// 구독자를 등록합니다. 같은 키는 교체됩니다.
    pub async fn subscribe(&self, key: SubscriberKey, handle: Arc<dyn DynDelivery>) {
        self.registry.subscribe(key, handle).await;
    }

    /// 구독자를 제거합니다.
    pub async fn unsubscribe(&self, key: &SubscriberKey) -> bool {
        self.registry.unsubscribe(key).await
    }

    /// 현재 구독자 수
    pub async fn subscriber_count(&self) -> usize {
        self.registry.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LookupError;
    use crate::registry::{Delivery, DeliveryResult};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 조회 횟수를 세고 고정된 정보를 돌려주는 조회기
    #[derive(Default)]
    struct StaticLookup {
        calls: AtomicUsize,
        fail: bool,
    }

    impl HostInfoLookup for StaticLookup {
        async fn lookup(&self, addr: IpAddr) -> Result<HostInfo, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(LookupError::Status(500));
            }
            Ok(HostInfo {
                ip: Some(addr.to_string()),
                city: Some("Mountain View".to_owned()),
                region: Some("California".to_owned()),
                country: Some("US".to_owned()),
                org: Some("AS15169 Google LLC".to_owned()),
                ..Default::default()
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        received: std::sync::Mutex<Vec<AuthEvent>>,
    }

    impl Delivery for Recorder {
        async fn deliver(&self, event: &AuthEvent) -> DeliveryResult {
            if let Ok(mut received) = self.received.lock() {
                received.push(event.clone());
            }
            DeliveryResult::Delivered
        }
    }

    fn pipeline(lookup: StaticLookup, history_len: usize) -> EventPipeline<StaticLookup> {
        let filter = AddressFilter::from_patterns(&["10.0.0.0/8", "192.168.0.0/16"]).unwrap();
        EventPipeline::new(
            filter,
            lookup,
            WatcherState::new(HostInfoCache::new(), history_len),
            Arc::new(SubscriberRegistry::new()),
        )
        .unwrap()
    }

    fn line(seq: u64, text: &str) -> RawLine {
        RawLine {
            seq,
            text: text.to_owned(),
        }
    }

    const FAILED_ROOT: &str =
        "Jan 10 12:00:01 host sshd[1234]: Failed password for root from 8.8.8.8 port 4321 ssh2";

    #[tokio::test]
    async fn remote_line_counts_and_produces_event() {
        let p = pipeline(StaticLookup::default(), 10);
        let event = p.handle_line(&line(0, FAILED_ROOT)).await.unwrap();

        assert_eq!(event.remote_address, "8.8.8.8".parse::<IpAddr>().unwrap());
        assert_eq!(event.remote_port, Some(4321));
        assert_eq!(event.sanitized_message, "Failed password for root from  port  ssh2");

        let messages = p.handle().host_messages().await;
        let counts = &messages[&"8.8.8.8".parse::<IpAddr>().unwrap()];
        assert_eq!(counts["Failed password for root from  port  ssh2"], 1);
    }

    #[tokio::test]
    async fn private_address_produces_nothing() {
        let p = pipeline(StaticLookup::default(), 10);
        let result = p
            .handle_line(&line(0, "sshd[1]: Accepted publickey for me from 192.168.1.5 port 5555 ssh2"))
            .await;
        assert!(result.is_none());
        assert!(p.handle().host_messages().await.is_empty());
    }

    #[tokio::test]
    async fn lookup_happens_once_per_address() {
        let p = pipeline(StaticLookup::default(), 10);
        p.handle_line(&line(0, FAILED_ROOT)).await.unwrap();
        p.handle_line(&line(1, FAILED_ROOT)).await.unwrap();
        assert_eq!(p.lookup.calls.load(Ordering::SeqCst), 1);

        let messages = p.handle().host_messages().await;
        let counts = &messages[&"8.8.8.8".parse::<IpAddr>().unwrap()];
        assert_eq!(counts["Failed password for root from  port  ssh2"], 2);
        assert_eq!(p.handle().host_info().await.len(), 1);
    }

    #[tokio::test]
    async fn lookup_failure_counts_but_emits_nothing() {
        let p = pipeline(
            StaticLookup {
                fail: true,
                ..Default::default()
            },
            10,
        );
        assert!(p.handle_line(&line(0, FAILED_ROOT)).await.is_none());
        assert!(p.handle().host_info().await.is_empty());
        assert_eq!(p.handle().host_messages().await.len(), 1);

        // 다음 라인에서 다시 조회를 시도
        assert!(p.handle_line(&line(1, FAILED_ROOT)).await.is_none());
        assert_eq!(p.lookup.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn history_returns_last_events_in_order() {
        let p = pipeline(StaticLookup::default(), 10);
        for n in 0..5u64 {
            let text = format!("sshd[1]: Invalid user u{n} from 8.8.4.{n} port 22");
            p.process(&line(n, &text)).await.unwrap();
        }
        let handle = p.handle();
        assert_eq!(handle.event_count().await, 5);

        let last_two = handle.event_history(2).await;
        let addrs: Vec<String> = last_two.iter().map(|e| e.remote_address.to_string()).collect();
        assert_eq!(addrs, vec!["8.8.4.3", "8.8.4.4"]);
        assert!(handle.event_history(0).await.is_empty());
    }

    #[tokio::test]
    async fn history_is_bounded() {
        let p = pipeline(StaticLookup::default(), 3);
        for n in 0..10u64 {
            p.process(&line(n, FAILED_ROOT)).await.unwrap();
        }
        let handle = p.handle();
        assert_eq!(handle.event_history(100).await.len(), 3);
        assert_eq!(handle.event_count().await, 10);
    }

    #[tokio::test]
    async fn publish_fans_out_to_subscribers() {
        let p = pipeline(StaticLookup::default(), 10);
        let recorder = Arc::new(Recorder::default());
        p.handle()
            .subscribe(SubscriberKey::new("localhost", 9000), recorder.clone())
            .await;

        p.process(&line(0, FAILED_ROOT)).await.unwrap();

        let received = recorder.received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].remote_port, Some(4321));
    }

    #[tokio::test]
    async fn save_cache_persists_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host_info.json");
        let p = pipeline(StaticLookup::default(), 10);
        p.handle_line(&line(0, FAILED_ROOT)).await.unwrap();
        p.save_cache(&path).await.unwrap();

        let loaded = HostInfoCache::load(&path).await;
        assert!(loaded.contains(&"8.8.8.8".parse().unwrap()));
    }

    proptest! {
        #[test]
        fn private_lines_never_reach_counts_or_events(
            c in any::<u8>(),
            d in any::<u8>(),
            port in 1u16..=u16::MAX,
            user in "[a-z]{1,12}",
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();
            let (event, messages, history, calls) = runtime.block_on(async {
                let p = pipeline(StaticLookup::default(), 10);
                let text = format!(
                    "sshd[42]: Failed password for {user} from 192.168.{c}.{d} port {port} ssh2"
                );
                let event = p.process(&line(0, &text)).await;
                let handle = p.handle();
                (
                    event,
                    handle.host_messages().await,
                    handle.event_history(10).await,
                    p.lookup.calls.load(Ordering::SeqCst),
                )
            });
            prop_assert!(event.is_none());
            prop_assert!(messages.is_empty());
            prop_assert!(history.is_empty());
            prop_assert_eq!(calls, 0);
        }
    }
}
