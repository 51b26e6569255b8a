//! 클라이언트 측 구독 멀티플렉서
//!
//! [`ClientMultiplexer`]는 서버에 대한 구독 하나를 유지하면서 도착한 이벤트를
//! 로컬 소비자마다 독립된 큐로 나눠 줍니다. 소비자끼리 큐를 공유하지 않으므로
//! 느린 소비자가 다른 소비자의 이벤트를 가로채거나 지연시키지 않습니다.
//!
//! # 연결 순서
//! ```text
//! ping -> 콜백 서버 바인드(callback_host:0) -> subscribe -> getEventHistory / getEventCount
//! ```
//!
//! # 소비자
//! [`join`](ClientMultiplexer::join)은 로컬 히스토리를 먼저 재생한 뒤 새 이벤트를
//! 도착 순서대로 돌려주는 [`ConsumerStream`]을 반환합니다. 스트림이 drop되면
//! 큐는 즉시 활성 목록에서 제거됩니다.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use authwatch_core::event::{AuthEvent, SubscriberKey};
use authwatch_watcher::history::EventHistory;

use crate::client::RpcClient;
use crate::config::MultiplexerSettings;
use crate::error::RpcError;
use crate::protocol::{PushRequest, RPC_PATH, RpcResponse};

/// 멀티플렉서 내부 상태
struct Inner {
    history: EventHistory,
    queues: HashMap<Uuid, mpsc::UnboundedSender<AuthEvent>>,
    event_count: u64,
}

/// 콜백 서버와 소비자 스트림이 공유하는 상태
pub(crate) struct MuxState {
    inner: Mutex<Inner>,
}

impl MuxState {
    pub(crate) fn new(history_len: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                history: EventHistory::new(history_len),
                queues: HashMap::new(),
                event_count: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 도착한 이벤트를 히스토리와 모든 활성 큐에 추가합니다.
    pub(crate) fn on_event(&self, event: AuthEvent) {
        let mut inner = self.lock();
        inner.event_count += 1;
        inner
            .queues
            .retain(|_, queue| queue.send(event.clone()).is_ok());
        inner.history.push(event);
    }

    /// 서버에서 받은 초기 히스토리를 반영합니다.
    ///
    /// 카운터는 `server_count - fetched`에 구독 후 받은 푸시 중 초기 히스토리에 없는
    /// 것의 수를 더한 값이 됩니다. 초기 히스토리에 이미 있는 푸시는 히스토리에 다시
    /// 넣지 않고 카운터에서도 한 번만 셉니다.
    pub(crate) fn seed(&self, fetched: Vec<AuthEvent>, server_count: u64) {
        let mut inner = self.lock();
        let pushed = inner.history.snapshot();
        let mut history = EventHistory::new(inner.history.capacity());
        history.extend(fetched.iter().cloned());
        let mut overlapping = 0u64;
        for event in pushed {
            if fetched.contains(&event) {
                overlapping += 1;
            } else {
                history.push(event);
            }
        }
        inner.history = history;
        inner.event_count = inner.event_count.saturating_sub(overlapping)
            + server_count.saturating_sub(fetched.len() as u64);
    }

    /// 새 소비자 큐를 등록하고 히스토리를 재생합니다.
    pub(crate) fn join(
        self: &Arc<Self>,
        poll_timeout: Duration,
        cancel: CancellationToken,
    ) -> ConsumerStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = Uuid::new_v4();
        {
            let mut inner = self.lock();
            for event in inner.history.iter() {
                // 수신측을 아직 쥐고 있으므로 실패하지 않는다
                let _ = tx.send(event.clone());
            }
            inner.queues.insert(id, tx);
        }
        debug!(consumer = %id, "consumer joined");
        ConsumerStream {
            id,
            rx,
            state: Arc::clone(self),
            poll_timeout,
            cancel,
        }
    }

    fn remove_queue(&self, id: &Uuid) {
        if self.lock().queues.remove(id).is_some() {
            debug!(consumer = %id, "consumer left");
        }
    }

    fn event_count(&self) -> u64 {
        self.lock().event_count
    }

    fn history(&self) -> Vec<AuthEvent> {
        self.lock().history.snapshot()
    }

    fn consumer_count(&self) -> usize {
        self.lock().queues.len()
    }
}

/// 소비자 하나의 이벤트 스트림
///
/// 대기 중에도 `poll_timeout`마다 취소 여부를 확인합니다.
/// drop되면 큐가 활성 목록에서 제거됩니다.
pub struct ConsumerStream {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<AuthEvent>,
    state: Arc<MuxState>,
    poll_timeout: Duration,
    cancel: CancellationToken,
}

impl ConsumerStream {
    /// 다음 이벤트를 기다립니다. 취소되거나 멀티플렉서가 닫히면 `None`입니다.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        loop {
            if self.cancel.is_cancelled() {
                return None;
            }
            match tokio::time::timeout(self.poll_timeout, self.rx.recv()).await {
                Ok(event) => return event,
                Err(_) => continue,
            }
        }
    }

    /// 대기 없이 이미 도착한 이벤트를 꺼냅니다.
    pub fn try_next(&mut self) -> Option<AuthEvent> {
        self.rx.try_recv().ok()
    }

    /// 소비자 식별자
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 이 스트림을 멈추는 토큰
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for ConsumerStream {
    fn drop(&mut self) {
        self.state.remove_queue(&self.id);
    }
}

/// 서버 구독 하나를 여러 로컬 소비자에게 나눠 주는 멀티플렉서
pub struct ClientMultiplexer {
    client: RpcClient,
    state: Arc<MuxState>,
    key: SubscriberKey,
    callback_addr: SocketAddr,
    poll_timeout: Duration,
    cancel: CancellationToken,
    server_task: Option<JoinHandle<()>>,
}

impl ClientMultiplexer {
    /// 서버에 연결하고 구독합니다.
    pub async fn connect(settings: MultiplexerSettings) -> Result<Self, RpcError> {
        settings.validate()?;
        let client = RpcClient::new(&settings.server_url, settings.request_timeout)?;

        let pong = client.ping().await?;
        if pong != "pong" {
            return Err(RpcError::UnexpectedReply {
                expected: "pong".to_owned(),
                got: pong,
            });
        }

        let bind_addr = format!("{}:0", settings.callback_host);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RpcError::Bind {
                addr: bind_addr.clone(),
                reason: e.to_string(),
            })?;
        let callback_addr = listener.local_addr()?;

        let state = Arc::new(MuxState::new(settings.history_len));
        let cancel = CancellationToken::new();
        let server_task = spawn_callback_server(listener, Arc::clone(&state), cancel.clone());

        let key = SubscriberKey::new(settings.callback_host.clone(), callback_addr.port());
        let mut mux = Self {
            client,
            state,
            key,
            callback_addr,
            poll_timeout: settings.poll_timeout,
            cancel,
            server_task: Some(server_task),
        };

        if let Err(e) = mux.subscribe_and_seed(settings.history_len).await {
            mux.stop_callback_server().await;
            return Err(e);
        }
        Ok(mux)
    }

    async fn subscribe_and_seed(&self, history_len: usize) -> Result<(), RpcError> {
        self.client.subscribe(&self.key.host, self.key.port).await?;
        info!(callback = %self.key, "subscribed to auth events");

        let history = self.client.event_history(history_len).await?;
        let server_count = self.client.event_count().await?;
        info!(fetched = history.len(), total = server_count, "fetched event history");
        self.state.seed(history, server_count);
        Ok(())
    }

    /// 새 소비자를 등록합니다.
    pub fn join(&self) -> ConsumerStream {
        self.state.join(self.poll_timeout, self.cancel.child_token())
    }

    /// 이벤트를 직접 주입합니다. 콜백 서버가 푸시를 받을 때와 같은 경로입니다.
    pub fn on_event(&self, event: AuthEvent) {
        self.state.on_event(event);
    }

    /// 받은 이벤트 수 (연결 시 서버 카운터로 초기화)
    pub fn event_count(&self) -> u64 {
        self.state.event_count()
    }

    /// 로컬 히스토리 스냅샷
    pub fn history(&self) -> Vec<AuthEvent> {
        self.state.history()
    }

    /// 활성 소비자 수
    pub fn consumer_count(&self) -> usize {
        self.state.consumer_count()
    }

    /// 서버에 등록된 구독자 키
    pub fn key(&self) -> &SubscriberKey {
        &self.key
    }

    /// 콜백 서버 주소
    pub fn callback_addr(&self) -> SocketAddr {
        self.callback_addr
    }

    /// RPC 클라이언트
    pub fn client(&self) -> &RpcClient {
        &self.client
    }

    /// 구독을 해제하고 콜백 서버를 멈춥니다.
    ///
    /// 구독 해제 실패는 로그만 남기고 콜백 서버 정리를 계속합니다.
    pub async fn shutdown(mut self) -> Result<(), RpcError> {
        let unsubscribed = self.client.unsubscribe(&self.key.host, self.key.port).await;
        match &unsubscribed {
            Ok(_) => info!(callback = %self.key, "unsubscribed from auth events"),
            Err(e) => warn!(callback = %self.key, error = %e, "unsubscribe failed"),
        }
        self.stop_callback_server().await;
        unsubscribed.map(|_| ())
    }

    async fn stop_callback_server(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.server_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "callback server task join failed");
            }
        }
    }
}

impl Drop for ClientMultiplexer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn spawn_callback_server(
    listener: TcpListener,
    state: Arc<MuxState>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let app = Router::new()
        .route(RPC_PATH, post(handle_push))
        .with_state(state);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(cancel.cancelled_owned())
            .await
        {
            warn!(error = %e, "callback server failed");
        }
    })
}

async fn handle_push(
    State(state): State<Arc<MuxState>>,
    Json(push): Json<PushRequest>,
) -> Json<RpcResponse> {
    match push {
        PushRequest::Event { data } => state.on_event(data),
    }
    Json(RpcResponse::ok(true))
}
