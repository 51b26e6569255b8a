//! RPC 서버 -- 감시 파이프라인 상태 조회와 구독 관리
//!
//! [`RpcServer`]는 core의 [`Pipeline`] trait을 구현하여 데몬에서
//! 감시 서비스와 같은 생명주기로 관리됩니다.
//!
//! # 메서드
//! - `ping` -> `"pong"`
//! - `getEventCount`, `getHostMessages`, `getHostInfo`, `getEventHistory(limit)`
//! - `subscribe(host, port)`, `unsubscribe(host, port)`

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use metrics::counter;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use authwatch_core::error::{AuthWatchError, PipelineError};
use authwatch_core::event::SubscriberKey;
use authwatch_core::metrics as m;
use authwatch_core::pipeline::{HealthStatus, Pipeline};
use authwatch_watcher::WatcherHandle;

use crate::config::RpcSettings;
use crate::error::RpcError;
use crate::protocol::{RPC_PATH, RpcRequest, RpcResponse};
use crate::push::HttpDelivery;

/// 핸들러 공유 상태
#[derive(Clone)]
pub struct RpcState {
    handle: WatcherHandle,
    push_client: reqwest::Client,
}

impl RpcState {
    /// 조회 핸들과 푸시 타임아웃으로 상태를 생성합니다.
    pub fn new(handle: WatcherHandle, settings: &RpcSettings) -> Result<Self, RpcError> {
        let push_client = reqwest::Client::builder()
            .timeout(settings.push_timeout)
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            handle,
            push_client,
        })
    }
}

/// RPC 라우터를 생성합니다.
pub fn router(state: RpcState) -> Router {
    Router::new()
        .route(RPC_PATH, post(handle_rpc))
        .with_state(Arc::new(state))
}

async fn handle_rpc(
    State(state): State<Arc<RpcState>>,
    request: Result<Json<RpcRequest>, JsonRejection>,
) -> (StatusCode, Json<RpcResponse>) {
    match request {
        Ok(Json(request)) => (StatusCode::OK, Json(dispatch(&state, request).await)),
        Err(rejection) => {
            debug!(error = %rejection, "rejected rpc request");
            counter!(m::RPC_REQUESTS_TOTAL, m::LABEL_METHOD => "invalid").increment(1);
            (
                StatusCode::BAD_REQUEST,
                Json(RpcResponse::error(format!("invalid request: {rejection}"))),
            )
        }
    }
}

/// 요청 하나를 처리합니다.
pub async fn dispatch(state: &RpcState, request: RpcRequest) -> RpcResponse {
    counter!(m::RPC_REQUESTS_TOTAL, m::LABEL_METHOD => request.method_name()).increment(1);
    let handle = &state.handle;

    match request {
        RpcRequest::Ping => RpcResponse::ok("pong"),
        RpcRequest::GetEventCount => RpcResponse::ok(handle.event_count().await),
        RpcRequest::GetHostMessages => RpcResponse::ok(handle.host_messages().await),
        RpcRequest::GetHostInfo => RpcResponse::ok(handle.host_info().await),
        RpcRequest::GetEventHistory { limit } => RpcResponse::ok(handle.event_history(limit).await),
        RpcRequest::Subscribe { host, port } => {
            if host.is_empty() || port == 0 {
                return RpcResponse::error("invalid params: host must be non-empty and port non-zero");
            }
            let key = SubscriberKey::new(host, port);
            let delivery = HttpDelivery::new(state.push_client.clone(), &key);
            handle.subscribe(key, Arc::new(delivery)).await;
            RpcResponse::ok(true)
        }
        RpcRequest::Unsubscribe { host, port } => {
            RpcResponse::ok(handle.unsubscribe(&SubscriberKey::new(host, port)).await)
        }
    }
}

/// 서버 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerState {
    Initialized,
    Running,
    Stopped,
}

/// RPC 서버
pub struct RpcServer {
    settings: RpcSettings,
    state: RpcState,
    server_state: ServerState,
    cancel: CancellationToken,
    fatal: CancellationToken,
    /// 서버 태스크가 실패했는지 여부
    failed: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl RpcServer {
    /// 새 서버를 생성합니다. 바인드는 [`start`](Pipeline::start)에서 합니다.
    pub fn new(settings: RpcSettings, handle: WatcherHandle) -> Result<Self, RpcError> {
        settings.validate()?;
        let state = RpcState::new(handle, &settings)?;
        Ok(Self {
            settings,
            state,
            server_state: ServerState::Initialized,
            cancel: CancellationToken::new(),
            fatal: CancellationToken::new(),
            failed: Arc::new(AtomicBool::new(false)),
            task: None,
            local_addr: None,
        })
    }

    /// 서버 태스크가 예기치 않게 종료되면 취소할 토큰을 지정합니다.
    pub fn with_fatal_token(mut self, token: CancellationToken) -> Self {
        self.fatal = token;
        self
    }

    /// 실제 바인드된 주소 (시작 전에는 `None`)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.server_state {
            ServerState::Initialized => "initialized",
            ServerState::Running => "running",
            ServerState::Stopped => "stopped",
        }
    }
}

impl Pipeline for RpcServer {
    async fn start(&mut self) -> Result<(), AuthWatchError> {
        if self.server_state == ServerState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let bind_addr = self.settings.bind_addr();
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| RpcError::Bind {
                addr: bind_addr.clone(),
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;

        self.cancel = CancellationToken::new();
        let shutdown = self.cancel.clone();
        let cancel = self.cancel.clone();
        let fatal = self.fatal.clone();
        let failed = Arc::clone(&self.failed);
        let app = router(self.state.clone());

        self.task = Some(tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await;
            if cancel.is_cancelled() {
                return;
            }
            match served {
                Ok(()) => error!("rpc server exited unexpectedly"),
                Err(e) => error!(error = %e, "rpc server failed"),
            }
            failed.store(true, Ordering::SeqCst);
            fatal.cancel();
        }));

        self.local_addr = Some(local_addr);
        self.server_state = ServerState::Running;
        info!(addr = %local_addr, "rpc server listening");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AuthWatchError> {
        if self.server_state != ServerState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping rpc server");
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "rpc server task join failed");
            }
        }

        self.server_state = ServerState::Stopped;
        info!("rpc server stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.server_state {
            ServerState::Running if self.failed.load(Ordering::SeqCst) => {
                HealthStatus::Unhealthy("server task failed".to_owned())
            }
            ServerState::Running => HealthStatus::Healthy,
            ServerState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServerState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}
