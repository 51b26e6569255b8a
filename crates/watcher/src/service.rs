//! auth.log 감시 서비스 -- tailer와 이벤트 파이프라인의 생명주기 관리
//!
//! [`AuthWatcher`]는 core의 [`Pipeline`] trait을 구현하여 데몬에서
//! RPC 서버와 동일한 생명주기로 관리됩니다.
//!
//! # 내부 아키텍처
//! ```text
//! FileTailer (spawn_blocking) -> mpsc<RawLine> -> EventPipeline task -> SubscriberRegistry
//! ```
//!
//! 백그라운드 태스크가 취소 없이 종료되거나 패닉하면 fatal 토큰을 취소합니다.
//! 데몬은 이 토큰을 감시하여 프로세스 전체를 정리합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use authwatch_core::error::{AuthWatchError, PipelineError};
use authwatch_core::pipeline::{HealthStatus, Pipeline};

use crate::cache::HostInfoCache;
use crate::config::WatcherSettings;
use crate::enrich::{HostInfoLookup, IpInfoClient};
use crate::error::WatcherError;
use crate::parser::AddressFilter;
use crate::pipeline::{EventPipeline, WatcherHandle, WatcherState};
use crate::registry::SubscriberRegistry;
use crate::tailer::{ChannelSink, FileTailer, RawLine};

/// 서비스 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    Initialized,
    Running,
    Stopped,
}

/// auth.log 감시 서비스
///
/// # 사용 예시
/// ```ignore
/// use authwatch_watcher::AuthWatcherBuilder;
///
/// let mut watcher = AuthWatcherBuilder::new()
///     .settings(settings)
///     .fatal_token(fatal.clone())
///     .build()
///     .await?;
/// let handle = watcher.handle(); // RPC 서버에 전달
/// watcher.start().await?;
/// ```
pub struct AuthWatcher<L = IpInfoClient> {
    settings: WatcherSettings,
    state: ServiceState,
    pipeline: Arc<EventPipeline<L>>,
    /// 정상 종료용 토큰 (start마다 새로 생성)
    cancel: CancellationToken,
    /// 백그라운드 태스크 실패 알림 토큰
    fatal: CancellationToken,
    /// 이 서비스의 태스크가 실패했는지 여부
    failed: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl<L: HostInfoLookup> AuthWatcher<L> {
    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }

    /// 파이프라인 상태 조회 핸들을 반환합니다.
    pub fn handle(&self) -> WatcherHandle {
        self.pipeline.handle()
    }

    /// fatal 토큰을 반환합니다.
    pub fn fatal_token(&self) -> CancellationToken {
        self.fatal.clone()
    }

    /// 서비스 설정을 반환합니다.
    pub fn settings(&self) -> &WatcherSettings {
        &self.settings
    }

    fn failure(&self) -> FailureSignal {
        FailureSignal {
            failed: Arc::clone(&self.failed),
            fatal: self.fatal.clone(),
        }
    }

    async fn spawn_tasks(&mut self) -> Result<(), WatcherError> {
        let (tx, rx) = mpsc::channel(self.settings.line_channel_capacity);

        // 재생 라인이 채널 용량을 넘을 수 있으므로 소비자를 먼저 띄운다
        let pipeline_task = tokio::spawn(process_lines(
            Arc::clone(&self.pipeline),
            rx,
            self.cancel.clone(),
        ));
        self.tasks.push(tokio::spawn(supervise(
            "event-pipeline",
            pipeline_task,
            self.cancel.clone(),
            self.failure(),
        )));

        // 시작 실패 시 취소가 채널 종료보다 먼저 관측되도록 송신측을 잡아 둔다
        let sender_guard = tx.clone();
        let mut tailer = FileTailer::new(&self.settings.watch_path, ChannelSink::new(tx))
            .replay_on_start(self.settings.replay_on_start)
            .poll_interval(self.settings.poll_interval);
        let started = tokio::task::spawn_blocking(move || tailer.start().map(|()| tailer))
            .await
            .map_err(|e| WatcherError::Task(e.to_string()))
            .and_then(|result| result);
        if started.is_err() {
            self.cancel.cancel();
        }
        drop(sender_guard);
        let tailer = started?;

        let cancel = self.cancel.clone();
        let tailer_task = tokio::task::spawn_blocking(move || {
            let mut tailer = tailer;
            tailer.run(&cancel)
        });
        self.tasks.push(tokio::spawn(supervise(
            "file-tailer",
            tailer_task,
            self.cancel.clone(),
            self.failure(),
        )));
        Ok(())
    }

    async fn join_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                warn!(error = %e, "supervisor task join failed");
            }
        }
    }
}

impl<L: HostInfoLookup> Pipeline for AuthWatcher<L> {
    async fn start(&mut self) -> Result<(), AuthWatchError> {
        if self.state == ServiceState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        info!(path = %self.settings.watch_path.display(), "starting auth watcher");
        self.cancel = CancellationToken::new();

        if let Err(e) = self.spawn_tasks().await {
            self.cancel.cancel();
            self.join_tasks().await;
            return Err(e.into());
        }

        self.state = ServiceState::Running;
        info!("auth watcher started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), AuthWatchError> {
        if self.state != ServiceState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping auth watcher");
        self.cancel.cancel();
        self.join_tasks().await;

        if let Err(e) = self.pipeline.save_cache(&self.settings.cache_path).await {
            error!(error = %e, "failed to save host info cache");
        } else {
            info!(path = %self.settings.cache_path.display(), "host info cache saved");
        }

        self.state = ServiceState::Stopped;
        info!("auth watcher stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running if self.failed.load(Ordering::SeqCst) => {
                HealthStatus::Unhealthy("background task failed".to_owned())
            }
            ServiceState::Running => HealthStatus::Healthy,
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 라인 채널을 소비하여 파이프라인에 전달합니다.
async fn process_lines<L: HostInfoLookup>(
    pipeline: Arc<EventPipeline<L>>,
    mut rx: mpsc::Receiver<RawLine>,
    cancel: CancellationToken,
) -> Result<(), WatcherError> {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            line = rx.recv() => match line {
                Some(line) => {
                    pipeline.process(&line).await;
                }
                None => return Err(WatcherError::SinkClosed("line sender dropped".to_owned())),
            },
        }
    }
}

/// 태스크 실패 신호
#[derive(Clone)]
struct FailureSignal {
    failed: Arc<AtomicBool>,
    fatal: CancellationToken,
}

impl FailureSignal {
    fn trip(&self) {
        self.failed.store(true, Ordering::SeqCst);
        self.fatal.cancel();
    }
}

/// 백그라운드 태스크의 종료를 감시합니다.
///
/// 취소되지 않은 상태에서 종료하거나 실패 또는 패닉하면 fatal 토큰을 취소합니다.
async fn supervise(
    name: &'static str,
    task: JoinHandle<Result<(), WatcherError>>,
    cancel: CancellationToken,
    failure: FailureSignal,
) {
    let outcome = task.await;
    if cancel.is_cancelled() {
        if let Ok(Err(e)) = &outcome {
            warn!(task = name, error = %e, "task ended with error during shutdown");
        }
        return;
    }
    match outcome {
        Ok(Ok(())) => error!(task = name, "task exited unexpectedly"),
        Ok(Err(e)) => error!(task = name, error = %e, "task failed"),
        Err(e) => error!(task = name, error = %e, "task panicked"),
    }
    failure.trip();
}

/// 감시 서비스 빌더
pub struct AuthWatcherBuilder {
    settings: WatcherSettings,
    registry: Option<Arc<SubscriberRegistry>>,
    fatal: Option<CancellationToken>,
}

impl AuthWatcherBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            settings: WatcherSettings::default(),
            registry: None,
            fatal: None,
        }
    }

    /// 서비스 설정을 지정합니다.
    pub fn settings(mut self, settings: WatcherSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 구독자 레지스트리를 지정합니다. 지정하지 않으면 새로 생성합니다.
    pub fn registry(mut self, registry: Arc<SubscriberRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// 백그라운드 태스크 실패 시 취소할 토큰을 지정합니다.
    pub fn fatal_token(mut self, token: CancellationToken) -> Self {
        self.fatal = Some(token);
        self
    }

    /// 설정된 조회 URL로 HTTP 조회기를 만들어 서비스를 빌드합니다.
    pub async fn build(self) -> Result<AuthWatcher<IpInfoClient>, WatcherError> {
        let lookup = IpInfoClient::new(&self.settings.lookup_url, self.settings.lookup_timeout)?;
        self.build_with_lookup(lookup).await
    }

    /// 지정한 조회기로 서비스를 빌드합니다.
    ///
    /// 호스트 정보 캐시는 이 시점에 한 번 로드합니다.
    pub async fn build_with_lookup<L: HostInfoLookup>(
        self,
        lookup: L,
    ) -> Result<AuthWatcher<L>, WatcherError> {
        self.settings.validate()?;
        let filter = AddressFilter::from_patterns(&self.settings.private_filters)?;
        let cache = HostInfoCache::load(&self.settings.cache_path).await;
        let state = WatcherState::new(cache, self.settings.history_len);
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(SubscriberRegistry::new()));
        let pipeline = EventPipeline::new(filter, lookup, state, registry)?;

        Ok(AuthWatcher {
            settings: self.settings,
            state: ServiceState::Initialized,
            pipeline: Arc::new(pipeline),
            cancel: CancellationToken::new(),
            fatal: self.fatal.unwrap_or_default(),
            failed: Arc::new(AtomicBool::new(false)),
            tasks: Vec::new(),
        })
    }
}

impl Default for AuthWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
