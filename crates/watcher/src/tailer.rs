//! 파일 tailer -- 로테이션을 견디는 `tail -f`
//!
//! [`FileTailer`]는 감시 대상 파일이 아니라 그 *부모 디렉토리*를 감시합니다.
//! logrotate처럼 inode를 교체하는 로테이션에서도 새 파일의 생성/이동 이벤트를 받을 수 있습니다.
//!
//! # 이벤트 처리
//! - 대상 경로의 생성 또는 대상 경로로의 이동: 로테이션. 이전 핸들의 남은 라인을 읽은 뒤
//!   새 파일을 열고 처음부터 재생합니다.
//! - 현재 열린 파일의 수정: 마지막 읽기 위치 이후의 라인만 전달합니다.
//! - 그 외 경로/종류: 무시 (debug 로그)
//!
//! 열기/읽기 실패는 로그만 남기고 감시를 계속합니다. 다음 알림에서 다시 시도합니다.
//!
//! # 상태
//! ```text
//! Idle -> start() -> Tailing
//! ```

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::mpsc as std_mpsc;
use std::time::Duration;

use metrics::counter;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use authwatch_core::metrics as m;

use crate::error::WatcherError;

/// 한 번에 읽는 최대 바이트 수
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// 읽어 들인 한 줄과 도착 순서
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLine {
    /// 도착 순서 (tailer 수명 동안 단조 증가)
    pub seq: u64,
    /// 개행 문자를 제외한 라인 내용
    pub text: String,
}

/// tailer가 읽은 라인을 받는 쪽
///
/// tailer는 이 trait에만 의존하며 파이프라인의 구체 타입을 알지 못합니다.
/// `Err`를 반환하면 tailer의 감시 루프가 종료됩니다.
pub trait LineSink: Send {
    /// 라인 하나를 받습니다.
    fn accept(&mut self, line: RawLine) -> Result<(), WatcherError>;
}

/// tokio 채널로 라인을 넘기는 싱크
///
/// 블로킹 전송을 사용하므로 `spawn_blocking` 컨텍스트에서만 사용해야 합니다.
pub struct ChannelSink {
    tx: mpsc::Sender<RawLine>,
}

impl ChannelSink {
    /// 새 채널 싱크를 생성합니다.
    pub fn new(tx: mpsc::Sender<RawLine>) -> Self {
        Self { tx }
    }
}

impl LineSink for ChannelSink {
    fn accept(&mut self, line: RawLine) -> Result<(), WatcherError> {
        self.tx
            .blocking_send(line)
            .map_err(|_| WatcherError::SinkClosed("line receiver dropped".to_owned()))
    }
}

/// tailer 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailerState {
    /// 생성됨, 감시 전
    Idle,
    /// 감시 중
    Tailing,
}

/// 파일 식별자 (device, inode)
type FileId = Option<(u64, u64)>;

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    Some((meta.dev(), meta.ino()))
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> FileId {
    None
}

/// 현재 열려 있는 파일과 읽기 위치
struct OpenFile {
    file: File,
    position: u64,
    id: FileId,
}

/// 파일 시스템 이벤트에 대한 처리 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsAction {
    Rotate,
    Append,
    Ignore,
}

/// 로테이션을 견디는 파일 tailer
pub struct FileTailer<S> {
    path: PathBuf,
    /// 감시 디렉토리 (설정 경로 기준)
    dir: PathBuf,
    /// 감시 디렉토리의 정규화 경로 (심볼릭 링크 해석)
    canonical_dir: Option<PathBuf>,
    replay_on_start: bool,
    poll_interval: Duration,
    sink: S,
    state: TailerState,
    current: Option<OpenFile>,
    /// 아직 개행이 오지 않은 마지막 부분 라인
    pending: Vec<u8>,
    next_seq: u64,
    watcher: Option<RecommendedWatcher>,
    events: Option<std_mpsc::Receiver<notify::Result<Event>>>,
}

impl<S: LineSink> FileTailer<S> {
    /// 새 tailer를 생성합니다. 감시는 [`start`](Self::start)에서 시작합니다.
    pub fn new(path: impl Into<PathBuf>, sink: S) -> Self {
        let path = path.into();
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            path,
            dir,
            canonical_dir: None,
            replay_on_start: false,
            poll_interval: Duration::from_millis(200),
            sink,
            state: TailerState::Idle,
            current: None,
            pending: Vec::new(),
            next_seq: 0,
            watcher: None,
            events: None,
        }
    }

    /// 시작 시 기존 내용을 재생할지 지정합니다.
    pub fn replay_on_start(mut self, replay: bool) -> Self {
        self.replay_on_start = replay;
        self
    }

    /// 이벤트 대기 주기를 지정합니다. 이 간격마다 취소 여부를 확인합니다.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// 현재 상태를 반환합니다.
    pub fn state(&self) -> TailerState {
        self.state
    }

    /// 현재 파일의 읽기 위치를 반환합니다. 파일이 열려 있지 않으면 `None`입니다.
    pub fn position(&self) -> Option<u64> {
        self.current.as_ref().map(|c| c.position)
    }

    /// 라인 싱크에 대한 참조를 반환합니다.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// 부모 디렉토리 감시를 등록하고 파일을 엽니다.
    ///
    /// 파일이 아직 없으면 경고만 남기고 생성 이벤트를 기다립니다.
    /// 디렉토리 감시 등록 실패는 에러로 반환합니다.
    pub fn start(&mut self) -> Result<(), WatcherError> {
        if self.state == TailerState::Tailing {
            return Ok(());
        }

        let (tx, rx) = std_mpsc::channel();
        let mut watcher = notify::recommended_watcher(tx).map_err(|e| WatcherError::Watch {
            path: self.dir.display().to_string(),
            reason: e.to_string(),
        })?;
        watcher
            .watch(&self.dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatcherError::Watch {
                path: self.dir.display().to_string(),
                reason: e.to_string(),
            })?;
        self.watcher = Some(watcher);
        self.events = Some(rx);
        self.canonical_dir = std::fs::canonicalize(&self.dir).ok();

        match open_file(&self.path) {
            Ok((file, meta)) => {
                let position = if self.replay_on_start { 0 } else { meta.len() };
                self.current = Some(OpenFile {
                    file,
                    position,
                    id: file_id(&meta),
                });
            }
            Err(e) => {
                counter!(m::WATCHER_IO_ERRORS_TOTAL).increment(1);
                warn!(path = %self.path.display(), error = %e, "log file not available yet, waiting for it to appear");
            }
        }

        self.state = TailerState::Tailing;
        info!(
            path = %self.path.display(),
            dir = %self.dir.display(),
            replay = self.replay_on_start,
            "tailing started"
        );

        if self.replay_on_start && self.current.is_some() {
            self.read_appended()?;
        }
        Ok(())
    }

    /// 취소될 때까지 파일 시스템 이벤트를 처리합니다.
    ///
    /// 블로킹 루프이므로 `spawn_blocking` 안에서 호출합니다.
    /// 싱크가 닫히거나 감시 채널이 끊기면 에러로 종료합니다.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<(), WatcherError> {
        let Some(events) = self.events.take() else {
            return Err(WatcherError::Watch {
                path: self.dir.display().to_string(),
                reason: "tailer not started".to_owned(),
            });
        };

        let result = loop {
            if cancel.is_cancelled() {
                break Ok(());
            }
            match events.recv_timeout(self.poll_interval) {
                Ok(Ok(event)) => {
                    if let Err(e) = self.handle_event(&event) {
                        break Err(e);
                    }
                }
                Ok(Err(e)) => warn!(error = %e, "file watch error"),
                Err(std_mpsc::RecvTimeoutError::Timeout) => {}
                Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                    break Err(WatcherError::Watch {
                        path: self.dir.display().to_string(),
                        reason: "watch channel disconnected".to_owned(),
                    });
                }
            }
        };

        self.events = Some(events);
        info!(path = %self.path.display(), "tailing stopped");
        result
    }

    /// 파일 시스템 이벤트 하나를 처리합니다.
    pub fn handle_event(&mut self, event: &Event) -> Result<(), WatcherError> {
        match self.classify(event) {
            FsAction::Rotate => self.reopen(),
            FsAction::Append => self.read_appended(),
            FsAction::Ignore => {
                debug!(kind = ?event.kind, paths = ?event.paths, "ignoring unrelated fs event");
                Ok(())
            }
        }
    }

    fn classify(&self, event: &Event) -> FsAction {
        let first = event.paths.first();
        match event.kind {
            EventKind::Create(_) if self.is_target(first) => FsAction::Rotate,
            // kqueue/FSEvents 백엔드는 이름 변경을 방향 없이 `Any`로 알린다
            EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any))
                if self.is_target(first) =>
            {
                FsAction::Rotate
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both))
                if self.is_target(event.paths.get(1)) =>
            {
                FsAction::Rotate
            }
            EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) if self.is_target(first) => {
                FsAction::Append
            }
            _ => FsAction::Ignore,
        }
    }

    fn is_target(&self, path: Option<&PathBuf>) -> bool {
        let Some(path) = path else {
            return false;
        };
        if *path == self.path {
            return true;
        }
        if path.file_name() != self.path.file_name() {
            return false;
        }
        match (path.parent(), &self.canonical_dir) {
            (Some(parent), Some(canonical)) => parent == canonical.as_path() || parent == self.dir,
            (Some(parent), None) => parent == self.dir,
            (None, _) => false,
        }
    }

    /// 대상 경로의 파일을 다시 엽니다.
    ///
    /// 같은 파일(동일 inode)에 대한 중복 알림이면 추가분만 읽습니다.
    fn reopen(&mut self) -> Result<(), WatcherError> {
        let (file, meta) = match open_file(&self.path) {
            Ok(opened) => opened,
            Err(e) => {
                counter!(m::WATCHER_IO_ERRORS_TOTAL).increment(1);
                warn!(path = %self.path.display(), error = %e, "failed to open log file");
                return Ok(());
            }
        };
        let id = file_id(&meta);

        if let Some(current) = &self.current {
            if current.id.is_some() && current.id == id {
                return self.read_appended();
            }
            // 이전 핸들에 남은 라인을 먼저 읽는다
            self.read_appended()?;
            self.flush_pending()?;
            counter!(m::WATCHER_ROTATIONS_TOTAL).increment(1);
            info!(path = %self.path.display(), "log rotation detected, reopening");
        } else {
            info!(path = %self.path.display(), "log file opened");
        }

        self.current = Some(OpenFile {
            file,
            position: 0,
            id,
        });
        self.read_appended()
    }

    /// 마지막 읽기 위치 이후에 추가된 라인을 읽어 전달합니다.
    fn read_appended(&mut self) -> Result<(), WatcherError> {
        let Some(current) = self.current.as_mut() else {
            return self.reopen();
        };

        let len = match current.file.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                counter!(m::WATCHER_IO_ERRORS_TOTAL).increment(1);
                error!(path = %self.path.display(), error = %e, "failed to stat log file");
                return Ok(());
            }
        };

        if len < current.position {
            info!(
                path = %self.path.display(),
                position = current.position,
                len,
                "log file truncated, reading from start"
            );
            current.position = 0;
            self.pending.clear();
        }
        if len == current.position {
            return Ok(());
        }

        let start = current.position;
        if let Err(e) = current.file.seek(SeekFrom::Start(start)) {
            counter!(m::WATCHER_IO_ERRORS_TOTAL).increment(1);
            error!(path = %self.path.display(), error = %e, "failed to seek log file");
            return Ok(());
        }

        // 큰 파일을 재생할 때도 메모리 사용이 청크 크기로 제한되도록 나눠 읽는다
        let mut remaining = len - start;
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        while remaining > 0 {
            let Some(current) = self.current.as_mut() else {
                break;
            };
            let want = remaining.min(READ_CHUNK_SIZE as u64) as usize;
            let n = match current.file.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    counter!(m::WATCHER_IO_ERRORS_TOTAL).increment(1);
                    error!(path = %self.path.display(), error = %e, "failed to read log file");
                    return Ok(());
                }
            };
            current.position += n as u64;
            remaining -= n as u64;
            self.dispatch_bytes(&chunk[..n])?;
        }
        Ok(())
    }

    /// 읽은 바이트를 완성된 라인 단위로 싱크에 전달합니다.
    ///
    /// 개행으로 끝나지 않은 마지막 조각은 다음 읽기까지 보관합니다.
    fn dispatch_bytes(&mut self, bytes: &[u8]) -> Result<(), WatcherError> {
        self.pending.extend_from_slice(bytes);
        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Ok(());
        };
        let complete: Vec<u8> = self.pending.drain(..=last_newline).collect();
        for raw in complete[..complete.len() - 1].split(|b| *b == b'\n') {
            self.emit(raw)?;
        }
        Ok(())
    }

    /// 보관 중인 부분 라인을 완성된 라인으로 전달합니다.
    fn flush_pending(&mut self) -> Result<(), WatcherError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let rest = std::mem::take(&mut self.pending);
        self.emit(&rest)
    }

    fn emit(&mut self, raw: &[u8]) -> Result<(), WatcherError> {
        let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
        if raw.is_empty() {
            return Ok(());
        }
        let line = RawLine {
            seq: self.next_seq,
            text: String::from_utf8_lossy(raw).into_owned(),
        };
        self.next_seq += 1;
        counter!(m::WATCHER_LINES_READ_TOTAL).increment(1);
        self.sink.accept(line)
    }
}

fn open_file(path: &Path) -> std::io::Result<(File, std::fs::Metadata)> {
    let file = File::open(path)?;
    let meta = file.metadata()?;
    Ok((file, meta))
}
