//! 감시 스케줄러
//!
//! [`Watcher`]는 백그라운드 워커 하나로 폴링 루프를 실행합니다.
//! 한 사이클은 탐색 -> 읽기 -> 분류 -> 집계 -> 알림 순서로 진행되며,
//! 사이클이 끝나면 폴링 주기만큼 쉬거나 nudge로 일찍 깨어납니다.
//!
//! # 실행 상태
//! ```text
//! Running --pause(스캔 중)--> PendingPause --사이클 종료--> Stopped
//! Running --pause(유휴)-----> Stopped
//! Stopped --resume----------> Running
//! ```
//! `Stopped` 상태에서는 파일 I/O를 하지 않습니다.
//!
//! # 잠금 규칙
//! 파일 맵과 설정은 `std::sync::RwLock`으로 보호되며 `.await`를 넘어 잠금을 유지하지 않습니다.
//! 사이클은 잠금 아래에서 상태를 복사하고, 잠금 없이 I/O를 수행한 뒤, 짧은 잠금으로 결과를 반영합니다.

mod restart;
mod scan;

pub use restart::ApplyStatus;
pub use scan::ScanReport;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use tokio::sync::{Notify, broadcast, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use logwatch_core::pipeline::MatchHandler;

use crate::aggregator::Aggregator;
use crate::classify::{Classifier, FileFilter};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::handler::AggregatingHandler;
use crate::normalize::Normalizer;
use crate::notify::{AlertMessage, MailEntry, NotificationEngine};
use crate::tail::{FileRecord, TailState};

/// 알림 브로드캐스트 채널 용량
const MAIL_CHANNEL_CAPACITY: usize = 64;

/// 스케줄러 실행 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// 사이클 실행 중
    Running,
    /// 현재 사이클을 마치고 멈출 예정
    PendingPause,
    /// 유휴 (파일 I/O 없음)
    Stopped,
}

impl RunState {
    /// 로그/상태 표시용 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::PendingPause => "pending_pause",
            Self::Stopped => "stopped",
        }
    }
}

/// 현재 적용 중인 설정과 컴파일된 패턴
#[derive(Debug)]
pub(crate) struct Active {
    pub(crate) config: EngineConfig,
    pub(crate) filter: FileFilter,
    pub(crate) classifier: Classifier,
}

impl Active {
    fn compile(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            filter: config.file_filter()?,
            classifier: config.classifier()?,
            config,
        })
    }
}

struct Worker {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub(crate) struct Shared {
    pub(crate) active: RwLock<Arc<Active>>,
    pub(crate) files: RwLock<HashMap<PathBuf, FileRecord>>,
    pub(crate) aggregator: Arc<Aggregator>,
    pub(crate) handler: Arc<dyn MatchHandler>,
    pub(crate) normalizer: Normalizer,
    pub(crate) notifier: Mutex<NotificationEngine>,
    run_state: Mutex<RunState>,
    pub(crate) scanning: AtomicBool,
    nudge: Notify,
    worker: Mutex<Option<Worker>>,
    pub(crate) caught_up: watch::Sender<bool>,
    pub(crate) mail: broadcast::Sender<MailEntry>,
    pub(crate) restart_in_flight: AtomicBool,
    pub(crate) apply: watch::Sender<ApplyStatus>,
}

impl Shared {
    pub(crate) fn active(&self) -> Arc<Active> {
        Arc::clone(&self.active.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// 새 설정을 설치하고 비구조적 필드를 즉시 반영합니다.
    pub(crate) fn install(&self, active: Active) {
        self.aggregator.set_capacity(active.config.cache_capacity);
        self.notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_settings(active.config.notification.clone());
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(active);
    }

    pub(crate) fn run_state(&self) -> RunState {
        *self.run_state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish_pending_pause(&self) {
        let mut state = self.run_state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == RunState::PendingPause {
            *state = RunState::Stopped;
            tracing::info!("watcher paused");
        }
    }

    pub(crate) fn clear_files(&self) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// 로그 감시 스케줄러
///
/// 복제 비용이 낮은 핸들이며, 모든 복제본이 같은 워커와 상태를 공유합니다.
///
/// # 사용 예시
/// ```ignore
/// use logwatch_engine::{EngineConfig, Watcher};
///
/// let watcher = Watcher::new(EngineConfig::default())?;
/// watcher.start()?;
/// let snapshot = watcher.aggregator().snapshot();
/// watcher.stop().await?;
/// ```
#[derive(Clone)]
pub struct Watcher {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Watcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watcher")
            .field("state", &self.state_name())
            .field("running", &self.is_running())
            .field("files", &self.file_count())
            .finish()
    }
}

impl Watcher {
    /// 기본 집계기와 핸들러로 스케줄러를 생성합니다.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        WatcherBuilder::new().config(config).build()
    }

    /// 공유 집계기
    pub fn aggregator(&self) -> Arc<Aggregator> {
        Arc::clone(&self.shared.aggregator)
    }

    /// 현재 적용 중인 설정의 복사본
    pub fn config(&self) -> EngineConfig {
        self.shared.active().config.clone()
    }

    // --- 생명주기 ---

    /// 백그라운드 워커를 시작합니다.
    ///
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn start(&self) -> Result<(), EngineError> {
        let mut worker = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Err(EngineError::AlreadyRunning);
        }

        self.shared.caught_up.send_replace(false);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_worker(Arc::clone(&self.shared), cancel.clone()));
        *worker = Some(Worker { cancel, handle });

        tracing::info!(state = self.state_name(), "watcher started");
        Ok(())
    }

    /// 워커를 깨워 중지시키고 종료를 기다립니다.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let worker = self
            .shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return Err(EngineError::NotRunning);
        };

        worker.cancel.cancel();
        self.shared.nudge.notify_one();
        if let Err(e) = worker.handle.await {
            tracing::error!(error = %e, "watcher worker terminated abnormally");
        }

        tracing::info!("watcher stopped");
        Ok(())
    }

    /// 워커가 실행 중인지 여부
    pub fn is_running(&self) -> bool {
        self.shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// 현재 워커의 취소 토큰
    pub(crate) fn worker_cancel(&self) -> Option<CancellationToken> {
        self.shared
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|w| w.cancel.clone())
    }

    // --- 실행 상태 ---

    /// 현재 실행 상태
    pub fn run_state(&self) -> RunState {
        self.shared.run_state()
    }

    /// 현재 실행 상태 이름
    pub fn state_name(&self) -> &'static str {
        self.run_state().as_str()
    }

    /// 일시 정지를 요청합니다.
    ///
    /// 스캔 중이면 현재 사이클을 마친 뒤 멈추고, 유휴 상태면 바로 멈춥니다.
    pub fn pause(&self) {
        {
            let mut state = self
                .shared
                .run_state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *state != RunState::Running {
                return;
            }
            *state = if self.shared.scanning.load(Ordering::Acquire) {
                RunState::PendingPause
            } else {
                RunState::Stopped
            };
            tracing::info!(state = state.as_str(), "watcher pause requested");
        }
        self.nudge();
    }

    /// 일시 정지를 해제합니다.
    pub fn resume(&self) {
        {
            let mut state = self
                .shared
                .run_state
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *state == RunState::Running {
                return;
            }
            *state = RunState::Running;
            tracing::info!("watcher resumed");
        }
        self.nudge();
    }

    /// 다음 사이클을 즉시 시작하도록 워커를 깨웁니다.
    pub fn nudge(&self) {
        self.shared.nudge.notify_one();
    }

    // --- 스캔 ---

    /// 워커 없이 한 사이클을 직접 실행합니다.
    ///
    /// 워커가 실행 중이면 사이클이 겹치지 않도록 `AlreadyRunning`을 반환합니다.
    /// 사이클 중에 요청된 일시 정지는 사이클이 끝나면 확정됩니다.
    pub async fn scan_once(&self) -> Result<ScanReport, EngineError> {
        if self.is_running() {
            return Err(EngineError::AlreadyRunning);
        }
        let report = scan::scan_cycle(&self.shared, &CancellationToken::new()).await;
        self.shared.finish_pending_pause();
        report
    }

    /// 추적 중인 모든 파일 상태를 버립니다.
    pub fn clear_files(&self) {
        self.shared.clear_files();
    }

    /// 추적 중인 파일 수
    pub fn file_count(&self) -> usize {
        self.shared
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// 파일의 소비 상태
    pub fn tail_state(&self, path: &Path) -> Option<TailState> {
        self.shared
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .map(|r| r.state)
    }

    /// 추적 중인 파일 목록 (경로순)
    pub fn tracked_files(&self) -> Vec<FileRecord> {
        let mut files: Vec<FileRecord> = self
            .shared
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// 마지막 완료된 사이클에서 모든 파일을 끝까지 읽었는지 여부
    pub fn caught_up(&self) -> bool {
        *self.shared.caught_up.borrow()
    }

    /// 따라잡음 상태 구독
    pub fn subscribe_caught_up(&self) -> watch::Receiver<bool> {
        self.shared.caught_up.subscribe()
    }

    // --- 알림 ---

    /// 메일박스 복사본 (오래된 순)
    pub fn mailbox_snapshot(&self) -> Vec<MailEntry> {
        self.shared
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .mailbox_snapshot()
    }

    /// 표시용 메시지를 순서대로 모두 꺼냅니다. 각 메시지는 한 번만 전달됩니다.
    pub fn drain_messages(&self) -> Vec<AlertMessage> {
        self.shared
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain_messages()
    }

    /// 새 메일박스 항목 구독
    pub fn subscribe_mail(&self) -> broadcast::Receiver<MailEntry> {
        self.shared.mail.subscribe()
    }
}

/// 스케줄러 빌더
pub struct WatcherBuilder {
    config: EngineConfig,
    aggregator: Option<Arc<Aggregator>>,
    handler: Option<Arc<dyn MatchHandler>>,
}

impl Default for WatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WatcherBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            aggregator: None,
            handler: None,
        }
    }

    /// 엔진 설정을 지정합니다.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// 외부에서 만든 집계기를 공유합니다.
    pub fn aggregator(mut self, aggregator: Arc<Aggregator>) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    /// 수집 콜백을 교체합니다. 지정하지 않으면 [`AggregatingHandler`]를 사용합니다.
    pub fn handler(mut self, handler: Arc<dyn MatchHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    /// 설정을 검증하고 스케줄러를 생성합니다.
    pub fn build(self) -> Result<Watcher, EngineError> {
        let active = Active::compile(self.config)?;
        let config = &active.config;

        let aggregator = self
            .aggregator
            .unwrap_or_else(|| Arc::new(Aggregator::new(config.cache_capacity)));
        aggregator.set_capacity(config.cache_capacity);
        let handler = self
            .handler
            .unwrap_or_else(|| Arc::new(AggregatingHandler::new(Arc::clone(&aggregator))));

        let initial_state = if config.start_paused {
            RunState::PendingPause
        } else {
            RunState::Running
        };
        let notifier = NotificationEngine::new(config.notification.clone());
        let (mail, _) = broadcast::channel(MAIL_CHANNEL_CAPACITY);

        let shared = Shared {
            active: RwLock::new(Arc::new(active)),
            files: RwLock::new(HashMap::new()),
            aggregator,
            handler,
            normalizer: Normalizer::new()?,
            notifier: Mutex::new(notifier),
            run_state: Mutex::new(initial_state),
            scanning: AtomicBool::new(false),
            nudge: Notify::new(),
            worker: Mutex::new(None),
            caught_up: watch::Sender::new(false),
            mail,
            restart_in_flight: AtomicBool::new(false),
            apply: watch::Sender::new(ApplyStatus::Idle),
        };

        Ok(Watcher {
            shared: Arc::new(shared),
        })
    }
}

/// 폴링 루프
///
/// 사이클은 별도 태스크에서 실행되어, 실패나 패닉이 로그로만 남고 루프는 계속됩니다.
async fn run_worker(shared: Arc<Shared>, cancel: CancellationToken) {
    tracing::debug!("watcher worker loop entered");

    loop {
        if cancel.is_cancelled() {
            break;
        }

        if shared.run_state() != RunState::Stopped {
            let cycle = {
                let shared = Arc::clone(&shared);
                let cancel = cancel.clone();
                tokio::spawn(async move { scan::scan_cycle(&shared, &cancel).await })
            };
            match cycle.await {
                Ok(Ok(report)) => {
                    tracing::trace!(
                        files = report.files_tracked,
                        lines = report.lines,
                        bytes = report.bytes_read,
                        "scan cycle completed"
                    );
                }
                Ok(Err(e)) => tracing::error!(error = %e, "scan cycle failed"),
                Err(e) => tracing::error!(error = %e, "scan cycle panicked"),
            }
            shared.finish_pending_pause();
        }

        let interval = shared.active().config.poll_interval;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = shared.nudge.notified() => {}
            _ = tokio::time::sleep(interval) => {}
        }
    }

    tracing::debug!("watcher worker loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn watcher_for(dir: &Path, paused: bool) -> Watcher {
        let config = crate::config::EngineConfigBuilder::new()
            .roots(vec![dir.to_path_buf()])
            .poll_interval(Duration::from_millis(100))
            .start_paused(paused)
            .build()
            .unwrap();
        Watcher::new(config).unwrap()
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = EngineConfig {
            rules: Vec::new(),
            ..EngineConfig::default()
        };
        assert!(Watcher::new(config).is_err());
    }

    #[test]
    fn initial_state_follows_pause_setting() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(watcher_for(dir.path(), false).run_state(), RunState::Running);
        assert_eq!(
            watcher_for(dir.path(), true).run_state(),
            RunState::PendingPause
        );
    }

    #[test]
    fn pause_and_resume_when_idle() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = watcher_for(dir.path(), false);
        watcher.pause();
        assert_eq!(watcher.run_state(), RunState::Stopped);
        assert_eq!(watcher.state_name(), "stopped");
        watcher.resume();
        assert_eq!(watcher.run_state(), RunState::Running);
    }

    #[test]
    fn pause_while_scanning_is_pending() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = watcher_for(dir.path(), false);
        watcher.shared.scanning.store(true, Ordering::Release);
        watcher.pause();
        assert_eq!(watcher.run_state(), RunState::PendingPause);

        watcher.shared.finish_pending_pause();
        assert_eq!(watcher.run_state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn start_twice_fails_and_stop_requires_running() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = watcher_for(dir.path(), false);
        assert!(matches!(watcher.stop().await, Err(EngineError::NotRunning)));

        watcher.start().unwrap();
        assert!(watcher.is_running());
        assert!(matches!(watcher.start(), Err(EngineError::AlreadyRunning)));
        assert!(matches!(
            watcher.scan_once().await,
            Err(EngineError::AlreadyRunning)
        ));

        watcher.stop().await.unwrap();
        assert!(!watcher.is_running());
    }

    #[tokio::test]
    async fn paused_start_runs_one_cycle_then_stops() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), "existing\n").unwrap();
        let watcher = watcher_for(dir.path(), true);
        let mut caught_up = watcher.subscribe_caught_up();

        watcher.start().unwrap();
        tokio::time::timeout(Duration::from_secs(5), caught_up.wait_for(|c| *c))
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while watcher.run_state() != RunState::Stopped {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(watcher.file_count(), 1);
        watcher.stop().await.unwrap();
    }

    #[tokio::test]
    async fn pause_after_scan_once_stops_immediately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), "existing\n").unwrap();
        let watcher = watcher_for(dir.path(), false);

        watcher.scan_once().await.unwrap();
        watcher.pause();
        assert_eq!(watcher.run_state(), RunState::Stopped);

        watcher.resume();
        assert_eq!(watcher.run_state(), RunState::Running);
    }

    #[tokio::test]
    async fn scan_once_settles_pending_pause() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = watcher_for(dir.path(), true);
        assert_eq!(watcher.run_state(), RunState::PendingPause);

        watcher.scan_once().await.unwrap();
        assert_eq!(watcher.run_state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn worker_survives_panicking_cycle() {
        use std::sync::atomic::AtomicUsize;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), "[error] boom\n").unwrap();

        // 첫 호출에서만 패닉합니다.
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let config = crate::config::EngineConfigBuilder::new()
            .roots(vec![dir.path().to_path_buf()])
            .poll_interval(Duration::from_millis(50))
            .replay_from_start(true)
            .build()
            .unwrap();
        let watcher = WatcherBuilder::new()
            .config(config)
            .handler(Arc::new(move |_: &logwatch_core::types::Match| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("handler failure");
                }
            }))
            .build()
            .unwrap();

        watcher.start().unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("worker should keep scanning after a panicked cycle");

        // 패닉한 사이클은 커밋하지 않았으므로 같은 라인을 다시 읽습니다.
        assert!(watcher.is_running());
        watcher.stop().await.unwrap();
        assert_eq!(watcher.tail_state(&dir.path().join("a.log")).unwrap().line_no, 1);
    }
}
