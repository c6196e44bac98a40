//! 실행 중 설정 변경 (재시작 프로토콜)
//!
//! 구조적 변경은 별도 태스크에서 다음 순서로 처리합니다.
//!
//! 1. 진행 중인 재시작이 있으면 요청을 버립니다 (원자적 compare-exchange).
//! 2. 워커를 깨우고 종료를 기다립니다.
//! 3. 변경 종류에 따라 파일 상태와 통계를 재구성합니다.
//!    - 재생 모드 켜짐: `backup_and_clear` 후 파일 상태 초기화
//!    - 재생 모드 꺼짐: 파일 상태 초기화 후 `restore_and_clear`,
//!      다시 따라잡으면 `invalidate_backup`
//!    - 감시 대상 변경: 파일 상태와 통계 모두 초기화
//! 4. 새 설정을 설치하고 워커를 다시 시작합니다.
//!
//! 상태 변경은 워커가 완전히 멈춘 뒤에만 일어나므로 이전 설정과 새 설정이
//! 섞여 적용되는 일은 없습니다. 완료 여부는 [`ApplyStatus`] 채널로 알립니다.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use tokio::sync::watch;

use logwatch_core::metrics as m;

use super::{Active, Watcher};
use crate::config::{EngineConfig, RestartKind};
use crate::error::EngineError;

/// 설정 적용 상태
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyStatus {
    /// 적용 요청 없음
    Idle,
    /// 재시작 진행 중
    Pending(RestartKind),
    /// 적용 완료
    Done(RestartKind),
    /// 재시작 실패 (이전 설정 유지)
    Failed(String),
}

impl ApplyStatus {
    /// 적용이 끝났는지 여부 (성공/실패 무관)
    pub fn is_settled(&self) -> bool {
        !matches!(self, Self::Pending(_))
    }
}

impl Watcher {
    /// 새 설정을 적용합니다.
    ///
    /// 비구조적 변경은 즉시 설치되고 다음 사이클부터 반영됩니다.
    /// 구조적 변경은 재시작 태스크를 띄우고 바로 반환하며, 완료는
    /// [`Watcher::subscribe_apply`]로 확인합니다. 다른 재시작이 진행 중이면
    /// 요청을 버리고 에러를 반환합니다.
    ///
    /// 일시 정지 설정이 바뀌면 새 설정이 설치된 뒤 실행 상태도 그에 맞춥니다.
    pub fn apply_config(&self, next: EngineConfig) -> Result<RestartKind, EngineError> {
        let active = Active::compile(next)?;
        let shared = &self.shared;

        if shared
            .restart_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!("restart already in flight, dropping config change");
            metrics::counter!(m::RESTARTS_TOTAL, m::LABEL_RESULT => "dropped").increment(1);
            return Err(EngineError::Restart("restart already in flight".to_owned()));
        }

        let current = shared.active();
        let kind = current.config.restart_kind(&active.config);
        let paused = active.config.start_paused;
        let pause_change = (current.config.start_paused != paused).then_some(paused);
        if !kind.is_required() {
            shared.install(active);
            self.follow_pause_setting(pause_change);
            shared.restart_in_flight.store(false, Ordering::Release);
            shared.apply.send_replace(ApplyStatus::Done(kind));
            self.nudge();
            tracing::info!("config applied without restart");
            return Ok(kind);
        }

        shared.apply.send_replace(ApplyStatus::Pending(kind));
        tracing::info!(kind = kind.as_str(), "config change requires restart");

        let watcher = self.clone();
        tokio::spawn(async move {
            let status = match watcher.restart(kind, active).await {
                Ok(()) => {
                    watcher.follow_pause_setting(pause_change);
                    metrics::counter!(m::RESTARTS_TOTAL, m::LABEL_RESULT => "success")
                        .increment(1);
                    tracing::info!(kind = kind.as_str(), "restart completed");
                    ApplyStatus::Done(kind)
                }
                Err(e) => {
                    metrics::counter!(m::RESTARTS_TOTAL, m::LABEL_RESULT => "failure")
                        .increment(1);
                    tracing::error!(kind = kind.as_str(), error = %e, "restart failed");
                    ApplyStatus::Failed(e.to_string())
                }
            };
            watcher
                .shared
                .restart_in_flight
                .store(false, Ordering::Release);
            watcher.shared.apply.send_replace(status);
        });

        Ok(kind)
    }

    /// 현재 설정 적용 상태
    pub fn apply_status(&self) -> ApplyStatus {
        self.shared.apply.borrow().clone()
    }

    /// 설정 적용 상태 구독
    pub fn subscribe_apply(&self) -> watch::Receiver<ApplyStatus> {
        self.shared.apply.subscribe()
    }

    /// 재시작이 진행 중인지 여부
    pub fn restart_in_flight(&self) -> bool {
        self.shared.restart_in_flight.load(Ordering::Acquire)
    }

    fn follow_pause_setting(&self, paused: Option<bool>) {
        match paused {
            Some(true) => self.pause(),
            Some(false) => self.resume(),
            None => {}
        }
    }

    async fn restart(&self, kind: RestartKind, active: Active) -> Result<(), EngineError> {
        let was_running = self.is_running();
        if was_running {
            self.stop().await?;
        }

        let aggregator = &self.shared.aggregator;
        match kind {
            RestartKind::ReplayOn => {
                aggregator.backup_and_clear();
                self.shared.clear_files();
            }
            RestartKind::ReplayOff => {
                self.shared.clear_files();
                if !aggregator.restore_and_clear() {
                    tracing::warn!("no statistics backup to restore, starting empty");
                }
            }
            RestartKind::SourcesChanged => {
                self.shared.clear_files();
                aggregator.clear();
            }
            RestartKind::None => {}
        }

        self.shared.install(active);
        // 통계가 재구성되었으므로 알림 기준값을 새로 잡습니다.
        self.shared
            .notifier
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .reset_baselines();

        if was_running {
            self.start()?;
            if kind == RestartKind::ReplayOff {
                self.invalidate_backup_when_caught_up();
            }
        }
        Ok(())
    }

    /// 다시 따라잡으면 백업 슬롯을 비웁니다. 그 전에 워커가 멈추면 아무것도 하지 않습니다.
    fn invalidate_backup_when_caught_up(&self) {
        let Some(cancel) = self.worker_cancel() else {
            return;
        };
        let mut caught_up = self.subscribe_caught_up();
        let aggregator = Arc::clone(&self.shared.aggregator);
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                result = caught_up.wait_for(|done| *done) => {
                    if result.is_ok() {
                        aggregator.invalidate_backup();
                        tracing::debug!("caught up after replay, statistics backup invalidated");
                    }
                }
            }
        });
    }
}
