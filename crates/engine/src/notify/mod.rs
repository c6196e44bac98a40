//! 알림 엔진
//!
//! 스케줄러가 매 사이클 끝에 집계기의 카운터 스냅샷과 고정 키 목록을 넘기면
//! 두 가지 알림 모드를 평가합니다.
//!
//! - [`PeriodicSummary`]: 설정된 간격마다 키별 증가분을 요약
//! - [`PinnedAlerts`]: 고정 키의 증가분을 매 사이클 확인하여 즉시 알림
//!
//! 생성된 항목은 [`Mailbox`]에 쌓이고, 고정 키 알림은 [`MessageQueue`]에도 들어가
//! 표시 계층이 순서대로 한 번씩 가져갑니다.

pub mod mailbox;
pub mod periodic;
pub mod pinned;

pub use mailbox::{
    AlertMessage, MailEntry, MailKind, Mailbox, MessageQueue, MessageSegment, SourceDiff,
};
pub use periodic::PeriodicSummary;
pub use pinned::{PinnedAlert, PinnedAlerts, PinnedSnapshot};

use std::time::Instant;

use logwatch_core::metrics as m;

use crate::aggregator::CountsSnapshot;
use crate::config::NotifySettings;

/// 주기 요약과 고정 키 알림을 묶은 알림 엔진
#[derive(Debug)]
pub struct NotificationEngine {
    settings: NotifySettings,
    periodic: PeriodicSummary,
    pinned: PinnedAlerts,
    mailbox: Mailbox,
    messages: MessageQueue,
}

impl NotificationEngine {
    /// 새 알림 엔진을 생성합니다.
    pub fn new(settings: NotifySettings) -> Self {
        Self {
            mailbox: Mailbox::new(settings.mailbox_capacity),
            messages: MessageQueue::new(settings.message_queue_capacity),
            periodic: PeriodicSummary::new(),
            pinned: PinnedAlerts::new(),
            settings,
        }
    }

    /// 현재 설정
    pub fn settings(&self) -> &NotifySettings {
        &self.settings
    }

    /// 설정을 교체합니다. 기준값은 유지되고 큐 용량만 즉시 반영됩니다.
    pub fn set_settings(&mut self, settings: NotifySettings) {
        self.mailbox.set_capacity(settings.mailbox_capacity);
        self.messages.set_capacity(settings.message_queue_capacity);
        self.settings = settings;
    }

    /// 한 사이클을 평가하고 새로 생성된 메일박스 항목을 반환합니다.
    ///
    /// 꺼진 모드는 기준값을 버리므로 다시 켜지면 기준값부터 새로 잡습니다.
    pub fn evaluate(
        &mut self,
        current: &CountsSnapshot,
        pins: &[String],
        now: Instant,
    ) -> Vec<MailEntry> {
        let mut produced = Vec::new();

        if !self.settings.enabled {
            self.reset_baselines();
            return produced;
        }

        if self.settings.periodic_enabled {
            if let Some(entry) = self.periodic.evaluate(current, now, &self.settings) {
                tracing::debug!(
                    title = %entry.title,
                    sources = entry.sources.len(),
                    "periodic summary produced"
                );
                produced.push(entry);
            }
        } else {
            self.periodic.reset();
        }

        if self.settings.pinned_enabled {
            for alert in self.pinned.evaluate(pins, current, now, &self.settings) {
                tracing::debug!(key = %alert.message.key, "pinned alert produced");
                self.messages.push(alert.message);
                produced.push(alert.entry);
            }
        } else {
            self.pinned.reset();
        }

        for entry in &produced {
            metrics::counter!(m::NOTIFICATIONS_TOTAL, m::LABEL_KIND => entry.kind.as_str())
                .increment(1);
            if self.mailbox.push(entry.clone()) {
                tracing::debug!(capacity = self.mailbox.capacity(), "mailbox full, evicted oldest entry");
            }
        }

        produced
    }

    /// 모든 기준값을 버립니다.
    pub fn reset_baselines(&mut self) {
        self.periodic.reset();
        self.pinned.reset();
    }

    /// 메일박스 복사본 (오래된 순)
    pub fn mailbox_snapshot(&self) -> Vec<MailEntry> {
        self.mailbox.snapshot()
    }

    /// 표시용 메시지를 순서대로 모두 꺼냅니다.
    pub fn drain_messages(&mut self) -> Vec<AlertMessage> {
        self.messages.drain()
    }
}
