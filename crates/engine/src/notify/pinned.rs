//! 고정 키 알림
//!
//! 고정된 키마다 자신의 기준값과 마지막 알림 시각을 보관하고, 매 사이클 증가분을
//! 계산합니다. 증가분이 최소 신규 이슈 수보다 작거나 쿨다운 중이면 기준값만 조용히
//! 갱신하고 알림을 건너뜁니다.

use std::collections::HashMap;
use std::time::Instant;

use logwatch_core::types::{Counts, Severity};

use super::mailbox::{AlertMessage, MailEntry, MailKind, MessageSegment, SourceDiff};
use crate::aggregator::CountsSnapshot;
use crate::config::NotifySettings;

/// 고정 키 하나의 기준 상태
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PinnedSnapshot {
    /// 마지막으로 관찰한 카운터
    pub counts: Counts,
    /// 마지막 알림 시각
    pub last_alert_at: Option<Instant>,
}

/// 고정 키 알림 한 건
#[derive(Debug, Clone)]
pub struct PinnedAlert {
    /// 메일박스 항목
    pub entry: MailEntry,
    /// 표시용 메시지
    pub message: AlertMessage,
}

/// 고정 키 알림 상태
#[derive(Debug, Default)]
pub struct PinnedAlerts {
    baselines: HashMap<String, PinnedSnapshot>,
}

impl PinnedAlerts {
    /// 새 상태를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 키의 기준 상태
    pub fn baseline(&self, key: &str) -> Option<PinnedSnapshot> {
        self.baselines.get(key).copied()
    }

    /// 모든 기준 상태를 버립니다.
    pub fn reset(&mut self) {
        self.baselines.clear();
    }

    /// 고정 키 목록을 평가합니다.
    ///
    /// 처음 보는 키는 기준값이 0인 것으로 보고 바로 평가합니다. 집계에 없는 키는
    /// 카운터가 0인 것으로 봅니다. 고정 해제된 키의 기준 상태는 제거됩니다.
    pub fn evaluate(
        &mut self,
        pins: &[String],
        current: &CountsSnapshot,
        now: Instant,
        settings: &NotifySettings,
    ) -> Vec<PinnedAlert> {
        self.baselines.retain(|key, _| pins.contains(key));

        let mut alerts = Vec::new();
        for key in pins {
            let counts = current.get(key).copied().unwrap_or_default();
            let base = self
                .baselines
                .entry(key.clone())
                .or_insert(PinnedSnapshot {
                    counts: Counts::default(),
                    last_alert_at: None,
                });

            let diff = counts.diff(&base.counts);
            let level = diff.level_count(settings.pinned_rollup);
            let cooling = base
                .last_alert_at
                .is_some_and(|at| now.saturating_duration_since(at) < settings.pinned_cooldown);

            base.counts = counts;
            if level == 0 || level < settings.pinned_min_new_issues || cooling {
                tracing::trace!(key = %key, level, cooling, "pinned alert skipped");
                continue;
            }
            base.last_alert_at = Some(now);

            alerts.push(build_alert(key, diff, settings));
        }
        alerts
    }
}

fn plural(n: u64, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// 롤업 범위 안에서 증가한 심각도 목록
fn increased(diff: &Counts, settings: &NotifySettings) -> Vec<(Severity, u64, &'static str)> {
    let rollup = settings.pinned_rollup;
    let mut parts = Vec::with_capacity(3);
    if diff.errors > 0 {
        parts.push((Severity::Error, diff.errors, "error"));
    }
    if rollup.includes_warnings() && diff.warnings > 0 {
        parts.push((Severity::Warning, diff.warnings, "warning"));
    }
    if rollup.includes_fails() && diff.fails > 0 {
        parts.push((Severity::Fail, diff.fails, "fail"));
    }
    parts
}

fn build_alert(key: &str, diff: Counts, settings: &NotifySettings) -> PinnedAlert {
    let parts = increased(&diff, settings);

    let summary = parts
        .iter()
        .map(|(_, n, word)| plural(*n, &format!("new {word}")))
        .collect::<Vec<_>>()
        .join(", ");

    let mut segments = vec![MessageSegment::plain(format!("{key}: "))];
    for (i, (severity, n, word)) in parts.iter().enumerate() {
        if i > 0 {
            segments.push(MessageSegment::plain(", "));
        }
        segments.push(MessageSegment::styled(plural(*n, word), *severity));
    }

    let entry = MailEntry::new(
        MailKind::Pinned,
        key,
        summary,
        vec![SourceDiff {
            key: key.to_owned(),
            diff,
        }],
    );
    let message = AlertMessage {
        key: key.to_owned(),
        segments,
    };
    PinnedAlert { entry, message }
}
