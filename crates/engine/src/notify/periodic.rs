//! 주기 요약
//!
//! 구간 시작 시점의 카운터를 기준값으로 저장해 두고, 간격이 지나면 키별 증가분을
//! 계산하여 레벨 카운트 순으로 상위 N개를 요약합니다. 보고할 내용이 없어도
//! 기준값은 항상 다시 잡으므로 구간은 끊김 없이 이어집니다.

use std::time::Instant;

use logwatch_core::types::Counts;

use super::mailbox::{MailEntry, MailKind, SourceDiff};
use crate::aggregator::CountsSnapshot;
use crate::config::NotifySettings;

/// 주기 요약 상태
#[derive(Debug, Default)]
pub struct PeriodicSummary {
    baseline: Option<(CountsSnapshot, Instant)>,
}

impl PeriodicSummary {
    /// 새 상태를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기준값이 잡혀 있는지 여부
    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// 기준값을 버립니다. 다음 평가는 기준값만 다시 잡습니다.
    pub fn reset(&mut self) {
        self.baseline = None;
    }

    /// 현재 카운터를 평가합니다.
    ///
    /// 첫 호출은 기준값만 저장하고, 간격이 지나지 않았으면 아무것도 하지 않습니다.
    pub fn evaluate(
        &mut self,
        current: &CountsSnapshot,
        now: Instant,
        settings: &NotifySettings,
    ) -> Option<MailEntry> {
        if self.baseline.is_none() {
            self.baseline = Some((current.clone(), now));
            return None;
        }
        let Some((baseline, since)) = &self.baseline else {
            return None;
        };

        let elapsed = now.saturating_duration_since(*since);
        if elapsed < settings.periodic_interval {
            return None;
        }

        let rollup = settings.periodic_rollup;
        let mut changed: Vec<(SourceDiff, u64)> = current
            .iter()
            .filter_map(|(key, counts)| {
                let base = baseline.get(key).copied().unwrap_or_default();
                let diff = counts.diff(&base);
                let level = diff.level_count(rollup);
                (level > 0).then(|| {
                    (
                        SourceDiff {
                            key: key.clone(),
                            diff,
                        },
                        level,
                    )
                })
            })
            .collect();

        self.baseline = Some((current.clone(), now));

        if changed.is_empty() {
            return None;
        }

        changed.sort_by(|(a, la), (b, lb)| lb.cmp(la).then_with(|| a.key.cmp(&b.key)));

        let mut totals = Counts::default();
        for (source, _) in &changed {
            totals.accumulate(&source.diff);
        }
        let source_count = changed.len();

        let sources: Vec<SourceDiff> = changed
            .into_iter()
            .take(settings.periodic_max_sources)
            .map(|(source, _)| source)
            .collect();

        let title = format!("Issues in the last {}s", elapsed.as_secs());
        let summary = format!(
            "{} errors, {} warnings, {} fails across {} sources",
            totals.errors, totals.warnings, totals.fails, source_count
        );

        Some(MailEntry::new(MailKind::Periodic, title, summary, sources))
    }
}
