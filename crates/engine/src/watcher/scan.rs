//! 한 사이클의 탐색/읽기/분류/집계/알림

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::PoisonError;
use std::time::{Instant, SystemTime};

use tokio_util::sync::CancellationToken;

use logwatch_core::metrics as m;
use logwatch_core::types::{Counts, Match, Severity};

use super::{Active, Shared};
use crate::discovery::{Candidate, discover};
use crate::error::EngineError;
use crate::normalize::trim_line;
use crate::tail::{FileRecord, Line, Lines, Observation, TailState, chunk_cap, read_chunk};

/// 한 사이클의 결과
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// 사이클 종료 시 추적 중인 파일 수
    pub files_tracked: usize,
    /// 새로 추적을 시작한 파일 수
    pub new_files: usize,
    /// 사라져서 추적 해제된 파일 수
    pub evicted: usize,
    /// truncation이 감지된 파일 수
    pub truncated: usize,
    /// 읽은 바이트 수
    pub bytes_read: u64,
    /// 분류된 라인 수
    pub lines: u64,
    /// 길이 제한으로 버려진 라인 수
    pub dropped: u64,
    /// 심각도별 분류 결과
    pub matches: Counts,
    /// 건너뛴 파일시스템 에러 수
    pub errors: u64,
    /// 모든 파일을 끝까지 읽었는지 여부
    pub caught_up: bool,
    /// 취소로 중단되었는지 여부
    pub cancelled: bool,
    /// 생성된 알림 수
    pub notifications: usize,
}

/// 파일 하나를 읽은 결과
#[derive(Debug, Default)]
struct FileOutcome {
    bytes: u64,
    lines: u64,
    dropped: u64,
    matches: Counts,
    truncated: bool,
    cancelled: bool,
}

/// 사이클 동안 `scanning`을 세우고, 조기 반환이나 패닉으로 끝나도 내립니다.
struct ScanningGuard<'a>(&'a AtomicBool);

impl<'a> ScanningGuard<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::Release);
        Self(flag)
    }
}

impl Drop for ScanningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub(crate) async fn scan_cycle(
    shared: &Shared,
    cancel: &CancellationToken,
) -> Result<ScanReport, EngineError> {
    let started = Instant::now();
    let _scanning = ScanningGuard::raise(&shared.scanning);

    let active = shared.active();
    let config = &active.config;
    let mut report = ScanReport::default();

    let found = discover(&config.active_roots(), &active.filter, cancel).await;
    report.errors += found.errors;
    if found.cancelled {
        report.cancelled = true;
        return Ok(report);
    }

    let missing = reconcile(shared, &found.files, config.replay_from_start, &mut report);
    for path in missing {
        match tokio::fs::try_exists(&path).await {
            Ok(false) => {
                evict(shared, &path);
                report.evicted += 1;
            }
            Ok(true) => {}
            Err(e) => {
                report.errors += 1;
                tracing::debug!(path = %path.display(), error = %e, "failed to check file existence");
            }
        }
    }

    let plan: Vec<FileRecord> = {
        let files = shared.files.read().unwrap_or_else(PoisonError::into_inner);
        let mut plan: Vec<FileRecord> = files.values().cloned().collect();
        plan.sort_by(|a, b| a.path.cmp(&b.path));
        plan
    };

    for record in plan {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        let metadata = match tokio::fs::metadata(&record.path).await {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                evict(shared, &record.path);
                report.evicted += 1;
                continue;
            }
            Err(e) => {
                report.errors += 1;
                tracing::warn!(path = %record.path.display(), error = %e, "failed to stat file, skipping");
                continue;
            }
        };

        let mut state = record.state;
        let observation = state.observe(metadata.len(), metadata.modified().ok());
        let outcome = match read_file(shared, &active, &record, &mut state, observation, cancel).await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                report.errors += 1;
                tracing::warn!(path = %record.path.display(), error = %e, "failed to read file, skipping");
                // 관찰한 크기와 truncation 처리 결과는 반영합니다.
                commit(shared, &record.path, state);
                continue;
            }
        };

        commit(shared, &record.path, state);

        report.bytes_read += outcome.bytes;
        report.lines += outcome.lines;
        report.dropped += outcome.dropped;
        report.matches.accumulate(&outcome.matches);
        if outcome.truncated {
            report.truncated += 1;
        }
        if outcome.cancelled {
            report.cancelled = true;
            break;
        }
    }

    {
        let files = shared.files.read().unwrap_or_else(PoisonError::into_inner);
        report.files_tracked = files.len();
        report.caught_up = !report.cancelled && files.values().all(|f| f.state.is_caught_up());
    }

    if !report.cancelled {
        let caught_up = report.caught_up;
        shared.caught_up.send_if_modified(|current| {
            let changed = *current != caught_up;
            *current = caught_up;
            changed
        });
        report.notifications = notify(shared);
    }

    record_metrics(&report, started);
    Ok(report)
}

/// 탐색 결과를 파일 맵에 반영하고, 탐색되지 않은 기존 파일 경로를 반환합니다.
fn reconcile(
    shared: &Shared,
    found: &std::collections::BTreeMap<PathBuf, Candidate>,
    replay_from_start: bool,
    report: &mut ScanReport,
) -> Vec<PathBuf> {
    let mut files = shared.files.write().unwrap_or_else(PoisonError::into_inner);

    for (path, candidate) in found {
        if files.contains_key(path) {
            continue;
        }
        let state = if replay_from_start {
            TailState::from_start(candidate.size, candidate.modified)
        } else {
            TailState::from_end(candidate.size, candidate.modified)
        };
        tracing::debug!(
            path = %path.display(),
            kind = candidate.kind.as_str(),
            offset = state.offset,
            "tracking new file"
        );
        files.insert(
            path.clone(),
            FileRecord::new(path.clone(), candidate.kind, state),
        );
        report.new_files += 1;
    }

    files
        .keys()
        .filter(|path| !found.contains_key(*path))
        .cloned()
        .collect()
}

fn evict(shared: &Shared, path: &std::path::Path) {
    let removed = shared
        .files
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(path);
    if removed.is_some() {
        tracing::debug!(path = %path.display(), "file disappeared, stopped tracking");
    }
}

fn commit(shared: &Shared, path: &std::path::Path, state: TailState) {
    let mut files = shared.files.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(record) = files.get_mut(path) {
        record.state = state;
    }
}

/// 미읽음 구간을 한 청크 읽어 라인 단위로 분류합니다.
async fn read_file(
    shared: &Shared,
    active: &Active,
    record: &FileRecord,
    state: &mut TailState,
    observation: Observation,
    cancel: &CancellationToken,
) -> Result<FileOutcome, EngineError> {
    let mut outcome = FileOutcome::default();

    if let Observation::Truncated { .. } = observation {
        outcome.truncated = true;
        tracing::info!(path = %record.path.display(), size = state.size, "file truncated, reading from start");
    }

    let unread = observation.unread();
    if unread == 0 {
        return Ok(outcome);
    }

    let config = &active.config;
    let limits = record.kind.limits(config);
    let want = chunk_cap(limits, &config.boost, unread).min(unread);

    let chunk = read_chunk(&record.path, state.offset, want)
        .await
        .map_err(|e| EngineError::Read {
            path: record.path.display().to_string(),
            reason: e.to_string(),
        })?;

    let mut lines = Lines::new(&chunk, limits.line_bytes);
    loop {
        // 꺼낸 라인은 반드시 처리하므로 취소는 꺼내기 전에 확인합니다.
        if cancel.is_cancelled() {
            outcome.cancelled = true;
            break;
        }
        let Some(line) = lines.next() else {
            break;
        };

        let bytes = match line {
            Line::Oversized(len) => {
                state.line_no += 1;
                outcome.dropped += 1;
                tracing::trace!(path = %record.path.display(), line_no = state.line_no, len, "line exceeds cap, dropped");
                continue;
            }
            Line::Text(bytes) => bytes,
        };

        let raw = String::from_utf8_lossy(bytes);
        let trimmed = trim_line(&raw);
        if trimmed.is_empty() {
            continue;
        }
        state.line_no += 1;

        let Some(hit) = active.classifier.classify(&raw) else {
            continue;
        };
        let event = Match {
            source: record.path.clone(),
            display_name: record.display_name.clone(),
            text: shared.normalizer.normalize(trimmed),
            rule: hit.rule.to_owned(),
            severity: hit.severity,
            line_no: state.line_no,
            when: SystemTime::now(),
        };
        shared.handler.on_match(&event);
        outcome.lines += 1;
        outcome.matches.record(hit.severity);
    }

    // 취소로 멈춘 경우 소비한 바이트만큼만 전진합니다.
    let consumed = (chunk.len() - lines.remaining()) as u64;
    state.advance(consumed, 0);
    outcome.bytes = consumed;
    Ok(outcome)
}

fn notify(shared: &Shared) -> usize {
    let current = shared.aggregator.counts_snapshot();
    let pins = shared.aggregator.snapshot_pins();
    let produced = shared
        .notifier
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .evaluate(&current, &pins, Instant::now());

    let count = produced.len();
    for entry in produced {
        // 구독자가 없으면 메일박스에만 남습니다.
        let _ = shared.mail.send(entry);
    }
    count
}

fn record_metrics(report: &ScanReport, started: Instant) {
    metrics::counter!(m::BYTES_READ_TOTAL).increment(report.bytes_read);
    metrics::counter!(m::LINES_READ_TOTAL).increment(report.lines);
    metrics::counter!(m::LINES_DROPPED_TOTAL).increment(report.dropped);
    metrics::counter!(m::TRUNCATIONS_TOTAL).increment(report.truncated as u64);
    metrics::counter!(m::FILES_EVICTED_TOTAL).increment(report.evicted as u64);
    metrics::counter!(m::SCAN_ERRORS_TOTAL).increment(report.errors);
    for severity in Severity::ALL {
        let n = report.matches.get(severity);
        if n > 0 {
            metrics::counter!(m::MATCHES_TOTAL, m::LABEL_SEVERITY => severity.as_str()).increment(n);
        }
    }
    metrics::gauge!(m::FILES_TRACKED).set(report.files_tracked as f64);
    metrics::histogram!(m::SCAN_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}
