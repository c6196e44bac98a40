//! 동시성 집계 저장소
//!
//! [`Aggregator`]는 키(로그 소스)별 누적 카운터와 고정 크기 링 버퍼를 보관합니다.
//! 고정(pin) 키 집합은 통계와 독립적으로 관리되며 통계를 비워도 유지됩니다.
//!
//! # 동시성 계약
//! - 변경 연산(`add`, `set_capacity`, `clear`, 백업/복원, 고정 키 변경)은 쓰기 잠금을 잡습니다.
//! - 조회 연산(`snapshot`, `recent`, 고정 키 조회)은 읽기 잠금을 잡고 독립된 복사본을 반환합니다.
//! - 잠금을 잡은 채로 I/O를 수행하지 않으며, 잠금은 `.await`를 넘어 유지되지 않습니다.
//!
//! # 모드 전환 프로토콜
//! 재생 모드로 들어갈 때 [`Aggregator::backup_and_clear`]로 현재 통계를 백업 슬롯으로
//! 옮기고, 재생 모드를 벗어날 때 [`Aggregator::restore_and_clear`]로 되돌립니다.
//! 백업 슬롯은 항상 최대 하나입니다.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::SystemTime;

use logwatch_core::types::{Counts, Match, Severity};

/// 링 버퍼에 보관되는 레코드 한 건
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// 심각도
    pub severity: Severity,
    /// 표시용 원본 파일 이름
    pub display_name: String,
    /// 정규화된 텍스트
    pub text: String,
    /// 파일 내 라인 번호
    pub line_no: u64,
    /// 분류 시각
    pub when: SystemTime,
    /// 심각도 비트마스크
    pub mask: u8,
}

impl From<&Match> for Record {
    fn from(event: &Match) -> Self {
        Self {
            severity: event.severity,
            display_name: event.display_name.clone(),
            text: event.text.clone(),
            line_no: event.line_no,
            when: event.when,
            mask: event.severity.mask(),
        }
    }
}

/// 키 하나의 집계
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModStats {
    /// 누적 카운터
    pub counts: Counts,
    /// 최근 레코드 (오래된 것이 앞)
    pub records: VecDeque<Record>,
}

impl ModStats {
    fn push(&mut self, record: Record, capacity: usize) {
        self.counts.record(record.severity);
        self.records.push_back(record);
        self.trim(capacity);
    }

    fn trim(&mut self, capacity: usize) {
        while self.records.len() > capacity {
            self.records.pop_front();
        }
    }
}

/// 모든 키의 특정 시점 복사본
pub type Snapshot = HashMap<String, ModStats>;

/// 모든 키의 카운터만 담은 특정 시점 복사본
pub type CountsSnapshot = HashMap<String, Counts>;

#[derive(Debug, Default)]
struct Stats {
    live: HashMap<String, ModStats>,
    backup: Option<HashMap<String, ModStats>>,
}

/// 키별 통계와 고정 키 집합을 보관하는 동시성 저장소
#[derive(Debug)]
pub struct Aggregator {
    stats: RwLock<Stats>,
    pins: RwLock<HashSet<String>>,
    capacity: AtomicUsize,
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Aggregator {
    /// 키당 `capacity`개의 레코드를 보관하는 집계기를 생성합니다.
    pub fn new(capacity: usize) -> Self {
        Self {
            stats: RwLock::new(Stats::default()),
            pins: RwLock::new(HashSet::new()),
            capacity: AtomicUsize::new(capacity),
        }
    }

    /// 표시용 파일 이름에서 집계 키를 만듭니다 (마지막 `.` 이후를 제거).
    pub fn key_of(display_name: &str) -> &str {
        match display_name.rfind('.') {
            Some(i) if i > 0 => &display_name[..i],
            _ => display_name,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Stats> {
        self.stats.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Stats> {
        self.stats.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// 분류된 라인을 집계합니다.
    pub fn add(&self, event: &Match) {
        let key = Self::key_of(&event.display_name);
        let capacity = self.capacity();
        let record = Record::from(event);

        let mut stats = self.write();
        match stats.live.get_mut(key) {
            Some(entry) => entry.push(record, capacity),
            None => {
                let mut entry = ModStats::default();
                entry.push(record, capacity);
                stats.live.insert(key.to_owned(), entry);
            }
        }
    }

    /// 모든 키의 독립된 복사본을 반환합니다.
    pub fn snapshot(&self) -> Snapshot {
        self.read().live.clone()
    }

    /// 모든 키의 카운터 복사본을 반환합니다.
    pub fn counts_snapshot(&self) -> CountsSnapshot {
        self.read()
            .live
            .iter()
            .map(|(k, v)| (k.clone(), v.counts))
            .collect()
    }

    /// 키의 최근 레코드를 최신순으로 최대 `limit`개 반환합니다.
    pub fn recent(&self, key: &str, limit: usize) -> Vec<Record> {
        self.recent_level(key, limit, logwatch_core::types::MASK_ALL)
    }

    /// `mask`에 포함된 심각도의 최근 레코드를 최신순으로 최대 `limit`개 반환합니다.
    pub fn recent_level(&self, key: &str, limit: usize, mask: u8) -> Vec<Record> {
        let stats = self.read();
        let Some(entry) = stats.live.get(key) else {
            return Vec::new();
        };
        entry
            .records
            .iter()
            .rev()
            .filter(|r| r.mask & mask != 0)
            .take(limit)
            .cloned()
            .collect()
    }

    /// 키의 누적 카운터
    pub fn counts(&self, key: &str) -> Option<Counts> {
        self.read().live.get(key).map(|e| e.counts)
    }

    /// 모든 키의 카운터 합계
    pub fn total_counts(&self) -> Counts {
        let stats = self.read();
        let mut total = Counts::default();
        for entry in stats.live.values() {
            total.accumulate(&entry.counts);
        }
        total
    }

    /// 정렬된 키 목록
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.read().live.keys().cloned().collect();
        keys.sort_unstable();
        keys
    }

    /// 키 수
    pub fn len(&self) -> usize {
        self.read().live.len()
    }

    /// 통계가 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 키당 보관 레코드 수
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire)
    }

    /// 링 버퍼 용량을 변경하고 기존 링을 즉시 잘라냅니다.
    pub fn set_capacity(&self, capacity: usize) {
        let mut stats = self.write();
        self.capacity.store(capacity, Ordering::Release);
        for entry in stats.live.values_mut() {
            entry.trim(capacity);
        }
    }

    /// 한 키의 통계를 제거합니다. 키가 있었으면 `true`.
    pub fn reset(&self, key: &str) -> bool {
        self.write().live.remove(key).is_some()
    }

    /// 모든 통계를 비웁니다. 고정 키와 백업 슬롯은 유지됩니다.
    pub fn clear(&self) {
        self.write().live.clear();
    }

    // --- 모드 전환 ---

    /// 현재 통계를 백업 슬롯으로 옮기고 빈 통계로 시작합니다.
    ///
    /// 이미 백업이 있으면 기존 백업(더 이전 상태)을 유지하고 현재 통계만 버립니다.
    pub fn backup_and_clear(&self) {
        let mut stats = self.write();
        let live = std::mem::take(&mut stats.live);
        if stats.backup.is_some() {
            tracing::debug!(discarded = live.len(), "backup already pending, keeping older state");
        } else {
            stats.backup = Some(live);
        }
    }

    /// 백업 슬롯을 현재 통계로 되돌리고 백업을 비웁니다.
    ///
    /// 현재 통계는 버려지며, 복원된 링은 현재 용량으로 잘립니다.
    /// 백업이 없었으면 통계가 빈 상태가 되고 `false`를 반환합니다.
    pub fn restore_and_clear(&self) -> bool {
        let capacity = self.capacity();
        let mut stats = self.write();
        let restored = stats.backup.take();
        let had_backup = restored.is_some();
        stats.live = restored.unwrap_or_default();
        for entry in stats.live.values_mut() {
            entry.trim(capacity);
        }
        had_backup
    }

    /// 백업 슬롯을 무조건 비웁니다.
    pub fn invalidate_backup(&self) {
        self.write().backup = None;
    }

    /// 백업이 남아 있는지 여부
    pub fn has_backup(&self) -> bool {
        self.read().backup.is_some()
    }

    // --- 고정 키 ---

    /// 키가 고정되어 있는지 여부
    pub fn is_pinned(&self, key: &str) -> bool {
        self.pins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }

    /// 키의 고정 여부를 설정합니다.
    pub fn set_pinned(&self, key: &str, pinned: bool) {
        let mut pins = self.pins.write().unwrap_or_else(PoisonError::into_inner);
        if pinned {
            pins.insert(key.to_owned());
        } else {
            pins.remove(key);
        }
    }

    /// 고정 키 집합을 통째로 교체합니다.
    pub fn replace_pins<I, S>(&self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: HashSet<String> = keys.into_iter().map(Into::into).collect();
        *self.pins.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// 고정 키 목록 (정렬됨)
    pub fn snapshot_pins(&self) -> Vec<String> {
        let mut pins: Vec<String> = self
            .pins
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect();
        pins.sort_unstable();
        pins
    }

    /// 고정 키를 모두 해제합니다.
    pub fn clear_pins(&self) {
        self.pins
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
