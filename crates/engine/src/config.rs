//! 엔진 설정
//!
//! [`EngineConfig`]는 core의 [`LogwatchConfig`](logwatch_core::config::LogwatchConfig)에서
//! 단위 변환(KB/MB -> 바이트, 초 -> `Duration`)과 범위 고정을 거쳐 만들어지는
//! 불변 설정 값입니다. 엔진은 사이클마다 이 값의 복사본을 사용합니다.
//!
//! 설정 변경은 [`EngineConfig::restart_kind`]로 이전 값과 비교하여
//! 재시작이 필요한지 결정합니다.
//!
//! # 사용 예시
//! ```ignore
//! use logwatch_core::config::LogwatchConfig;
//! use logwatch_engine::config::EngineConfig;
//!
//! let core_config = LogwatchConfig::default();
//! let config = EngineConfig::from_core(&core_config);
//! config.validate()?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use logwatch_core::config::{LogwatchConfig, RuleConfig};
use logwatch_core::types::LevelRollup;

use crate::classify::{Classifier, FileFilter};
use crate::error::EngineError;

/// 폴링 주기 하한
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);
/// 폴링 주기 상한
pub const MAX_POLL_INTERVAL: Duration = Duration::from_millis(5000);

const KIB: u64 = 1024;
const MIB: u64 = 1024 * 1024;

/// 파일 종류별 읽기 한도
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadLimits {
    /// 사이클당 최대 읽기 바이트
    pub chunk_bytes: u64,
    /// 최대 라인 길이 (바이트). 초과 라인은 버려집니다.
    pub line_bytes: usize,
}

/// 백로그 부스트 정책
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoostPolicy {
    /// 부스트 사용 여부
    pub enabled: bool,
    /// 부스트가 시작되는 미읽음 바이트 수 (초과 시)
    pub threshold_bytes: u64,
    /// 청크 배율
    pub factor: f64,
    /// 부스트된 청크의 최대 크기
    pub cap_bytes: u64,
}

impl Default for BoostPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold_bytes: 8 * MIB,
            factor: 2.0,
            cap_bytes: 10 * MIB,
        }
    }
}

/// 알림 엔진 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifySettings {
    /// 알림 전체 활성화
    pub enabled: bool,
    /// 주기 요약 활성화
    pub periodic_enabled: bool,
    /// 주기 요약 간격
    pub periodic_interval: Duration,
    /// 주기 요약에 나열할 최대 소스 수
    pub periodic_max_sources: usize,
    /// 주기 요약 레벨 롤업
    pub periodic_rollup: LevelRollup,
    /// 고정 키 알림 활성화
    pub pinned_enabled: bool,
    /// 고정 키 알림 쿨다운
    pub pinned_cooldown: Duration,
    /// 고정 키 알림 최소 신규 이슈 수
    pub pinned_min_new_issues: u64,
    /// 고정 키 알림 레벨 롤업
    pub pinned_rollup: LevelRollup,
    /// 메일박스 최대 항목 수
    pub mailbox_capacity: usize,
    /// 표시용 메시지 큐 최대 길이
    pub message_queue_capacity: usize,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self::from_core(&logwatch_core::config::NotificationConfig::default())
    }
}

impl NotifySettings {
    /// core의 `NotificationConfig`에서 알림 설정을 생성합니다.
    pub fn from_core(core: &logwatch_core::config::NotificationConfig) -> Self {
        Self {
            enabled: core.enabled,
            periodic_enabled: core.periodic_enabled,
            periodic_interval: Duration::from_secs(core.periodic_interval_secs),
            periodic_max_sources: core.periodic_max_sources,
            periodic_rollup: LevelRollup::from_level(core.periodic_min_level),
            pinned_enabled: core.pinned_enabled,
            pinned_cooldown: Duration::from_secs(core.pinned_cooldown_secs),
            pinned_min_new_issues: core.pinned_min_new_issues,
            pinned_rollup: LevelRollup::from_level(core.pinned_min_level),
            mailbox_capacity: core.mailbox_capacity,
            message_queue_capacity: core.message_queue_capacity,
        }
    }
}

/// 설정 변경 시 필요한 재시작 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartKind {
    /// 재시작 불필요 (다음 사이클부터 적용)
    None,
    /// 재생 모드 켜짐: 통계 백업 후 처음부터 다시 읽기
    ReplayOn,
    /// 재생 모드 꺼짐: 백업 복원 후 현재 끝부터 다시 추적
    ReplayOff,
    /// 감시 대상 변경: 파일 상태와 통계를 모두 비우고 다시 시작
    SourcesChanged,
}

impl RestartKind {
    /// 재시작이 필요한지 여부
    pub fn is_required(self) -> bool {
        !matches!(self, Self::None)
    }

    /// 로그/메트릭용 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ReplayOn => "replay_on",
            Self::ReplayOff => "replay_off",
            Self::SourcesChanged => "sources_changed",
        }
    }
}

/// 감시 엔진 설정
///
/// core의 `WatcherConfig`와 `NotificationConfig`에서 파생됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// 감시 루트 디렉토리
    pub roots: Vec<PathBuf>,
    /// 대용량 소스 루트 디렉토리
    pub high_volume_roots: Vec<PathBuf>,
    /// 대용량 소스 루트 포함 여부
    pub watch_high_volume: bool,
    /// 포함할 파일 이름 패턴
    pub include_pattern: String,
    /// 제외할 파일 이름 패턴 (빈 문자열이면 제외 없음)
    pub exclude_pattern: String,
    /// 분류 규칙 (순서 유지)
    pub rules: Vec<RuleConfig>,
    /// 폴링 주기 (100ms-5s)
    pub poll_interval: Duration,
    /// 키당 보관 레코드 수
    pub cache_capacity: usize,
    /// 일반 파일 읽기 한도
    pub generic_limits: ReadLimits,
    /// 대용량 파일 읽기 한도
    pub high_volume_limits: ReadLimits,
    /// 백로그 부스트 정책
    pub boost: BoostPolicy,
    /// 새 파일을 처음부터 읽을지 여부
    pub replay_from_start: bool,
    /// 시작 시 첫 사이클 후 일시 정지
    pub start_paused: bool,
    /// 알림 설정
    pub notification: NotifySettings,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_core(&LogwatchConfig::default())
    }
}

impl EngineConfig {
    /// core 설정에서 엔진 설정을 생성합니다.
    ///
    /// 폴링 주기는 100ms-5s 범위로 고정되고, 알림 레벨은 2 이하로 고정됩니다.
    pub fn from_core(core: &LogwatchConfig) -> Self {
        let w = &core.watcher;
        Self {
            roots: w.roots.iter().map(PathBuf::from).collect(),
            high_volume_roots: w.high_volume_roots.iter().map(PathBuf::from).collect(),
            watch_high_volume: w.watch_high_volume,
            include_pattern: w.include_pattern.clone(),
            exclude_pattern: w.exclude_pattern.clone(),
            rules: w.rules.clone(),
            poll_interval: Duration::from_millis(w.poll_interval_ms)
                .clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL),
            cache_capacity: w.cache_capacity,
            generic_limits: ReadLimits {
                chunk_bytes: w.max_chunk_kb.saturating_mul(KIB),
                line_bytes: kib_to_usize(w.max_line_kb),
            },
            high_volume_limits: ReadLimits {
                chunk_bytes: w.high_volume_max_chunk_kb.saturating_mul(KIB),
                line_bytes: kib_to_usize(w.high_volume_max_line_kb),
            },
            boost: BoostPolicy {
                enabled: w.auto_boost_on_backlog,
                threshold_bytes: w.backlog_boost_threshold_mb.saturating_mul(MIB),
                factor: w.backlog_boost_factor,
                cap_bytes: w.max_boost_cap_mb.saturating_mul(MIB),
            },
            replay_from_start: w.replay_from_start,
            start_paused: w.pause,
            notification: NotifySettings::from_core(&core.notification),
        }
    }

    /// 실제로 탐색할 루트 목록을 반환합니다. 대용량 루트는 `true`로 표시됩니다.
    pub fn active_roots(&self) -> Vec<(PathBuf, bool)> {
        let mut roots: Vec<(PathBuf, bool)> =
            self.roots.iter().map(|r| (r.clone(), false)).collect();
        if self.watch_high_volume {
            roots.extend(self.high_volume_roots.iter().map(|r| (r.clone(), true)));
        }
        roots
    }

    /// 파일 필터를 컴파일합니다.
    pub fn file_filter(&self) -> Result<FileFilter, EngineError> {
        FileFilter::new(&self.include_pattern, &self.exclude_pattern)
    }

    /// 분류기를 컴파일합니다.
    pub fn classifier(&self) -> Result<Classifier, EngineError> {
        Classifier::from_rules(&self.rules)
    }

    /// 이전 설정과 비교하여 필요한 재시작 종류를 결정합니다.
    ///
    /// 재생 모드 전환이 감시 대상 변경보다 우선합니다.
    pub fn restart_kind(&self, next: &EngineConfig) -> RestartKind {
        match (self.replay_from_start, next.replay_from_start) {
            (false, true) => return RestartKind::ReplayOn,
            (true, false) => return RestartKind::ReplayOff,
            _ => {}
        }

        let sources_changed = self.roots != next.roots
            || self.high_volume_roots != next.high_volume_roots
            || self.watch_high_volume != next.watch_high_volume
            || self.include_pattern != next.include_pattern
            || self.exclude_pattern != next.exclude_pattern;

        if sources_changed {
            RestartKind::SourcesChanged
        } else {
            RestartKind::None
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EngineError> {
        const MAX_CACHE_CAPACITY: usize = 100_000;

        if self.roots.is_empty() {
            return Err(config_err("roots", "at least one root is required"));
        }

        if self.cache_capacity == 0 || self.cache_capacity > MAX_CACHE_CAPACITY {
            return Err(config_err(
                "cache_capacity",
                format!("must be 1-{}", MAX_CACHE_CAPACITY),
            ));
        }

        for (field, limits) in [
            ("generic_limits", self.generic_limits),
            ("high_volume_limits", self.high_volume_limits),
        ] {
            if limits.chunk_bytes == 0 || limits.line_bytes == 0 {
                return Err(config_err(field, "chunk and line caps must be non-zero"));
            }
        }

        if !self.boost.factor.is_finite() || self.boost.factor < 1.0 {
            return Err(config_err("boost.factor", "must be a finite value >= 1.0"));
        }

        if self.boost.cap_bytes == 0 {
            return Err(config_err("boost.cap_bytes", "must be greater than 0"));
        }

        let n = &self.notification;
        if n.periodic_interval.is_zero() {
            return Err(config_err(
                "notification.periodic_interval",
                "must be greater than 0",
            ));
        }
        if n.periodic_max_sources == 0 || n.mailbox_capacity == 0 || n.message_queue_capacity == 0
        {
            return Err(config_err(
                "notification",
                "max sources and queue capacities must be greater than 0",
            ));
        }

        self.file_filter().map_err(|e| config_err("include_pattern", e.to_string()))?;
        self.classifier().map_err(|e| config_err("rules", e.to_string()))?;

        Ok(())
    }
}

fn kib_to_usize(kb: u64) -> usize {
    usize::try_from(kb.saturating_mul(KIB)).unwrap_or(usize::MAX)
}

fn config_err(field: &str, reason: impl Into<String>) -> EngineError {
    EngineError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// 엔진 설정 빌더
///
/// 설정 필드가 많으므로 빌더 패턴을 사용합니다.
#[derive(Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// 기본 설정으로 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 감시 루트를 설정합니다.
    pub fn roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.config.roots = roots;
        self
    }

    /// 대용량 소스 루트를 설정합니다.
    pub fn high_volume_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.config.high_volume_roots = roots;
        self
    }

    /// 대용량 소스 포함 여부를 설정합니다.
    pub fn watch_high_volume(mut self, watch: bool) -> Self {
        self.config.watch_high_volume = watch;
        self
    }

    /// 포함/제외 파일 이름 패턴을 설정합니다.
    pub fn file_patterns(mut self, include: impl Into<String>, exclude: impl Into<String>) -> Self {
        self.config.include_pattern = include.into();
        self.config.exclude_pattern = exclude.into();
        self
    }

    /// 분류 규칙을 설정합니다.
    pub fn rules(mut self, rules: Vec<RuleConfig>) -> Self {
        self.config.rules = rules;
        self
    }

    /// 폴링 주기를 설정합니다 (100ms-5s로 고정).
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval.clamp(MIN_POLL_INTERVAL, MAX_POLL_INTERVAL);
        self
    }

    /// 키당 보관 레코드 수를 설정합니다.
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.config.cache_capacity = capacity;
        self
    }

    /// 일반 파일 읽기 한도를 설정합니다.
    pub fn generic_limits(mut self, limits: ReadLimits) -> Self {
        self.config.generic_limits = limits;
        self
    }

    /// 대용량 파일 읽기 한도를 설정합니다.
    pub fn high_volume_limits(mut self, limits: ReadLimits) -> Self {
        self.config.high_volume_limits = limits;
        self
    }

    /// 백로그 부스트 정책을 설정합니다.
    pub fn boost(mut self, boost: BoostPolicy) -> Self {
        self.config.boost = boost;
        self
    }

    /// 재생 모드를 설정합니다.
    pub fn replay_from_start(mut self, replay: bool) -> Self {
        self.config.replay_from_start = replay;
        self
    }

    /// 시작 시 일시 정지 여부를 설정합니다.
    pub fn start_paused(mut self, paused: bool) -> Self {
        self.config.start_paused = paused;
        self
    }

    /// 알림 설정을 지정합니다.
    pub fn notification(mut self, notification: NotifySettings) -> Self {
        self.config.notification = notification;
        self
    }

    /// 설정을 검증하고 `EngineConfig`를 생성합니다.
    pub fn build(self) -> Result<EngineConfig, EngineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        EngineConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_converts_units() {
        let mut core = LogwatchConfig::default();
        core.watcher.max_chunk_kb = 4;
        core.watcher.max_line_kb = 1;
        core.watcher.backlog_boost_threshold_mb = 2;
        core.notification.pinned_cooldown_secs = 30;

        let config = EngineConfig::from_core(&core);
        assert_eq!(config.generic_limits.chunk_bytes, 4096);
        assert_eq!(config.generic_limits.line_bytes, 1024);
        assert_eq!(config.boost.threshold_bytes, 2 * 1024 * 1024);
        assert_eq!(config.notification.pinned_cooldown, Duration::from_secs(30));
        assert_eq!(config.high_volume_limits.chunk_bytes, 8192 * 1024);
    }

    #[test]
    fn from_core_clamps_poll_interval() {
        let mut core = LogwatchConfig::default();
        core.watcher.poll_interval_ms = 10;
        assert_eq!(EngineConfig::from_core(&core).poll_interval, MIN_POLL_INTERVAL);

        core.watcher.poll_interval_ms = 60_000;
        assert_eq!(EngineConfig::from_core(&core).poll_interval, MAX_POLL_INTERVAL);
    }

    #[test]
    fn from_core_clamps_levels() {
        let mut core = LogwatchConfig::default();
        core.notification.pinned_min_level = 7;
        let config = EngineConfig::from_core(&core);
        assert_eq!(
            config.notification.pinned_rollup,
            LevelRollup::ErrorsWarningsFails
        );
    }

    #[test]
    fn active_roots_respects_high_volume_toggle() {
        let config = EngineConfigBuilder::new()
            .roots(vec![PathBuf::from("/logs")])
            .high_volume_roots(vec![PathBuf::from("/logs/Script")])
            .watch_high_volume(false)
            .build()
            .unwrap();
        assert_eq!(config.active_roots(), vec![(PathBuf::from("/logs"), false)]);

        let config = EngineConfig {
            watch_high_volume: true,
            ..config
        };
        assert_eq!(config.active_roots().len(), 2);
        assert!(config.active_roots()[1].1);
    }

    #[test]
    fn restart_kind_detects_replay_toggle() {
        let base = EngineConfig::default();
        let on = EngineConfig {
            replay_from_start: true,
            ..base.clone()
        };
        assert_eq!(base.restart_kind(&on), RestartKind::ReplayOn);
        assert_eq!(on.restart_kind(&base), RestartKind::ReplayOff);
    }

    #[test]
    fn restart_kind_detects_source_changes() {
        let base = EngineConfig::default();
        let toggled = EngineConfig {
            watch_high_volume: !base.watch_high_volume,
            ..base.clone()
        };
        assert_eq!(base.restart_kind(&toggled), RestartKind::SourcesChanged);
    }

    #[test]
    fn restart_kind_ignores_non_structural_fields() {
        let base = EngineConfig::default();
        let mut next = base.clone();
        next.cache_capacity = 10;
        next.poll_interval = Duration::from_secs(1);
        next.notification.pinned_cooldown = Duration::from_secs(1);
        assert_eq!(base.restart_kind(&next), RestartKind::None);
        assert!(!base.restart_kind(&next).is_required());
    }

    #[test]
    fn replay_toggle_wins_over_source_change() {
        let base = EngineConfig::default();
        let next = EngineConfig {
            replay_from_start: true,
            watch_high_volume: !base.watch_high_volume,
            ..base.clone()
        };
        assert_eq!(base.restart_kind(&next), RestartKind::ReplayOn);
    }

    #[test]
    fn validate_rejects_bad_include_pattern() {
        let result = EngineConfigBuilder::new()
            .file_patterns("(unclosed", "")
            .build();
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[test]
    fn validate_rejects_bad_rule_pattern() {
        let result = EngineConfigBuilder::new()
            .rules(vec![RuleConfig::new("error", "[")])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let result = EngineConfigBuilder::new().cache_capacity(0).build();
        assert!(result.is_err());
    }

    #[test]
    fn builder_clamps_poll_interval() {
        let config = EngineConfigBuilder::new()
            .poll_interval(Duration::from_millis(1))
            .build()
            .unwrap();
        assert_eq!(config.poll_interval, MIN_POLL_INTERVAL);
    }
}
