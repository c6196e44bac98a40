//! 설정 관리 -- logwatch.toml 파싱 및 런타임 설정
//!
//! [`LogwatchConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGWATCH_WATCHER_POLL_INTERVAL_MS=250` 형식)
//! 3. 설정 파일 (`logwatch.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), logwatch_core::error::LogwatchError> {
//! use logwatch_core::config::LogwatchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = LogwatchConfig::load("logwatch.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = LogwatchConfig::parse("[watcher]\nroots = [\"/srv/logs\"]")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, LogwatchError};

/// logwatch 통합 설정
///
/// `logwatch.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogwatchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파일 감시 / 분류 설정
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// 알림 설정
    #[serde(default)]
    pub notification: NotificationConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl LogwatchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, LogwatchError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, LogwatchError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                LogwatchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                LogwatchError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, LogwatchError> {
        toml::from_str(toml_str).map_err(|e| {
            LogwatchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `LOGWATCH_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "LOGWATCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "LOGWATCH_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.pins_file, "LOGWATCH_GENERAL_PINS_FILE");
        override_bool(
            &mut self.general.persist_pins,
            "LOGWATCH_GENERAL_PERSIST_PINS",
        );

        // Watcher
        override_csv(&mut self.watcher.roots, "LOGWATCH_WATCHER_ROOTS");
        override_csv(
            &mut self.watcher.high_volume_roots,
            "LOGWATCH_WATCHER_HIGH_VOLUME_ROOTS",
        );
        override_bool(
            &mut self.watcher.watch_high_volume,
            "LOGWATCH_WATCHER_WATCH_HIGH_VOLUME",
        );
        override_string(
            &mut self.watcher.include_pattern,
            "LOGWATCH_WATCHER_INCLUDE_PATTERN",
        );
        override_string(
            &mut self.watcher.exclude_pattern,
            "LOGWATCH_WATCHER_EXCLUDE_PATTERN",
        );
        override_u64(
            &mut self.watcher.poll_interval_ms,
            "LOGWATCH_WATCHER_POLL_INTERVAL_MS",
        );
        override_usize(
            &mut self.watcher.cache_capacity,
            "LOGWATCH_WATCHER_CACHE_CAPACITY",
        );
        override_bool(
            &mut self.watcher.replay_from_start,
            "LOGWATCH_WATCHER_REPLAY_FROM_START",
        );
        override_bool(&mut self.watcher.pause, "LOGWATCH_WATCHER_PAUSE");
        override_bool(
            &mut self.watcher.auto_boost_on_backlog,
            "LOGWATCH_WATCHER_AUTO_BOOST_ON_BACKLOG",
        );
        override_f64(
            &mut self.watcher.backlog_boost_factor,
            "LOGWATCH_WATCHER_BACKLOG_BOOST_FACTOR",
        );

        // Notification
        override_bool(&mut self.notification.enabled, "LOGWATCH_NOTIFICATION_ENABLED");
        override_bool(
            &mut self.notification.periodic_enabled,
            "LOGWATCH_NOTIFICATION_PERIODIC_ENABLED",
        );
        override_u64(
            &mut self.notification.periodic_interval_secs,
            "LOGWATCH_NOTIFICATION_PERIODIC_INTERVAL_SECS",
        );
        override_bool(
            &mut self.notification.pinned_enabled,
            "LOGWATCH_NOTIFICATION_PINNED_ENABLED",
        );
        override_u64(
            &mut self.notification.pinned_cooldown_secs,
            "LOGWATCH_NOTIFICATION_PINNED_COOLDOWN_SECS",
        );
        override_u64(
            &mut self.notification.pinned_min_new_issues,
            "LOGWATCH_NOTIFICATION_PINNED_MIN_NEW_ISSUES",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "LOGWATCH_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "LOGWATCH_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "LOGWATCH_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 정규식 컴파일 검증은 엔진 설정(`EngineConfig::validate`)에서 수행합니다.
    pub fn validate(&self) -> Result<(), LogwatchError> {
        const MAX_CACHE_CAPACITY: usize = 100_000;
        const MAX_CHUNK_KB: u64 = 1024 * 1024; // 1 GiB
        const MAX_BOOST_FACTOR: f64 = 64.0;

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.general.persist_pins && self.general.pins_file.is_empty() {
            return Err(invalid(
                "general.pins_file",
                "must not be empty when persist_pins is enabled",
            ));
        }

        let w = &self.watcher;
        if w.roots.is_empty() || w.roots.iter().any(|r| r.trim().is_empty()) {
            return Err(invalid(
                "watcher.roots",
                "at least one non-empty root is required",
            ));
        }
        if w.high_volume_roots.iter().any(|r| r.trim().is_empty()) {
            return Err(invalid("watcher.high_volume_roots", "must not contain empty paths"));
        }
        if w.include_pattern.is_empty() {
            return Err(invalid("watcher.include_pattern", "must not be empty"));
        }
        if w.rules.is_empty() {
            return Err(invalid("watcher.rules", "at least one rule is required"));
        }
        for rule in &w.rules {
            if rule.name.trim().is_empty() || rule.pattern.is_empty() {
                return Err(invalid(
                    "watcher.rules",
                    "every rule needs a non-empty name and pattern",
                ));
            }
        }
        if w.poll_interval_ms == 0 {
            return Err(invalid("watcher.poll_interval_ms", "must be greater than 0"));
        }
        if w.cache_capacity == 0 || w.cache_capacity > MAX_CACHE_CAPACITY {
            return Err(invalid(
                "watcher.cache_capacity",
                format!("must be 1-{}", MAX_CACHE_CAPACITY),
            ));
        }
        for (field, value) in [
            ("watcher.max_chunk_kb", w.max_chunk_kb),
            ("watcher.max_line_kb", w.max_line_kb),
            ("watcher.high_volume_max_chunk_kb", w.high_volume_max_chunk_kb),
            ("watcher.high_volume_max_line_kb", w.high_volume_max_line_kb),
        ] {
            if value == 0 || value > MAX_CHUNK_KB {
                return Err(invalid(field, format!("must be 1-{}", MAX_CHUNK_KB)));
            }
        }
        if !w.backlog_boost_factor.is_finite()
            || w.backlog_boost_factor < 1.0
            || w.backlog_boost_factor > MAX_BOOST_FACTOR
        {
            return Err(invalid(
                "watcher.backlog_boost_factor",
                format!("must be between 1.0 and {}", MAX_BOOST_FACTOR),
            ));
        }
        if w.max_boost_cap_mb == 0 {
            return Err(invalid("watcher.max_boost_cap_mb", "must be greater than 0"));
        }

        let n = &self.notification;
        if n.periodic_interval_secs == 0 {
            return Err(invalid(
                "notification.periodic_interval_secs",
                "must be greater than 0",
            ));
        }
        if n.periodic_max_sources == 0 {
            return Err(invalid(
                "notification.periodic_max_sources",
                "must be greater than 0",
            ));
        }
        if n.mailbox_capacity == 0 {
            return Err(invalid("notification.mailbox_capacity", "must be greater than 0"));
        }
        if n.message_queue_capacity == 0 {
            return Err(invalid(
                "notification.message_queue_capacity",
                "must be greater than 0",
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid("metrics.port", "must be non-zero when metrics are enabled"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> LogwatchError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 고정(pin) 키 저장 파일 경로
    pub pins_file: String,
    /// 고정 키 영속화 여부
    pub persist_pins: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            pins_file: "/var/lib/logwatch/pins.json".to_owned(),
            persist_pins: true,
        }
    }
}

/// 분류 규칙 하나 (이름 + 정규식)
///
/// 규칙은 선언 순서대로 평가되며 처음 매칭된 규칙이 심각도를 결정합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    /// 규칙 이름 (error, warning, fail, other 또는 사용자 정의)
    pub name: String,
    /// 정규식 패턴
    pub pattern: String,
}

impl RuleConfig {
    /// 규칙을 생성합니다.
    pub fn new(name: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            pattern: pattern.into(),
        }
    }
}

/// 기본 분류 규칙 집합 (대소문자 무시, 마지막 규칙은 catch-all)
pub fn default_rules() -> Vec<RuleConfig> {
    vec![
        RuleConfig::new(
            "error",
            r"(?i)(\[\s*(error|e|critical|crit)\s*\])|\(\s*(error|e|critical|crit)\s*\)|(^|\s)(ERROR|ERR|CRITICAL|CRIT)\b|(^|\s)error:|(^|\s)critical:",
        ),
        RuleConfig::new(
            "warning",
            r"(?i)(\[\s*warn(?:ing)?\s*\])|\(\s*warn(?:ing)?\s*\)|(^|\s)WARN(?:ING)?\b|(^|\s)warning:",
        ),
        RuleConfig::new("fail", r"(?i)(\bfail(?:ed|ure)?\b|\[\s*fail(?:ed|ure)?\s*\])"),
        RuleConfig::new("other", r".+"),
    ]
}

/// 파일 감시 / 분류 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// 감시 루트 디렉토리 목록 (재귀 탐색)
    pub roots: Vec<String>,
    /// 대용량 소스 루트 목록 (더 큰 청크/라인 한도 적용)
    pub high_volume_roots: Vec<String>,
    /// 대용량 소스 루트 포함 여부
    pub watch_high_volume: bool,
    /// 포함할 파일 이름 패턴
    pub include_pattern: String,
    /// 제외할 파일 이름 패턴 (빈 문자열이면 제외 없음)
    pub exclude_pattern: String,
    /// 분류 규칙 (순서 유지)
    pub rules: Vec<RuleConfig>,
    /// 폴링 주기 (밀리초, 100-5000으로 고정)
    pub poll_interval_ms: u64,
    /// 키당 보관 레코드 수
    pub cache_capacity: usize,
    /// 일반 파일 사이클당 최대 읽기 크기 (KB)
    pub max_chunk_kb: u64,
    /// 일반 파일 최대 라인 길이 (KB)
    pub max_line_kb: u64,
    /// 대용량 파일 사이클당 최대 읽기 크기 (KB)
    pub high_volume_max_chunk_kb: u64,
    /// 대용량 파일 최대 라인 길이 (KB)
    pub high_volume_max_line_kb: u64,
    /// 백로그 부스트 사용 여부
    pub auto_boost_on_backlog: bool,
    /// 부스트 시작 백로그 크기 (MB)
    pub backlog_boost_threshold_mb: u64,
    /// 부스트 배율
    pub backlog_boost_factor: f64,
    /// 부스트된 청크 최대 크기 (MB)
    pub max_boost_cap_mb: u64,
    /// 새 파일을 처음부터 읽을지 여부 (false면 현재 끝부터)
    pub replay_from_start: bool,
    /// 첫 사이클 이후 일시 정지
    pub pause: bool,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            roots: vec!["/var/log".to_owned()],
            high_volume_roots: Vec::new(),
            watch_high_volume: true,
            include_pattern: r"(?i)(?:^|[\\/]).+\.(?:log)$".to_owned(),
            exclude_pattern: r"(?i)(^|[\\/])crash-\d{4}-\d{2}-\d{2}-\d{2}-\d{2}-\d{2}\.log$"
                .to_owned(),
            rules: default_rules(),
            poll_interval_ms: 500,
            cache_capacity: 1000,
            max_chunk_kb: 2048,
            max_line_kb: 64,
            high_volume_max_chunk_kb: 8192,
            high_volume_max_line_kb: 256,
            auto_boost_on_backlog: true,
            backlog_boost_threshold_mb: 8,
            backlog_boost_factor: 2.0,
            max_boost_cap_mb: 10,
            replay_from_start: false,
            pause: false,
        }
    }
}

/// 알림 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    /// 알림 전체 활성화
    pub enabled: bool,
    /// 주기 요약 활성화
    pub periodic_enabled: bool,
    /// 주기 요약 간격 (초)
    pub periodic_interval_secs: u64,
    /// 주기 요약에 나열할 최대 소스 수
    pub periodic_max_sources: usize,
    /// 주기 요약 레벨 (0: 에러, 1: +경고, 2: +실패)
    pub periodic_min_level: u8,
    /// 고정 키 알림 활성화
    pub pinned_enabled: bool,
    /// 고정 키 알림 쿨다운 (초)
    pub pinned_cooldown_secs: u64,
    /// 고정 키 알림 최소 신규 이슈 수
    pub pinned_min_new_issues: u64,
    /// 고정 키 알림 레벨 (0: 에러, 1: +경고, 2: +실패)
    pub pinned_min_level: u8,
    /// 메일박스 최대 항목 수
    pub mailbox_capacity: usize,
    /// 표시용 메시지 큐 최대 길이
    pub message_queue_capacity: usize,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            periodic_enabled: true,
            periodic_interval_secs: 300,
            periodic_max_sources: 5,
            periodic_min_level: 1,
            pinned_enabled: true,
            pinned_cooldown_secs: 60,
            pinned_min_new_issues: 1,
            pinned_min_level: 1,
            mailbox_capacity: 200,
            message_queue_capacity: 64,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 경로 (현재 `/metrics`만 지원)
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9108,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.trim().parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_f64(target: &mut f64, env_key: &str) {
    override_parsed(target, env_key, "f64");
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
