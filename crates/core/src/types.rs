//! 도메인 타입 -- 시스템 전역에서 사용되는 공통 타입
//!
//! 분류기, 집계기, 알림 엔진이 공유하는 값 타입을 정의합니다.

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

/// 모든 심각도를 포함하는 비트마스크
pub const MASK_ALL: u8 = 0x0F;

/// 로그 라인 심각도
///
/// 분류 규칙 이름에서 결정되며, 집계기의 카운터와 비트마스크에 대응합니다.
/// `Ord` 구현은 중요도 순서입니다 (`Error < Warning < Fail < Other`).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 에러 / 치명적 에러
    Error,
    /// 경고
    Warning,
    /// 실패 (fail, failed, failure)
    Fail,
    /// 나머지 모든 라인
    #[default]
    Other,
}

impl Severity {
    /// 전체 심각도 목록 (중요도 순)
    pub const ALL: [Severity; 4] = [Self::Error, Self::Warning, Self::Fail, Self::Other];

    /// 심각도 비트마스크 (Error=1, Warning=2, Fail=4, Other=8)
    pub fn mask(self) -> u8 {
        match self {
            Self::Error => 1,
            Self::Warning => 2,
            Self::Fail => 4,
            Self::Other => 8,
        }
    }

    /// 소문자 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Fail => "fail",
            Self::Other => "other",
        }
    }

    /// 분류 규칙 이름에서 심각도를 결정합니다.
    ///
    /// 대소문자를 구분하지 않으며, 알 수 없는 이름은 `Other`로 취급합니다.
    pub fn from_rule_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "error" | "err" | "critical" | "crit" => Self::Error,
            "warning" | "warn" => Self::Warning,
            "fail" | "failed" | "failure" => Self::Fail,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 레벨 롤업 -- 알림 임계값과 정렬에 사용하는 심각도 합산 범위
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LevelRollup {
    /// 에러만
    Errors,
    /// 에러 + 경고
    #[default]
    ErrorsWarnings,
    /// 에러 + 경고 + 실패
    ErrorsWarningsFails,
}

impl LevelRollup {
    /// 설정 값(0, 1, 2)에서 롤업을 생성합니다. 2보다 큰 값은 2로 고정됩니다.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Self::Errors,
            1 => Self::ErrorsWarnings,
            _ => Self::ErrorsWarningsFails,
        }
    }

    /// 설정 값 표현
    pub fn level(self) -> u8 {
        match self {
            Self::Errors => 0,
            Self::ErrorsWarnings => 1,
            Self::ErrorsWarningsFails => 2,
        }
    }

    /// 경고가 롤업에 포함되는지 여부
    pub fn includes_warnings(self) -> bool {
        !matches!(self, Self::Errors)
    }

    /// 실패가 롤업에 포함되는지 여부
    pub fn includes_fails(self) -> bool {
        matches!(self, Self::ErrorsWarningsFails)
    }
}

/// 심각도별 누적 합계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counts {
    /// 에러 수
    pub errors: u64,
    /// 경고 수
    pub warnings: u64,
    /// 실패 수
    pub fails: u64,
    /// 기타 라인 수
    pub others: u64,
}

impl Counts {
    /// 해당 심각도의 카운터를 1 증가시킵니다.
    pub fn record(&mut self, severity: Severity) {
        let slot = match severity {
            Severity::Error => &mut self.errors,
            Severity::Warning => &mut self.warnings,
            Severity::Fail => &mut self.fails,
            Severity::Other => &mut self.others,
        };
        *slot = slot.saturating_add(1);
    }

    /// 해당 심각도의 카운터 값
    pub fn get(&self, severity: Severity) -> u64 {
        match severity {
            Severity::Error => self.errors,
            Severity::Warning => self.warnings,
            Severity::Fail => self.fails,
            Severity::Other => self.others,
        }
    }

    /// 기준값 대비 증가분을 계산합니다. 음수 차이는 0으로 고정됩니다.
    ///
    /// 카운터는 단조 증가하지만 clear/reset 이후에는 현재 값이
    /// 기준값보다 작아질 수 있습니다.
    pub fn diff(&self, baseline: &Counts) -> Counts {
        Counts {
            errors: self.errors.saturating_sub(baseline.errors),
            warnings: self.warnings.saturating_sub(baseline.warnings),
            fails: self.fails.saturating_sub(baseline.fails),
            others: self.others.saturating_sub(baseline.others),
        }
    }

    /// 롤업 범위의 합계
    pub fn level_count(&self, rollup: LevelRollup) -> u64 {
        let mut total = self.errors;
        if rollup.includes_warnings() {
            total = total.saturating_add(self.warnings);
        }
        if rollup.includes_fails() {
            total = total.saturating_add(self.fails);
        }
        total
    }

    /// 전체 합계
    pub fn total(&self) -> u64 {
        self.errors
            .saturating_add(self.warnings)
            .saturating_add(self.fails)
            .saturating_add(self.others)
    }

    /// 다른 합계를 더합니다.
    pub fn accumulate(&mut self, other: &Counts) {
        self.errors = self.errors.saturating_add(other.errors);
        self.warnings = self.warnings.saturating_add(other.warnings);
        self.fails = self.fails.saturating_add(other.fails);
        self.others = self.others.saturating_add(other.others);
    }
}

impl fmt::Display for Counts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "errors={} warnings={} fails={} others={}",
            self.errors, self.warnings, self.fails, self.others
        )
    }
}

/// 분류된 로그 라인 한 건
///
/// 스케줄러가 라인마다 생성하여 수집 콜백([`MatchHandler`](crate::pipeline::MatchHandler))에
/// 한 번 전달하며, 그 자체로는 보관되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Match {
    /// 원본 파일 경로
    pub source: PathBuf,
    /// 파일 이름의 표시용 형태 (`My_ModName.log` -> `My Mod Name.log`)
    pub display_name: String,
    /// 정규화된 라인 텍스트
    pub text: String,
    /// 매칭된 분류 규칙 이름
    pub rule: String,
    /// 심각도
    pub severity: Severity,
    /// 파일 내 라인 번호 (1부터 시작)
    pub line_no: u64,
    /// 분류 시각
    pub when: SystemTime,
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}:{}: {}",
            self.severity, self.display_name, self.line_no, self.text
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_masks_are_distinct_bits() {
        let combined = Severity::ALL.iter().fold(0u8, |acc, s| acc | s.mask());
        assert_eq!(combined, MASK_ALL);
        assert_eq!(Severity::Error.mask(), 1);
        assert_eq!(Severity::Other.mask(), 8);
    }

    #[test]
    fn severity_from_rule_name() {
        assert_eq!(Severity::from_rule_name("error"), Severity::Error);
        assert_eq!(Severity::from_rule_name("WARNING"), Severity::Warning);
        assert_eq!(Severity::from_rule_name("fail"), Severity::Fail);
        assert_eq!(Severity::from_rule_name("other"), Severity::Other);
        assert_eq!(Severity::from_rule_name("custom"), Severity::Other);
    }

    #[test]
    fn severity_display() {
        assert_eq!(Severity::Error.to_string(), "error");
        assert_eq!(Severity::Warning.to_string(), "warning");
    }

    #[test]
    fn level_rollup_clamps_large_levels() {
        assert_eq!(LevelRollup::from_level(0), LevelRollup::Errors);
        assert_eq!(LevelRollup::from_level(1), LevelRollup::ErrorsWarnings);
        assert_eq!(LevelRollup::from_level(2), LevelRollup::ErrorsWarningsFails);
        assert_eq!(LevelRollup::from_level(9), LevelRollup::ErrorsWarningsFails);
    }

    #[test]
    fn counts_record_and_get() {
        let mut c = Counts::default();
        c.record(Severity::Error);
        c.record(Severity::Error);
        c.record(Severity::Fail);
        assert_eq!(c.get(Severity::Error), 2);
        assert_eq!(c.get(Severity::Fail), 1);
        assert_eq!(c.total(), 3);
    }

    #[test]
    fn counts_diff_clamps_negative() {
        let base = Counts {
            errors: 10,
            warnings: 2,
            fails: 0,
            others: 5,
        };
        let curr = Counts {
            errors: 3,
            warnings: 4,
            fails: 1,
            others: 5,
        };
        let d = curr.diff(&base);
        assert_eq!(d.errors, 0);
        assert_eq!(d.warnings, 2);
        assert_eq!(d.fails, 1);
        assert_eq!(d.others, 0);
    }

    #[test]
    fn counts_level_count_rollups() {
        let c = Counts {
            errors: 1,
            warnings: 2,
            fails: 4,
            others: 8,
        };
        assert_eq!(c.level_count(LevelRollup::Errors), 1);
        assert_eq!(c.level_count(LevelRollup::ErrorsWarnings), 3);
        assert_eq!(c.level_count(LevelRollup::ErrorsWarningsFails), 7);
    }

    #[test]
    fn match_display_contains_location() {
        let m = Match {
            source: PathBuf::from("/logs/Net_Core.log"),
            display_name: "Net Core.log".to_owned(),
            text: "socket closed".to_owned(),
            rule: "error".to_owned(),
            severity: Severity::Error,
            line_no: 7,
            when: SystemTime::UNIX_EPOCH,
        };
        assert_eq!(m.to_string(), "[error] Net Core.log:7: socket closed");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn counts() -> impl Strategy<Value = Counts> {
            (0u64..1000, 0u64..1000, 0u64..1000, 0u64..1000).prop_map(|(e, w, f, o)| Counts {
                errors: e,
                warnings: w,
                fails: f,
                others: o,
            })
        }

        proptest! {
            #[test]
            fn diff_never_exceeds_current(curr in counts(), base in counts()) {
                let d = curr.diff(&base);
                prop_assert!(d.errors <= curr.errors);
                prop_assert!(d.warnings <= curr.warnings);
                prop_assert!(d.fails <= curr.fails);
                prop_assert!(d.others <= curr.others);
            }

            #[test]
            fn level_count_is_monotonic_in_rollup(c in counts()) {
                let e = c.level_count(LevelRollup::Errors);
                let ew = c.level_count(LevelRollup::ErrorsWarnings);
                let ewf = c.level_count(LevelRollup::ErrorsWarningsFails);
                prop_assert!(e <= ew && ew <= ewf);
                prop_assert!(ewf <= c.total());
            }
        }
    }
}
