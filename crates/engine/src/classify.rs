//! 분류기와 파일 필터
//!
//! [`Classifier`]는 `(이름, 패턴)` 규칙을 선언 순서대로 평가하여 처음 매칭된 규칙으로
//! 라인의 심각도를 결정합니다. 어떤 규칙에도 매칭되지 않은 비어 있지 않은 라인은
//! `other`로 분류되므로 분류 단계에 도달한 라인은 항상 하나의 결과를 가집니다.
//!
//! [`FileFilter`]는 탐색된 파일을 감시할지 결정하는 이전 단계의 게이트입니다.
//! 파일 이름이 포함 패턴에 매칭되고 제외 패턴에는 매칭되지 않아야 합니다.

use std::path::Path;

use regex::Regex;

use logwatch_core::config::RuleConfig;
use logwatch_core::types::Severity;

use crate::error::EngineError;

/// 어떤 규칙에도 매칭되지 않은 라인의 규칙 이름
pub const FALLBACK_RULE: &str = "other";

/// 컴파일된 분류 규칙
#[derive(Debug, Clone)]
pub struct ClassifierRule {
    /// 규칙 이름
    pub name: String,
    /// 규칙 이름에서 결정된 심각도
    pub severity: Severity,
    /// 컴파일된 패턴
    regex: Regex,
}

impl ClassifierRule {
    /// 규칙을 컴파일합니다.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, EngineError> {
        let name = name.into();
        let severity = Severity::from_rule_name(&name);
        Ok(Self {
            name,
            severity,
            regex: Regex::new(pattern)?,
        })
    }

    /// 라인이 패턴에 매칭되는지 확인합니다.
    pub fn is_match(&self, line: &str) -> bool {
        self.regex.is_match(line)
    }
}

/// 분류 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification<'a> {
    /// 매칭된 규칙 이름
    pub rule: &'a str,
    /// 심각도
    pub severity: Severity,
}

/// 순서 기반 라인 분류기
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    rules: Vec<ClassifierRule>,
}

impl Classifier {
    /// 설정 규칙 목록을 컴파일합니다.
    ///
    /// 하나라도 컴파일에 실패하면 에러를 반환합니다.
    pub fn from_rules(rules: &[RuleConfig]) -> Result<Self, EngineError> {
        if rules.is_empty() {
            return Err(EngineError::Config {
                field: "rules".to_owned(),
                reason: "at least one rule is required".to_owned(),
            });
        }
        let rules = rules
            .iter()
            .map(|r| {
                ClassifierRule::new(&r.name, &r.pattern).map_err(|e| EngineError::Config {
                    field: format!("rules.{}", r.name),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// 규칙 없이 모든 라인을 `other`로 분류하는 분류기
    pub fn catch_all() -> Self {
        Self::default()
    }

    /// 규칙 수
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// 라인을 분류합니다. 빈 라인이면 `None`을 반환합니다.
    ///
    /// 규칙은 선언 순서대로 평가하며 처음 매칭된 규칙에서 멈춥니다.
    pub fn classify(&self, line: &str) -> Option<Classification<'_>> {
        if line.is_empty() {
            return None;
        }
        let hit = self
            .rules
            .iter()
            .find(|rule| rule.is_match(line))
            .map(|rule| Classification {
                rule: &rule.name,
                severity: rule.severity,
            });
        Some(hit.unwrap_or(Classification {
            rule: FALLBACK_RULE,
            severity: Severity::Other,
        }))
    }
}

/// 파일 이름 포함/제외 필터
#[derive(Debug, Clone)]
pub struct FileFilter {
    include: Regex,
    exclude: Option<Regex>,
}

impl FileFilter {
    /// 필터를 컴파일합니다. 제외 패턴이 빈 문자열이면 제외 규칙이 없습니다.
    pub fn new(include: &str, exclude: &str) -> Result<Self, EngineError> {
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(Regex::new(exclude)?)
        };
        Ok(Self {
            include: Regex::new(include)?,
            exclude,
        })
    }

    /// 경로의 파일 이름이 감시 대상인지 확인합니다.
    pub fn accepts(&self, path: &Path) -> bool {
        let Some(name) = path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        self.include.is_match(&name)
            && !self.exclude.as_ref().is_some_and(|ex| ex.is_match(&name))
    }
}
