#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use logwatch_core::config::{RuleConfig, default_rules};
use logwatch_engine::classify::Classifier;

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    /// 사용자 규칙 (최대 8개까지만 사용)
    rules: Vec<(String, String)>,
    line: String,
}

fuzz_target!(|input: FuzzInput| {
    // 기본 규칙은 비어 있지 않은 모든 라인을 분류해야 합니다.
    if let Ok(classifier) = Classifier::from_rules(&default_rules()) {
        let result = classifier.classify(&input.line);
        assert_eq!(result.is_some(), !input.line.is_empty());
    }

    // 임의 규칙: 컴파일 실패는 에러로, 분류는 패닉 없이 끝나야 합니다.
    let rules: Vec<RuleConfig> = input
        .rules
        .into_iter()
        .take(8)
        .map(|(name, pattern)| RuleConfig::new(name, pattern))
        .collect();
    if let Ok(classifier) = Classifier::from_rules(&rules) {
        let _ = classifier.classify(&input.line);
    }
});
