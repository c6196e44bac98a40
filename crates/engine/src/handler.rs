//! 기본 수집 콜백
//!
//! 분류된 라인을 집계기에 전달하고 `debug` 레벨로 로그를 남깁니다.
//! 테스트에서는 [`MatchHandler`]를 구현한 다른 타입이나 클로저로 교체할 수 있습니다.

use std::sync::Arc;

use logwatch_core::pipeline::MatchHandler;
use logwatch_core::types::Match;

use crate::aggregator::Aggregator;

/// 집계기로 전달하는 기본 핸들러
#[derive(Debug, Clone)]
pub struct AggregatingHandler {
    aggregator: Arc<Aggregator>,
}

impl AggregatingHandler {
    /// 새 핸들러를 생성합니다.
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self { aggregator }
    }
}

impl MatchHandler for AggregatingHandler {
    fn on_match(&self, event: &Match) {
        tracing::debug!(
            key = Aggregator::key_of(&event.display_name),
            severity = %event.severity,
            line_no = event.line_no,
            text = %event.text,
            "classified line"
        );
        self.aggregator.add(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logwatch_core::types::Severity;
    use std::path::PathBuf;
    use std::time::SystemTime;

    #[test]
    fn forwards_to_aggregator() {
        let aggregator = Arc::new(Aggregator::new(10));
        let handler = AggregatingHandler::new(Arc::clone(&aggregator));
        handler.on_match(&Match {
            source: PathBuf::from("/logs/Net.log"),
            display_name: "Net.log".to_owned(),
            text: "boom".to_owned(),
            rule: "error".to_owned(),
            severity: Severity::Error,
            line_no: 7,
            when: SystemTime::now(),
        });
        assert_eq!(aggregator.counts("Net").unwrap().errors, 1);
        assert_eq!(aggregator.recent("Net", 1)[0].line_no, 7);
    }
}
