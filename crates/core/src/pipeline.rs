//! 수집 콜백 trait -- 분류된 라인의 확장 포인트 정의

use crate::types::Match;

/// 분류된 라인을 받는 수집 콜백
///
/// 스케줄러는 분류된 모든 라인에 대해 파일 순서대로 `on_match`를 호출합니다.
/// 기본 구현은 집계기에 전달하고 로그를 남기며, 테스트에서는 교체할 수 있습니다.
///
/// 스캔 루프 안에서 동기적으로 호출되므로 오래 블로킹하면 안 됩니다.
pub trait MatchHandler: Send + Sync {
    /// 분류된 라인 한 건을 처리합니다.
    fn on_match(&self, event: &Match);
}

impl<F> MatchHandler for F
where
    F: Fn(&Match) + Send + Sync,
{
    fn on_match(&self, event: &Match) {
        self(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Severity;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::SystemTime;

    #[test]
    fn closure_is_a_match_handler() {
        let seen = Mutex::new(Vec::new());
        let handler = |m: &Match| {
            seen.lock().unwrap().push(m.line_no);
        };

        let event = Match {
            source: PathBuf::from("a.log"),
            display_name: "a.log".to_owned(),
            text: "x".to_owned(),
            rule: "other".to_owned(),
            severity: Severity::Other,
            line_no: 3,
            when: SystemTime::now(),
        };
        handler.on_match(&event);
        handler.on_match(&event);

        assert_eq!(*seen.lock().unwrap(), vec![3, 3]);
    }
}
