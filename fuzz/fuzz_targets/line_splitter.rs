#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use logwatch_engine::tail::{Line, Lines};

/// 퍼저용 구조적 입력
#[derive(Arbitrary, Debug)]
struct FuzzInput {
    chunk: Vec<u8>,
    /// 최대 라인 길이 (0은 1로 보정)
    max_len: u16,
}

fuzz_target!(|input: FuzzInput| {
    let max_len = usize::from(input.max_len).max(1);
    let mut lines = Lines::new(&input.chunk, max_len);
    let mut records = 0usize;
    for line in lines.by_ref() {
        match line {
            Line::Text(text) => {
                assert!(text.len() <= max_len);
                assert!(!text.contains(&b'\n') && !text.contains(&b'\r'));
            }
            Line::Oversized(len) => assert!(len > max_len),
        }
        records += 1;
    }
    // 끝까지 순회하면 남는 바이트가 없어야 합니다.
    assert_eq!(lines.remaining(), 0);
    assert!(records <= input.chunk.len());
});
