#![no_main]

use libfuzzer_sys::fuzz_target;
use logwatch_engine::normalize::{Normalizer, spacify};

// 임의 UTF-8 입력에 대해 패닉이 없어야 합니다 (문자 경계 슬라이싱 포함).
fuzz_target!(|data: &str| {
    let Ok(normalizer) = Normalizer::new() else {
        return;
    };
    let once = normalizer.normalize(data);
    let _ = normalizer.normalize(&once);
    let _ = spacify(data);
});
