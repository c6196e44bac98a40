//! 텍스트 정규화 -- 로그 라인에서 형식 잡음을 제거합니다.
//!
//! [`Normalizer::normalize`]는 다음 순서로 라인을 정리합니다.
//!
//! 1. 선두의 소스 위치 접두어 (`engine/net.cpp(42): ...`, `net.cpp:42: ...`)
//! 2. 소스 위치를 포함한 `[...]`, `(...)` 조각
//! 3. 여러 형식의 괄호 타임스탬프, pid/tid 태그
//! 4. 일반 `[word]`, `[123]` 태그
//! 5. 같은 장식 문자가 4개 이상 이어지는 구간 (`=====`, `----`)
//! 6. 공백 정리 (연속 공백 축약 + 양끝 제거)
//!
//! 결과는 로깅 형식과 무관하게 비교 가능한 표시용 문자열입니다.
//! 입력이 UTF-8이 아니어도 호출 측에서 lossy 변환 후 전달하므로 실패하지 않습니다.

use regex::Regex;

use crate::error::EngineError;

/// 소스 위치로 인식하는 확장자
const SOURCE_EXTENSIONS: &[&str] = &[
    "c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx", "ipp", "inl", "tpp", "ixx", "cppm",
];

/// 장식 문자 구간으로 취급하는 최소 반복 길이
const MIN_DECORATIVE_RUN: usize = 4;

/// 제거할 타임스탬프/태그 패턴 (적용 순서대로)
const NOISE_PATTERNS: &[&str] = &[
    // [2024-01-02 03:04:05.678]
    r"\[\d{4}-\d{2}-\d{2}\s+\d{2}[:-]\d{2}[:-]\d{2}(?:[.:]\d+)?\]",
    // [2024-01-02/03:04:05]
    r"\[\d{4}-\d{2}-\d{2}/\d{2}:\d{2}:\d{2}(?:[.:]\d+)?\]",
    // [1/2/2024 03:04:05]
    r"\[\d{1,2}/\d{1,2}/\d{2,4}\s+\d{2}[:-]\d{2}[:-]\d{2}(?:[.:]\d+)?\]",
    // [03:04:05.123 +09:00]
    r"\[\d{2}:\d{2}:\d{2}(?::\d+|\.\d+)?(?:\s*[+-]\d{2}:\d{2})?\]",
    // 1/2/2024 - 03:04:05 (line start)
    r"^\s*\d{1,2}/\d{1,2}/\d{2,4}\s*-\s*\d{2}:\d{2}:\d{2}(?:[.:]\d+)?\s*",
    // [pid: 12 | tid: 34]
    r"(?i)\[\s*pid\s*:\s*\d+\s*\|\s*tid\s*:\s*\d+\s*\]",
    // [info], [Render]
    r"\[\s*[A-Za-z_]+\s*\]",
    // [42]
    r"\[\s*\d+\s*\]",
];

/// 로그 라인 정규화기
///
/// 패턴은 생성 시 한 번 컴파일되며, 인스턴스는 스레드 간 공유해도 안전합니다.
#[derive(Debug, Clone)]
pub struct Normalizer {
    noise: Vec<Regex>,
}

impl Normalizer {
    /// 정규화기를 생성합니다.
    pub fn new() -> Result<Self, EngineError> {
        let noise = NOISE_PATTERNS
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { noise })
    }

    /// 라인을 정규화합니다.
    pub fn normalize(&self, line: &str) -> String {
        let mut s = strip_leading_location(line).to_owned();
        strip_enclosed_locations(&mut s, '[', ']', false);
        strip_enclosed_locations(&mut s, '(', ')', true);

        for re in &self.noise {
            if re.is_match(&s) {
                s = re.replace_all(&s, "").into_owned();
            }
        }

        let s = strip_decorative_runs(&s, MIN_DECORATIVE_RUN);
        collapse_whitespace(&s)
    }
}

fn is_space(c: char) -> bool {
    matches!(c, '\t'..='\r' | ' ')
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_decorative(c: char) -> bool {
    matches!(
        c,
        '*' | '>' | '<' | '-' | '=' | '_' | '~' | '#' | '.' | '!' | '/' | '\\' | '+' | '|' | ':'
    )
}

/// `dot` 위치의 `.` 뒤에 소스 확장자가 오는지 확인하고 확장자 끝 위치를 반환합니다.
fn source_extension_at(s: &str, dot: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let start = dot + 1;
    let mut end = start;
    while end < bytes.len() && is_word_byte(bytes[end]) {
        end += 1;
    }
    if end == start {
        return None;
    }
    let ext = s[start..end].to_ascii_lowercase();
    SOURCE_EXTENSIONS.contains(&ext.as_str()).then_some(end)
}

/// `[start, end)` 구간에 소스 위치(`name.ext`)가 있는지 확인합니다.
fn contains_source_location(s: &str, start: usize, end: usize) -> bool {
    s[start..end]
        .match_indices('.')
        .any(|(i, _)| source_extension_at(s, start + i).is_some())
}

/// 선두 소스 위치 접두어를 제거한 나머지를 반환합니다.
///
/// 첫 `[` 이전의 첫 `.` 뒤에 소스 확장자가 와야 하며, 이어지는
/// `(NN)`, `(NN):`, `:NN:` 와 공백까지 함께 제거합니다.
pub fn strip_leading_location(s: &str) -> &str {
    let guard = s.find('[').unwrap_or(s.len());
    let Some(dot) = s.find('.') else {
        return s;
    };
    if dot >= guard {
        return s;
    }
    let Some(mut i) = source_extension_at(s, dot) else {
        return s;
    };

    let bytes = s.as_bytes();
    let digits_from = |mut j: usize| {
        while j < bytes.len() && bytes[j].is_ascii_digit() {
            j += 1;
        }
        j
    };

    if i < bytes.len() && bytes[i] == b'(' {
        let j = digits_from(i + 1);
        if j < bytes.len() && bytes[j] == b')' {
            i = j + 1;
            if i < bytes.len() && bytes[i] == b':' {
                i += 1;
            }
        }
    } else if i < bytes.len() && bytes[i] == b':' {
        let mut j = digits_from(i + 1);
        if j < bytes.len() && bytes[j] == b':' {
            j += 1;
        }
        i = j;
    }

    s[i..].trim_start_matches(is_space)
}

/// 소스 위치를 포함한 괄호 조각을 제거합니다.
///
/// `colon_tail`이 참이면 닫는 괄호 뒤의 `:`와 공백도 함께 제거합니다.
fn strip_enclosed_locations(s: &mut String, open: char, close: char, colon_tail: bool) {
    let mut from = 0;
    loop {
        let Some(lo) = s[from..].find(open).map(|p| p + from) else {
            break;
        };
        let Some(hi) = s[lo + 1..].find(close).map(|p| p + lo + 1) else {
            break;
        };

        if !contains_source_location(s, lo + 1, hi) {
            from = hi + 1;
            continue;
        }

        let mut end = hi + 1;
        if colon_tail && s[end..].starts_with(':') {
            end += 1;
            end += s[end..].len() - s[end..].trim_start_matches(is_space).len();
        }
        s.replace_range(lo..end, "");
        from = lo;
    }
}

/// 같은 장식 문자가 `min_run`개 이상 이어지는 구간을 제거합니다.
pub fn strip_decorative_runs(s: &str, min_run: usize) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if !is_decorative(c) {
            out.push(c);
            continue;
        }
        let mut run = 1;
        while chars.peek() == Some(&c) {
            chars.next();
            run += 1;
        }
        if run < min_run {
            out.extend(std::iter::repeat_n(c, run));
        }
    }
    out
}

/// 연속 공백을 하나의 스페이스로 축약하고 양끝을 제거합니다.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for word in s.split(is_space).filter(|w| !w.is_empty()) {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out
}

/// 라인 양끝의 스페이스, 탭, CR, LF를 제거합니다.
pub fn trim_line(s: &str) -> &str {
    s.trim_matches(|c| matches!(c, ' ' | '\t' | '\r' | '\n'))
}

/// 파일 이름을 표시용 형태로 바꿉니다.
///
/// 연속된 `_`는 스페이스 하나로, 소문자 뒤의 대문자 앞에는 스페이스를 넣습니다.
/// (`My_ModName.log` -> `My Mod Name.log`)
pub fn spacify(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 8);
    let mut prev: Option<char> = None;
    for c in name.chars() {
        if c == '_' {
            if prev != Some('_') {
                out.push(' ');
            }
        } else {
            if let Some(p) = prev
                && p.is_ascii_lowercase()
                && c.is_ascii_uppercase()
            {
                out.push(' ');
            }
            out.push(c);
        }
        prev = Some(c);
    }
    out
}
