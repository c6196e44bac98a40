//! 청크 단위 읽기와 라인 분할
//!
//! 사이클마다 파일당 최대 `chunk_cap` 바이트만 읽어 I/O와 CPU 사용량을 제한합니다.
//! 백로그가 임계값을 넘으면 청크 크기를 배율만큼 늘려 더 빨리 따라잡되,
//! 설정된 상한을 넘지 않습니다.

use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::config::{BoostPolicy, ReadLimits};

/// 한 번에 미리 할당하는 최대 버퍼 크기
const MAX_PREALLOC: u64 = 1024 * 1024;

/// 파일 종류의 기본 한도와 백로그로 이번 사이클의 청크 크기를 결정합니다.
///
/// 부스트된 크기는 `cap_bytes`로 제한되지만 기본 청크 크기보다 작아지지는 않습니다.
pub fn chunk_cap(limits: ReadLimits, boost: &BoostPolicy, backlog: u64) -> u64 {
    let base = limits.chunk_bytes;
    if !boost.enabled || backlog <= boost.threshold_bytes {
        return base;
    }
    // f64 -> u64 변환은 포화됩니다.
    let boosted = (base as f64 * boost.factor) as u64;
    boosted.min(boost.cap_bytes).max(base)
}

/// `offset`부터 최대 `cap` 바이트를 읽습니다.
///
/// 반환된 버퍼의 길이가 실제로 읽은 바이트 수이며, 호출자는 정확히 그만큼 오프셋을
/// 전진시켜야 합니다.
pub async fn read_chunk(path: &Path, offset: u64, cap: u64) -> std::io::Result<Bytes> {
    let mut file = tokio::fs::File::open(path).await?;
    file.seek(SeekFrom::Start(offset)).await?;

    let prealloc = usize::try_from(cap.min(MAX_PREALLOC)).unwrap_or(0);
    let mut buf = Vec::with_capacity(prealloc);
    file.take(cap).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

/// 분할된 라인 한 건
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line<'a> {
    /// 종료 문자를 제외한 라인 내용
    Text(&'a [u8]),
    /// 길이 제한을 넘어 버려진 라인
    Oversized(usize),
}

/// 청크를 라인 단위로 나누는 반복자
///
/// `\n`, `\r`, `\r\n`을 모두 하나의 종료 문자로 취급하며, 청크 끝의 종료 문자
/// 뒤에는 빈 레코드를 만들지 않습니다.
#[derive(Debug, Clone)]
pub struct Lines<'a> {
    buf: &'a [u8],
    pos: usize,
    max_len: usize,
}

impl<'a> Lines<'a> {
    /// 새 라인 분할기를 생성합니다.
    pub fn new(buf: &'a [u8], max_len: usize) -> Self {
        Self {
            buf,
            pos: 0,
            max_len,
        }
    }

    /// 아직 소비하지 않은 바이트 수
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}

impl<'a> Iterator for Lines<'a> {
    type Item = Line<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.buf.len() {
            return None;
        }

        let rest = &self.buf[self.pos..];
        let (line, consumed) = match rest.iter().position(|&b| b == b'\n' || b == b'\r') {
            Some(i) => {
                let width = if rest[i] == b'\r' && rest.get(i + 1) == Some(&b'\n') {
                    2
                } else {
                    1
                };
                (&rest[..i], i + width)
            }
            None => (rest, rest.len()),
        };
        self.pos += consumed;

        if line.len() > self.max_len {
            Some(Line::Oversized(line.len()))
        } else {
            Some(Line::Text(line))
        }
    }
}
