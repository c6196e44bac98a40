//! 파일별 소비 상태 추적
//!
//! 감시 중인 파일마다 [`FileRecord`]가 하나씩 있고, 그 안의 [`TailState`]가
//! 읽은 위치(바이트 오프셋), 라인 카운터, 마지막으로 관찰한 크기/수정 시각을 기록합니다.
//!
//! # Truncation 감지
//! 현재 크기가 추적 중인 오프셋보다 작으면 오프셋 이전의 내용이 더 이상 존재하지
//! 않는 것이므로 오프셋과 라인 카운터를 0으로 되돌립니다.

pub mod reader;

pub use reader::{Line, Lines, chunk_cap, read_chunk};

use std::path::{Path, PathBuf};
use std::time::{Instant, SystemTime};

use crate::config::{EngineConfig, ReadLimits};
use crate::normalize::spacify;

/// 파일 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// 일반 로그 파일
    #[default]
    Generic,
    /// 대용량 소스 루트에서 발견된 파일
    HighVolume,
}

impl FileKind {
    /// 파일 종류에 해당하는 읽기 한도
    pub fn limits(self, config: &EngineConfig) -> ReadLimits {
        match self {
            Self::Generic => config.generic_limits,
            Self::HighVolume => config.high_volume_limits,
        }
    }

    /// 로그용 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generic => "generic",
            Self::HighVolume => "high_volume",
        }
    }
}

/// 크기 관찰 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// 읽을 내용 없음
    Idle,
    /// 새 바이트가 있음
    Grew {
        /// 미읽음 바이트 수
        unread: u64,
    },
    /// 파일이 줄어들어 처음부터 다시 읽음
    Truncated {
        /// 미읽음 바이트 수 (현재 크기 전체)
        unread: u64,
    },
}

impl Observation {
    /// 미읽음 바이트 수
    pub fn unread(self) -> u64 {
        match self {
            Self::Idle => 0,
            Self::Grew { unread } | Self::Truncated { unread } => unread,
        }
    }
}

/// 파일 하나의 소비 커서
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TailState {
    /// 다음 읽기 시작 위치
    pub offset: u64,
    /// 지금까지 처리한 라인 수 (마지막 라인 번호)
    pub line_no: u64,
    /// 마지막으로 관찰한 파일 크기
    pub size: u64,
    /// 마지막으로 관찰한 수정 시각
    pub modified: Option<SystemTime>,
    /// 마지막 폴링 시각
    pub last_poll: Option<Instant>,
}

impl TailState {
    /// 처음부터 읽는 상태 (재생 모드)
    pub fn from_start(size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            size,
            modified,
            ..Self::default()
        }
    }

    /// 현재 끝부터 읽는 상태 (tail-from-now)
    pub fn from_end(size: u64, modified: Option<SystemTime>) -> Self {
        Self {
            offset: size,
            size,
            modified,
            ..Self::default()
        }
    }

    /// 새 크기를 관찰하고 필요한 경우 truncation을 처리합니다.
    pub fn observe(&mut self, size: u64, modified: Option<SystemTime>) -> Observation {
        self.size = size;
        self.modified = modified;
        self.last_poll = Some(Instant::now());

        if size < self.offset {
            self.offset = 0;
            self.line_no = 0;
            return Observation::Truncated { unread: size };
        }

        match size - self.offset {
            0 => Observation::Idle,
            unread => Observation::Grew { unread },
        }
    }

    /// 미읽음 바이트 수
    pub fn unread(&self) -> u64 {
        self.size.saturating_sub(self.offset)
    }

    /// 끝까지 읽었는지 여부
    pub fn is_caught_up(&self) -> bool {
        self.offset >= self.size
    }

    /// 읽은 바이트와 처리한 라인만큼 커서를 전진시킵니다.
    ///
    /// 오프셋은 관찰한 크기를 넘지 않습니다.
    pub fn advance(&mut self, bytes: u64, lines: u64) {
        self.offset = self.offset.saturating_add(bytes).min(self.size);
        self.line_no = self.line_no.saturating_add(lines);
    }
}

/// 감시 중인 파일
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// 파일 경로
    pub path: PathBuf,
    /// 표시용 파일 이름
    pub display_name: String,
    /// 파일 종류
    pub kind: FileKind,
    /// 소비 상태
    pub state: TailState,
}

impl FileRecord {
    /// 새 파일 레코드를 생성합니다.
    pub fn new(path: PathBuf, kind: FileKind, state: TailState) -> Self {
        let display_name = display_name_of(&path);
        Self {
            path,
            display_name,
            kind,
            state,
        }
    }
}

/// 경로의 표시용 파일 이름 (`Net_CoreLib.log` -> `Net Core Lib.log`)
pub fn display_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| spacify(&n.to_string_lossy()))
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_end_starts_caught_up() {
        let state = TailState::from_end(120, None);
        assert_eq!(state.offset, 120);
        assert!(state.is_caught_up());
        assert_eq!(state.unread(), 0);
    }

    #[test]
    fn observe_growth() {
        let mut state = TailState::from_end(0, None);
        assert_eq!(state.observe(100, None), Observation::Grew { unread: 100 });
        assert_eq!(state.unread(), 100);
        assert!(state.last_poll.is_some());
    }

    #[test]
    fn observe_unchanged_is_idle() {
        let mut state = TailState::from_end(40, None);
        assert_eq!(state.observe(40, None), Observation::Idle);
    }

    #[test]
    fn observe_truncation_resets_cursor() {
        let mut state = TailState::from_start(500, None);
        state.advance(500, 12);
        assert_eq!(state.offset, 500);

        let obs = state.observe(50, None);
        assert_eq!(obs, Observation::Truncated { unread: 50 });
        assert_eq!(state.offset, 0);
        assert_eq!(state.line_no, 0);
    }

    #[test]
    fn advance_never_exceeds_size() {
        let mut state = TailState::from_start(10, None);
        state.advance(64, 1);
        assert_eq!(state.offset, 10);
        assert_eq!(state.line_no, 1);
    }

    #[test]
    fn display_name_is_spacified() {
        assert_eq!(
            display_name_of(Path::new("/logs/Net_CoreLib.log")),
            "Net Core Lib.log"
        );
    }

    #[test]
    fn kind_selects_limits() {
        let config = EngineConfig::default();
        assert_eq!(FileKind::Generic.limits(&config), config.generic_limits);
        assert_eq!(
            FileKind::HighVolume.limits(&config),
            config.high_volume_limits
        );
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn offset_never_exceeds_observed_size(
                steps in proptest::collection::vec((0u64..2000, 0u64..2000), 1..40)
            ) {
                let mut state = TailState::from_start(0, None);
                for (size, read) in steps {
                    let before = state.offset;
                    let obs = state.observe(size, None);
                    state.advance(read.min(obs.unread()), 1);
                    prop_assert!(state.offset <= size);
                    if !matches!(obs, Observation::Truncated { .. }) {
                        prop_assert!(state.offset >= before);
                    }
                }
            }
        }
    }
}
