//! 엔진 에러 타입
//!
//! [`EngineError`]는 감시 엔진 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<EngineError> for LogwatchError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 스캔 루프 안의 파일시스템 에러는 대부분 이 타입으로 올라오지 않고
//! 로그만 남긴 채 건너뜁니다.

use logwatch_core::error::{ConfigError, LogwatchError, WatchError};

/// 감시 엔진 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 파일 읽기 실패
    #[error("read error: {path}: {reason}")]
    Read {
        /// 파일 경로
        path: String,
        /// 실패 사유
        reason: String,
    },

    /// 워커가 이미 실행 중
    #[error("watcher already running")]
    AlreadyRunning,

    /// 워커가 실행 중이 아님
    #[error("watcher not running")]
    NotRunning,

    /// 재시작 프로토콜 실패
    #[error("restart failed: {0}")]
    Restart(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl From<EngineError> for LogwatchError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Config { field, reason } => {
                LogwatchError::Config(ConfigError::InvalidValue { field, reason })
            }
            EngineError::AlreadyRunning => LogwatchError::Watch(WatchError::AlreadyRunning),
            EngineError::NotRunning => LogwatchError::Watch(WatchError::NotRunning),
            EngineError::Restart(reason) => LogwatchError::Watch(WatchError::RestartFailed(reason)),
            EngineError::Io(e) => LogwatchError::Io(e),
            other => LogwatchError::Watch(WatchError::InitFailed(other.to_string())),
        }
    }
}
