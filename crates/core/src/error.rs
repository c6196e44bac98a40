//! 에러 타입 -- 도메인별 에러 정의

/// logwatch 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum LogwatchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 감시 엔진 에러
    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 감시 엔진 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// 이미 실행 중
    #[error("watcher already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("watcher not running")]
    NotRunning,

    /// 초기화 실패
    #[error("watcher init failed: {0}")]
    InitFailed(String),

    /// 재시작(설정 적용) 실패
    #[error("restart failed: {0}")]
    RestartFailed(String),
}
