#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`normalize`]: 로그 라인의 타임스탬프/태그/소스 위치 잡음 제거
//! - [`classify`]: 순서 기반 심각도 분류기와 파일 이름 필터
//! - [`tail`]: 파일별 소비 상태, 청크 읽기, 라인 분할
//! - [`discovery`]: 루트 디렉토리 재귀 탐색
//! - [`aggregator`]: 키별 카운터 + 링 버퍼 동시성 저장소 (백업/복원 모드 전환 포함)
//! - [`notify`]: 주기 요약과 고정 키 알림, 메일박스
//! - [`handler`]: 기본 수집 콜백
//! - [`watcher`]: 폴링 루프, 실행 상태, 재시작 프로토콜
//! - [`config`]: 엔진 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! discovery -> TailState -> read_chunk -> Lines -> Classifier + Normalizer
//!                                                      |
//!                                             MatchHandler (Aggregator)
//!                                                      |
//!                              counts snapshot -> NotificationEngine -> Mailbox
//! ```

pub mod aggregator;
pub mod classify;
pub mod config;
pub mod discovery;
pub mod error;
pub mod handler;
pub mod normalize;
pub mod notify;
pub mod tail;
pub mod watcher;

// --- 주요 타입 re-export ---

// 스케줄러
pub use watcher::{ApplyStatus, RunState, ScanReport, Watcher, WatcherBuilder};

// 설정
pub use config::{BoostPolicy, EngineConfig, EngineConfigBuilder, NotifySettings, ReadLimits, RestartKind};

// 에러
pub use error::EngineError;

// 집계
pub use aggregator::{Aggregator, CountsSnapshot, ModStats, Record, Snapshot};

// 분류/정규화
pub use classify::{Classifier, FileFilter};
pub use normalize::Normalizer;

// 알림
pub use notify::{AlertMessage, MailEntry, MailKind, MessageSegment, NotificationEngine};

// 파일 상태
pub use tail::{FileKind, FileRecord, TailState};

// 수집 콜백
pub use handler::AggregatingHandler;
