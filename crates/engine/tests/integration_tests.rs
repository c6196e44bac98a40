//! 통합 테스트 -- 실제 파일을 사용한 감시 엔진 전체 흐름 검증
//!
//! 탐색부터 알림까지의 흐름과 재시작 프로토콜을 검증합니다.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use logwatch_core::types::{Counts, Severity};
use logwatch_engine::aggregator::CountsSnapshot;
use logwatch_engine::{
    ApplyStatus, EngineConfig, EngineConfigBuilder, MailKind, NotificationEngine, NotifySettings,
    RestartKind, RunState, Watcher,
};

const WAIT: Duration = Duration::from_secs(10);

fn config(dir: &Path, replay: bool) -> EngineConfig {
    EngineConfigBuilder::new()
        .roots(vec![dir.to_path_buf()])
        .poll_interval(Duration::from_millis(100))
        .replay_from_start(replay)
        .build()
        .expect("valid config")
}

fn append(path: &Path, text: &str) {
    let mut f = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .expect("open log");
    f.write_all(text.as_bytes()).expect("append");
    f.flush().expect("flush");
}

async fn wait_until(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

async fn settled(watcher: &Watcher) -> ApplyStatus {
    let mut rx = watcher.subscribe_apply();
    let status = tokio::time::timeout(WAIT, rx.wait_for(|s| s.is_settled()))
        .await
        .expect("apply timed out")
        .expect("apply channel closed")
        .clone();
    status
}

fn errors(watcher: &Watcher, key: &str) -> u64 {
    watcher
        .aggregator()
        .counts(key)
        .map(|c| c.errors)
        .unwrap_or(0)
}

/// 빈 파일에서 tail-from-now로 시작한 뒤 100바이트(3라인)가 추가되면 정확히 한 번씩 읽힘
#[tokio::test]
async fn test_growing_file_is_read_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Game_Net.log");
    fs::write(&log, "").unwrap();

    let watcher = Watcher::new(config(dir.path(), false)).unwrap();
    watcher.start().unwrap();
    wait_until("initial discovery", || watcher.file_count() == 1).await;

    let first = format!("[error] {}\n", "x".repeat(24));
    let second = format!("warning: {}\n", "y".repeat(23));
    let third = format!("load failed {}\n", "z".repeat(21));
    assert_eq!(first.len() + second.len() + third.len(), 100);

    append(&log, &first);
    append(&log, &second);
    wait_until("two lines", || {
        watcher.tail_state(&log).is_some_and(|s| s.line_no >= 2)
    })
    .await;
    append(&log, &third);
    wait_until("three lines", || {
        watcher.tail_state(&log).is_some_and(|s| s.line_no == 3)
    })
    .await;

    // 추가 사이클이 지나도 다시 읽지 않습니다.
    watcher.nudge();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let state = watcher.tail_state(&log).unwrap();
    assert_eq!(state.offset, 100);
    assert_eq!(state.line_no, 3);

    let counts = watcher.aggregator().counts("Game Net").unwrap();
    assert_eq!(
        counts,
        Counts {
            errors: 1,
            warnings: 1,
            fails: 1,
            others: 0,
        }
    );
    assert!(watcher.caught_up());

    watcher.stop().await.unwrap();
}

/// 500바이트에서 50바이트로 줄어든 파일은 오프셋 0부터 다시 읽음
#[tokio::test]
async fn test_truncated_file_restarts_from_zero() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Render.log");
    let line = format!("[error] {}\n", "e".repeat(41));
    assert_eq!(line.len(), 50);
    fs::write(&log, line.repeat(10)).unwrap();

    let watcher = Watcher::new(config(dir.path(), true)).unwrap();
    let report = watcher.scan_once().await.unwrap();
    assert_eq!(report.lines, 10);
    assert_eq!(watcher.tail_state(&log).unwrap().offset, 500);

    let shorter = format!("warning: {}\n", "w".repeat(40));
    assert_eq!(shorter.len(), 50);
    fs::write(&log, &shorter).unwrap();

    let report = watcher.scan_once().await.unwrap();
    assert_eq!(report.truncated, 1);
    assert_eq!(report.lines, 1);

    let state = watcher.tail_state(&log).unwrap();
    assert_eq!(state.offset, 50);
    assert_eq!(state.line_no, 1);

    let counts = watcher.aggregator().counts("Render").unwrap();
    assert_eq!(counts.errors, 10);
    assert_eq!(counts.warnings, 1);
}

/// 고정 키: 2개 증가는 무시되고 5개 증가는 알림 한 건을 생성
#[tokio::test]
async fn test_pinned_alert_thresholds() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Net.log");
    fs::write(&log, "").unwrap();

    let mut cfg = config(dir.path(), false);
    cfg.notification.pinned_min_new_issues = 3;
    let watcher = Watcher::new(cfg).unwrap();
    watcher.aggregator().set_pinned("Net", true);

    // 기준값 설정
    watcher.scan_once().await.unwrap();

    append(&log, "[error] a\n[error] b\n");
    let report = watcher.scan_once().await.unwrap();
    assert_eq!(report.notifications, 0);
    assert!(watcher.mailbox_snapshot().is_empty());

    append(&log, &"[error] boom\n".repeat(5));
    let report = watcher.scan_once().await.unwrap();
    assert_eq!(report.notifications, 1);

    let mailbox = watcher.mailbox_snapshot();
    assert_eq!(mailbox.len(), 1);
    assert_eq!(mailbox[0].kind, MailKind::Pinned);
    assert_eq!(mailbox[0].summary, "5 new errors");

    let messages = watcher.drain_messages();
    assert_eq!(messages.len(), 1);
    let styled: Vec<_> = messages[0]
        .segments
        .iter()
        .filter(|s| s.severity == Some(Severity::Error))
        .map(|s| s.text.as_str())
        .collect();
    assert_eq!(styled, vec!["5 errors"]);
    assert!(watcher.drain_messages().is_empty());
}

/// 주기 요약: 첫 사이클은 기준값만, 70초 뒤 두 키를 레벨 카운트 순으로 나열
#[test]
fn test_periodic_summary_window() {
    let mut engine = NotificationEngine::new(NotifySettings {
        periodic_interval: Duration::from_secs(60),
        pinned_enabled: false,
        ..NotifySettings::default()
    });
    let t0 = Instant::now();
    let snapshot = |entries: &[(&str, u64)]| -> CountsSnapshot {
        entries
            .iter()
            .map(|(k, e)| {
                (
                    (*k).to_owned(),
                    Counts {
                        errors: *e,
                        ..Counts::default()
                    },
                )
            })
            .collect()
    };

    assert!(
        engine
            .evaluate(&snapshot(&[("Audio", 1), ("Net", 1)]), &[], t0)
            .is_empty()
    );

    let produced = engine.evaluate(
        &snapshot(&[("Audio", 3), ("Net", 6)]),
        &[],
        t0 + Duration::from_secs(70),
    );
    assert_eq!(produced.len(), 1);
    let keys: Vec<_> = produced[0].sources.iter().map(|s| s.key.as_str()).collect();
    assert_eq!(keys, vec!["Net", "Audio"]);
    assert_eq!(engine.mailbox_snapshot().len(), 1);
}

/// 재생 모드 켜기/끄기: 통계 백업 후 전체 재생, 끄면 이전 통계 복원
#[tokio::test]
async fn test_replay_toggle_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("Net.log");
    fs::write(&log, "[error] old one\n[error] old two\n").unwrap();

    let watcher = Watcher::new(config(dir.path(), false)).unwrap();
    let mut caught_up = watcher.subscribe_caught_up();
    watcher.start().unwrap();
    tokio::time::timeout(WAIT, caught_up.wait_for(|c| *c))
        .await
        .unwrap()
        .unwrap();

    append(&log, "[error] live\n");
    wait_until("live line", || errors(&watcher, "Net") == 1).await;

    let mut next = watcher.config();
    next.replay_from_start = true;
    assert_eq!(watcher.apply_config(next).unwrap(), RestartKind::ReplayOn);
    assert_eq!(settled(&watcher).await, ApplyStatus::Done(RestartKind::ReplayOn));
    assert!(watcher.is_running());
    wait_until("full replay", || errors(&watcher, "Net") == 3).await;
    assert!(watcher.aggregator().has_backup());

    let mut next = watcher.config();
    next.replay_from_start = false;
    assert_eq!(watcher.apply_config(next).unwrap(), RestartKind::ReplayOff);
    assert_eq!(settled(&watcher).await, ApplyStatus::Done(RestartKind::ReplayOff));
    wait_until("backup invalidated", || !watcher.aggregator().has_backup()).await;
    wait_until("caught up", || watcher.caught_up()).await;

    assert_eq!(errors(&watcher, "Net"), 1);
    let state = watcher.tail_state(&log).unwrap();
    assert_eq!(state.offset, fs::metadata(&log).unwrap().len());

    watcher.stop().await.unwrap();
}

/// 감시 대상 변경: 파일 상태와 통계를 모두 비우고 새 루트로 재시작
#[tokio::test]
async fn test_sources_change_clears_everything() {
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    fs::write(first.path().join("A.log"), "[error] a\n").unwrap();
    fs::write(second.path().join("B.log"), "[warn] b\n").unwrap();

    let watcher = Watcher::new(config(first.path(), true)).unwrap();
    watcher.aggregator().set_pinned("A", true);
    watcher.start().unwrap();
    wait_until("first root", || errors(&watcher, "A") == 1).await;

    let mut next = watcher.config();
    next.roots = vec![PathBuf::from(second.path())];
    assert_eq!(
        watcher.apply_config(next).unwrap(),
        RestartKind::SourcesChanged
    );
    assert_eq!(
        settled(&watcher).await,
        ApplyStatus::Done(RestartKind::SourcesChanged)
    );
    wait_until("second root", || {
        watcher.aggregator().counts("B").is_some_and(|c| c.warnings == 1)
    })
    .await;

    assert!(watcher.aggregator().counts("A").is_none());
    assert!(watcher.aggregator().is_pinned("A"));
    assert_eq!(watcher.file_count(), 1);

    watcher.stop().await.unwrap();
}

/// 일시 정지 중에는 새 라인을 읽지 않고, 재개하면 이어서 읽음
#[tokio::test]
async fn test_pause_and_resume() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("A.log");
    fs::write(&log, "").unwrap();

    let watcher = Watcher::new(config(dir.path(), false)).unwrap();
    watcher.start().unwrap();
    wait_until("discovery", || watcher.file_count() == 1).await;

    watcher.pause();
    wait_until("paused", || watcher.run_state() == RunState::Stopped).await;

    append(&log, "[error] while paused\n");
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(errors(&watcher, "A"), 0);

    watcher.resume();
    wait_until("resumed read", || errors(&watcher, "A") == 1).await;
    assert_eq!(watcher.state_name(), "running");

    watcher.stop().await.unwrap();
}

/// 사라진 파일은 추적에서 제거되고, 다시 생기면 새 파일로 추적
#[tokio::test]
async fn test_file_rotation_by_replacement() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("A.log");
    fs::write(&log, "[error] 1\n").unwrap();

    let watcher = Watcher::new(config(dir.path(), true)).unwrap();
    watcher.scan_once().await.unwrap();
    assert_eq!(errors(&watcher, "A"), 1);

    fs::remove_file(&log).unwrap();
    let report = watcher.scan_once().await.unwrap();
    assert_eq!(report.evicted, 1);
    assert!(watcher.tail_state(&log).is_none());

    fs::write(&log, "[error] 2\n").unwrap();
    let report = watcher.scan_once().await.unwrap();
    assert_eq!(report.new_files, 1);
    assert_eq!(errors(&watcher, "A"), 2);

    let recent = watcher.aggregator().recent("A", 1);
    assert_eq!(recent[0].line_no, 1);
    assert!(recent[0].when <= SystemTime::now());
}
