//! 메일박스와 표시용 메시지 큐
//!
//! 두 큐 모두 용량을 넘으면 가장 오래된 항목을 버립니다.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use logwatch_core::types::{Counts, Severity};

/// 알림 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MailKind {
    /// 주기 요약
    Periodic,
    /// 고정 키 알림
    Pinned,
}

impl MailKind {
    /// 로그/메트릭용 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Periodic => "periodic",
            Self::Pinned => "pinned",
        }
    }
}

impl fmt::Display for MailKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 키 하나의 증가분
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDiff {
    /// 집계 키
    pub key: String,
    /// 기준값 대비 증가분
    pub diff: Counts,
}

/// 메일박스 항목
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MailEntry {
    /// 항목 ID
    pub id: Uuid,
    /// 알림 종류
    pub kind: MailKind,
    /// 제목
    pub title: String,
    /// 요약
    pub summary: String,
    /// 생성 시각
    pub created_at: DateTime<Utc>,
    /// 키별 증가분
    pub sources: Vec<SourceDiff>,
}

impl MailEntry {
    /// 현재 시각으로 새 항목을 생성합니다.
    pub fn new(
        kind: MailKind,
        title: impl Into<String>,
        summary: impl Into<String>,
        sources: Vec<SourceDiff>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            title: title.into(),
            summary: summary.into(),
            created_at: Utc::now(),
            sources,
        }
    }
}

/// 용량 제한이 있는 알림 보관함
#[derive(Debug, Clone)]
pub struct Mailbox {
    entries: VecDeque<MailEntry>,
    capacity: usize,
}

impl Mailbox {
    /// 새 메일박스를 생성합니다.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    /// 항목을 추가합니다. 가장 오래된 항목이 밀려나면 `true`.
    pub fn push(&mut self, entry: MailEntry) -> bool {
        self.entries.push_back(entry);
        self.trim()
    }

    fn trim(&mut self) -> bool {
        let mut evicted = false;
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
            evicted = true;
        }
        evicted
    }

    /// 용량을 변경하고 초과분을 버립니다.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        self.trim();
    }

    /// 보관 중인 항목 복사본 (오래된 순)
    pub fn snapshot(&self) -> Vec<MailEntry> {
        self.entries.iter().cloned().collect()
    }

    /// 항목 수
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 최대 항목 수
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// 표시용 메시지 조각
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageSegment {
    /// 텍스트
    pub text: String,
    /// 강조 심각도 (`None`이면 일반 텍스트)
    pub severity: Option<Severity>,
}

impl MessageSegment {
    /// 일반 텍스트 조각
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: None,
        }
    }

    /// 심각도가 지정된 조각
    pub fn styled(text: impl Into<String>, severity: Severity) -> Self {
        Self {
            text: text.into(),
            severity: Some(severity),
        }
    }
}

/// 표시 계층에 전달되는 짧은 알림 메시지
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertMessage {
    /// 집계 키
    pub key: String,
    /// 메시지 조각
    pub segments: Vec<MessageSegment>,
}

impl fmt::Display for AlertMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.segments {
            f.write_str(&segment.text)?;
        }
        Ok(())
    }
}

/// 표시용 메시지 FIFO 큐
#[derive(Debug, Clone)]
pub struct MessageQueue {
    queue: VecDeque<AlertMessage>,
    capacity: usize,
}

impl MessageQueue {
    /// 새 메시지 큐를 생성합니다.
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// 메시지를 추가합니다. 가득 차면 가장 오래된 메시지를 버립니다.
    pub fn push(&mut self, message: AlertMessage) {
        if self.queue.len() >= self.capacity {
            self.queue.pop_front();
            tracing::debug!(capacity = self.capacity, "message queue full, dropped oldest message");
        }
        self.queue.push_back(message);
    }

    /// 용량을 변경합니다.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.queue.len() > self.capacity {
            self.queue.pop_front();
        }
    }

    /// 모든 메시지를 순서대로 꺼냅니다.
    pub fn drain(&mut self) -> Vec<AlertMessage> {
        self.queue.drain(..).collect()
    }

    /// 대기 중인 메시지 수
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
