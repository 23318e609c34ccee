//! Monitor
//!
//! The live view is driven by a `Scheduler` ticking a `Session`. A session
//! owns everything with state (the link, the history, counters, notices);
//! each tick connects if needed, ingests pending lines, and produces a
//! `Frame` for the `Renderer`.

mod scheduler;
mod session;

pub use scheduler::{stop_channel, Scheduler, DEFAULT_TICK_INTERVAL};
pub use session::{Session, SessionConfig};

use crate::data::Snapshot;
use crate::link::ConnectionState;
use crate::view::Viewport;

use std::collections::VecDeque;
use std::io;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No tick has run yet.
    Idle,
    /// Still trying to open the link.
    Connecting,
    Streaming,
    /// No link and no more attempts. The chart keeps the last data.
    Exhausted,
    Closed,
}

impl MonitorState {
    fn from_link(state: ConnectionState) -> MonitorState {
        match state {
            ConnectionState::Unopened => MonitorState::Connecting,
            ConnectionState::Open => MonitorState::Streaming,
            ConnectionState::FailedPermanently => MonitorState::Exhausted,
            ConnectionState::Closed => MonitorState::Closed,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MonitorState::Idle => "IDLE",
            MonitorState::Connecting => "CONNECTING",
            MonitorState::Streaming => "STREAMING",
            MonitorState::Exhausted => "NO LINK",
            MonitorState::Closed => "CLOSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A message meant for the person watching the chart.
#[derive(Debug, Clone)]
pub struct Notice {
    pub timestamp: SystemTime,
    pub severity: Severity,
    pub text: String,
}

/// Most recent notices, newest first.
#[derive(Debug, Clone)]
pub struct NoticeLog {
    entries: VecDeque<Notice>,
    size: usize,
}

impl NoticeLog {
    pub fn new(size: usize) -> NoticeLog {
        NoticeLog {
            entries: VecDeque::with_capacity(size),
            size,
        }
    }

    pub fn push(&mut self, severity: Severity, text: impl Into<String>) {
        self.entries.push_front(Notice {
            timestamp: SystemTime::now(),
            severity,
            text: text.into(),
        });
        self.entries.truncate(self.size);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Notice> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Line counters since the session started.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub accepted: u64,
    pub rejected: u64,
    /// Lines that had undecodable bytes dropped, whether accepted or not.
    pub noisy: u64,
    /// Parse diagnostics shown so far.
    pub diagnostics: u32,
}

/// Everything a renderer needs to draw one tick.
pub struct Frame<'a> {
    pub state: MonitorState,
    pub link: String,
    pub snapshot: &'a Snapshot,
    pub viewport: &'a Viewport,
    pub stats: &'a IngestStats,
    pub notices: &'a NoticeLog,
    pub capacity: usize,
}

pub trait Renderer {
    fn render(&mut self, frame: &Frame<'_>) -> io::Result<()>;
}
