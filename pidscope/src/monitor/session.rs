use super::{Frame, IngestStats, MonitorState, NoticeLog, Severity};
use crate::data::{History, Snapshot, DEFAULT_CAPACITY};
use crate::link::{Connection, ConnectionState, LinkEvent, LinkOpener, DEFAULT_RETRY_BUDGET};
use crate::proto;
use crate::view::{ViewConfig, Viewport};

use std::time::Instant;

/// Parse diagnostics shown before the first sample arrives. Once data
/// flows, bad lines are only counted.
const MAX_EARLY_DIAGNOSTICS: u32 = 5;

/// How much of an offending line to quote in a diagnostic.
const QUOTE_LEN: usize = 50;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub capacity: usize,
    pub retry_budget: u32,
    pub view: ViewConfig,
    pub notice_log_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            capacity: DEFAULT_CAPACITY,
            retry_budget: DEFAULT_RETRY_BUDGET,
            view: ViewConfig::default(),
            notice_log_size: 5,
        }
    }
}

/// State of one monitoring run, advanced one tick at a time.
pub struct Session<O: LinkOpener> {
    connection: Connection<O>,
    history: History,
    view: ViewConfig,
    state: MonitorState,
    stats: IngestStats,
    notices: NoticeLog,
    snapshot: Snapshot,
    viewport: Viewport,
}

impl<O: LinkOpener> Session<O> {
    pub fn new(opener: O, cfg: SessionConfig) -> Session<O> {
        Session {
            connection: Connection::new(opener, cfg.retry_budget),
            history: History::new(cfg.capacity),
            viewport: Viewport::initial(&cfg.view),
            view: cfg.view,
            state: MonitorState::Idle,
            stats: IngestStats::default(),
            notices: NoticeLog::new(cfg.notice_log_size),
            snapshot: Snapshot::default(),
        }
    }

    pub fn state(&self) -> MonitorState {
        self.state
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn connection(&self) -> &Connection<O> {
        &self.connection
    }

    pub fn stats(&self) -> &IngestStats {
        &self.stats
    }

    pub fn notices(&self) -> &NoticeLog {
        &self.notices
    }

    /// Adds a message from outside the pipeline, e.g. the analysis result.
    pub fn notify(&mut self, severity: Severity, text: impl Into<String>) {
        self.notices.push(severity, text);
    }

    /// Runs one pipeline step. Samples read during this tick are stamped
    /// with `now`.
    pub fn tick(&mut self, now: Instant) -> Frame<'_> {
        if self.state != MonitorState::Closed {
            if self.connection.ensure_connected() == ConnectionState::Open {
                self.ingest(now);
            }
            self.absorb_link_events();
            self.state = MonitorState::from_link(self.connection.state());

            self.snapshot = self.history.snapshot();
            self.viewport = Viewport::fit(&self.snapshot, &self.view);
        }
        self.frame()
    }

    /// The most recent frame, without advancing.
    pub fn frame(&self) -> Frame<'_> {
        Frame {
            state: self.state,
            link: self.connection.describe(),
            snapshot: &self.snapshot,
            viewport: &self.viewport,
            stats: &self.stats,
            notices: &self.notices,
            capacity: self.history.capacity(),
        }
    }

    /// Releases the link. The session stays readable but no longer ticks.
    pub fn teardown(&mut self) {
        if self.state == MonitorState::Closed {
            return;
        }
        self.connection.close();
        self.state = MonitorState::Closed;
        tracing::info!(
            "session closed: {} samples accepted, {} lines rejected",
            self.stats.accepted,
            self.stats.rejected
        );
    }

    fn ingest(&mut self, now: Instant) {
        for raw in self.connection.pending_lines() {
            let decoded = proto::decode(&raw);
            if decoded.noisy {
                self.stats.noisy += 1;
                tracing::trace!("dropped undecodable bytes from line");
            }
            match proto::parse_text(&decoded.text) {
                Ok(sample) => {
                    if self.history.is_empty() {
                        self.notices.push(
                            Severity::Info,
                            format!(
                                "receiving data (T={:.2}°C, setpoint={:.2}°C)",
                                sample.temperature, sample.setpoint
                            ),
                        );
                    }
                    tracing::trace!("{}", sample);
                    self.history.append(&sample, now);
                    self.stats.accepted += 1;
                }
                Err(rejected) => {
                    self.stats.rejected += 1;
                    tracing::trace!("rejected line {:?}: {}", decoded.text, rejected);
                    if rejected.is_malformed_record()
                        && self.history.is_empty()
                        && self.stats.diagnostics < MAX_EARLY_DIAGNOSTICS
                    {
                        self.stats.diagnostics += 1;
                        let quote: String = decoded.text.trim().chars().take(QUOTE_LEN).collect();
                        tracing::warn!("could not parse {:?}: {}", quote, rejected);
                        self.notices.push(
                            Severity::Warning,
                            format!("could not parse line: {}... ({})", quote, rejected),
                        );
                    }
                }
            }
        }
    }

    fn absorb_link_events(&mut self) {
        for event in self.connection.drain_events() {
            let (severity, text) = match event {
                LinkEvent::Opened { port } => (Severity::Info, format!("connected to {}", port)),
                LinkEvent::OpenFailed { error, .. } => (
                    Severity::Warning,
                    format!(
                        "cannot open {}: {}; retrying (up to {} attempts)",
                        self.connection.describe(),
                        error,
                        self.connection.retry_budget()
                    ),
                ),
                LinkEvent::GaveUp { attempts } => (
                    Severity::Error,
                    format!("no link after {} attempts, giving up", attempts),
                ),
                LinkEvent::Lost { error } => (Severity::Error, format!("link lost: {}", error)),
            };
            self.notices.push(severity, text);
        }
    }
}

impl<O: LinkOpener> Drop for Session<O> {
    fn drop(&mut self) {
        self.teardown();
    }
}
