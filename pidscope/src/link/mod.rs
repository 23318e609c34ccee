//! Link management
//!
//! `Connection` owns the serial link for the lifetime of a monitoring
//! session:
//! - Opening it on demand, with a bounded number of attempts. An absent
//!   device costs at most `retry_budget` failed opens, after which the
//!   connection gives up for good.
//! - Turning the byte stream into complete lines. Reads only cover bytes
//!   that are already pending, so draining never waits on the device.
//! - Releasing the port on `close()` or when dropped.
//!
//! Opening goes through the `LinkOpener` trait so that the serial port can
//! be swapped for a scripted source.

pub mod discover;
mod linebuf;
pub mod serial;

pub use linebuf::{LineBuf, LINEBUF_SIZE};
pub use serial::{SerialLink, SerialOpener};

use std::collections::VecDeque;
use std::io;
use thiserror::Error;

/// Default number of open attempts before giving up.
pub const DEFAULT_RETRY_BUDGET: u32 = 10;

/// Upper bound on reads per `pending_lines()` pass, so that a device
/// streaming faster than we parse cannot keep a tick busy forever.
const MAX_REFILLS_PER_DRAIN: usize = 64;

#[derive(Error, Debug)]
pub enum LinkError {
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },
    #[error("failed to enumerate serial ports: {0}")]
    Enumeration(#[source] serialport::Error),
    #[error("no serial adapter found")]
    NoAdapter,
    #[error("found {0} serial adapters; please specify the port explicitly")]
    MultipleAdapters(usize),
    #[error("link I/O error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unopened,
    Open,
    /// Retry budget spent or link lost. Terminal.
    FailedPermanently,
    /// Released by `close()`. Terminal.
    Closed,
}

/// Things that happened to the link that a user should hear about.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    Opened { port: String },
    /// Only reported for the first failed attempt.
    OpenFailed { attempt: u32, error: String },
    GaveUp { attempts: u32 },
    Lost { error: String },
}

/// Byte source with a non-blocking view of how much data is waiting.
pub trait RawLink: io::Read {
    /// Number of bytes that can be read right now without waiting.
    fn bytes_pending(&mut self) -> io::Result<usize>;

    /// Human readable name of the link, for messages.
    fn label(&self) -> String;
}

/// Knows how to acquire a link. Called once per connection attempt.
pub trait LinkOpener {
    type Link: RawLink;

    fn open(&mut self) -> Result<Self::Link, LinkError>;

    /// Describes the link target even before it is opened.
    fn describe(&self) -> String;
}

pub struct Connection<O: LinkOpener> {
    opener: O,
    link: Option<O::Link>,
    state: ConnectionState,
    attempts: u32,
    retry_budget: u32,
    rxbuf: LineBuf,
    events: VecDeque<LinkEvent>,
}

impl<O: LinkOpener> Connection<O> {
    pub fn new(opener: O, retry_budget: u32) -> Connection<O> {
        Connection {
            opener,
            link: None,
            state: ConnectionState::Unopened,
            attempts: 0,
            retry_budget,
            rxbuf: LineBuf::new(),
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Failed open attempts so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    pub fn describe(&self) -> String {
        match &self.link {
            Some(link) => link.label(),
            None => self.opener.describe(),
        }
    }

    /// Makes one open attempt if the link is not open and the budget
    /// allows it. Idempotent once open or once given up.
    pub fn ensure_connected(&mut self) -> ConnectionState {
        if self.state != ConnectionState::Unopened {
            return self.state;
        }
        if self.attempts >= self.retry_budget {
            self.give_up();
            return self.state;
        }

        match self.opener.open() {
            Ok(link) => {
                let port = link.label();
                tracing::info!("connected to {}", port);
                self.rxbuf.flush();
                self.link = Some(link);
                self.state = ConnectionState::Open;
                self.events.push_back(LinkEvent::Opened { port });
            }
            Err(e) => {
                self.attempts += 1;
                if self.attempts == 1 {
                    tracing::warn!("failed to open {}: {}; retrying", self.opener.describe(), e);
                    self.events.push_back(LinkEvent::OpenFailed {
                        attempt: self.attempts,
                        error: e.to_string(),
                    });
                } else {
                    tracing::debug!("open attempt {} failed: {}", self.attempts, e);
                }
                if self.attempts >= self.retry_budget {
                    self.give_up();
                }
            }
        }
        self.state
    }

    fn give_up(&mut self) {
        self.state = ConnectionState::FailedPermanently;
        tracing::warn!(
            "giving up on {} after {} failed attempts",
            self.opener.describe(),
            self.attempts
        );
        self.events.push_back(LinkEvent::GaveUp {
            attempts: self.attempts,
        });
    }

    /// The link failed while open. No reconnection is attempted.
    fn lose(&mut self, error: io::Error) {
        tracing::warn!("lost link {}: {}", self.describe(), error);
        self.link = None;
        self.rxbuf.flush();
        self.state = ConnectionState::FailedPermanently;
        self.events.push_back(LinkEvent::Lost {
            error: error.to_string(),
        });
    }

    /// Complete lines available right now. Lines still being received stay
    /// buffered for the next call.
    pub fn pending_lines(&mut self) -> PendingLines<'_, O> {
        PendingLines {
            conn: self,
            refills: 0,
        }
    }

    pub fn drain_events(&mut self) -> Vec<LinkEvent> {
        self.events.drain(..).collect()
    }

    /// Releases the link, if open. The connection will not open again.
    pub fn close(&mut self) {
        if let Some(link) = self.link.take() {
            tracing::info!("releasing {}", link.label());
            drop(link);
        }
        self.rxbuf.flush();
        self.state = ConnectionState::Closed;
    }
}

impl<O: LinkOpener> Drop for Connection<O> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Iterator returned by `Connection::pending_lines()`.
pub struct PendingLines<'a, O: LinkOpener> {
    conn: &'a mut Connection<O>,
    refills: usize,
}

impl<O: LinkOpener> Iterator for PendingLines<'_, O> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            let conn = &mut *self.conn;
            if let Some(line) = conn.rxbuf.next_line() {
                return Some(line);
            }
            if self.refills >= MAX_REFILLS_PER_DRAIN {
                return None;
            }
            let link = conn.link.as_mut()?;
            let pending = match link.bytes_pending() {
                Ok(0) => return None,
                Ok(n) => n,
                Err(e) => {
                    conn.lose(e);
                    return None;
                }
            };
            if conn.rxbuf.full() {
                tracing::debug!("discarding line longer than {} bytes", LINEBUF_SIZE);
                conn.rxbuf.drop_overlong();
            }
            self.refills += 1;
            if let Err(e) = conn.rxbuf.refill(link, pending) {
                conn.lose(e);
                return None;
            }
        }
    }
}
