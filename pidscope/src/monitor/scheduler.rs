use super::{Renderer, Session};
use crate::link::LinkOpener;

use crossbeam::channel::{self, Receiver, Sender, TryRecvError};
use std::io;
use std::time::{Duration, Instant};

/// Default redraw period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

/// Returns the pair used to stop a running `Scheduler`. Sending a value or
/// dropping the sender both stop it.
pub fn stop_channel() -> (Sender<()>, Receiver<()>) {
    channel::bounded(1)
}

/// Runs session ticks on a fixed period, one at a time, on the calling
/// thread.
pub struct Scheduler {
    interval: Duration,
}

impl Scheduler {
    pub fn new(interval: Duration) -> Scheduler {
        Scheduler { interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Ticks and renders until `stop` fires or rendering fails. The session
    /// is torn down before returning, on both paths. Returns the number of
    /// frames rendered.
    pub fn run<O: LinkOpener, R: Renderer>(
        &self,
        session: &mut Session<O>,
        renderer: &mut R,
        stop: &Receiver<()>,
    ) -> io::Result<u64> {
        let ticker = channel::tick(self.interval);
        let mut frames = 0u64;

        let result = 'ticks: loop {
            match stop.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Disconnected) => break 'ticks Ok(frames),
            }

            let frame = session.tick(Instant::now());
            if let Err(e) = renderer.render(&frame) {
                tracing::error!("render failed: {}", e);
                break 'ticks Err(e);
            }
            frames += 1;

            crossbeam::select! {
                recv(stop) -> _ => break 'ticks Ok(frames),
                recv(ticker) -> _ => {}
            }
        };

        session.teardown();
        result
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new(DEFAULT_TICK_INTERVAL)
    }
}
