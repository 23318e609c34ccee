use pidscope::data::Channel;
use pidscope::link::{ConnectionState, LinkError, LinkOpener, RawLink};
use pidscope::monitor::{
    stop_channel, Frame, MonitorState, Renderer, Scheduler, Session, SessionConfig, Severity,
    DEFAULT_TICK_INTERVAL,
};
use pidscope::view::ViewConfig;

use crossbeam::channel::Sender;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::time::{Duration, Instant};

type Feed = Rc<RefCell<VecDeque<u8>>>;

struct FeedLink {
    feed: Feed,
    broken: Rc<Cell<bool>>,
    live: Rc<Cell<u32>>,
}

impl Drop for FeedLink {
    fn drop(&mut self) {
        self.live.set(self.live.get() - 1);
    }
}

impl io::Read for FeedLink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut feed = self.feed.borrow_mut();
        let n = buf.len().min(feed.len());
        for (dst, src) in buf.iter_mut().zip(feed.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }
}

impl RawLink for FeedLink {
    fn bytes_pending(&mut self) -> io::Result<usize> {
        if self.broken.get() {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"));
        }
        Ok(self.feed.borrow().len())
    }

    fn label(&self) -> String {
        "feed".into()
    }
}

/// Fails the first `failures` opens, then hands out links on a shared feed.
#[derive(Clone)]
struct Bench {
    failures: Rc<Cell<u32>>,
    calls: Rc<Cell<u32>>,
    feed: Feed,
    broken: Rc<Cell<bool>>,
    /// Links handed out and not yet dropped.
    live: Rc<Cell<u32>>,
}

impl Bench {
    fn new(failures: u32) -> Bench {
        Bench {
            failures: Rc::new(Cell::new(failures)),
            calls: Rc::default(),
            feed: Rc::default(),
            broken: Rc::default(),
            live: Rc::default(),
        }
    }

    fn send(&self, text: &str) {
        self.feed.borrow_mut().extend(text.as_bytes());
    }
}

impl LinkOpener for Bench {
    type Link = FeedLink;

    fn open(&mut self) -> Result<FeedLink, LinkError> {
        self.calls.set(self.calls.get() + 1);
        if self.failures.get() > 0 {
            self.failures.set(self.failures.get() - 1);
            return Err(LinkError::NoAdapter);
        }
        self.live.set(self.live.get() + 1);
        Ok(FeedLink {
            feed: self.feed.clone(),
            broken: self.broken.clone(),
            live: self.live.clone(),
        })
    }

    fn describe(&self) -> String {
        "bench".into()
    }
}

fn session(bench: &Bench, capacity: usize, retry_budget: u32) -> Session<Bench> {
    Session::new(
        bench.clone(),
        SessionConfig {
            capacity,
            retry_budget,
            ..Default::default()
        },
    )
}

const REFERENCE: &str = ">> 24.50,25.00,0.00,1.20,3.10,0.05,0.00,128.00\n";

#[test]
fn connects_then_streams() {
    let bench = Bench::new(1);
    let mut s = session(&bench, 300, 10);
    let t0 = Instant::now();
    assert_eq!(s.state(), MonitorState::Idle);

    assert_eq!(s.tick(t0).state, MonitorState::Connecting);

    bench.send(REFERENCE);
    let frame = s.tick(t0 + Duration::from_millis(50));
    assert_eq!(frame.state, MonitorState::Streaming);
    assert_eq!(frame.snapshot.len(), 1);
    assert_eq!(frame.snapshot.values(Channel::Temperature), &[24.5]);
    assert_eq!(frame.snapshot.times, vec![0.0]);
    assert_eq!(frame.link, "feed");

    let (_, pwm) = s.history().latest(Channel::PwmPercent).unwrap();
    assert!((pwm - 50.196).abs() < 1e-3);
    assert_eq!(bench.calls.get(), 2);
}

#[test]
fn samples_take_the_tick_time() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);
    let t0 = Instant::now();

    bench.send(REFERENCE);
    bench.send(REFERENCE);
    s.tick(t0);
    bench.send(REFERENCE);
    let frame = s.tick(t0 + Duration::from_millis(500));
    assert_eq!(frame.snapshot.times, vec![0.0, 0.0, 0.5]);
}

#[test]
fn bad_line_leaves_history_unchanged() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);
    let t0 = Instant::now();

    bench.send(REFERENCE);
    s.tick(t0);
    let before = s.history().snapshot();

    bench.send(">> bad,data\n");
    let frame = s.tick(t0 + Duration::from_millis(50));
    assert_eq!(*frame.snapshot, before);
    assert_eq!(frame.stats.accepted, 1);
    assert_eq!(frame.stats.rejected, 1);
}

#[test]
fn early_diagnostics_are_limited() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);

    for _ in 0..20 {
        bench.send(">> 1,2,3\n");
    }
    // Debug chatter without the prefix is never reported.
    bench.send("PID tuning loaded\n");
    s.tick(Instant::now());

    assert_eq!(s.stats().rejected, 21);
    assert_eq!(s.stats().diagnostics, 5);
    let warnings = s
        .notices()
        .iter()
        .filter(|n| n.severity == Severity::Warning)
        .count();
    assert!(warnings <= 5);
}

#[test]
fn history_keeps_most_recent() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 3, 10);
    let t0 = Instant::now();

    for (i, temp) in ["20", "21", "22", "23", "24"].iter().enumerate() {
        bench.send(&format!(">> {},25,0,0,0,0,0,0\n", temp));
        s.tick(t0 + Duration::from_secs(i as u64));
    }
    let frame = s.frame();
    assert_eq!(frame.snapshot.values(Channel::Temperature), &[22.0, 23.0, 24.0]);
    assert_eq!(frame.snapshot.times, vec![2.0, 3.0, 4.0]);
    assert_eq!(frame.capacity, 3);
}

#[test]
fn lines_split_across_ticks() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);
    let t0 = Instant::now();

    bench.send(">> 24.50,25.00,0.00,1");
    assert!(s.tick(t0).snapshot.is_empty());
    bench.send(".20,3.10,0.05,0.00,128.00\r\n");
    let frame = s.tick(t0 + Duration::from_millis(50));
    assert_eq!(frame.snapshot.values(Channel::PidP), &[1.2]);
}

#[test]
fn noise_is_stripped() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);

    bench.feed.borrow_mut().extend(b">> 24.50,25.00,0.00,1.20,3.10,0.05,0.00,128.00\xff\n");
    s.tick(Instant::now());
    assert_eq!(s.stats().accepted, 1);
    assert_eq!(s.stats().noisy, 1);
}

#[test]
fn gives_up_after_budget() {
    let bench = Bench::new(u32::MAX);
    let mut s = session(&bench, 300, 10);
    let t0 = Instant::now();

    for i in 0..9 {
        assert_eq!(s.tick(t0 + Duration::from_millis(50 * i)).state, MonitorState::Connecting);
    }
    assert_eq!(s.tick(t0).state, MonitorState::Exhausted);
    assert_eq!(bench.calls.get(), 10);

    for _ in 0..5 {
        assert_eq!(s.tick(t0).state, MonitorState::Exhausted);
    }
    assert_eq!(bench.calls.get(), 10);

    let errors: Vec<&str> = s
        .notices()
        .iter()
        .filter(|n| n.severity == Severity::Error)
        .map(|n| n.text.as_str())
        .collect();
    assert_eq!(errors.len(), 1);

    let warnings: Vec<&str> = s
        .notices()
        .iter()
        .filter(|n| n.severity == Severity::Warning)
        .map(|n| n.text.as_str())
        .collect();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("up to 10 attempts"));
}

#[test]
fn lost_link_freezes_chart() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);
    let t0 = Instant::now();

    bench.send(REFERENCE);
    s.tick(t0);
    bench.broken.set(true);
    let frame = s.tick(t0 + Duration::from_millis(50));
    assert_eq!(frame.state, MonitorState::Exhausted);
    assert_eq!(frame.snapshot.len(), 1);
    assert_eq!(bench.calls.get(), 1);
}

#[test]
fn axes_cover_observed_data() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);
    let t0 = Instant::now();

    bench.send(">> 41.0,25.0,0,-150.0,3.0,0.5,0,255\n");
    s.tick(t0);
    bench.send(">> 12.0,25.0,0,130.0,3.0,0.5,0,0\n");
    let frame = s.tick(t0 + Duration::from_secs(45));

    let cfg = ViewConfig::default();
    let v = frame.viewport;
    assert!(v.time.max >= v.time.min + cfg.window_secs);
    assert_eq!(v.time.min, 0.0);
    assert_eq!(v.time.max, 45.0);
    assert!(v.temperature.contains(41.0) && v.temperature.contains(12.0));
    assert!(v.pid.contains(-150.0) && v.pid.contains(130.0));
    assert_eq!(v.pwm.as_array(), [0.0, 100.0]);
}

/// Records frames and asks the scheduler to stop after a few.
struct StopAfter {
    frames: u64,
    limit: u64,
    stop: Sender<()>,
    states: Vec<MonitorState>,
}

impl Renderer for StopAfter {
    fn render(&mut self, frame: &Frame<'_>) -> io::Result<()> {
        self.frames += 1;
        self.states.push(frame.state);
        if self.frames == self.limit {
            let _ = self.stop.try_send(());
        }
        Ok(())
    }
}

#[test]
fn scheduler_stops_and_tears_down() {
    let bench = Bench::new(0);
    bench.send(REFERENCE);
    let mut s = session(&bench, 300, 10);
    let (tx, rx) = stop_channel();
    let mut renderer = StopAfter {
        frames: 0,
        limit: 3,
        stop: tx,
        states: Vec::new(),
    };

    let frames = Scheduler::new(Duration::from_millis(1))
        .run(&mut s, &mut renderer, &rx)
        .unwrap();
    assert_eq!(frames, 3);
    assert_eq!(renderer.states, vec![MonitorState::Streaming; 3]);
    assert_eq!(s.state(), MonitorState::Closed);
    assert_eq!(s.connection().state(), ConnectionState::Closed);
    assert_eq!(bench.live.get(), 0);
    assert_eq!(s.history().len(), 1);

    // A closed session no longer ticks.
    bench.send(REFERENCE);
    assert_eq!(s.tick(Instant::now()).state, MonitorState::Closed);
    assert_eq!(s.history().len(), 1);
    assert_eq!(bench.calls.get(), 1);
    assert_eq!(bench.live.get(), 0);
}

struct Failing;

impl Renderer for Failing {
    fn render(&mut self, _frame: &Frame<'_>) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "terminal gone"))
    }
}

#[test]
fn render_failure_still_tears_down() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);
    let (_tx, rx) = stop_channel();

    let result = Scheduler::default().run(&mut s, &mut Failing, &rx);
    assert!(result.is_err());
    assert_eq!(bench.calls.get(), 1);
    assert_eq!(s.state(), MonitorState::Closed);
    assert_eq!(bench.live.get(), 0);
}

struct Panicking;

impl Renderer for Panicking {
    fn render(&mut self, _frame: &Frame<'_>) -> io::Result<()> {
        panic!("renderer bug");
    }
}

#[test]
fn panic_in_renderer_releases_link() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);
    let (_tx, rx) = stop_channel();

    let result = panic::catch_unwind(AssertUnwindSafe(move || {
        Scheduler::default().run(&mut s, &mut Panicking, &rx)
    }));
    assert!(result.is_err());
    assert_eq!(bench.calls.get(), 1);
    assert_eq!(bench.live.get(), 0);
}

#[test]
fn stop_from_another_thread_interrupts_wait() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);
    let (tx, rx) = stop_channel();
    let mut renderer = StopAfter {
        frames: 0,
        limit: u64::MAX,
        stop: tx.clone(),
        states: Vec::new(),
    };

    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        let _ = tx.try_send(());
    });
    let started = Instant::now();
    let frames = Scheduler::new(Duration::from_secs(30))
        .run(&mut s, &mut renderer, &rx)
        .unwrap();
    stopper.join().unwrap();

    assert_eq!(frames, 1);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(s.state(), MonitorState::Closed);
    assert_eq!(bench.live.get(), 0);
}

#[test]
fn dropping_session_releases_link() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);
    s.tick(Instant::now());
    assert_eq!(bench.live.get(), 1);
    drop(s);
    assert_eq!(bench.live.get(), 0);
}

#[test]
fn dropped_stop_sender_stops() {
    let bench = Bench::new(0);
    let mut s = session(&bench, 300, 10);
    let (tx, rx) = stop_channel();
    drop(tx);

    let scheduler = Scheduler::default();
    assert_eq!(scheduler.interval(), DEFAULT_TICK_INTERVAL);
    let frames = scheduler
        .run(&mut s, &mut Failing, &rx)
        .unwrap();
    assert_eq!(frames, 0);
    assert_eq!(s.state(), MonitorState::Closed);
}
