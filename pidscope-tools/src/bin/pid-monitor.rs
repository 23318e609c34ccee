// pid-monitor
//
// Live chart of the telemetry printed by a PID temperature controller on a
// serial port.
//
// Quit:  q / Esc / Ctrl-C, or SIGINT / SIGTERM / SIGHUP
// Bode:  b (when the margin analysis ran)

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use pidscope::analysis::{self, Analysis, CommandAnalyzer, Conclusion};
use pidscope::link::{discover, LinkOpener};
use pidscope::monitor::{stop_channel, Scheduler, Session, Severity};
use pidscope_tools::config::MonitorConfig;
use pidscope_tools::{tui, MonitorOpts};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pid-monitor",
    version,
    about = "Live chart of a serial PID temperature controller"
)]
struct Cli {
    #[command(flatten)]
    opts: MonitorOpts,

    #[arg(long = "analyze", help = "Run the loop margin analysis before streaming")]
    analyze: bool,

    #[arg(long = "log-file", help = "Log file [default: pid-monitor.log in the temp dir]")]
    log_file: Option<PathBuf>,

    #[arg(long = "list-ports", help = "List serial adapters and exit")]
    list_ports: bool,

    #[arg(long = "all", requires = "list_ports", help = "Include unrecognized adapters")]
    all: bool,
}

fn init_logging(path: &Path) -> Result<()> {
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("cannot open log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::sync::Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn list_ports(all: bool) -> Result<()> {
    let devices = discover::enum_devices(all)?;
    if devices.is_empty() {
        println!("No serial adapters found");
    }
    for dev in devices {
        println!(
            "{:<24} {:<16} {}",
            dev.name,
            format!("{:?}", dev.kind),
            dev.description.unwrap_or_default()
        );
    }
    Ok(())
}

/// Runs the margin analysis once. A failure becomes a notice; the chart
/// starts either way.
fn analyze(cfg: &MonitorConfig) -> (Option<Analysis>, Severity, String) {
    let result = CommandAnalyzer::new(&cfg.analysis.command)
        .and_then(|analyzer| analysis::run_once(&analyzer, &cfg.analysis.model));
    match result {
        Ok(a) => {
            let severity = match a.assessment.conclusion {
                Conclusion::Robust => Severity::Info,
                Conclusion::StableWithIssues => Severity::Warning,
                Conclusion::PossiblyUnstable => Severity::Error,
            };
            let mut text = format!("loop analysis: {:?}", a.assessment.conclusion);
            if !a.assessment.problems.is_empty() {
                text.push_str(&format!(" ({})", a.assessment.problems.join(", ")));
            }
            (Some(a), severity, text)
        }
        Err(e) => {
            tracing::warn!("stability analysis failed: {}", e);
            (None, Severity::Error, format!("stability analysis failed: {}", e))
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.list_ports {
        return list_ports(cli.all);
    }

    let mut cfg = cli.opts.resolve()?;
    if cli.analyze {
        cfg.analysis.enabled = true;
    }
    cfg.validate()?;

    let log_path = cli
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("pid-monitor.log"));
    init_logging(&log_path)?;
    tracing::info!("starting pid-monitor on {}", cfg.opener().describe());

    let mut session = Session::new(cfg.opener(), cfg.session_config());
    let analysis = if cfg.analysis.enabled {
        let (analysis, severity, text) = analyze(&cfg);
        session.notify(severity, text);
        analysis
    } else {
        None
    };

    let terminal = tui::setup().context("TUI setup failed")?;
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        tui::teardown();
        original_hook(panic_info);
    }));

    let mut renderer = tui::ChartRenderer::new(terminal, analysis);
    let show_bode = renderer.bode_toggle();
    let (stop_tx, stop_rx) = stop_channel();

    // Signals stop the scheduler like a key press, so the link is released
    // and the terminal restored on the way out.
    let signal_tx = stop_tx.clone();
    ctrlc::set_handler(move || {
        tracing::info!("termination signal received");
        let _ = signal_tx.try_send(());
    })
    .context("cannot install signal handler")?;

    // Keyboard handler
    std::thread::spawn(move || loop {
        let k = match event::read() {
            Ok(Event::Key(k)) if k.kind == KeyEventKind::Press => k,
            Ok(_) => continue,
            Err(_) => break,
        };
        let quit = k.code == KeyCode::Char('q')
            || k.code == KeyCode::Esc
            || (k.code == KeyCode::Char('c') && k.modifiers == KeyModifiers::CONTROL);
        if quit {
            let _ = stop_tx.try_send(());
            break;
        }
        if k.code == KeyCode::Char('b') {
            show_bode.fetch_xor(true, Ordering::Relaxed);
        }
    });

    let scheduler = Scheduler::new(cfg.tick_interval());
    tracing::info!("redrawing every {:?}", scheduler.interval());
    let result = scheduler.run(&mut session, &mut renderer, &stop_rx);
    tui::teardown();

    let frames = result.context("rendering failed")?;
    tracing::info!("rendered {} frames", frames);
    Ok(())
}
