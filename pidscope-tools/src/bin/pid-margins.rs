// pid-margins
//
// One-shot gain and phase margin report for the configured loop model.
// Exits with status 2 when the loop is possibly unstable.

use anyhow::Result;
use clap::Parser;
use pidscope::analysis::{self, CommandAnalyzer, Conclusion};
use pidscope_tools::MonitorOpts;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "pid-margins",
    version,
    about = "Stability margins of a PID loop with a first order plus dead time plant"
)]
struct Cli {
    #[command(flatten)]
    opts: MonitorOpts,

    #[arg(long = "bode", help = "Also print the Bode response")]
    bode: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut cfg = cli.opts.resolve()?;
    cfg.analysis.enabled = true;
    cfg.validate()?;

    let analyzer = CommandAnalyzer::new(&cfg.analysis.command)?;
    tracing::info!("running analyzer {}", analyzer.program());
    let result = analysis::run_once(&analyzer, &cfg.analysis.model)?;
    print!("{}", result);

    if cli.bode && !result.report.bode.is_empty() {
        println!();
        println!("{:>12}  {:>10}  {:>10}", "rad/s", "dB", "deg");
        for p in &result.report.bode {
            println!("{:>12.4}  {:>10.2}  {:>10.2}", p.omega, p.magnitude_db, p.phase_deg);
        }
    }

    if result.assessment.conclusion == Conclusion::PossiblyUnstable {
        std::process::exit(2);
    }
    Ok(())
}
