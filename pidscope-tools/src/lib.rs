pub mod config;
pub mod tui;

use clap::Parser;
use config::{ConfigError, MonitorConfig};
use std::path::PathBuf;

/// Options shared by the tools. Anything given here overrides the config
/// file.
#[derive(Parser, Debug, Clone, Default)]
pub struct MonitorOpts {
    /// YAML configuration file
    #[arg(short = 'c', long = "config", help = "Configuration file")]
    pub config: Option<PathBuf>,

    /// Serial port of the controller (e.g., /dev/ttyUSB0, COM3)
    #[arg(short = 'p', long = "port", help = "Serial port, auto-detected if omitted")]
    pub port: Option<String>,

    #[arg(short = 'b', long = "baud", help = "Baud rate [default: 9600]")]
    pub baud: Option<u32>,

    #[arg(long = "retry-budget", help = "Open attempts before giving up [default: 10]")]
    pub retry_budget: Option<u32>,

    #[arg(short = 'n', long = "capacity", help = "Samples kept in history [default: 300]")]
    pub capacity: Option<usize>,

    #[arg(long = "tick-ms", help = "Redraw interval in ms [default: 50]")]
    pub tick_ms: Option<u64>,

    #[arg(short = 'w', long = "window", help = "Minimum visible time span in s [default: 30]")]
    pub window_secs: Option<f64>,

    #[arg(long = "analyzer", help = "External margin analyzer program")]
    pub analyzer: Option<String>,

    /// Passed to the analyzer unchanged, one value per flag
    #[arg(
        long = "analyzer-arg",
        requires = "analyzer",
        allow_hyphen_values = true,
        help = "Argument for the analyzer program (repeatable)"
    )]
    pub analyzer_args: Vec<String>,

    #[arg(long = "kp")]
    pub kp: Option<f64>,
    #[arg(long = "ki")]
    pub ki: Option<f64>,
    #[arg(long = "kd")]
    pub kd: Option<f64>,
}

impl MonitorOpts {
    /// Loads the config file, if any, and applies the overrides.
    pub fn resolve(&self) -> Result<MonitorConfig, ConfigError> {
        let mut cfg = match &self.config {
            Some(path) => MonitorConfig::load(path)?,
            None => MonitorConfig::default(),
        };
        self.apply(&mut cfg);
        Ok(cfg)
    }

    pub fn apply(&self, cfg: &mut MonitorConfig) {
        if let Some(port) = &self.port {
            cfg.serial.port = Some(port.clone());
        }
        if let Some(baud) = self.baud {
            cfg.serial.baud = baud;
        }
        if let Some(budget) = self.retry_budget {
            cfg.serial.retry_budget = budget;
        }
        if let Some(capacity) = self.capacity {
            cfg.history.capacity = capacity;
        }
        if let Some(tick_ms) = self.tick_ms {
            cfg.render.tick_ms = tick_ms;
        }
        if let Some(window) = self.window_secs {
            cfg.render.window_secs = window;
        }
        if let Some(program) = &self.analyzer {
            cfg.analysis.command = std::iter::once(program.clone())
                .chain(self.analyzer_args.iter().cloned())
                .collect();
        }
        let gains = &mut cfg.analysis.model.controller;
        if let Some(kp) = self.kp {
            gains.kp = kp;
        }
        if let Some(ki) = self.ki {
            gains.ki = ki;
        }
        if let Some(kd) = self.kd {
            gains.kd = kd;
        }
    }
}
