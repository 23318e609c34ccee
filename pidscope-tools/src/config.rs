//! Monitor configuration file.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration:
//!
//! ```yaml
//! serial:
//!   port: /dev/ttyUSB0
//!   baud: 9600
//! history:
//!   capacity: 300
//! render:
//!   tick_ms: 50
//!   window_secs: 30
//! analysis:
//!   enabled: true
//!   command: [python3, margins.py]
//!   model:
//!     controller: { kp: 1.8, ki: 5.4, kd: 0.31 }
//! ```

use pidscope::analysis::LoopModel;
use pidscope::data::DEFAULT_CAPACITY;
use pidscope::link::serial::{SerialOpener, DEFAULT_BAUD, DEFAULT_READ_TIMEOUT};
use pidscope::link::DEFAULT_RETRY_BUDGET;
use pidscope::monitor::{SessionConfig, DEFAULT_TICK_INTERVAL};
use pidscope::view::ViewConfig;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SerialConfig {
    /// Auto-detected when absent.
    pub port: Option<String>,
    pub baud: u32,
    pub read_timeout_ms: u64,
    pub retry_budget: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: None,
            baud: DEFAULT_BAUD,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            retry_budget: DEFAULT_RETRY_BUDGET,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HistoryConfig {
    pub capacity: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            capacity: DEFAULT_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RenderConfig {
    pub tick_ms: u64,
    pub window_secs: f64,
    pub notice_log_size: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            tick_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            window_secs: ViewConfig::default().window_secs,
            notice_log_size: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub enabled: bool,
    /// Program and arguments of the external analyzer.
    pub command: Vec<String>,
    pub model: LoopModel,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MonitorConfig {
    pub serial: SerialConfig,
    pub history: HistoryConfig,
    pub render: RenderConfig,
    pub analysis: AnalysisConfig,
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<MonitorConfig, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        MonitorConfig::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<MonitorConfig, serde_yaml::Error> {
        // An empty document deserializes as null rather than an empty map.
        if text.trim().is_empty() {
            return Ok(MonitorConfig::default());
        }
        serde_yaml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.history.capacity == 0 {
            return Err(ConfigError::Invalid("history capacity must be at least 1".into()));
        }
        if self.render.tick_ms == 0 {
            return Err(ConfigError::Invalid("tick interval must be positive".into()));
        }
        if !(self.render.window_secs.is_finite() && self.render.window_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "time window must be positive, got {}",
                self.render.window_secs
            )));
        }
        if self.serial.baud == 0 {
            return Err(ConfigError::Invalid("baud rate must be positive".into()));
        }
        let model = &self.analysis.model;
        if !(model.omega_min > 0.0 && model.omega_max > model.omega_min) {
            return Err(ConfigError::Invalid(format!(
                "analysis frequency range {}..{} is empty",
                model.omega_min, model.omega_max
            )));
        }
        if self.analysis.enabled && self.analysis.command.is_empty() {
            return Err(ConfigError::Invalid(
                "analysis is enabled but no analyzer command is set".into(),
            ));
        }
        Ok(())
    }

    pub fn opener(&self) -> SerialOpener {
        SerialOpener::new(
            self.serial.port.clone(),
            self.serial.baud,
            Duration::from_millis(self.serial.read_timeout_ms),
        )
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            capacity: self.history.capacity,
            retry_budget: self.serial.retry_budget,
            view: ViewConfig {
                window_secs: self.render.window_secs,
                ..ViewConfig::default()
            },
            notice_log_size: self.render.notice_log_size,
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.render.tick_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pidscope::link::LinkOpener;

    #[test]
    fn empty_file_is_default() {
        let cfg = MonitorConfig::from_yaml("").unwrap();
        assert_eq!(cfg, MonitorConfig::default());
        assert_eq!(cfg.serial.baud, 9600);
        assert_eq!(cfg.serial.retry_budget, 10);
        assert_eq!(cfg.history.capacity, 300);
        assert_eq!(cfg.render.tick_ms, 50);
        assert!(!cfg.analysis.enabled);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn partial_file_merges_with_defaults() {
        let cfg = MonitorConfig::from_yaml(
            "serial:\n  port: /dev/ttyACM0\nanalysis:\n  model:\n    controller:\n      kp: 2.5\n",
        )
        .unwrap();
        assert_eq!(cfg.serial.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(cfg.serial.baud, 9600);
        assert_eq!(cfg.analysis.model.controller.kp, 2.5);
        assert_eq!(cfg.analysis.model.controller.ki, 5.4);
        assert_eq!(cfg.analysis.model.plant.dead_time, 0.1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(MonitorConfig::from_yaml("serial:\n  bauds: 115200\n").is_err());
    }

    #[test]
    fn rejects_invalid_values() {
        let mut cfg = MonitorConfig::default();
        cfg.history.capacity = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg = MonitorConfig::default();
        cfg.render.tick_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = MonitorConfig::default();
        cfg.render.window_secs = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = MonitorConfig::default();
        cfg.analysis.enabled = true;
        assert!(cfg.validate().is_err());
        cfg.analysis.command = vec!["margins".into()];
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn session_settings() {
        let mut cfg = MonitorConfig::default();
        cfg.history.capacity = 42;
        cfg.render.window_secs = 10.0;
        let s = cfg.session_config();
        assert_eq!(s.capacity, 42);
        assert_eq!(s.view.window_secs, 10.0);
        assert_eq!(s.view.temperature_pad, 2.0);
        assert_eq!(cfg.tick_interval(), Duration::from_millis(50));
        assert_eq!(cfg.opener().describe(), "auto @ 9600 baud");
    }

    #[test]
    fn missing_file() {
        let err = MonitorConfig::load(Path::new("/nonexistent/pidscope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
