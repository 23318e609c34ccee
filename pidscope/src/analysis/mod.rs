//! Stability analysis
//!
//! Gain and phase margins of the open loop `C(s) * P(s)` are computed by an
//! external control-systems tool; this module defines what goes in and what
//! comes out, and how a result is judged.
//!
//! The loop is a PID controller `kp + ki/s + kd*s` driving a first order
//! plant with dead time, `K / (T*s + 1) * e^(-L*s)`, the delay being
//! approximated by a Padé expansion of `pade_order`.

mod assess;
mod command;

pub use assess::{Assessment, Conclusion, GainVerdict, PhaseVerdict};
pub use command::CommandAnalyzer;

use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("no analyzer command configured")]
    NotConfigured,
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("analyzer I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("analyzer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("invalid analyzer output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid report: {0}")]
    InvalidReport(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for ControllerGains {
    fn default() -> Self {
        ControllerGains {
            kp: 1.8,
            ki: 5.4,
            kd: 0.31,
        }
    }
}

/// First order plus dead time plant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlantModel {
    /// Static gain, °C per % PWM.
    pub gain: f64,
    /// Seconds.
    pub time_constant: f64,
    /// Seconds.
    pub dead_time: f64,
}

impl Default for PlantModel {
    fn default() -> Self {
        PlantModel {
            gain: 0.35,
            time_constant: 1.0,
            dead_time: 0.1,
        }
    }
}

/// Input handed to the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopModel {
    pub controller: ControllerGains,
    pub plant: PlantModel,
    pub pade_order: u32,
    /// Frequency range for the Bode response, rad/s.
    pub omega_min: f64,
    pub omega_max: f64,
}

impl Default for LoopModel {
    fn default() -> Self {
        LoopModel {
            controller: ControllerGains::default(),
            plant: PlantModel::default(),
            pade_order: 1,
            omega_min: 0.01,
            omega_max: 100.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodePoint {
    /// rad/s
    pub omega: f64,
    pub magnitude_db: f64,
    pub phase_deg: f64,
}

/// Output of the analyzer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StabilityReport {
    /// Linear gain margin; `None` when the phase never reaches -180°, i.e.
    /// the margin is infinite.
    pub gain_margin: Option<f64>,
    pub phase_margin_deg: Option<f64>,
    /// Frequency where the phase crosses -180°, rad/s.
    pub phase_crossover: Option<f64>,
    /// Frequency where the magnitude crosses 0 dB, rad/s.
    pub gain_crossover: Option<f64>,
    #[serde(default)]
    pub bode: Vec<BodePoint>,
}

impl StabilityReport {
    /// Gain margin in dB; infinite when the linear margin is.
    pub fn gain_margin_db(&self) -> f64 {
        match self.gain_margin {
            Some(gm) => 20.0 * gm.log10(),
            None => f64::INFINITY,
        }
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        if let Some(gm) = self.gain_margin {
            if gm.is_nan() || gm <= 0.0 {
                return Err(AnalysisError::InvalidReport(format!(
                    "gain margin must be positive, got {}",
                    gm
                )));
            }
        }
        if self.bode.iter().any(|p| p.omega.is_nan() || p.omega <= 0.0) {
            return Err(AnalysisError::InvalidReport(
                "Bode frequencies must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Crossover frequencies are only meaningful when strictly positive.
    fn crossover(w: Option<f64>) -> Option<f64> {
        w.filter(|w| *w > 0.0)
    }

    pub fn phase_crossover_hz(&self) -> Option<f64> {
        Self::crossover(self.phase_crossover).map(rad_to_hz)
    }

    pub fn gain_crossover_hz(&self) -> Option<f64> {
        Self::crossover(self.gain_crossover).map(rad_to_hz)
    }
}

fn rad_to_hz(w: f64) -> f64 {
    w / (2.0 * std::f64::consts::PI)
}

/// Something that can compute margins for a loop model.
pub trait StabilityAnalyzer {
    fn analyze(&self, model: &LoopModel) -> Result<StabilityReport, AnalysisError>;
}

/// A report together with its interpretation.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub model: LoopModel,
    pub report: StabilityReport,
    pub assessment: Assessment,
}

/// Runs the analyzer once and judges the result.
pub fn run_once(
    analyzer: &dyn StabilityAnalyzer,
    model: &LoopModel,
) -> Result<Analysis, AnalysisError> {
    tracing::info!(
        "analyzing loop kp={} ki={} kd={} K={} T={} L={}",
        model.controller.kp,
        model.controller.ki,
        model.controller.kd,
        model.plant.gain,
        model.plant.time_constant,
        model.plant.dead_time
    );
    let report = analyzer.analyze(model)?;
    report.validate()?;
    let assessment = Assessment::of(&report);
    tracing::info!(
        "gain margin {:.2} dB, phase margin {:?} deg: {:?}",
        report.gain_margin_db(),
        report.phase_margin_deg,
        assessment.conclusion
    );
    Ok(Analysis {
        model: model.clone(),
        report,
        assessment,
    })
}
