use super::{Analysis, StabilityReport};
use std::fmt;

/// Gain margin below this many dB is considered low.
const GAIN_MARGIN_MIN_DB: f64 = 3.0;

/// Phase margins in `(PHASE_MARGIN_LOW, PHASE_MARGIN_HIGH]` degrees are
/// considered well tuned.
const PHASE_MARGIN_LOW: f64 = 30.0;
const PHASE_MARGIN_HIGH: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GainVerdict {
    Adequate,
    Low,
    Unstable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseVerdict {
    /// Robust but probably sluggish.
    High,
    Optimal,
    /// Stable, with an oscillating transient.
    Low,
    Unstable,
    /// The magnitude never crosses 0 dB.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conclusion {
    Robust,
    StableWithIssues,
    PossiblyUnstable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assessment {
    pub gain: GainVerdict,
    pub phase: PhaseVerdict,
    pub problems: Vec<&'static str>,
    pub conclusion: Conclusion,
}

impl Assessment {
    pub fn of(report: &StabilityReport) -> Assessment {
        let mut problems = Vec::new();
        let mut stable = true;

        let gm_db = report.gain_margin_db();
        let gain = if gm_db > GAIN_MARGIN_MIN_DB {
            GainVerdict::Adequate
        } else if gm_db > 0.0 {
            problems.push("low gain margin");
            stable = false;
            GainVerdict::Low
        } else {
            problems.push("negative gain margin");
            stable = false;
            GainVerdict::Unstable
        };

        let phase = match report.phase_margin_deg {
            None => PhaseVerdict::Unknown,
            Some(pm) if pm > PHASE_MARGIN_HIGH => {
                problems.push("very high phase margin");
                PhaseVerdict::High
            }
            Some(pm) if pm > PHASE_MARGIN_LOW => PhaseVerdict::Optimal,
            Some(pm) if pm > 0.0 => {
                problems.push("low phase margin");
                PhaseVerdict::Low
            }
            Some(_) => {
                problems.push("negative phase margin");
                stable = false;
                PhaseVerdict::Unstable
            }
        };

        let conclusion = match (stable, problems.is_empty()) {
            (true, true) => Conclusion::Robust,
            (true, false) => Conclusion::StableWithIssues,
            (false, _) => Conclusion::PossiblyUnstable,
        };

        Assessment {
            gain,
            phase,
            problems,
            conclusion,
        }
    }
}

fn fmt_frequency(rad: Option<f64>, hz: Option<f64>) -> String {
    match (rad, hz) {
        (Some(rad), Some(hz)) => format!("{:.2} rad/s ({:.3} Hz)", rad, hz),
        _ => "N/A".to_string(),
    }
}

impl fmt::Display for Analysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.report;
        let a = &self.assessment;
        let c = &self.model.controller;
        let p = &self.model.plant;

        writeln!(f, "Loop model")?;
        writeln!(f, "  controller  kp={} ki={} kd={}", c.kp, c.ki, c.kd)?;
        writeln!(
            f,
            "  plant       K={} T={}s L={}s (Padé order {})",
            p.gain, p.time_constant, p.dead_time, self.model.pade_order
        )?;
        writeln!(f)?;

        writeln!(f, "Gain margin")?;
        match r.gain_margin {
            None => {
                writeln!(f, "  value:     ∞ (phase never crosses -180°)")?;
            }
            Some(gm) => {
                writeln!(f, "  value:     {:.2} dB ({:.2}x)", r.gain_margin_db(), gm)?;
            }
        }
        writeln!(
            f,
            "  crossover: {}",
            fmt_frequency(r.phase_crossover, r.phase_crossover_hz())
        )?;
        writeln!(f, "  verdict:   {:?}", a.gain)?;
        writeln!(f)?;

        writeln!(f, "Phase margin")?;
        match r.phase_margin_deg {
            Some(pm) => writeln!(f, "  value:     {:.2}°", pm)?,
            None => writeln!(f, "  value:     N/A")?,
        }
        writeln!(
            f,
            "  crossover: {}",
            fmt_frequency(r.gain_crossover, r.gain_crossover_hz())
        )?;
        writeln!(f, "  verdict:   {:?}", a.phase)?;
        writeln!(f)?;

        match a.conclusion {
            Conclusion::Robust => writeln!(f, "Conclusion: robust and stable")?,
            Conclusion::StableWithIssues => writeln!(f, "Conclusion: stable, with issues")?,
            Conclusion::PossiblyUnstable => {
                writeln!(f, "Conclusion: possibly unstable or prone to oscillation")?
            }
        }
        for problem in &a.problems {
            writeln!(f, "  - {}", problem)?;
        }
        if a.conclusion == Conclusion::PossiblyUnstable {
            writeln!(f, "  recommendation: reduce kp and/or ki")?;
        }
        Ok(())
    }
}
