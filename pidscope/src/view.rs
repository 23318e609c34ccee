//! Axis fitting for the telemetry chart.
//!
//! The time axis always spans at least `window_secs`; it starts at the
//! oldest retained sample and grows to the newest one. The value axes are
//! the union of a fixed default range and whatever the data reaches, plus a
//! margin, so that every plotted point is visible.

use crate::data::{Channel, Snapshot};

/// Channels drawn on the temperature panel.
pub const TEMPERATURE_CHANNELS: [Channel; 2] = [Channel::Temperature, Channel::Setpoint];

/// Channels drawn on the PID contribution panel.
pub const PID_CHANNELS: [Channel; 3] = [Channel::PidP, Channel::PidI, Channel::PidD];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisBounds {
    pub min: f64,
    pub max: f64,
}

impl AxisBounds {
    pub const fn new(min: f64, max: f64) -> AxisBounds {
        AxisBounds { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    pub fn contains(&self, v: f64) -> bool {
        v >= self.min && v <= self.max
    }

    /// Smallest range covering both this one and `lo..=hi`, widened by `pad`
    /// on both sides.
    pub fn covering(&self, extent: Option<(f64, f64)>, pad: f64) -> AxisBounds {
        let (lo, hi) = match extent {
            Some((lo, hi)) => (self.min.min(lo), self.max.max(hi)),
            None => (self.min, self.max),
        };
        AxisBounds::new(lo - pad, hi + pad)
    }

    pub fn as_array(&self) -> [f64; 2] {
        [self.min, self.max]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewConfig {
    /// Minimum visible time span, in seconds.
    pub window_secs: f64,
    pub temperature_default: AxisBounds,
    pub temperature_pad: f64,
    pub pid_default: AxisBounds,
    pub pid_pad: f64,
    pub pwm: AxisBounds,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            window_secs: 30.0,
            temperature_default: AxisBounds::new(20.0, 35.0),
            temperature_pad: 2.0,
            pid_default: AxisBounds::new(-100.0, 100.0),
            pid_pad: 10.0,
            pwm: AxisBounds::new(0.0, 100.0),
        }
    }
}

/// Axis bounds for every panel of the chart.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub time: AxisBounds,
    pub temperature: AxisBounds,
    pub pwm: AxisBounds,
    pub pid: AxisBounds,
}

impl Viewport {
    /// Bounds shown before any data arrives.
    pub fn initial(cfg: &ViewConfig) -> Viewport {
        Viewport {
            time: AxisBounds::new(0.0, cfg.window_secs),
            temperature: cfg.temperature_default,
            pwm: cfg.pwm,
            pid: cfg.pid_default,
        }
    }

    pub fn fit(snapshot: &Snapshot, cfg: &ViewConfig) -> Viewport {
        let (first, last) = match (snapshot.first_time(), snapshot.last_time()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Viewport::initial(cfg),
        };
        let lower = first.max(0.0);
        let time = AxisBounds::new(lower, last.max(lower + cfg.window_secs));

        Viewport {
            time,
            temperature: cfg
                .temperature_default
                .covering(snapshot.extent(&TEMPERATURE_CHANNELS), cfg.temperature_pad),
            pwm: cfg.pwm,
            pid: cfg
                .pid_default
                .covering(snapshot.extent(&PID_CHANNELS), cfg.pid_pad),
        }
    }
}
