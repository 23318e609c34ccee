mod history;
mod sample;

pub use history::{History, Snapshot, DEFAULT_CAPACITY};
pub use sample::{Channel, TelemetrySample, PWM_FULL_SCALE};
