/// Raw PWM duty value corresponding to 100 %.
pub const PWM_FULL_SCALE: f64 = 255.0;

/// One decoded controller observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetrySample {
    pub temperature: f64,
    pub setpoint: f64,
    pub pid_p: f64,
    pub pid_i: f64,
    pub pid_d: f64,
    /// Controller output, already scaled from the raw 0-255 duty value.
    pub pwm_percent: f64,
    /// Wire fields 3 and 7, carried through unchanged.
    pub aux: [f64; 2],
}

impl TelemetrySample {
    /// Builds a sample from the 8 wire fields, in wire order.
    pub fn from_fields(fields: [f64; 8]) -> TelemetrySample {
        TelemetrySample {
            temperature: fields[0],
            setpoint: fields[1],
            aux: [fields[2], fields[6]],
            pid_p: fields[3],
            pid_i: fields[4],
            pid_d: fields[5],
            pwm_percent: fields[7] * 100.0 / PWM_FULL_SCALE,
        }
    }

    pub fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Temperature => self.temperature,
            Channel::Setpoint => self.setpoint,
            Channel::PwmPercent => self.pwm_percent,
            Channel::PidP => self.pid_p,
            Channel::PidI => self.pid_i,
            Channel::PidD => self.pid_d,
            Channel::Aux0 => self.aux[0],
            Channel::Aux1 => self.aux[1],
        }
    }
}

impl std::fmt::Display for TelemetrySample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "SAMPLE")?;
        for channel in Channel::ALL {
            write!(f, " {}: {:.2}", channel.name(), self.value(channel))?;
        }
        Ok(())
    }
}

/// Series kept by the history, one per sample field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Temperature,
    Setpoint,
    PwmPercent,
    PidP,
    PidI,
    PidD,
    Aux0,
    Aux1,
}

impl Channel {
    pub const COUNT: usize = 8;

    pub const ALL: [Channel; Channel::COUNT] = [
        Channel::Temperature,
        Channel::Setpoint,
        Channel::PwmPercent,
        Channel::PidP,
        Channel::PidI,
        Channel::PidD,
        Channel::Aux0,
        Channel::Aux1,
    ];

    pub(crate) fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Channel::Temperature => "temperature",
            Channel::Setpoint => "setpoint",
            Channel::PwmPercent => "pwm",
            Channel::PidP => "p",
            Channel::PidI => "i",
            Channel::PidD => "d",
            Channel::Aux0 => "aux0",
            Channel::Aux1 => "aux1",
        }
    }
}
