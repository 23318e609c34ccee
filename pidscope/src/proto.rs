//! Line protocol
//!
//! The controller firmware prints one text line per control period. Data
//! lines look like
//!
//! ```text
//! >> 24.50,25.00,0.00,1.20,3.10,0.05,0.00,128.00
//! ```
//!
//! with fields measured temperature, setpoint, (unused), P, I and D
//! contributions, (unused), and the raw 0-255 PWM duty. Anything else the
//! firmware prints (boot banners, debug output) is rejected without noise.

use crate::data::TelemetrySample;
use thiserror::Error;

/// Marker that starts every data line.
pub const DATA_PREFIX: &str = ">> ";

/// Number of comma separated fields in a data line.
pub const FIELD_COUNT: usize = 8;

/// Reasons a line does not yield a sample.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejected {
    #[error("empty line")]
    Empty,
    #[error("line does not start with {DATA_PREFIX:?}")]
    MissingPrefix,
    #[error("expected {FIELD_COUNT} fields, found {0}")]
    FieldCount(usize),
    #[error("field {index} is not a number: {text:?}")]
    BadNumber { index: usize, text: String },
}

impl Rejected {
    /// Whether this looks like a data line that went wrong, as opposed to
    /// blank lines and unrelated firmware chatter.
    pub fn is_malformed_record(&self) -> bool {
        matches!(self, Rejected::FieldCount(_) | Rejected::BadNumber { .. })
    }
}

/// Text recovered from a raw line.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub text: String,
    /// Some bytes were not valid UTF-8 and were dropped.
    pub noisy: bool,
}

/// Decodes `raw` as UTF-8, dropping invalid byte sequences instead of
/// failing or substituting replacement characters.
pub fn decode(raw: &[u8]) -> Decoded {
    let mut text = String::with_capacity(raw.len());
    let mut noisy = false;
    for chunk in raw.utf8_chunks() {
        text.push_str(chunk.valid());
        noisy |= !chunk.invalid().is_empty();
    }
    Decoded { text, noisy }
}

/// Parses an already decoded line.
pub fn parse_text(line: &str) -> Result<TelemetrySample, Rejected> {
    let line = line.trim();
    if line.is_empty() {
        return Err(Rejected::Empty);
    }
    let body = line.strip_prefix(DATA_PREFIX).ok_or(Rejected::MissingPrefix)?;

    let parts: Vec<&str> = body.split(',').collect();
    if parts.len() != FIELD_COUNT {
        return Err(Rejected::FieldCount(parts.len()));
    }

    let mut fields = [0.0f64; FIELD_COUNT];
    for (index, part) in parts.iter().enumerate() {
        let text = part.trim();
        fields[index] = text
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| Rejected::BadNumber {
                index,
                text: text.to_string(),
            })?;
    }
    Ok(TelemetrySample::from_fields(fields))
}

/// Parses one raw line, as read from the link without its terminator.
pub fn parse(raw: &[u8]) -> Result<TelemetrySample, Rejected> {
    parse_text(&decode(raw).text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reference_line() {
        let s = parse(b">> 24.50,25.00,0.00,1.20,3.10,0.05,0.00,128.00").unwrap();
        assert_eq!(s.temperature, 24.50);
        assert_eq!(s.setpoint, 25.00);
        assert_eq!(s.pid_p, 1.20);
        assert_eq!(s.pid_i, 3.10);
        assert_eq!(s.pid_d, 0.05);
        assert!((s.pwm_percent - 50.196).abs() < 1e-3);
    }

    #[test]
    fn rejects_short_line() {
        assert_eq!(parse(b">> bad,data"), Err(Rejected::FieldCount(2)));
        assert!(parse(b">> bad,data").unwrap_err().is_malformed_record());
    }

    #[test]
    fn rejects_missing_prefix() {
        assert_eq!(
            parse(b"24.50,25.00,0.00,1.20,3.10,0.05,0.00,128.00"),
            Err(Rejected::MissingPrefix)
        );
        assert_eq!(
            parse(b">>24.50,25.00,0.00,1.20,3.10,0.05,0.00,128.00"),
            Err(Rejected::MissingPrefix)
        );
        assert_eq!(parse(b"PID ready"), Err(Rejected::MissingPrefix));
        assert!(!Rejected::MissingPrefix.is_malformed_record());
    }

    #[test]
    fn rejects_blank_lines() {
        assert_eq!(parse(b""), Err(Rejected::Empty));
        assert_eq!(parse(b"  \t\r"), Err(Rejected::Empty));
    }

    #[test]
    fn field_count_must_be_exact() {
        assert_eq!(parse(b">> 1,2,3,4,5,6,7"), Err(Rejected::FieldCount(7)));
        assert_eq!(parse(b">> 1,2,3,4,5,6,7,8,9"), Err(Rejected::FieldCount(9)));
        assert_eq!(
            parse(b">> 1,2,3,4,5,6,7,"),
            Err(Rejected::BadNumber {
                index: 7,
                text: String::new()
            })
        );
    }

    #[test]
    fn one_bad_number_rejects_line() {
        assert_eq!(
            parse(b">> 1,2,3,x4,5,6,7,8"),
            Err(Rejected::BadNumber {
                index: 3,
                text: "x4".to_string()
            })
        );
    }

    #[test]
    fn rejects_non_finite_values() {
        assert_eq!(
            parse(b">> inf,25,0,1,2,3,0,128"),
            Err(Rejected::BadNumber {
                index: 0,
                text: "inf".to_string()
            })
        );
        assert!(parse(b">> 24,25,0,NaN,2,3,0,128").is_err());
        assert!(parse(b">> 24,25,0,1,-infinity,3,0,128").is_err());
        assert!(parse(b">> 24,25,0,1,2,3,0,1e999").is_err());
    }

    #[test]
    fn tolerates_whitespace_and_crlf() {
        let s = parse(b"  >> 20, 21 ,0,1,2,3,0,0\r\n").unwrap();
        assert_eq!(s.temperature, 20.0);
        assert_eq!(s.setpoint, 21.0);
        assert_eq!(s.pwm_percent, 0.0);
    }

    #[test]
    fn drops_undecodable_bytes() {
        let raw = b">> 24.5\xff,25,0,1,2,3,0,255";
        let d = decode(raw);
        assert!(d.noisy);
        assert_eq!(d.text, ">> 24.5,25,0,1,2,3,0,255");
        let s = parse(raw).unwrap();
        assert_eq!(s.temperature, 24.5);
        assert!(!decode(b">> ok").noisy);
    }

    #[test]
    fn parse_is_deterministic() {
        let line = b">> 1.5,2,3,4,5,6,7,8";
        assert_eq!(parse(line), parse(line));
    }
}
