//! Center frequency value type

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A capture center frequency in Hz
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Frequency(u32);

impl Frequency {
    pub const fn from_hz(hz: u32) -> Self {
        Self(hz)
    }

    pub const fn hz(self) -> u32 {
        self.0
    }

    pub fn mhz(self) -> f64 {
        self.0 as f64 / 1e6
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} MHz", self.mhz())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FrequencyParseError {
    #[error("empty frequency")]
    Empty,
    #[error("'{0}' is not a number")]
    NotANumber(String),
    #[error("{0} MHz is out of range")]
    OutOfRange(f64),
}

/// Parses operator input given in MHz, e.g. `145.800`, `145.8M` or `145.8 MHz`.
impl FromStr for Frequency {
    type Err = FrequencyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let number = s
            .strip_suffix("MHz")
            .or_else(|| s.strip_suffix("mhz"))
            .or_else(|| s.strip_suffix('M'))
            .unwrap_or(s)
            .trim();
        if number.is_empty() {
            return Err(FrequencyParseError::Empty);
        }

        let mhz: f64 = number
            .parse()
            .map_err(|_| FrequencyParseError::NotANumber(number.to_string()))?;
        let hz = (mhz * 1e6).round();
        if !hz.is_finite() || hz < 1.0 || hz > u32::MAX as f64 {
            return Err(FrequencyParseError::OutOfRange(mhz));
        }

        Ok(Self(hz as u32))
    }
}
