use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ProtocolError;

/// JS8 transmit speed.
///
/// Every sub-mode sends the same 79-symbol frame; only the transmit period
/// changes. `Normal` is the reference mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubMode {
    /// 15 second periods.
    #[default]
    Normal,
    /// 10 second periods.
    Fast,
    /// 6 second periods.
    Turbo,
    /// 30 second periods.
    Slow,
}

impl SubMode {
    /// Length of one complete transmission.
    pub fn tx_duration(self) -> Duration {
        Duration::from_secs(self.tx_seconds() as u64)
    }

    pub fn tx_seconds(self) -> u32 {
        match self {
            Self::Normal => 15,
            Self::Fast => 10,
            Self::Turbo => 6,
            Self::Slow => 30,
        }
    }

    /// Divisor applied to the sample rate to get the tone spacing. The
    /// reference mode uses 2048; faster modes widen the spacing in step with
    /// their shorter symbols.
    pub fn tone_spacing_divisor(self) -> f32 {
        2048.0 * self.tx_seconds() as f32 / Self::Normal.tx_seconds() as f32
    }

    /// Single-letter speed code used in on-air and log output.
    pub fn code(self) -> char {
        match self {
            Self::Normal => 'A',
            Self::Fast => 'B',
            Self::Turbo => 'C',
            Self::Slow => 'E',
        }
    }

    /// Mode tag carried on messages.
    pub fn tag(self) -> &'static str {
        "JS8"
    }
}

impl FromStr for SubMode {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "a" => Ok(Self::Normal),
            "fast" | "b" => Ok(Self::Fast),
            "turbo" | "c" => Ok(Self::Turbo),
            "slow" | "e" => Ok(Self::Slow),
            other => Err(ProtocolError::UnknownSubMode(other.to_string())),
        }
    }
}

impl fmt::Display for SubMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::Fast => write!(f, "fast"),
            Self::Turbo => write!(f, "turbo"),
            Self::Slow => write!(f, "slow"),
        }
    }
}
