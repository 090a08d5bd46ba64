use std::fmt;

use serde::{Deserialize, Serialize};

/// Confidence score in basis points, always within `[0, 10000]`.
///
/// 100 BPS is one percent. The only way to build a `Bps` from an arbitrary
/// integer is [`Bps::clamped`], so an out-of-range value can never exist.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Bps(u16);

impl Bps {
    pub const ZERO: Bps = Bps(0);
    pub const MAX: Bps = Bps(10_000);

    /// Weight applied to the average jury severity.
    pub const SEVERITY_WEIGHT: f64 = 20.0;

    /// Exact constructor; `None` when `value > 10000`.
    pub fn new(value: u16) -> Option<Self> {
        (value <= Self::MAX.0).then_some(Self(value))
    }

    /// Clamp any integer into range.
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(0, Self::MAX.0 as i64) as u16)
    }

    /// `round(10000 - 20 * average_severity)`, clamped.
    ///
    /// An average of zero yields [`Bps::MAX`]; an average of 100 yields zero.
    pub fn from_average_severity(average: f64) -> Self {
        if !average.is_finite() {
            return Self::ZERO;
        }
        let raw = (Self::MAX.0 as f64 - Self::SEVERITY_WEIGHT * average).round();
        Self::clamped(raw as i64)
    }

    pub fn value(self) -> u16 {
        self.0
    }

    /// Score as a percentage, e.g. `96.5` for 9650 BPS.
    pub fn as_percent(self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl fmt::Display for Bps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u16> for Bps {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Bps::new(value).ok_or_else(|| format!("{} exceeds 10000 bps", value))
    }
}

impl From<Bps> for u16 {
    fn from(value: Bps) -> Self {
        value.0
    }
}

/// Jury severity vote in `[1, 100]`, where 100 means total failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Severity(u8);

impl Severity {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 100;

    pub fn new(value: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX).contains(&value).then_some(Self(value))
    }

    /// Accepts any integer that lands in range, e.g. a scraped token.
    pub fn from_i64(value: i64) -> Option<Self> {
        u8::try_from(value).ok().and_then(Self::new)
    }

    pub fn value(self) -> u8 {
        self.0
    }

    /// Mean of a set of severities, `None` when empty.
    pub fn average(values: &[Severity]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let sum: u32 = values.iter().map(|s| s.0 as u32).sum();
        Some(sum as f64 / values.len() as f64)
    }
}

impl TryFrom<u8> for Severity {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Severity::new(value).ok_or_else(|| format!("severity {} outside 1..=100", value))
    }
}

impl From<Severity> for u8 {
    fn from(value: Severity) -> Self {
        value.0
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
