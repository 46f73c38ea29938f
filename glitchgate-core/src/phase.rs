//! Hostility tiers and the per-tier tables every subsystem reads from.
use serde::{Deserialize, Serialize};

/// Coarse difficulty tier scaling every probability and duration table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(try_from = "u8", into = "u8")]
pub enum Phase {
    #[default]
    One,
    Two,
    Three,
}

impl Phase {
    pub const ALL: [Self; 3] = [Self::One, Self::Two, Self::Three];

    /// Parse the numeric tier used by page-level state.
    #[must_use]
    pub const fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Phase a controller should act on. Maximum hostility pins everything to phase 3.
    #[must_use]
    pub const fn effective(self, max_hostility: bool) -> Self {
        if max_hostility { Self::Three } else { self }
    }
}

impl TryFrom<u8> for Phase {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_level(value).ok_or_else(|| format!("phase must be 1, 2 or 3 (got {value})"))
    }
}

impl From<Phase> for u8 {
    fn from(value: Phase) -> Self {
        value.level()
    }
}

/// Exactly one value per phase.
///
/// Values are expected to grow more hostile as the phase increases; that is a
/// tuning convention and is not enforced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTable<T> {
    #[serde(rename = "1")]
    pub one: T,
    #[serde(rename = "2")]
    pub two: T,
    #[serde(rename = "3")]
    pub three: T,
}

impl<T> PhaseTable<T> {
    #[must_use]
    pub const fn new(one: T, two: T, three: T) -> Self {
        Self { one, two, three }
    }

    #[must_use]
    pub const fn get(&self, phase: Phase) -> &T {
        match phase {
            Phase::One => &self.one,
            Phase::Two => &self.two,
            Phase::Three => &self.three,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PhaseTable<U> {
        PhaseTable {
            one: f(&self.one),
            two: f(&self.two),
            three: f(&self.three),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Phase, &T)> {
        [
            (Phase::One, &self.one),
            (Phase::Two, &self.two),
            (Phase::Three, &self.three),
        ]
        .into_iter()
    }
}

impl<T: Copy> PhaseTable<T> {
    #[must_use]
    pub const fn uniform(value: T) -> Self {
        Self {
            one: value,
            two: value,
            three: value,
        }
    }

    #[must_use]
    pub const fn at(&self, phase: Phase) -> T {
        *self.get(phase)
    }
}

/// Inclusive millisecond window `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsRange {
    pub min: u64,
    pub max: u64,
}

impl MsRange {
    #[must_use]
    pub const fn new(min: u64, max: u64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub const fn is_ordered(&self) -> bool {
        self.min <= self.max
    }

    /// Clamp a duration into the window, tolerating an inverted range.
    #[must_use]
    pub fn clamp(&self, value: u64) -> u64 {
        let (lo, hi) = if self.is_ordered() {
            (self.min, self.max)
        } else {
            (self.max, self.min)
        };
        value.clamp(lo, hi)
    }
}

/// Inclusive floating point window, used for pixel offsets and percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub min: f64,
    pub max: f64,
}

impl Span {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn is_ordered(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min <= self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_hostility_forces_phase_three() {
        for phase in Phase::ALL {
            assert_eq!(phase.effective(true), Phase::Three);
            assert_eq!(phase.effective(false), phase);
        }
    }

    #[test]
    fn table_lookup_follows_phase() {
        let table: PhaseTable<f64> = PhaseTable::new(0.1, 0.2, 0.4);
        assert!((table.at(Phase::One) - 0.1).abs() < f64::EPSILON);
        assert!((table.at(Phase::Three) - 0.4).abs() < f64::EPSILON);
        let doubled = table.map(|p| p * 2.0);
        assert!((doubled.at(Phase::Two) - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn table_deserializes_numeric_keys() {
        let table: PhaseTable<u32> = serde_json::from_str(r#"{"1":3,"2":2,"3":1}"#).unwrap();
        assert_eq!(table, PhaseTable::new(3, 2, 1));
        let phase: Phase = serde_json::from_str("2").unwrap();
        assert_eq!(phase, Phase::Two);
        assert!(serde_json::from_str::<Phase>("4").is_err());
    }

    #[test]
    fn ms_range_clamp_tolerates_inversion() {
        assert_eq!(MsRange::new(100, 200).clamp(500), 200);
        assert_eq!(MsRange::new(200, 100).clamp(50), 100);
    }
}
