//! Instrument selection by volume class, dispense splitting, and agitation
//! sizing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// The two volume-ranged liquid handlers on the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    /// 20-300 uL class (right mount)
    HighVolume,
    /// 1-20 uL class (left mount)
    LowVolume,
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighVolume => write!(f, "high-volume"),
            Self::LowVolume => write!(f, "low-volume"),
        }
    }
}

/// Volume bounds that drive instrument routing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentLimits {
    /// Volumes at or above this go to the high-volume instrument
    pub switch_threshold: f64,
    /// Smallest volume the low-volume instrument can pipette reliably
    pub low_volume_floor: f64,
    /// Largest single dispense on the high-volume instrument
    pub high_volume_ceiling: f64,
}

impl Default for InstrumentLimits {
    fn default() -> Self {
        Self {
            switch_threshold: 20.0,
            low_volume_floor: 1.0,
            high_volume_ceiling: 200.0,
        }
    }
}

impl InstrumentLimits {
    pub fn select(&self, volume: f64) -> Instrument {
        if volume >= self.switch_threshold {
            Instrument::HighVolume
        } else {
            Instrument::LowVolume
        }
    }

    /// Most an instrument moves in one aspiration
    pub fn capacity(&self, instrument: Instrument) -> f64 {
        match instrument {
            Instrument::HighVolume => self.high_volume_ceiling,
            Instrument::LowVolume => self.switch_threshold,
        }
    }

    /// Break a dispense into ceiling-sized pieces plus the remainder.
    ///
    /// Volumes at or under the ceiling come back as a single piece.
    pub fn split(&self, volume: f64) -> Vec<f64> {
        let ceiling = self.high_volume_ceiling;
        if volume <= ceiling || ceiling <= 0.0 {
            return vec![volume];
        }

        let mut pieces = Vec::new();
        let mut remaining = volume;
        while remaining > ceiling {
            pieces.push(ceiling);
            remaining -= ceiling;
        }
        // float drift slivers are dropped
        if remaining > SPLIT_EPSILON {
            pieces.push(remaining);
        }
        pieces
    }

    pub fn validate(&self) -> Result<(), String> {
        let Self {
            switch_threshold,
            low_volume_floor,
            high_volume_ceiling,
        } = *self;
        if !(low_volume_floor.is_finite() && low_volume_floor > 0.0) {
            return Err(format!("low_volume_floor must be positive, got {low_volume_floor}"));
        }
        if !(switch_threshold.is_finite() && switch_threshold > low_volume_floor) {
            return Err(format!(
                "switch_threshold ({switch_threshold}) must exceed low_volume_floor ({low_volume_floor})"
            ));
        }
        if !(high_volume_ceiling.is_finite() && high_volume_ceiling >= switch_threshold) {
            return Err(format!(
                "high_volume_ceiling ({high_volume_ceiling}) must be at least switch_threshold ({switch_threshold})"
            ));
        }
        Ok(())
    }
}

const SPLIT_EPSILON: f64 = 1e-9;

/// How large a post- or pre-dispense mix should be.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Agitation {
    /// A fixed mixing volume, clamped to the instrument's capacity
    Fixed { volume: f64 },
    /// Mix the dispensed volume itself, capped at the high-volume ceiling.
    /// `low_volume` overrides the size when the low-volume instrument mixes.
    Scaled { low_volume: Option<f64> },
}

impl Agitation {
    /// Mixing volume for a dispense of `volume` on `instrument`.
    pub fn size(&self, volume: f64, instrument: Instrument, limits: &InstrumentLimits) -> f64 {
        let capacity = limits.capacity(instrument);
        let raw = match (*self, instrument) {
            (Self::Fixed { volume: fixed }, _) => fixed,
            (Self::Scaled { low_volume: Some(low) }, Instrument::LowVolume) => low,
            (Self::Scaled { .. }, _) => volume,
        };
        raw.min(capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_is_inclusive_for_high_volume() {
        let limits = InstrumentLimits::default();
        assert_eq!(limits.select(20.0), Instrument::HighVolume);
        assert_eq!(limits.select(19.999), Instrument::LowVolume);
        assert_eq!(limits.select(2.4), Instrument::LowVolume);
        assert_eq!(limits.select(450.0), Instrument::HighVolume);
    }

    #[test]
    fn test_split_caps_at_ceiling() {
        let limits = InstrumentLimits::default();
        assert_eq!(limits.split(150.0), vec![150.0]);
        assert_eq!(limits.split(200.0), vec![200.0]);
        assert_eq!(limits.split(450.0), vec![200.0, 200.0, 50.0]);
        assert_eq!(limits.split(400.0), vec![200.0, 200.0]);
    }

    #[test]
    fn test_split_remainder_can_route_low() {
        let limits = InstrumentLimits::default();
        let pieces = limits.split(210.0);
        assert_eq!(pieces.len(), 2);
        assert!((pieces[1] - 10.0).abs() < 1e-9);
        assert_eq!(limits.select(pieces[1]), Instrument::LowVolume);
    }

    #[test]
    fn test_scaled_agitation_bands() {
        let limits = InstrumentLimits::default();
        let distribution = Agitation::Scaled {
            low_volume: Some(15.0),
        };
        assert_eq!(distribution.size(80.0, Instrument::HighVolume, &limits), 80.0);
        assert_eq!(distribution.size(900.0, Instrument::HighVolume, &limits), 200.0);
        assert_eq!(distribution.size(8.0, Instrument::LowVolume, &limits), 15.0);

        let recipe = Agitation::Scaled { low_volume: None };
        assert_eq!(recipe.size(12.5, Instrument::LowVolume, &limits), 12.5);
    }

    #[test]
    fn test_fixed_agitation_clamped_to_capacity() {
        let limits = InstrumentLimits::default();
        let fixed = Agitation::Fixed { volume: 50.0 };
        assert_eq!(fixed.size(5.0, Instrument::LowVolume, &limits), 20.0);
        assert_eq!(fixed.size(5.0, Instrument::HighVolume, &limits), 50.0);
    }

    #[test]
    fn test_validate_rejects_inverted_limits() {
        let mut limits = InstrumentLimits::default();
        assert!(limits.validate().is_ok());
        limits.high_volume_ceiling = 10.0;
        assert!(limits.validate().is_err());
    }
}
