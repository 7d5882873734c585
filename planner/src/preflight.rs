//! Preflight Validator: rejects designs that would need DNA volumes the
//! low-volume instrument cannot pipette.

use crate::entry::AggregatedEntry;
use crate::error::{PlanError, PlanResult};
use crate::instrument::InstrumentLimits;

/// Fail on the first entry whose DNA volume is under the floor.
pub fn check(entries: &[AggregatedEntry], limits: &InstrumentLimits) -> PlanResult<()> {
    for entry in entries {
        if entry.volumes.dna < limits.low_volume_floor {
            tracing::warn!(
                label = entry.label(),
                volume = entry.volumes.dna,
                floor = limits.low_volume_floor,
                "DNA volume under pipetting floor"
            );
            return Err(PlanError::VolumeTooLow {
                label: entry.label().to_string(),
                volume: entry.volumes.dna,
                floor: limits.low_volume_floor,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{ReagentEntry, TransfectionKind};
    use crate::volume::{Coefficients, VolumeCalculator};

    fn aggregated(label: &str, conc: f64, mass: f64, excess: f64) -> AggregatedEntry {
        let entry = ReagentEntry {
            source: "A1".parse().unwrap(),
            dna_destination: "B1".parse().unwrap(),
            mix_destination: "C1".parse().unwrap(),
            plate_destination: "A1".parse().unwrap(),
            kind: TransfectionKind::Single,
            label: label.to_string(),
            concentration: conc,
            mass_wanted: mass,
        };
        let volumes = VolumeCalculator::new(Coefficients::default(), excess)
            .derive_entry(&entry)
            .unwrap();
        AggregatedEntry::single(entry, volumes)
    }

    #[test]
    fn test_concentrated_dna_is_rejected_by_label() {
        let entries = vec![aggregated("ok", 75.0, 500.0, 1.2), aggregated("hot", 1000.0, 1.0, 1.2)];
        match check(&entries, &InstrumentLimits::default()).unwrap_err() {
            PlanError::VolumeTooLow { label, volume, floor } => {
                assert_eq!(label, "hot");
                assert!((volume - 0.0012).abs() < 1e-12);
                assert_eq!(floor, 1.0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_volume_at_floor_passes() {
        let entries = vec![aggregated("edge", 100.0, 100.0, 1.0)];
        assert!(check(&entries, &InstrumentLimits::default()).is_ok());
    }
}
