//! Replicate Aggregator: folds technical replicates into one master-mix entry.
//!
//! Two rows are replicates when they share both the source tube and the DNA
//! destination tube. The first occurrence supplies the representative
//! metadata and fixes the output position.

use std::collections::HashMap;

use crate::address::WellAddress;
use crate::entry::{AggregatedEntry, ReagentEntry};
use crate::error::PlanResult;
use crate::volume::VolumeCalculator;

/// Merge replicate rows, summing their derived volumes.
pub fn aggregate(
    entries: &[ReagentEntry],
    calculator: &VolumeCalculator,
) -> PlanResult<Vec<AggregatedEntry>> {
    let mut aggregated: Vec<AggregatedEntry> = Vec::with_capacity(entries.len());
    let mut positions: HashMap<(WellAddress, WellAddress), usize> = HashMap::new();

    for entry in entries {
        let volumes = calculator.derive_entry(entry)?;
        let key = (entry.source, entry.dna_destination);
        match positions.get(&key) {
            Some(&position) => {
                let existing = &mut aggregated[position];
                existing.volumes += volumes;
                existing.replicates += 1;
                tracing::debug!(
                    label = %entry.label,
                    representative = %existing.entry.label,
                    replicates = existing.replicates,
                    "Folded technical replicate"
                );
            }
            None => {
                positions.insert(key, aggregated.len());
                aggregated.push(AggregatedEntry::single(entry.clone(), volumes));
            }
        }
    }

    Ok(aggregated)
}

/// Row-by-row entries for protocols that skip replicate aggregation.
pub fn expand(
    entries: &[ReagentEntry],
    calculator: &VolumeCalculator,
) -> PlanResult<Vec<AggregatedEntry>> {
    entries
        .iter()
        .map(|entry| Ok(AggregatedEntry::single(entry.clone(), calculator.derive_entry(entry)?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::TransfectionKind;
    use crate::volume::Coefficients;

    fn row(source: &str, dna: &str, plate: &str, label: &str, conc: f64) -> ReagentEntry {
        ReagentEntry {
            source: source.parse().unwrap(),
            dna_destination: dna.parse().unwrap(),
            mix_destination: "D1.3".parse().unwrap(),
            plate_destination: plate.parse().unwrap(),
            kind: TransfectionKind::Single,
            label: label.to_string(),
            concentration: conc,
            mass_wanted: 500.0,
        }
    }

    fn calculator() -> VolumeCalculator {
        VolumeCalculator::new(Coefficients::default(), 1.2)
    }

    #[test]
    fn test_replicates_sum_at_first_position() {
        let rows = vec![
            row("A1.1", "B1.2", "A1.1", "mNG", 75.0),
            row("A2.1", "B2.2", "A2.1", "mKO2", 50.0),
            row("A1.1", "B1.2", "A3.1", "mNG rep", 75.0),
        ];
        let calc = calculator();
        let out = aggregate(&rows, &calc).unwrap();

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].label(), "mNG");
        assert_eq!(out[0].replicates, 2);
        assert_eq!(out[0].entry.plate_destination, "A1.1".parse().unwrap());
        assert_eq!(out[1].label(), "mKO2");

        let one = calc.derive_entry(&rows[0]).unwrap();
        let two = calc.derive_entry(&rows[2]).unwrap();
        let summed = one + two;
        assert!((out[0].volumes.dna - summed.dna).abs() < 1e-9);
        assert!((out[0].volumes.opti_mem - summed.opti_mem).abs() < 1e-9);
        assert!((out[0].volumes.reagent_a - summed.reagent_a).abs() < 1e-9);
        assert!((out[0].volumes.reagent_b - summed.reagent_b).abs() < 1e-9);
    }

    #[test]
    fn test_same_source_different_destination_not_merged() {
        let rows = vec![
            row("A1.1", "B1.2", "A1.1", "mNG", 75.0),
            row("A1.1", "B2.2", "A2.1", "mNG again", 75.0),
        ];
        let out = aggregate(&rows, &calculator()).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|e| e.replicates == 1));
    }

    #[test]
    fn test_expand_keeps_every_row() {
        let rows = vec![
            row("A1.1", "B1.2", "A1.1", "mNG", 75.0),
            row("A1.1", "B1.2", "A2.1", "mNG rep", 75.0),
        ];
        let out = expand(&rows, &calculator()).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_invalid_concentration_reports_row_label() {
        let rows = vec![row("A1.1", "B1.2", "A1.1", "broken", 0.0)];
        let err = aggregate(&rows, &calculator()).unwrap_err();
        assert_eq!(
            err,
            crate::error::PlanError::InvalidConcentration {
                label: "broken".into(),
                concentration: 0.0
            }
        );
    }
}
