//! Master-mix well allocation for designs that omit the mix-destination
//! column (single-rack layouts).
//!
//! One well per DNA-keyed group is taken in row-major order, starting right
//! after the last row's DNA destination and skipping wells already named by
//! the design or reserved for reagents.

use std::collections::HashSet;

use crate::address::{WellAddress, WellGrid};
use crate::entry::{ReagentEntry, TransfectionKind};
use crate::error::{PlanError, PlanResult};
use crate::grouping::{group, GroupKey, Groupable};

/// A typed design row whose mix destination may still be unassigned.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignRow {
    pub source: WellAddress,
    pub dna_destination: WellAddress,
    pub mix_destination: Option<WellAddress>,
    pub plate_destination: WellAddress,
    pub kind: TransfectionKind,
    pub label: String,
    pub concentration: f64,
    pub mass_wanted: f64,
}

impl DesignRow {
    fn into_entry(self, mix_destination: WellAddress) -> ReagentEntry {
        ReagentEntry {
            source: self.source,
            dna_destination: self.dna_destination,
            mix_destination,
            plate_destination: self.plate_destination,
            kind: self.kind,
            label: self.label,
            concentration: self.concentration,
            mass_wanted: self.mass_wanted,
        }
    }
}

impl Groupable for DesignRow {
    fn kind(&self) -> TransfectionKind {
        self.kind
    }

    fn dna_destination(&self) -> WellAddress {
        self.dna_destination
    }

    fn mix_destination(&self) -> Option<WellAddress> {
        self.mix_destination
    }

    fn plate_destination(&self) -> WellAddress {
        self.plate_destination
    }
}

/// Turn design rows into entries, allocating any missing mix destinations.
/// `reserved` wells (reagent stocks and master-mix tubes) are never handed out.
pub fn assign_mix_destinations(
    rows: Vec<DesignRow>,
    grid: &WellGrid,
    reserved: &[WellAddress],
) -> PlanResult<Vec<ReagentEntry>> {
    if rows.iter().all(|row| row.mix_destination.is_some()) {
        return Ok(rows
            .into_iter()
            .map(|row| {
                let mix = row.mix_destination.unwrap_or(row.dna_destination);
                row.into_entry(mix)
            })
            .collect());
    }

    let Some(last) = rows.last().map(|row| row.dna_destination) else {
        return Ok(Vec::new());
    };

    let used: HashSet<WellAddress> = rows
        .iter()
        .flat_map(|row| [Some(row.source), Some(row.dna_destination), row.mix_destination])
        .flatten()
        .chain(reserved.iter().copied())
        .collect();

    let groups = group(&rows, GroupKey::DnaDestination);
    let pending: Vec<_> = groups
        .iter()
        .filter(|g| g.members().iter().any(|&i| rows[i].mix_destination.is_none()))
        .collect();

    let mut assigned: Vec<Option<WellAddress>> = rows.iter().map(|r| r.mix_destination).collect();
    let mut cursor = last;
    for (allocated, group) in pending.iter().enumerate() {
        let well = next_free(grid, &mut cursor, &used).ok_or_else(|| {
            PlanError::MixWellsExhausted {
                container: last.container_index,
                needed: pending.len(),
                available: allocated,
            }
        })?;
        for &index in group.members() {
            assigned[index].get_or_insert(well);
        }
        tracing::debug!(well = %well, members = group.len(), "Allocated master-mix well");
    }

    Ok(rows
        .into_iter()
        .zip(assigned)
        .map(|(row, mix)| {
            let mix = mix.unwrap_or(row.dna_destination);
            row.into_entry(mix)
        })
        .collect())
}

fn next_free(
    grid: &WellGrid,
    cursor: &mut WellAddress,
    used: &HashSet<WellAddress>,
) -> Option<WellAddress> {
    loop {
        let next = grid.successor(cursor)?;
        *cursor = next;
        if !used.contains(&next) {
            return Some(next);
        }
    }
}
