//! Experiment design records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::address::WellAddress;
use crate::error::PlanError;
use crate::volume::DerivedVolumes;

/// How a row's DNA is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransfectionKind {
    /// One plasmid per well
    Single,
    /// Pre-pooled plasmids in one tube
    Poly,
    /// Several rows combined into one shared mixture
    Co,
}

impl TransfectionKind {
    pub fn is_co(self) -> bool {
        matches!(self, Self::Co)
    }
}

impl fmt::Display for TransfectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single => write!(f, "Single"),
            Self::Poly => write!(f, "Poly"),
            Self::Co => write!(f, "Co"),
        }
    }
}

impl FromStr for TransfectionKind {
    type Err = PlanError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "poly" => Ok(Self::Poly),
            "co" => Ok(Self::Co),
            _ => Err(PlanError::UnknownTransfectionType {
                value: value.to_string(),
            }),
        }
    }
}

/// One row of the experiment design.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReagentEntry {
    pub source: WellAddress,
    pub dna_destination: WellAddress,
    pub mix_destination: WellAddress,
    pub plate_destination: WellAddress,
    pub kind: TransfectionKind,
    pub label: String,
    /// ng/uL
    pub concentration: f64,
    /// ng
    pub mass_wanted: f64,
}

/// A representative entry with volumes summed over its technical replicates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedEntry {
    pub entry: ReagentEntry,
    pub volumes: DerivedVolumes,
    /// Number of design rows folded into this entry
    pub replicates: usize,
}

impl AggregatedEntry {
    pub fn single(entry: ReagentEntry, volumes: DerivedVolumes) -> Self {
        Self {
            entry,
            volumes,
            replicates: 1,
        }
    }

    pub fn label(&self) -> &str {
        &self.entry.label
    }

    pub fn kind(&self) -> TransfectionKind {
        self.entry.kind
    }

    /// Replicate identity: same source tube, same DNA destination tube
    pub fn is_replicate_of(&self, other: &ReagentEntry) -> bool {
        self.entry.source == other.source && self.entry.dna_destination == other.dna_destination
    }
}
