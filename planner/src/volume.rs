//! Volume Calculator: fixed linear stoichiometry from DNA mass to the four
//! reagent volumes of one transfection.

use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

use crate::entry::ReagentEntry;
use crate::error::{PlanError, PlanResult};

/// Per-ng reagent ratios (uL per ng of DNA)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Coefficients {
    /// Opti-MEM diluent
    pub opti_mem: f64,
    /// Reagent A (P3000 enhancer)
    pub reagent_a: f64,
    /// Reagent B (Lipofectamine 3000)
    pub reagent_b: f64,
}

impl Default for Coefficients {
    fn default() -> Self {
        Self {
            opti_mem: 0.05,
            reagent_a: 0.0022,
            reagent_b: 0.0022,
        }
    }
}

/// Derived dispense volumes in uL
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DerivedVolumes {
    pub dna: f64,
    pub opti_mem: f64,
    pub reagent_a: f64,
    pub reagent_b: f64,
}

impl DerivedVolumes {
    /// Volume returned to cells in the delivery stage
    pub fn delivery_volume(&self, excess: f64) -> f64 {
        (self.dna + 2.0 * self.opti_mem + 2.0 * self.reagent_a) / excess
    }
}

impl Add for DerivedVolumes {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self {
            dna: self.dna + rhs.dna,
            opti_mem: self.opti_mem + rhs.opti_mem,
            reagent_a: self.reagent_a + rhs.reagent_a,
            reagent_b: self.reagent_b + rhs.reagent_b,
        }
    }
}

impl AddAssign for DerivedVolumes {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for DerivedVolumes {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Compute the four volumes for one requested DNA mass.
///
/// Errors carry an empty label; [`VolumeCalculator::derive_entry`] fills it in.
pub fn derive(
    mass_wanted: f64,
    concentration: f64,
    coefficients: &Coefficients,
    excess: f64,
) -> PlanResult<DerivedVolumes> {
    if !concentration.is_finite() || concentration <= 0.0 {
        return Err(PlanError::InvalidConcentration {
            label: String::new(),
            concentration,
        });
    }
    if !mass_wanted.is_finite() || mass_wanted <= 0.0 {
        return Err(PlanError::InvalidMass {
            label: String::new(),
            mass: mass_wanted,
        });
    }

    Ok(DerivedVolumes {
        dna: (mass_wanted / concentration) * excess,
        opti_mem: mass_wanted * coefficients.opti_mem * excess,
        reagent_a: mass_wanted * coefficients.reagent_a * excess,
        reagent_b: mass_wanted * coefficients.reagent_b * excess,
    })
}

/// Coefficients and excess bound together for one protocol run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeCalculator {
    pub coefficients: Coefficients,
    pub excess: f64,
}

impl VolumeCalculator {
    pub fn new(coefficients: Coefficients, excess: f64) -> Self {
        Self {
            coefficients,
            excess,
        }
    }

    pub fn derive_entry(&self, entry: &ReagentEntry) -> PlanResult<DerivedVolumes> {
        derive(
            entry.mass_wanted,
            entry.concentration,
            &self.coefficients,
            self.excess,
        )
        .map_err(|e| e.labelled(&entry.label))
    }
}
