//! Protocol configuration
//!
//! Every constant of the workflow lives here. All fields carry serde
//! defaults matching the three-rack bench layout, so a config file only needs
//! to name what differs.

use serde::{Deserialize, Serialize};

use crate::address::{LabwareSlot, WellAddress, WellGrid};
use crate::error::{PlanError, PlanResult};
use crate::grouping::GroupKey;
use crate::instrument::{Agitation, InstrumentLimits};
use crate::operation::{FlowRate, Stage, StageSettings};
use crate::volume::{Coefficients, VolumeCalculator};

const TUBE_RACK: &str = "opentrons_24_tuberack_eppendorf_1.5ml_safelock_snapcap";
const PLATE: &str = "corning_24_wellplate_3.4ml_flat";

/// Labware on the deck. The n-th entry of each list is container index n.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeckLayout {
    pub racks: Vec<LabwareSlot>,
    pub plates: Vec<LabwareSlot>,
}

impl Default for DeckLayout {
    fn default() -> Self {
        Self {
            racks: [4, 5, 6]
                .into_iter()
                .map(|slot| LabwareSlot::new(slot, TUBE_RACK))
                .collect(),
            plates: [2, 3]
                .into_iter()
                .map(|slot| LabwareSlot::new(slot, PLATE))
                .collect(),
        }
    }
}

/// Display names used in checkpoint instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReagentNames {
    pub diluent: String,
    pub reagent_a: String,
    pub reagent_b: String,
}

impl Default for ReagentNames {
    fn default() -> Self {
        Self {
            diluent: "OM".to_string(),
            reagent_a: "P3000".to_string(),
            reagent_b: "L3000".to_string(),
        }
    }
}

/// Fixed wells for reagent stocks and the two master-mix tubes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReagentLayout {
    pub reagent_a_stock: WellAddress,
    pub reagent_b_stock: WellAddress,
    pub diluent_stock: WellAddress,
    /// Extra diluent used to top up the stock before the second recipe
    pub diluent_reserve: Option<WellAddress>,
    pub mix_a: WellAddress,
    pub mix_b: WellAddress,
    pub names: ReagentNames,
}

impl Default for ReagentLayout {
    fn default() -> Self {
        Self {
            reagent_a_stock: WellAddress::new('D', 4, 3),
            reagent_b_stock: WellAddress::new('D', 3, 3),
            diluent_stock: WellAddress::new('D', 6, 3),
            diluent_reserve: Some(WellAddress::new('D', 5, 3)),
            mix_a: WellAddress::new('D', 2, 3),
            mix_b: WellAddress::new('D', 1, 3),
            names: ReagentNames::default(),
        }
    }
}

impl ReagentLayout {
    /// Every fixed well, for container resolution and collision checks
    pub fn wells(&self) -> Vec<(&'static str, WellAddress)> {
        let mut wells = vec![
            ("reagent_a_stock", self.reagent_a_stock),
            ("reagent_b_stock", self.reagent_b_stock),
            ("diluent_stock", self.diluent_stock),
            ("mix_a", self.mix_a),
            ("mix_b", self.mix_b),
        ];
        if let Some(reserve) = self.diluent_reserve {
            wells.push(("diluent_reserve", reserve));
        }
        wells
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MixingConfig {
    pub repetitions: u32,
    /// Pre-aspiration mix of a DNA source the first time it is used
    pub source_mix: Agitation,
    /// Post-dispense mix on the last row of a co-transfection group
    pub co_mix: Agitation,
    /// Diluent added to a master-mix well
    pub recipe_mix: Agitation,
    /// Reagent-A mix distributed to DNA tubes
    pub distribution_mix: Agitation,
    /// DNA mixture combined into the reagent-B well
    pub combination_mix: Agitation,
}

impl Default for MixingConfig {
    fn default() -> Self {
        Self {
            repetitions: 3,
            source_mix: Agitation::Fixed { volume: 20.0 },
            co_mix: Agitation::Fixed { volume: 20.0 },
            recipe_mix: Agitation::Scaled { low_volume: None },
            distribution_mix: Agitation::Scaled {
                low_volume: Some(15.0),
            },
            combination_mix: Agitation::Scaled {
                low_volume: Some(20.0),
            },
        }
    }
}

/// Per-stage liquid-handling settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageSettingsTable {
    pub dna_distribution: StageSettings,
    pub master_mix_preparation: StageSettings,
    pub mix_combination: StageSettings,
    pub delivery: StageSettings,
}

const HIGH_FLOW: FlowRate = FlowRate {
    aspirate: 250.0,
    dispense: 250.0,
};

const LOW_FLOW: FlowRate = FlowRate {
    aspirate: 20.0,
    dispense: 20.0,
};

impl Default for StageSettingsTable {
    fn default() -> Self {
        let prep = StageSettings {
            aspirate_clearance: 0.5,
            dispense_clearance: 0.5,
            high_volume_flow: HIGH_FLOW,
            low_volume_flow: LOW_FLOW,
        };
        Self {
            dna_distribution: StageSettings {
                aspirate_clearance: 0.1,
                ..prep
            },
            master_mix_preparation: prep,
            mix_combination: prep,
            // slow, high dispense so the monolayer is not disturbed
            delivery: StageSettings {
                dispense_clearance: 2.0,
                high_volume_flow: FlowRate {
                    dispense: 50.0,
                    ..HIGH_FLOW
                },
                ..prep
            },
        }
    }
}

impl StageSettingsTable {
    pub fn for_stage(&self, stage: Stage) -> StageSettings {
        match stage {
            Stage::DnaDistribution => self.dna_distribution,
            Stage::MasterMixPreparation => self.master_mix_preparation,
            Stage::MixCombination => self.mix_combination,
            Stage::Delivery => self.delivery,
        }
    }
}

/// Destination key used to form co-transfection groups in each stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingConfig {
    pub dna_distribution: GroupKey,
    pub master_mix_preparation: GroupKey,
    pub mix_combination: GroupKey,
    pub delivery: GroupKey,
}

impl Default for GroupingConfig {
    fn default() -> Self {
        Self {
            dna_distribution: GroupKey::DnaDestination,
            master_mix_preparation: GroupKey::DnaDestination,
            mix_combination: GroupKey::DnaDestination,
            delivery: GroupKey::DnaAndPlateDestination,
        }
    }
}

impl GroupingConfig {
    pub fn for_stage(&self, stage: Stage) -> GroupKey {
        match stage {
            Stage::DnaDistribution => self.dna_distribution,
            Stage::MasterMixPreparation => self.master_mix_preparation,
            Stage::MixCombination => self.mix_combination,
            Stage::Delivery => self.delivery,
        }
    }
}

/// Complete parameter set for one protocol run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub coefficients: Coefficients,
    /// Pipetting-loss multiplier applied to every derived volume
    pub excess: f64,
    /// Extra multiplier on master-mix totals
    pub master_mix_surplus: f64,
    pub limits: InstrumentLimits,
    pub grid: WellGrid,
    pub deck: DeckLayout,
    pub reagents: ReagentLayout,
    /// Diluent total above which the stock is topped up from the reserve
    pub diluent_reserve_trigger: f64,
    pub mixing: MixingConfig,
    pub stages: StageSettingsTable,
    pub grouping: GroupingConfig,
    pub aggregate_replicates: bool,
    /// Pause for reagent B separately instead of loading it at the first pause
    pub reagent_b_staged_separately: bool,
    pub incubation_minutes: u32,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            coefficients: Coefficients::default(),
            excess: 1.2,
            master_mix_surplus: 1.2,
            limits: InstrumentLimits::default(),
            grid: WellGrid::default(),
            deck: DeckLayout::default(),
            reagents: ReagentLayout::default(),
            diluent_reserve_trigger: 750.0,
            mixing: MixingConfig::default(),
            stages: StageSettingsTable::default(),
            grouping: GroupingConfig::default(),
            aggregate_replicates: true,
            reagent_b_staged_separately: true,
            incubation_minutes: 10,
        }
    }
}

impl PlannerConfig {
    /// Single-rack bench: every tube on rack 1, no replicate folding.
    pub fn single_rack() -> Self {
        let rack = |row, column| WellAddress::new(row, column, 1);
        Self {
            deck: DeckLayout {
                racks: vec![LabwareSlot::new(4, TUBE_RACK)],
                plates: vec![LabwareSlot::new(2, PLATE)],
            },
            reagents: ReagentLayout {
                reagent_a_stock: rack('D', 5),
                reagent_b_stock: rack('D', 4),
                diluent_stock: rack('D', 6),
                diluent_reserve: None,
                mix_a: rack('D', 3),
                mix_b: rack('D', 2),
                names: ReagentNames::default(),
            },
            aggregate_replicates: false,
            reagent_b_staged_separately: false,
            ..Self::default()
        }
    }

    /// Number of tube racks (container indices available to tube addresses)
    pub fn number_of_containers(&self) -> usize {
        self.deck.racks.len()
    }

    pub fn calculator(&self) -> VolumeCalculator {
        VolumeCalculator::new(self.coefficients, self.excess)
    }

    pub fn validate(&self) -> PlanResult<()> {
        let Coefficients {
            opti_mem,
            reagent_a,
            reagent_b,
        } = self.coefficients;
        for (name, value) in [
            ("coefficients.opti_mem", opti_mem),
            ("coefficients.reagent_a", reagent_a),
            ("coefficients.reagent_b", reagent_b),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PlanError::config(format!("{name} must be non-negative, got {value}")));
            }
        }
        for (name, value) in [
            ("excess", self.excess),
            ("master_mix_surplus", self.master_mix_surplus),
        ] {
            if !value.is_finite() || value < 1.0 {
                return Err(PlanError::config(format!("{name} must be at least 1.0, got {value}")));
            }
        }
        self.limits.validate().map_err(PlanError::config)?;

        if self.grid.rows == 0 || self.grid.rows > 26 || self.grid.columns == 0 {
            return Err(PlanError::config(format!(
                "grid {}x{} is not usable",
                self.grid.rows, self.grid.columns
            )));
        }
        if self.deck.racks.is_empty() {
            return Err(PlanError::config("deck.racks must list at least one tube rack"));
        }
        if self.deck.plates.is_empty() {
            return Err(PlanError::config("deck.plates must list at least one plate"));
        }
        if self.mixing.repetitions == 0 {
            return Err(PlanError::config("mixing.repetitions must be at least 1"));
        }

        let wells = self.reagents.wells();
        for (index, (name, well)) in wells.iter().enumerate() {
            self.grid.check(well).map_err(|e| {
                PlanError::config(format!("reagents.{name}: {e}"))
            })?;
            if let Some((other, _)) = wells[..index].iter().find(|(_, w)| w == well) {
                return Err(PlanError::config(format!(
                    "reagents.{name} and reagents.{other} share well {well}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_bench_layout() {
        let config = PlannerConfig::default();
        assert_eq!(config.number_of_containers(), 3);
        assert_eq!(config.deck.racks[2].deck_slot, 6);
        assert_eq!(config.reagents.diluent_stock.to_string(), "D6.3");
        assert_eq!(config.stages.delivery.high_volume_flow.dispense, 50.0);
        assert_eq!(config.stages.delivery.high_volume_flow.aspirate, 250.0);
        assert_eq!(config.stages.dna_distribution.aspirate_clearance, 0.1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_single_rack_profile_is_valid() {
        let config = PlannerConfig::single_rack();
        assert_eq!(config.number_of_containers(), 1);
        assert!(!config.aggregate_replicates);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_single_rack_reagent_wells() {
        let reagents = PlannerConfig::single_rack().reagents;
        assert_eq!(reagents.reagent_a_stock.to_string(), "D5.1");
        assert_eq!(reagents.mix_a.to_string(), "D3.1");
        assert_eq!(reagents.reagent_b_stock.to_string(), "D4.1");
        assert_eq!(reagents.mix_b.to_string(), "D2.1");
        assert_eq!(reagents.diluent_stock.to_string(), "D6.1");
    }

    #[test]
    fn test_validate_rejects_shared_reagent_wells() {
        let mut config = PlannerConfig::default();
        config.reagents.mix_b = config.reagents.mix_a;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("mix_b"));
    }

    #[test]
    fn test_validate_rejects_excess_below_one() {
        let config = PlannerConfig {
            excess: 0.9,
            ..PlannerConfig::default()
        };
        assert!(matches!(config.validate(), Err(PlanError::Config { .. })));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PlannerConfig =
            serde_json::from_str(r#"{"excess": 1.1, "limits": {"switch_threshold": 25.0}}"#).unwrap();
        assert_eq!(config.excess, 1.1);
        assert_eq!(config.limits.switch_threshold, 25.0);
        assert_eq!(config.limits.high_volume_ceiling, 200.0);
        assert!(config.aggregate_replicates);
    }
}
