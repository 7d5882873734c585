//! Plan output types
//!
//! A compiled [`TransferPlan`] is an ordered list of [`PlanStep`]s. Steps are
//! produced once by the compiler and never mutated afterwards; the executor
//! and renderers only read them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::address::{ContainerKind, WellAddress};
use crate::instrument::Instrument;
use crate::plan::stage_machine::TransitionRecord;

/// The four workflow stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DnaDistribution,
    MasterMixPreparation,
    MixCombination,
    Delivery,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::DnaDistribution,
        Stage::MasterMixPreparation,
        Stage::MixCombination,
        Stage::Delivery,
    ];

    /// 1-based position in the workflow
    pub fn number(self) -> u8 {
        match self {
            Self::DnaDistribution => 1,
            Self::MasterMixPreparation => 2,
            Self::MixCombination => 3,
            Self::Delivery => 4,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DnaDistribution => write!(f, "DNA distribution"),
            Self::MasterMixPreparation => write!(f, "master-mix preparation"),
            Self::MixCombination => write!(f, "mix combination"),
            Self::Delivery => write!(f, "delivery"),
        }
    }
}

/// Human checkpoints between stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Barrier {
    /// Load diluent and reagent A
    ReagentLoading,
    /// Load reagent B
    SecondReagentLoading,
    /// Incubate the combined mixture and load the target plates
    Incubation,
}

impl fmt::Display for Barrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReagentLoading => write!(f, "reagent loading"),
            Self::SecondReagentLoading => write!(f, "second reagent loading"),
            Self::Incubation => write!(f, "incubation"),
        }
    }
}

/// `(count, volume)` mixing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MixSpec {
    pub repetitions: u32,
    /// uL
    pub volume: f64,
}

impl MixSpec {
    pub fn new(repetitions: u32, volume: f64) -> Self {
        Self {
            repetitions,
            volume,
        }
    }
}

impl fmt::Display for MixSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{:.1}", self.repetitions, self.volume)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TipPolicy {
    /// Fresh tip for this operation, discarded afterwards
    AlwaysNew,
    /// Use the tip currently held by the instrument
    NeverNew,
}

/// Aspirate/dispense speed in uL/s.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowRate {
    pub aspirate: f64,
    pub dispense: f64,
}

/// Liquid-handling parameters applied for the duration of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageSettings {
    /// mm above the well bottom when aspirating
    pub aspirate_clearance: f64,
    /// mm above the well bottom when dispensing
    pub dispense_clearance: f64,
    pub high_volume_flow: FlowRate,
    pub low_volume_flow: FlowRate,
}

impl StageSettings {
    pub fn flow(&self, instrument: Instrument) -> FlowRate {
        match instrument {
            Instrument::HighVolume => self.high_volume_flow,
            Instrument::LowVolume => self.low_volume_flow,
        }
    }
}

/// Where a well lives on the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub kind: ContainerKind,
    pub deck_slot: u8,
}

/// One fully-resolved liquid transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferOperation {
    pub stage: Stage,
    /// uL
    pub volume: f64,
    pub source: WellAddress,
    pub source_container: Placement,
    pub destination: WellAddress,
    pub destination_container: Placement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix_before: Option<MixSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mix_after: Option<MixSpec>,
    pub blowout: bool,
    pub tip_policy: TipPolicy,
    pub instrument: Instrument,
}

impl fmt::Display for TransferOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>8.3} uL  {} -> {}  [{}]",
            self.volume, self.source, self.destination, self.instrument
        )?;
        if let Some(mix) = self.mix_before {
            write!(f, " mix-before {mix}")?;
        }
        if let Some(mix) = self.mix_after {
            write!(f, " mix-after {mix}")?;
        }
        if self.tip_policy == TipPolicy::NeverNew {
            write!(f, " held-tip")?;
        }
        Ok(())
    }
}

/// One entry of a compiled plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PlanStep {
    BeginStage {
        stage: Stage,
        settings: StageSettings,
    },
    Transfer(TransferOperation),
    PickUpTip {
        instrument: Instrument,
    },
    DropTip {
        instrument: Instrument,
    },
    Checkpoint {
        barrier: Barrier,
        instruction: String,
    },
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BeginStage { stage, settings } => write!(
                f,
                "== Stage {}: {} (clearance {:.1}/{:.1} mm)",
                stage.number(),
                stage,
                settings.aspirate_clearance,
                settings.dispense_clearance
            ),
            Self::Transfer(op) => write!(f, "   {op}"),
            Self::PickUpTip { instrument } => write!(f, "   pick up {instrument} tip"),
            Self::DropTip { instrument } => write!(f, "   drop {instrument} tip"),
            Self::Checkpoint {
                barrier,
                instruction,
            } => write!(f, "-- PAUSE ({barrier}): {instruction}"),
        }
    }
}

/// Reagent totals prepared in the master-mix wells (uL, surplus included).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MasterMixTotals {
    pub opti_mem: f64,
    pub reagent_a: f64,
    pub reagent_b: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanSummary {
    /// Design rows read
    pub rows: usize,
    /// Entries after replicate aggregation
    pub entries: usize,
    pub transfers_per_stage: BTreeMap<Stage, usize>,
    pub transfers_per_instrument: BTreeMap<Instrument, usize>,
    pub groups_per_stage: BTreeMap<Stage, usize>,
    pub master_mix: MasterMixTotals,
    /// Whether the diluent stock is topped up from the reserve well
    pub diluent_top_up: bool,
}

/// The compiled, ordered output of the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferPlan {
    pub steps: Vec<PlanStep>,
    pub summary: PlanSummary,
    pub transitions: Vec<TransitionRecord>,
}

impl TransferPlan {
    pub fn operations(&self) -> impl Iterator<Item = &TransferOperation> {
        self.steps.iter().filter_map(|step| match step {
            PlanStep::Transfer(op) => Some(op),
            _ => None,
        })
    }

    pub fn operations_in(&self, stage: Stage) -> impl Iterator<Item = &TransferOperation> {
        self.operations().filter(move |op| op.stage == stage)
    }

    pub fn checkpoints(&self) -> impl Iterator<Item = (Barrier, &str)> {
        self.steps.iter().filter_map(|step| match step {
            PlanStep::Checkpoint {
                barrier,
                instruction,
            } => Some((*barrier, instruction.as_str())),
            _ => None,
        })
    }

    /// Human-readable step listing
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        for step in &self.steps {
            out.push_str(&step.to_string());
            out.push('\n');
        }
        out.push_str(&format!(
            "\n{} rows, {} entries, {} transfers; master mix OM {:.2} uL, A {:.2} uL, B {:.2} uL\n",
            self.summary.rows,
            self.summary.entries,
            self.operations().count(),
            self.summary.master_mix.opti_mem,
            self.summary.master_mix.reagent_a,
            self.summary.master_mix.reagent_b,
        ));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(volume: f64) -> TransferOperation {
        let rack = Placement {
            kind: ContainerKind::TubeRack,
            deck_slot: 4,
        };
        TransferOperation {
            stage: Stage::DnaDistribution,
            volume,
            source: "A1".parse().unwrap(),
            source_container: rack,
            destination: "B1".parse().unwrap(),
            destination_container: rack,
            mix_before: Some(MixSpec::new(3, 20.0)),
            mix_after: None,
            blowout: true,
            tip_policy: TipPolicy::AlwaysNew,
            instrument: Instrument::LowVolume,
        }
    }

    #[test]
    fn test_plan_step_serializes_with_tag() {
        let step = PlanStep::DropTip {
            instrument: Instrument::HighVolume,
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["step"], "drop_tip");
        assert_eq!(json["instrument"], "high_volume");

        let transfer = serde_json::to_value(PlanStep::Transfer(op(2.4))).unwrap();
        assert_eq!(transfer["step"], "transfer");
        assert_eq!(transfer["source"], "A1.1");
        assert!(transfer.get("mix_after").is_none());
    }

    #[test]
    fn test_operation_display_lists_mixing() {
        let text = op(2.4154).to_string();
        assert!(text.contains("A1.1 -> B1.1"));
        assert!(text.contains("mix-before 3x20.0"));
    }
}
