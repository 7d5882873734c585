//! Transfection Transfer-Plan Compiler
//!
//! Turns a table of DNA rows into an ordered, fully-resolved list of liquid
//! transfers for a three-step lipid transfection:
//!
//! 1. DNA distribution into mixing tubes
//! 2. Reagent-A master mix added to every DNA tube
//! 3. Reagent-B master mix prepared and combined with each DNA mixture
//! 4. Delivery of the combined mixture onto the cells
//!
//! with operator checkpoints between the stages.
//!
//! # Pipeline
//!
//! ```text
//! ReagentEntry rows ─▶ volume ─▶ aggregate ─▶ preflight ─▶ group ─▶ PlanStep list
//! ```
//!
//! The compiler is pure and deterministic; it never touches hardware. The
//! `transfect-runner` crate drives a compiled [`TransferPlan`] against an
//! actuator.

#![allow(dead_code)]
#![allow(clippy::uninlined_format_args)]

pub mod address;
pub mod aggregate;
pub mod allocate;
pub mod config;
pub mod entry;
pub mod error;
pub mod grouping;
pub mod instrument;
pub mod operation;
pub mod plan;
pub mod preflight;
pub mod volume;

pub use address::{ContainerKind, ContainerRef, Deck, LabwareSlot, WellAddress, WellGrid};
pub use allocate::{assign_mix_destinations, DesignRow};
pub use config::{PlannerConfig, ReagentLayout, ReagentNames};
pub use entry::{AggregatedEntry, ReagentEntry, TransfectionKind};
pub use error::{PlanError, PlanResult};
pub use grouping::{group, GroupKey, TransferGroup};
pub use instrument::{Agitation, Instrument, InstrumentLimits};
pub use operation::{
    Barrier, MasterMixTotals, MixSpec, PlanStep, PlanSummary, Stage, StageSettings, TipPolicy,
    TransferOperation, TransferPlan,
};
pub use plan::{ProtocolMachine, ProtocolState, TransferPlanner, TransitionRecord};
pub use volume::{Coefficients, DerivedVolumes, VolumeCalculator};
