//! Bench-side runner for the transfection planner.
//!
//! Loads the design spreadsheet export and the bench config, compiles a
//! [`planner::TransferPlan`], and executes it against an [`Actuator`] with
//! operator checkpoints behind a [`CheckpointGate`].

#![allow(clippy::uninlined_format_args)]

pub mod config;
pub mod design_table;
pub mod error;
pub mod executor;

pub use config::{RunSettings, RunnerConfig, CONFIG_ENV};
pub use design_table::{load_design, read_design};
pub use error::{DesignTableError, DeviceError, RunError};
pub use executor::{
    Actuator, AutoAcknowledge, CheckpointAck, CheckpointGate, LineGate, LoggingActuator,
    PlanExecutor, RunReport, StdinGate,
};
