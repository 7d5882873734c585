//! Runner error taxonomy.
//!
//! `DesignTableError` covers ingestion of the design CSV; `RunError` covers
//! executing a compiled plan. Planner errors are wrapped, never flattened to
//! strings, so callers can still reach `recovery_suggestion()`.

use std::path::PathBuf;

use planner::{Barrier, PlanError};
use thiserror::Error;

/// Failure reported by hardware behind an actuator or checkpoint gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DeviceError {
    pub message: String,
}

impl DeviceError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum DesignTableError {
    #[error("Failed to open design table {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed design table: {0}")]
    Csv(#[from] csv::Error),

    #[error("Design table is missing column '{column}'")]
    MissingColumn { column: &'static str },

    #[error("Design table line {line}: {source}")]
    Row {
        line: u64,
        #[source]
        source: PlanError,
    },

    #[error(transparent)]
    Plan(#[from] PlanError),
}

impl DesignTableError {
    pub fn row(line: u64, source: PlanError) -> Self {
        Self::Row { line, source }
    }

    /// The underlying planner error, if any
    pub fn plan_error(&self) -> Option<&PlanError> {
        match self {
            Self::Row { source, .. } | Self::Plan(source) => Some(source),
            _ => None,
        }
    }

    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Io { .. } => Some("Check the design table path and permissions."),
            Self::Csv(_) => Some(
                "Export the spreadsheet as comma-separated values with the header row intact.",
            ),
            Self::MissingColumn { .. } => Some(
                "Keep the template header names: DNA source, DNA destination, Plate destination, \
                 Transfection type, Contents, Concentration (ng/uL), DNA wanted (ng).",
            ),
            Self::Row { source, .. } | Self::Plan(source) => source.recovery_suggestion(),
        }
    }

    pub fn with_suggestion(&self) -> String {
        match self.recovery_suggestion() {
            Some(suggestion) => format!("{}\n\nRecovery: {}", self, suggestion),
            None => self.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Actuator failed at step {step}: {source}")]
    Actuator {
        step: usize,
        #[source]
        source: DeviceError,
    },

    #[error("Checkpoint '{barrier}' failed: {source}")]
    Checkpoint {
        barrier: Barrier,
        #[source]
        source: DeviceError,
    },

    #[error("Run cancelled before step {step}")]
    Cancelled { step: usize },

    #[error("Plan is out of protocol order: {0}")]
    Protocol(#[from] PlanError),
}

impl RunError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
