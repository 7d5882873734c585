//! Planner error types
//!
//! Every fatal condition the compiler can hit is represented here. Errors
//! carry the offending row label or computed value so the operator can fix the
//! design table and recompile from scratch.

use crate::address::ContainerKind;
use thiserror::Error;

/// Result type alias for planner operations
pub type PlanResult<T> = Result<T, PlanError>;

/// Errors that can occur while compiling a transfer plan
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    /// A well reference could not be parsed
    #[error("Malformed well address '{input}': {reason}")]
    MalformedAddress { input: String, reason: String },

    /// A well references a container index with no registered container
    #[error("Unknown {kind} container index {index} in address {address}")]
    UnknownContainer {
        address: String,
        kind: ContainerKind,
        index: u8,
    },

    /// Concentration is zero, negative or not a number
    #[error("Invalid concentration {concentration} ng/uL for '{label}'")]
    InvalidConcentration { label: String, concentration: f64 },

    /// Transfection type column holds something other than Single/Poly/Co
    #[error("Unknown transfection type '{value}' (expected Single, Poly or Co)")]
    UnknownTransfectionType { value: String },

    /// Requested DNA mass is zero, negative or not a number
    #[error("Invalid DNA mass {mass} ng for '{label}'")]
    InvalidMass { label: String, mass: f64 },

    /// DNA volume falls under the low-volume instrument's floor
    #[error(
        "DNA concentration in tube '{label}' is too high: {volume:.4} uL required, minimum is {floor} uL"
    )]
    VolumeTooLow {
        label: String,
        volume: f64,
        floor: f64,
    },

    /// A group lookup walked past the end of the entry list
    #[error("Group member index {index} out of range for {len} entries")]
    GroupingIndexOverrun { index: usize, len: usize },

    /// Not enough free wells left to allocate master-mix destinations
    #[error("Cannot allocate {needed} mix wells in container {container}: only {available} free")]
    MixWellsExhausted {
        container: u8,
        needed: usize,
        available: usize,
    },

    /// An emitted operation would carry a non-positive or non-finite volume
    #[error("Invalid transfer volume {volume} uL for {context}")]
    InvalidVolume { context: String, volume: f64 },

    /// The protocol state machine rejected a transition
    #[error("Illegal protocol transition: {from} -> {to}")]
    IllegalStageTransition { from: String, to: String },

    /// The design table has no rows
    #[error("Design table contains no rows")]
    EmptyDesign,

    /// Configuration is internally inconsistent
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl PlanError {
    /// Create a malformed address error
    pub fn malformed(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedAddress {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an invalid volume error
    pub fn invalid_volume(context: impl Into<String>, volume: f64) -> Self {
        Self::InvalidVolume {
            context: context.into(),
            volume,
        }
    }

    /// Attach a row label to errors raised before the label was known
    pub fn labelled(self, label: &str) -> Self {
        match self {
            Self::InvalidConcentration { concentration, .. } => Self::InvalidConcentration {
                label: label.to_string(),
                concentration,
            },
            Self::InvalidMass { mass, .. } => Self::InvalidMass {
                label: label.to_string(),
                mass,
            },
            other => other,
        }
    }

    /// Internal invariant violations that indicate a bug rather than bad input
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::GroupingIndexOverrun { .. }
                | Self::InvalidVolume { .. }
                | Self::IllegalStageTransition { .. }
        )
    }

    /// Get recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::MalformedAddress { .. } => Some(
                "Use the form <Row><Column>[.<Container>], e.g. A1 or B3.2, with the row and \
                 column inside the rack grid.",
            ),
            Self::UnknownContainer { .. } => Some(
                "Register the container on the deck in the protocol config, or fix the \
                 container suffix in the design table.",
            ),
            Self::InvalidConcentration { .. } => {
                Some("Enter a positive concentration (ng/uL) for this row and re-run.")
            }
            Self::UnknownTransfectionType { .. } => {
                Some("Set the 'Transfection type' column to Single, Poly or Co.")
            }
            Self::InvalidMass { .. } => {
                Some("Enter a positive 'DNA wanted (ng)' value for this row and re-run.")
            }
            Self::VolumeTooLow { .. } => Some(
                "Dilute the DNA so at least 1 uL can be pipetted, update the concentration \
                 in the design table, and re-run.",
            ),
            Self::MixWellsExhausted { .. } => Some(
                "Add an explicit master-mix destination column or free up wells after the \
                 last DNA destination.",
            ),
            Self::EmptyDesign => Some("Add at least one DNA row to the design table."),
            Self::Config { .. } => Some("Check the protocol config values and re-run."),
            Self::GroupingIndexOverrun { .. }
            | Self::InvalidVolume { .. }
            | Self::IllegalStageTransition { .. } => None,
        }
    }

    /// Get error with recovery suggestion formatted
    pub fn with_suggestion(&self) -> String {
        match self.recovery_suggestion() {
            Some(suggestion) => format!("{}\n\nRecovery: {}", self, suggestion),
            None => format!("{} (internal planner defect)", self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labelled_fills_concentration_label() {
        let err = PlanError::InvalidConcentration {
            label: String::new(),
            concentration: 0.0,
        }
        .labelled("mNG");
        assert_eq!(
            err,
            PlanError::InvalidConcentration {
                label: "mNG".into(),
                concentration: 0.0
            }
        );
    }

    #[test]
    fn test_labelled_leaves_other_errors_alone() {
        let err = PlanError::config("bad").labelled("mNG");
        assert_eq!(err, PlanError::config("bad"));
    }

    #[test]
    fn test_defects_have_no_suggestion() {
        let err = PlanError::GroupingIndexOverrun { index: 4, len: 2 };
        assert!(err.is_defect());
        assert!(err.recovery_suggestion().is_none());
        assert!(err.with_suggestion().contains("internal planner defect"));
    }

    #[test]
    fn test_volume_too_low_message_names_label() {
        let err = PlanError::VolumeTooLow {
            label: "pEH004".into(),
            volume: 0.0012,
            floor: 1.0,
        };
        assert!(!err.is_defect());
        assert!(err.to_string().contains("pEH004"));
        assert!(err.with_suggestion().contains("Dilute"));
    }
}
