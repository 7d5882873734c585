//! Protocol State Machine: explicit workflow states and legal transition
//! guards.
//!
//! Both the compiler and the executor walk this graph, so a plan can only be
//! built, and a run can only proceed, in workflow order:
//!
//! ```text
//! Preflight → DnaDistribution → ReagentCheckpoint → MasterMixPreparation
//!   → [SecondReagentCheckpoint →] MixCombination → IncubationCheckpoint
//!   → Delivery → Completed
//! ```
//!
//! Every non-terminal state may move to `Aborted`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};
use crate::operation::{Barrier, Stage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolState {
    /// Validating the design before anything is emitted.
    Preflight,
    DnaDistribution,
    /// Waiting for diluent and reagent A (and B when loaded together).
    ReagentCheckpoint,
    MasterMixPreparation,
    /// Waiting for reagent B.
    SecondReagentCheckpoint,
    MixCombination,
    /// Mixture incubating; operator loads the cell plates.
    IncubationCheckpoint,
    Delivery,
    /// Terminal: every step emitted or executed.
    Completed,
    /// Terminal: compile or run stopped early.
    Aborted,
}

impl ProtocolState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    pub fn for_stage(stage: Stage) -> Self {
        match stage {
            Stage::DnaDistribution => Self::DnaDistribution,
            Stage::MasterMixPreparation => Self::MasterMixPreparation,
            Stage::MixCombination => Self::MixCombination,
            Stage::Delivery => Self::Delivery,
        }
    }

    pub fn for_barrier(barrier: Barrier) -> Self {
        match barrier {
            Barrier::ReagentLoading => Self::ReagentCheckpoint,
            Barrier::SecondReagentLoading => Self::SecondReagentCheckpoint,
            Barrier::Incubation => Self::IncubationCheckpoint,
        }
    }
}

impl fmt::Display for ProtocolState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Preflight => write!(f, "Preflight"),
            Self::DnaDistribution => write!(f, "DnaDistribution"),
            Self::ReagentCheckpoint => write!(f, "ReagentCheckpoint"),
            Self::MasterMixPreparation => write!(f, "MasterMixPreparation"),
            Self::SecondReagentCheckpoint => write!(f, "SecondReagentCheckpoint"),
            Self::MixCombination => write!(f, "MixCombination"),
            Self::IncubationCheckpoint => write!(f, "IncubationCheckpoint"),
            Self::Delivery => write!(f, "Delivery"),
            Self::Completed => write!(f, "Completed"),
            Self::Aborted => write!(f, "Aborted"),
        }
    }
}

fn is_legal_transition(from: ProtocolState, to: ProtocolState) -> bool {
    use ProtocolState::*;

    if to == Aborted && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Preflight, DnaDistribution)
            | (DnaDistribution, ReagentCheckpoint)
            | (ReagentCheckpoint, MasterMixPreparation)
            | (MasterMixPreparation, SecondReagentCheckpoint)
            // reagent B loaded at the first checkpoint
            | (MasterMixPreparation, MixCombination)
            | (SecondReagentCheckpoint, MixCombination)
            | (MixCombination, IncubationCheckpoint)
            | (IncubationCheckpoint, Delivery)
            | (Delivery, Completed)
    )
}

/// A single recorded state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: ProtocolState,
    pub to: ProtocolState,
    /// Number of plan steps emitted or executed before the transition.
    pub step: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Tracks the current protocol state and logs every transition.
#[derive(Debug, Clone)]
pub struct ProtocolMachine {
    current: ProtocolState,
    step: usize,
    transitions: Vec<TransitionRecord>,
}

impl ProtocolMachine {
    pub fn new() -> Self {
        Self {
            current: ProtocolState::Preflight,
            step: 0,
            transitions: Vec::new(),
        }
    }

    pub fn current(&self) -> ProtocolState {
        self.current
    }

    pub fn set_step(&mut self, step: usize) {
        self.step = step;
    }

    pub fn advance(&mut self, to: ProtocolState, reason: Option<&str>) -> PlanResult<()> {
        if !is_legal_transition(self.current, to) {
            return Err(PlanError::IllegalStageTransition {
                from: self.current.to_string(),
                to: to.to_string(),
            });
        }

        tracing::debug!(
            from = %self.current,
            to = %to,
            step = self.step,
            "Protocol transition"
        );

        self.transitions.push(TransitionRecord {
            from: self.current,
            to,
            step: self.step,
            reason: reason.map(String::from),
        });
        self.current = to;
        Ok(())
    }

    /// Move to `Aborted`; legal from any non-terminal state.
    pub fn abort(&mut self, reason: &str) -> PlanResult<()> {
        self.advance(ProtocolState::Aborted, Some(reason))
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        &self.transitions
    }

    pub fn into_transitions(self) -> Vec<TransitionRecord> {
        self.transitions
    }

    pub fn summary(&self) -> String {
        let states: Vec<String> = self.transitions.iter().map(|t| t.to.to_string()).collect();
        if states.is_empty() {
            format!("{} (no transitions)", self.current)
        } else {
            format!("{} → {}", ProtocolState::Preflight, states.join(" → "))
        }
    }
}

impl Default for ProtocolMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProtocolState::*;

    fn walk(machine: &mut ProtocolMachine, states: &[ProtocolState]) {
        for &state in states {
            machine.advance(state, None).unwrap();
        }
    }

    #[test]
    fn test_initial_state() {
        let machine = ProtocolMachine::new();
        assert_eq!(machine.current(), Preflight);
        assert!(!machine.is_terminal());
        assert!(machine.transitions().is_empty());
    }

    #[test]
    fn test_full_workflow_with_second_reagent_checkpoint() {
        let mut machine = ProtocolMachine::new();
        walk(
            &mut machine,
            &[
                DnaDistribution,
                ReagentCheckpoint,
                MasterMixPreparation,
                SecondReagentCheckpoint,
                MixCombination,
                IncubationCheckpoint,
                Delivery,
                Completed,
            ],
        );
        assert!(machine.is_terminal());
        assert_eq!(machine.transitions().len(), 8);
    }

    #[test]
    fn test_second_reagent_checkpoint_is_optional() {
        let mut machine = ProtocolMachine::new();
        walk(
            &mut machine,
            &[DnaDistribution, ReagentCheckpoint, MasterMixPreparation, MixCombination],
        );
        assert_eq!(machine.current(), MixCombination);
    }

    #[test]
    fn test_cannot_skip_checkpoint() {
        let mut machine = ProtocolMachine::new();
        walk(&mut machine, &[DnaDistribution]);
        let err = machine.advance(MasterMixPreparation, None).unwrap_err();
        assert_eq!(
            err,
            PlanError::IllegalStageTransition {
                from: "DnaDistribution".into(),
                to: "MasterMixPreparation".into(),
            }
        );
        assert!(err.is_defect());
    }

    #[test]
    fn test_abort_from_any_non_terminal_state() {
        for state in [
            Preflight,
            DnaDistribution,
            ReagentCheckpoint,
            MasterMixPreparation,
            SecondReagentCheckpoint,
            MixCombination,
            IncubationCheckpoint,
            Delivery,
        ] {
            let mut machine = ProtocolMachine {
                current: state,
                step: 0,
                transitions: Vec::new(),
            };
            assert!(machine.abort("operator cancelled").is_ok());
            assert_eq!(machine.current(), Aborted);
        }
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut machine = ProtocolMachine::new();
        machine.abort("preflight failed").unwrap();
        assert!(machine.abort("again").is_err());
        assert!(machine.advance(DnaDistribution, None).is_err());
    }

    #[test]
    fn test_transition_records_step_and_reason() {
        let mut machine = ProtocolMachine::new();
        machine.set_step(0);
        machine.advance(DnaDistribution, Some("preflight ok")).unwrap();
        machine.set_step(7);
        machine.advance(ReagentCheckpoint, None).unwrap();
        let log = machine.transitions();
        assert_eq!(log[0].reason.as_deref(), Some("preflight ok"));
        assert_eq!(log[1].step, 7);
        assert!(machine.summary().contains("ReagentCheckpoint"));
    }
}
