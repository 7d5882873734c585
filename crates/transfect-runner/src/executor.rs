//! Plan executor: drives a compiled plan against hardware seams.
//!
//! ## Lifecycle
//!
//! ```text
//! PlanExecutor::run(plan, actuator, gate, cancel)
//!   → for each step:
//!       check cancellation
//!       BeginStage  → actuator.apply_settings
//!       PickUpTip   → actuator.pick_up_tip      (tip now held)
//!       Transfer    → actuator.transfer
//!       DropTip     → actuator.drop_tip         (tip released)
//!       Checkpoint  → gate.wait raced against cancellation
//!   → on error: drop every held tip, then propagate
//! ```

use std::io::Write as _;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use planner::{
    Barrier, Instrument, PlanStep, ProtocolMachine, ProtocolState, Stage, StageSettings,
    TransferOperation, TransferPlan, TransitionRecord,
};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{DeviceError, RunError};

/// Physical liquid handling.
#[async_trait]
pub trait Actuator: Send {
    async fn apply_settings(
        &mut self,
        stage: Stage,
        settings: &StageSettings,
    ) -> Result<(), DeviceError>;

    async fn pick_up_tip(&mut self, instrument: Instrument) -> Result<(), DeviceError>;

    async fn drop_tip(&mut self, instrument: Instrument) -> Result<(), DeviceError>;

    async fn transfer(&mut self, operation: &TransferOperation) -> Result<(), DeviceError>;
}

/// Operator acknowledgement at a checkpoint.
#[async_trait]
pub trait CheckpointGate: Send {
    /// Resolve once the operator has completed the instruction.
    async fn wait(&mut self, barrier: Barrier, instruction: &str) -> Result<(), DeviceError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointAck {
    pub barrier: Barrier,
    pub acknowledged_at: DateTime<Utc>,
}

/// What happened during one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub operations_executed: usize,
    pub tips_picked_up: usize,
    pub checkpoints: Vec<CheckpointAck>,
    pub transitions: Vec<TransitionRecord>,
}

/// Mutable bookkeeping while a run is in flight.
struct RunState {
    machine: ProtocolMachine,
    held: Vec<Instrument>,
    operations: usize,
    tips: usize,
    checkpoints: Vec<CheckpointAck>,
}

impl RunState {
    fn new() -> Self {
        Self {
            machine: ProtocolMachine::new(),
            held: Vec::new(),
            operations: 0,
            tips: 0,
            checkpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct PlanExecutor;

impl PlanExecutor {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(
        &self,
        plan: &TransferPlan,
        actuator: &mut dyn Actuator,
        gate: &mut dyn CheckpointGate,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let mut state = RunState::new();

        tracing::info!(run_id = %run_id, steps = plan.steps.len(), "Run starting");

        for (index, step) in plan.steps.iter().enumerate() {
            state.machine.set_step(index);
            let outcome = if cancel.is_cancelled() {
                Err(RunError::Cancelled { step: index })
            } else {
                Self::apply(index, step, &mut state, actuator, gate, cancel).await
            };

            if let Err(error) = outcome {
                return Err(Self::abort(error, &mut state, actuator).await);
            }
        }

        state.machine.set_step(plan.steps.len());
        state.machine.advance(ProtocolState::Completed, None)?;

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            operations_executed: state.operations,
            tips_picked_up: state.tips,
            checkpoints: state.checkpoints,
            transitions: state.machine.into_transitions(),
        };
        tracing::info!(
            run_id = %run_id,
            operations = report.operations_executed,
            "Run completed"
        );
        Ok(report)
    }

    async fn apply(
        index: usize,
        step: &PlanStep,
        state: &mut RunState,
        actuator: &mut dyn Actuator,
        gate: &mut dyn CheckpointGate,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        let device = |source: DeviceError| RunError::Actuator {
            step: index,
            source,
        };

        match step {
            PlanStep::BeginStage { stage, settings } => {
                state
                    .machine
                    .advance(ProtocolState::for_stage(*stage), None)?;
                tracing::info!(stage = stage.number(), name = %stage, "Stage starting");
                actuator.apply_settings(*stage, settings).await.map_err(device)?;
            }
            PlanStep::PickUpTip { instrument } => {
                actuator.pick_up_tip(*instrument).await.map_err(device)?;
                state.held.push(*instrument);
                state.tips += 1;
            }
            PlanStep::DropTip { instrument } => {
                actuator.drop_tip(*instrument).await.map_err(device)?;
                state.held.retain(|held| held != instrument);
            }
            PlanStep::Transfer(operation) => {
                actuator.transfer(operation).await.map_err(device)?;
                state.operations += 1;
            }
            PlanStep::Checkpoint {
                barrier,
                instruction,
            } => {
                state
                    .machine
                    .advance(ProtocolState::for_barrier(*barrier), None)?;
                tracing::info!(barrier = %barrier, "Waiting for operator");
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        return Err(RunError::Cancelled { step: index });
                    }
                    acknowledged = gate.wait(*barrier, instruction) => {
                        acknowledged.map_err(|source| RunError::Checkpoint {
                            barrier: *barrier,
                            source,
                        })?;
                    }
                }
                state.checkpoints.push(CheckpointAck {
                    barrier: *barrier,
                    acknowledged_at: Utc::now(),
                });
            }
        }
        Ok(())
    }

    /// Release held tips and move the protocol to `Aborted`.
    async fn abort(error: RunError, state: &mut RunState, actuator: &mut dyn Actuator) -> RunError {
        for instrument in std::mem::take(&mut state.held).into_iter().rev() {
            match actuator.drop_tip(instrument).await {
                Ok(()) => tracing::info!(instrument = %instrument, "Dropped held tip after failure"),
                Err(e) => tracing::error!(
                    instrument = %instrument,
                    error = %e,
                    "Failed to drop held tip"
                ),
            }
        }
        if let Err(e) = state.machine.abort(&error.to_string()) {
            tracing::warn!(error = %e, "Protocol already terminal");
        }
        if error.is_cancelled() {
            tracing::warn!(error = %error, "Run cancelled");
        } else {
            tracing::error!(error = %error, "Run failed");
        }
        error
    }
}

/// Actuator that only logs; used for dry runs.
#[derive(Debug, Default)]
pub struct LoggingActuator {
    pub transfers: usize,
}

#[async_trait]
impl Actuator for LoggingActuator {
    async fn apply_settings(
        &mut self,
        stage: Stage,
        settings: &StageSettings,
    ) -> Result<(), DeviceError> {
        tracing::info!(
            stage = %stage,
            aspirate_clearance = settings.aspirate_clearance,
            dispense_clearance = settings.dispense_clearance,
            high_dispense_flow = settings.high_volume_flow.dispense,
            "Apply stage settings"
        );
        Ok(())
    }

    async fn pick_up_tip(&mut self, instrument: Instrument) -> Result<(), DeviceError> {
        tracing::info!(instrument = %instrument, "Pick up tip");
        Ok(())
    }

    async fn drop_tip(&mut self, instrument: Instrument) -> Result<(), DeviceError> {
        tracing::info!(instrument = %instrument, "Drop tip");
        Ok(())
    }

    async fn transfer(&mut self, operation: &TransferOperation) -> Result<(), DeviceError> {
        self.transfers += 1;
        tracing::info!(
            volume = operation.volume,
            source = %operation.source,
            destination = %operation.destination,
            instrument = %operation.instrument,
            "Transfer"
        );
        Ok(())
    }
}

/// Gate that acknowledges every checkpoint immediately.
#[derive(Debug, Default)]
pub struct AutoAcknowledge;

#[async_trait]
impl CheckpointGate for AutoAcknowledge {
    async fn wait(&mut self, barrier: Barrier, instruction: &str) -> Result<(), DeviceError> {
        tracing::info!(barrier = %barrier, instruction, "Checkpoint auto-acknowledged");
        Ok(())
    }
}

/// Gate that prints the instruction and waits for a line on `reader`.
///
/// The reader is kept across checkpoints so lines typed ahead are not lost.
#[derive(Debug)]
pub struct LineGate<R> {
    reader: R,
}

/// Operator prompts on stderr, acknowledgements from stdin.
pub type StdinGate = LineGate<BufReader<Stdin>>;

impl<R> LineGate<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }
}

impl LineGate<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> CheckpointGate for LineGate<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn wait(&mut self, barrier: Barrier, instruction: &str) -> Result<(), DeviceError> {
        {
            let mut stderr = std::io::stderr().lock();
            writeln!(stderr, "\n[{barrier}] {instruction}\nPress Enter to continue...")
                .map_err(|e| DeviceError::new(e.to_string()))?;
        }
        let mut line = String::new();
        let read = self
            .reader
            .read_line(&mut line)
            .await
            .map_err(|e| DeviceError::new(e.to_string()))?;
        if read == 0 {
            return Err(DeviceError::new("input closed before acknowledgement"));
        }
        Ok(())
    }
}
