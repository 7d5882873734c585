//! Step emission shared by the stage builders.
//!
//! `PlanBuilder` owns the step list, the protocol state machine and the
//! running summary. Transfers are validated and split here, so every stage
//! goes through the same routing rule.

use crate::address::{ContainerKind, Deck, WellAddress};
use crate::config::PlannerConfig;
use crate::error::{PlanError, PlanResult};
use crate::instrument::{Agitation, Instrument};
use crate::operation::{
    Barrier, MixSpec, Placement, PlanStep, PlanSummary, Stage, TipPolicy, TransferOperation,
    TransferPlan,
};
use crate::plan::stage_machine::{ProtocolMachine, ProtocolState};

/// One requested movement of liquid, before routing and splitting.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TransferRequest {
    pub volume: f64,
    pub source: WellAddress,
    pub source_kind: ContainerKind,
    pub destination: WellAddress,
    pub destination_kind: ContainerKind,
    pub mix_before: Option<Agitation>,
    pub mix_after: Option<Agitation>,
    pub tip_policy: TipPolicy,
}

impl TransferRequest {
    /// Rack-to-rack transfer with a fresh tip and no mixing
    pub fn between_tubes(source: WellAddress, destination: WellAddress, volume: f64) -> Self {
        Self {
            volume,
            source,
            source_kind: ContainerKind::TubeRack,
            destination,
            destination_kind: ContainerKind::TubeRack,
            mix_before: None,
            mix_after: None,
            tip_policy: TipPolicy::AlwaysNew,
        }
    }

    pub fn into_plate(mut self) -> Self {
        self.destination_kind = ContainerKind::Plate;
        self
    }

    pub fn mix_before(mut self, agitation: Option<Agitation>) -> Self {
        self.mix_before = agitation;
        self
    }

    pub fn mix_after(mut self, agitation: Option<Agitation>) -> Self {
        self.mix_after = agitation;
        self
    }

    pub fn held_tip(mut self) -> Self {
        self.tip_policy = TipPolicy::NeverNew;
        self
    }
}

pub(crate) struct PlanBuilder<'a> {
    config: &'a PlannerConfig,
    deck: &'a Deck,
    stage: Option<Stage>,
    steps: Vec<PlanStep>,
    machine: ProtocolMachine,
    summary: PlanSummary,
}

impl<'a> PlanBuilder<'a> {
    pub fn new(config: &'a PlannerConfig, deck: &'a Deck, summary: PlanSummary) -> Self {
        Self {
            config,
            deck,
            stage: None,
            steps: Vec::new(),
            machine: ProtocolMachine::new(),
            summary,
        }
    }

    pub fn config(&self) -> &PlannerConfig {
        self.config
    }

    pub fn summary_mut(&mut self) -> &mut PlanSummary {
        &mut self.summary
    }

    fn transition(&mut self, to: ProtocolState, reason: Option<&str>) -> PlanResult<()> {
        self.machine.set_step(self.steps.len());
        self.machine.advance(to, reason)
    }

    pub fn begin_stage(&mut self, stage: Stage) -> PlanResult<()> {
        self.transition(ProtocolState::for_stage(stage), None)?;
        self.stage = Some(stage);
        let settings = self.config.stages.for_stage(stage);
        tracing::info!(stage = stage.number(), name = %stage, "Planning stage");
        self.steps.push(PlanStep::BeginStage { stage, settings });
        Ok(())
    }

    pub fn checkpoint(&mut self, barrier: Barrier, instruction: String) -> PlanResult<()> {
        self.transition(ProtocolState::for_barrier(barrier), None)?;
        self.stage = None;
        tracing::info!(barrier = %barrier, "Checkpoint");
        self.steps.push(PlanStep::Checkpoint {
            barrier,
            instruction,
        });
        Ok(())
    }

    pub fn record_groups(&mut self, stage: Stage, count: usize) {
        self.summary.groups_per_stage.insert(stage, count);
    }

    fn current_stage(&self) -> PlanResult<Stage> {
        self.stage.ok_or_else(|| PlanError::IllegalStageTransition {
            from: self.machine.current().to_string(),
            to: "transfer".to_string(),
        })
    }

    fn placement(&self, address: &WellAddress, kind: ContainerKind) -> PlanResult<Placement> {
        let table = match kind {
            ContainerKind::TubeRack => &self.deck.racks,
            ContainerKind::Plate => &self.deck.plates,
        };
        let container = table.resolve(address)?;
        Ok(Placement {
            kind,
            deck_slot: container.deck_slot,
        })
    }

    /// Route and split one request into concrete operations without emitting.
    pub fn build(&self, request: TransferRequest) -> PlanResult<Vec<TransferOperation>> {
        let stage = self.current_stage()?;
        let limits = &self.config.limits;
        let context = format!("{} {} -> {}", stage, request.source, request.destination);

        if !request.volume.is_finite() || request.volume <= 0.0 {
            return Err(PlanError::invalid_volume(context, request.volume));
        }
        if stage != Stage::DnaDistribution && request.volume < limits.low_volume_floor {
            tracing::warn!(
                stage = %stage,
                source = %request.source,
                destination = %request.destination,
                volume = request.volume,
                floor = limits.low_volume_floor,
                "Transfer volume under low-volume floor"
            );
        }

        let source_container = self.placement(&request.source, request.source_kind)?;
        let destination_container = self.placement(&request.destination, request.destination_kind)?;
        let repetitions = self.config.mixing.repetitions;
        let mix = |agitation: Option<Agitation>, instrument: Instrument| {
            agitation.map(|a| MixSpec::new(repetitions, a.size(request.volume, instrument, limits)))
        };

        let pieces = limits.split(request.volume);
        let last = pieces.len() - 1;
        let operations = pieces
            .into_iter()
            .enumerate()
            .map(|(index, volume)| {
                let instrument = limits.select(volume);
                TransferOperation {
                    stage,
                    volume,
                    source: request.source,
                    source_container,
                    destination: request.destination,
                    destination_container,
                    mix_before: if index == 0 {
                        mix(request.mix_before, instrument)
                    } else {
                        None
                    },
                    mix_after: if index == last {
                        mix(request.mix_after, instrument)
                    } else {
                        None
                    },
                    blowout: true,
                    tip_policy: request.tip_policy,
                    instrument,
                }
            })
            .collect();
        Ok(operations)
    }

    fn push_operations(&mut self, operations: Vec<TransferOperation>) {
        for op in operations {
            tracing::debug!(
                stage = %op.stage,
                volume = op.volume,
                source = %op.source,
                destination = %op.destination,
                instrument = %op.instrument,
                "Transfer"
            );
            *self.summary.transfers_per_stage.entry(op.stage).or_default() += 1;
            *self
                .summary
                .transfers_per_instrument
                .entry(op.instrument)
                .or_default() += 1;
            self.steps.push(PlanStep::Transfer(op));
        }
    }

    pub fn transfer(&mut self, request: TransferRequest) -> PlanResult<()> {
        let operations = self.build(request)?;
        self.push_operations(operations);
        Ok(())
    }

    /// Emit a pass that reuses one tip per instrument.
    ///
    /// The whole pass is built first; each instrument it uses gets exactly
    /// one pick-up before and one drop after. A failed build emits nothing.
    pub fn held_tip_pass<I>(&mut self, requests: I) -> PlanResult<()>
    where
        I: IntoIterator<Item = TransferRequest>,
    {
        let mut operations = Vec::new();
        for request in requests {
            operations.extend(self.build(request.held_tip())?);
        }

        let mut instruments: Vec<Instrument> = Vec::new();
        for op in &operations {
            if !instruments.contains(&op.instrument) {
                instruments.push(op.instrument);
            }
        }

        self.steps.extend(
            instruments
                .iter()
                .map(|&instrument| PlanStep::PickUpTip { instrument }),
        );
        self.push_operations(operations);
        self.steps.extend(
            instruments
                .iter()
                .map(|&instrument| PlanStep::DropTip { instrument }),
        );
        Ok(())
    }

    pub fn finish(mut self) -> PlanResult<TransferPlan> {
        self.stage = None;
        self.transition(ProtocolState::Completed, None)?;
        tracing::info!(
            steps = self.steps.len(),
            transitions = %self.machine.summary(),
            "Plan compiled"
        );
        Ok(TransferPlan {
            steps: self.steps,
            summary: self.summary,
            transitions: self.machine.into_transitions(),
        })
    }
}
