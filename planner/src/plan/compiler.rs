//! Transfer Plan Compiler: design rows in, ordered plan out.

use crate::address::{Deck, WellAddress};
use crate::aggregate::{aggregate, expand};
use crate::config::PlannerConfig;
use crate::entry::{AggregatedEntry, ReagentEntry};
use crate::error::{PlanError, PlanResult};
use crate::operation::{PlanSummary, TransferPlan};
use crate::plan::builder::PlanBuilder;
use crate::plan::stages;
use crate::preflight;

/// Compiles design rows against one protocol configuration.
#[derive(Debug, Clone)]
pub struct TransferPlanner {
    config: PlannerConfig,
    deck: Deck,
}

impl TransferPlanner {
    pub fn new(config: PlannerConfig) -> PlanResult<Self> {
        config.validate()?;
        let deck = Deck::new(&config.deck.racks, &config.deck.plates)?;
        tracing::debug!(
            racks = deck.number_of_containers(),
            plates = deck.plates.len(),
            aggregate = config.aggregate_replicates,
            "Planner configured"
        );
        Ok(Self { config, deck })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn deck(&self) -> &Deck {
        &self.deck
    }

    /// Check that every address lies inside the grid and names a
    /// registered container.
    pub fn resolve_addresses(&self, rows: &[ReagentEntry]) -> PlanResult<()> {
        let grid = &self.config.grid;
        let tube = |address: &WellAddress| -> PlanResult<()> {
            grid.check(address)?;
            self.deck.racks.resolve(address).map(|_| ())
        };

        for (_, well) in self.config.reagents.wells() {
            tube(&well)?;
        }
        for row in rows {
            tube(&row.source)?;
            tube(&row.dna_destination)?;
            tube(&row.mix_destination)?;
            grid.check(&row.plate_destination)?;
            self.deck.plates.resolve(&row.plate_destination)?;
        }
        Ok(())
    }

    /// Derive, aggregate and validate without emitting any steps.
    pub fn preflight(&self, rows: &[ReagentEntry]) -> PlanResult<Vec<AggregatedEntry>> {
        if rows.is_empty() {
            return Err(PlanError::EmptyDesign);
        }
        self.resolve_addresses(rows)?;

        let calculator = self.config.calculator();
        let entries = if self.config.aggregate_replicates {
            aggregate(rows, &calculator)?
        } else {
            expand(rows, &calculator)?
        };
        preflight::check(&entries, &self.config.limits)?;

        tracing::info!(
            rows = rows.len(),
            entries = entries.len(),
            "Preflight passed"
        );
        Ok(entries)
    }

    /// Compile the full four-stage plan. Either every step is produced or
    /// an error is returned; there is no partial plan.
    pub fn compile(&self, rows: &[ReagentEntry]) -> PlanResult<TransferPlan> {
        let entries = self.preflight(rows)?;
        let per_row = if self.config.aggregate_replicates {
            expand(rows, &self.config.calculator())?
        } else {
            entries.clone()
        };
        let totals = stages::master_mix_totals(&entries, self.config.master_mix_surplus);

        let summary = PlanSummary {
            rows: rows.len(),
            entries: entries.len(),
            master_mix: totals,
            ..PlanSummary::default()
        };
        let mut builder = PlanBuilder::new(&self.config, &self.deck, summary);

        stages::dna_distribution(&mut builder, &entries)?;
        stages::reagent_checkpoint(&mut builder)?;
        stages::master_mix_preparation(&mut builder, &entries, &totals)?;
        if self.config.reagent_b_staged_separately {
            stages::second_reagent_checkpoint(&mut builder)?;
        }
        stages::mix_combination(&mut builder, &entries, &totals)?;
        stages::incubation_checkpoint(&mut builder)?;
        stages::delivery(&mut builder, &per_row)?;

        builder.finish()
    }
}
