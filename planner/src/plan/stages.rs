//! The four workflow stages and the checkpoints between them.

use std::collections::HashSet;

use crate::entry::AggregatedEntry;
use crate::error::PlanResult;
use crate::grouping::{group, TransferGroup};
use crate::operation::{Barrier, MasterMixTotals, Stage};
use crate::plan::builder::{PlanBuilder, TransferRequest};
use crate::volume::DerivedVolumes;

fn group_volumes(group: &TransferGroup, entries: &[AggregatedEntry]) -> PlanResult<DerivedVolumes> {
    Ok(group.resolve(entries)?.into_iter().map(|e| e.volumes).sum())
}

fn stage_groups(
    builder: &mut PlanBuilder<'_>,
    stage: Stage,
    entries: &[AggregatedEntry],
) -> Vec<TransferGroup> {
    let groups = group(entries, builder.config().grouping.for_stage(stage));
    builder.record_groups(stage, groups.len());
    groups
}

/// Stage 1: each DNA source into its destination tube.
pub(crate) fn dna_distribution(
    builder: &mut PlanBuilder<'_>,
    entries: &[AggregatedEntry],
) -> PlanResult<()> {
    builder.begin_stage(Stage::DnaDistribution)?;
    let mixing = builder.config().mixing.clone();

    let co_group_ends: HashSet<usize> = stage_groups(builder, Stage::DnaDistribution, entries)
        .iter()
        .filter(|g| entries[g.anchor()].kind().is_co())
        .map(TransferGroup::last)
        .collect();

    let mut aspirated = HashSet::new();
    for (index, entry) in entries.iter().enumerate() {
        let row = &entry.entry;
        let first_aspiration = aspirated.insert(row.source);
        let request = TransferRequest::between_tubes(
            row.source,
            row.dna_destination,
            entry.volumes.dna,
        )
        .mix_before(first_aspiration.then_some(mixing.source_mix))
        .mix_after(co_group_ends.contains(&index).then_some(mixing.co_mix));
        builder.transfer(request)?;
    }
    Ok(())
}

/// Barrier 1 wording depends on whether reagent B comes later.
pub(crate) fn reagent_checkpoint(builder: &mut PlanBuilder<'_>) -> PlanResult<()> {
    let config = builder.config();
    let names = &config.reagents.names;
    let instruction = if config.reagent_b_staged_separately {
        format!(
            "Now, get your {} and {} and place in tuberack at the locations specified on the spreadsheet",
            names.diluent, names.reagent_a
        )
    } else {
        format!(
            "Now, get your {}, {}, and {} and place in tuberack at the locations specified on the spreadsheet",
            names.diluent, names.reagent_a, names.reagent_b
        )
    };
    builder.checkpoint(Barrier::ReagentLoading, instruction)
}

pub(crate) fn master_mix_totals(entries: &[AggregatedEntry], surplus: f64) -> MasterMixTotals {
    let total: DerivedVolumes = entries.iter().map(|e| e.volumes).sum();
    MasterMixTotals {
        opti_mem: total.opti_mem * surplus,
        reagent_a: total.reagent_a * surplus,
        reagent_b: total.reagent_b * surplus,
    }
}

/// Stage 2: build the reagent-A mix and add it to every DNA tube.
pub(crate) fn master_mix_preparation(
    builder: &mut PlanBuilder<'_>,
    entries: &[AggregatedEntry],
    totals: &MasterMixTotals,
) -> PlanResult<()> {
    builder.begin_stage(Stage::MasterMixPreparation)?;
    let reagents = builder.config().reagents.clone();
    let mixing = builder.config().mixing.clone();

    builder.transfer(TransferRequest::between_tubes(
        reagents.reagent_a_stock,
        reagents.mix_a,
        totals.reagent_a,
    ))?;
    builder.transfer(
        TransferRequest::between_tubes(reagents.diluent_stock, reagents.mix_a, totals.opti_mem)
            .mix_after(Some(mixing.recipe_mix)),
    )?;

    for group in stage_groups(builder, Stage::MasterMixPreparation, entries) {
        let anchor = group.anchor_in(entries)?;
        let volumes = group_volumes(&group, entries)?;
        builder.transfer(
            TransferRequest::between_tubes(
                reagents.mix_a,
                anchor.entry.dna_destination,
                volumes.opti_mem + volumes.reagent_a,
            )
            .mix_after(Some(mixing.distribution_mix)),
        )?;
    }
    Ok(())
}

pub(crate) fn second_reagent_checkpoint(builder: &mut PlanBuilder<'_>) -> PlanResult<()> {
    let instruction = format!(
        "Now, get your {} and place in tuberack at the location specified on the spreadsheet",
        builder.config().reagents.names.reagent_b
    );
    builder.checkpoint(Barrier::SecondReagentLoading, instruction)
}

/// Stage 3: build the reagent-B mix, hand it out with a held tip, then pour
/// each DNA mixture into its reagent-B well.
pub(crate) fn mix_combination(
    builder: &mut PlanBuilder<'_>,
    entries: &[AggregatedEntry],
    totals: &MasterMixTotals,
) -> PlanResult<()> {
    builder.begin_stage(Stage::MixCombination)?;
    let config = builder.config();
    let reagents = config.reagents.clone();
    let mixing = config.mixing.clone();
    let top_up = reagents
        .diluent_reserve
        .filter(|_| totals.opti_mem > config.diluent_reserve_trigger);

    builder.transfer(TransferRequest::between_tubes(
        reagents.reagent_b_stock,
        reagents.mix_b,
        totals.reagent_b,
    ))?;

    if let Some(reserve) = top_up {
        tracing::info!(
            reserve = %reserve,
            stock = %reagents.diluent_stock,
            volume = totals.opti_mem,
            "Topping up diluent stock from reserve"
        );
        builder.transfer(TransferRequest::between_tubes(
            reserve,
            reagents.diluent_stock,
            totals.opti_mem,
        ))?;
        builder.summary_mut().diluent_top_up = true;
    }

    builder.transfer(
        TransferRequest::between_tubes(reagents.diluent_stock, reagents.mix_b, totals.opti_mem)
            .mix_after(Some(mixing.recipe_mix)),
    )?;

    let groups = stage_groups(builder, Stage::MixCombination, entries);

    let mut distribution = Vec::with_capacity(groups.len());
    for group in &groups {
        let anchor = group.anchor_in(entries)?;
        let volumes = group_volumes(group, entries)?;
        distribution.push(TransferRequest::between_tubes(
            reagents.mix_b,
            anchor.entry.mix_destination,
            volumes.opti_mem + volumes.reagent_b,
        ));
    }
    builder.held_tip_pass(distribution)?;

    for group in &groups {
        let anchor = group.anchor_in(entries)?;
        let volumes = group_volumes(group, entries)?;
        builder.transfer(
            TransferRequest::between_tubes(
                anchor.entry.dna_destination,
                anchor.entry.mix_destination,
                volumes.dna + volumes.opti_mem + volumes.reagent_a,
            )
            .mix_after(Some(mixing.combination_mix)),
        )?;
    }
    Ok(())
}

pub(crate) fn incubation_checkpoint(builder: &mut PlanBuilder<'_>) -> PlanResult<()> {
    let instruction = format!(
        "Now, incubate the mixture for {} mins and get your cells and place in the deck specified in the protocol",
        builder.config().incubation_minutes
    );
    builder.checkpoint(Barrier::Incubation, instruction)
}

/// Stage 4: combined mixture onto the cells. `rows` are per design row so
/// each replicate gets its own plate well.
pub(crate) fn delivery(builder: &mut PlanBuilder<'_>, rows: &[AggregatedEntry]) -> PlanResult<()> {
    builder.begin_stage(Stage::Delivery)?;
    let excess = builder.config().excess;

    for group in stage_groups(builder, Stage::Delivery, rows) {
        let anchor = group.anchor_in(rows)?;
        let volume: f64 = group
            .resolve(rows)?
            .iter()
            .map(|e| e.volumes.delivery_volume(excess))
            .sum();
        builder.transfer(
            TransferRequest::between_tubes(
                anchor.entry.mix_destination,
                anchor.entry.plate_destination,
                volume,
            )
            .into_plate(),
        )?;
    }
    Ok(())
}
