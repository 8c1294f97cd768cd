//! Rapid loss assessment of one earthquake.

use anyhow::{Context, Result};
use colored::Colorize;
use rtl_core::{Earthquake, EventOutcome, SequenceState};
use std::time::Instant;
use tracing::info;

use super::run::RunContext;
use crate::engine::PrecomputedEngine;
use crate::io;

/// Assesses `earthquake` against the current state and writes its results.
pub fn run_rla(
    ctx: &RunContext,
    state: &SequenceState,
    earthquake: &Earthquake,
) -> Result<EventOutcome> {
    let scale = ctx.processor.scale();
    let engine = PrecomputedEngine::new(ctx.layout.rla_damage(), scale.clone());
    let monitoring = ctx
        .monitoring
        .as_ref()
        .and_then(|m| m.get(&earthquake.event_id));

    let started = Instant::now();
    let outcome = ctx
        .processor
        .process(state, earthquake, &engine, monitoring)
        .with_context(|| format!("Rapid loss assessment of {} failed", earthquake.event_id))?;

    let economic: f64 = outcome.economic.values().sum();
    let injuries = outcome.human.totals();
    ctx.metrics.record_event(
        "rla",
        outcome.fallback.is_some(),
        outcome.clipped_rows,
        outcome.state.inventory.len(),
        started.elapsed(),
    );
    ctx.metrics.record_losses(economic, &injuries);

    let output = ctx.layout.output();
    let id = &outcome.event_id;
    io::write_damage_summary(
        &output.join(format!("damage_states_after_RLA_{id}.csv")),
        &outcome.damage_summary,
        scale,
    )?;
    io::write_economic(
        &output.join(format!("losses_economic_after_RLA_{id}.csv")),
        &outcome.economic,
    )?;
    io::write_human(
        &output.join(format!("losses_human_after_RLA_{id}.csv")),
        &outcome.human,
    )?;

    if ctx.config.store_intermediate {
        let dir = ctx.layout.rla_intermediate();
        io::write_inventory(
            &dir.join(format!("exposure_model_after_{id}.csv")),
            &outcome.state.inventory,
            scale,
        )?;
        io::write_damage_table(
            &dir.join(format!("damage_{id}.csv")),
            &outcome.merged_damage,
            scale,
        )?;
    }

    info!(
        event_id = %id,
        time_of_day = outcome.time_of_day.as_str(),
        economic,
        "Rapid loss assessment complete"
    );
    println!(
        "  {} RLA {} ({}): economic loss {:.0}, injuries {}",
        "✓".green(),
        id.cyan(),
        outcome.time_of_day.as_str(),
        economic,
        injuries
            .iter()
            .map(|v| format!("{v:.2}"))
            .collect::<Vec<_>>()
            .join(" / ")
    );
    if let Some(reason) = &outcome.fallback {
        println!("    {} {}; existing damage kept", "⚠".yellow(), reason);
    }

    Ok(outcome)
}
