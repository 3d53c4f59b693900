use std::{fs, path::Path};

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;
use phex_engine::{EngineConfig, EventKind};
use serde::Serialize;

mod cli;
mod scenario;

use cli::Args;
use scenario::{Outcome, Scenario};

fn main() -> Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_filter)).init();

    let config =
        EngineConfig::from_json_file(args.config.as_deref()).context("loading engine config")?;
    let scenario = Scenario::from_json_file(&args.scenario)?;
    let outcome = scenario::run(&scenario, config, args.until)
        .with_context(|| format!("running scenario {}", args.scenario.display()))?;

    describe_outcome(&scenario, &outcome, args.verbose);

    if let Some(path) = args.events_json.as_ref() {
        write_json(path, outcome.engine.events(), "event log")?;
        println!("Saved event log JSON to {}", path.display());
    }
    if let Some(path) = args.journal_json.as_ref() {
        write_json(path, outcome.world.journal(), "world journal")?;
        println!("Saved world journal JSON to {}", path.display());
    }
    Ok(())
}

fn describe_outcome(scenario: &Scenario, outcome: &Outcome, verbose: bool) {
    let events = outcome.engine.events();
    let stale = events.count(|kind| matches!(kind, EventKind::StaleDiscarded { .. }));
    println!(
        "Scenario: {} entities, {} steps, ran to tick {}",
        scenario.entities.len(),
        scenario.steps.len(),
        outcome.end
    );
    println!(
        "Actions armed: {} | fired: {} | still pending: {}",
        outcome.timeline.armed_total(),
        outcome.timeline.fired_total(),
        outcome.timeline.len()
    );
    println!(
        "Casts resolved: {} | suppressed: {}",
        outcome.engine.casts().resolved_total(),
        outcome.engine.casts().aborted_total()
    );
    println!("Events: {} ({} stale callbacks discarded)", events.len(), stale);

    println!("\nEvent log:");
    for event in events.events() {
        println!("  {event}");
    }

    if verbose {
        println!("\nWorld journal:");
        for record in outcome.world.journal() {
            println!("  {record:?}");
        }
    }
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, label: &str) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .with_context(|| format!("serializing {label} to JSON"))?;
    fs::write(path, json).with_context(|| format!("writing {label} JSON to {}", path.display()))
}
