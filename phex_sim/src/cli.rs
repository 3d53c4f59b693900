use std::path::PathBuf;

use clap::Parser;
use phex_engine::Tick;

/// Drives the engine through a scripted scenario against the in-memory world.
#[derive(Parser, Debug)]
#[command(
    about = "Runs a timed-action scenario and reports what the engine decided",
    version
)]
pub struct Args {
    /// Scenario JSON describing entities and timed steps
    #[arg(long)]
    pub scenario: PathBuf,

    /// Optional engine config JSON (missing fields fall back to built-ins)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Run the timeline up to this tick instead of the scenario's own horizon
    #[arg(long, value_name = "TICK")]
    pub until: Option<Tick>,

    /// Path to write the engine event log as JSON
    #[arg(long)]
    pub events_json: Option<PathBuf>,

    /// Path to write the world journal (sounds, messages, damage...) as JSON
    #[arg(long)]
    pub journal_json: Option<PathBuf>,

    /// Debug-level logging and the full world journal on stdout
    #[arg(long)]
    pub verbose: bool,
}
