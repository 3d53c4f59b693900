use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::tempdir;

fn scenario(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("scenarios")
        .join(name)
}

fn run_sim(args: &[&str]) -> Result<Output> {
    Command::new(env!("CARGO_BIN_EXE_phex_sim"))
        .args(args)
        .output()
        .context("executing phex_sim")
}

fn run_with_event_log(scenario_path: &Path, extra: &[&str]) -> Result<Vec<Value>> {
    let temp_dir = tempdir().context("creating temporary directory for event log")?;
    let events_path = temp_dir.path().join("events.json");
    let scenario_str = scenario_path
        .to_str()
        .context("scenario path is not valid UTF-8")?;
    let events_str = events_path
        .to_str()
        .context("event log path is not valid UTF-8")?;

    let mut args = vec!["--scenario", scenario_str, "--events-json", events_str];
    args.extend_from_slice(extra);
    let output = run_sim(&args)?;
    assert!(
        output.status.success(),
        "phex_sim exited with {:?}\nstdout:\n{}\nstderr:\n{}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );

    let raw = fs::read_to_string(&events_path)
        .with_context(|| format!("reading {}", events_path.display()))?;
    let events: Vec<Value> = serde_json::from_str(&raw).context("parsing event log")?;
    Ok(events)
}

fn kinds(events: &[Value]) -> Vec<&str> {
    events
        .iter()
        .filter_map(|event| event.get("kind").and_then(Value::as_str))
        .collect()
}

fn count_kind(events: &[Value], kind: &str) -> usize {
    kinds(events).into_iter().filter(|k| *k == kind).count()
}

#[test]
fn door_scenario_ignores_stale_auto_close() -> Result<()> {
    let events = run_with_event_log(&scenario("door.json"), &[])?;

    assert_eq!(
        kinds(&events),
        vec!["toggle_reset", "toggle_opened", "toggle_closed", "stale_discarded"]
    );
    assert_eq!(events[1]["close_not_before"], 4000);
    assert_eq!(events[2]["automatic"], false);
    assert_eq!(events[2]["tick"], 2000);
    assert_eq!(events[3]["reason"], "already_settled");
    assert_eq!(events[3]["action"]["action"], "auto_close");
    Ok(())
}

#[test]
fn config_file_changes_door_delay() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for config")?;
    let config_path = temp_dir.path().join("engine.json");
    fs::write(&config_path, r#"{ "door": { "auto_close_delay": 1000 } }"#)
        .context("writing config")?;
    let config_str = config_path
        .to_str()
        .context("config path is not valid UTF-8")?;

    let events = run_with_event_log(&scenario("door.json"), &["--config", config_str])?;

    assert_eq!(events[1]["close_not_before"], 1000);
    let automatic = events
        .iter()
        .filter(|event| event["kind"] == "toggle_closed" && event["automatic"] == true)
        .count();
    assert_eq!(automatic, 2, "both openings time out before the next use");
    assert_eq!(count_kind(&events, "toggle_opened"), 2);
    Ok(())
}

#[test]
fn orc_switches_to_bystander_when_target_hides() -> Result<()> {
    let events = run_with_event_log(&scenario("orc_chase.json"), &[])?;

    let abandoned = events
        .iter()
        .find(|event| event["kind"] == "pursuit_abandoned")
        .context("orc should lose its first target")?;
    assert_eq!(abandoned["opponent"], 2);
    assert_eq!(abandoned["reason"], "not_visible");

    let acquired: Vec<&Value> = events
        .iter()
        .filter(|event| event["kind"] == "pursuit_acquired")
        .map(|event| &event["opponent"])
        .collect();
    assert_eq!(acquired, vec![&Value::from(2), &Value::from(3)]);
    Ok(())
}

#[test]
fn fireball_scenario_commits_until_mana_runs_out() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary directory for journal")?;
    let journal_path = temp_dir.path().join("journal.json");
    let journal_str = journal_path
        .to_str()
        .context("journal path is not valid UTF-8")?;

    let events = run_with_event_log(
        &scenario("fireball.json"),
        &["--journal-json", journal_str],
    )?;

    assert_eq!(count_kind(&events, "cast_committed"), 2);
    assert_eq!(count_kind(&events, "cast_rejected"), 2);
    assert_eq!(count_kind(&events, "cast_resolved"), 2);
    let rejected = events
        .iter()
        .find(|event| event["kind"] == "cast_rejected")
        .context("third cast should be rejected")?;
    assert_eq!(rejected["reason"], "You don't have enough mana.");

    let raw = fs::read_to_string(&journal_path).context("reading journal")?;
    let journal: Vec<Value> = serde_json::from_str(&raw).context("parsing journal")?;
    let damage = journal
        .iter()
        .filter(|record| record["record"] == "damage")
        .count();
    assert_eq!(damage, 1);
    Ok(())
}

#[test]
fn missing_scenario_reports_the_path() -> Result<()> {
    let output = run_sim(&["--scenario", "does/not/exist.json"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("reading scenario does/not/exist.json"),
        "unexpected stderr: {stderr}"
    );
    Ok(())
}
