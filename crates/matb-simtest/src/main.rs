//! MATB Headless Session Harness
//!
//! Runs a full battery session in virtual time with a scripted operator and
//! checks the engine invariants. No rendering, no audio, no wall clock.
//!
//! Usage:
//!   cargo run -p matb-simtest
//!   cargo run -p matb-simtest -- --seconds 600 --seed 7 --verbose
//!   RUST_LOG=matb_core=debug cargo run -p matb-simtest -- --idle

mod autopilot;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use clap::Parser;
use matb_core::prelude::*;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use autopilot::Autopilot;

const FRAME_MS: Millis = 16;

// ── CLI ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "matb-simtest")]
#[command(about = "Headless workload battery session with invariant checks")]
struct Args {
    /// Session length in simulated seconds
    #[arg(short, long, default_value_t = 300)]
    seconds: u64,

    /// Session seed (random when omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Events per minute applied to every task
    #[arg(long)]
    epm: Option<f64>,

    /// Difficulty (0-10) applied to every task
    #[arg(short, long)]
    difficulty: Option<f64>,

    /// JSON battery configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run without the scripted operator
    #[arg(long)]
    idle: bool,

    /// Print every check, not just failures
    #[arg(short, long)]
    verbose: bool,
}

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

#[derive(Debug, Default, Serialize)]
struct Summary {
    seed: u64,
    seconds: u64,
    operator: bool,
    final_health: f64,
    final_load: f64,
    min_health: f64,
    max_load: f64,
    outcomes: BTreeMap<String, BTreeMap<String, usize>>,
    pump_failures: usize,
    tracking_transitions: usize,
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(2);
        }
    };

    println!("=== MATB Session Harness ===\n");

    let mut battery = match Battery::new(config) {
        Ok(battery) => battery,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(2);
        }
    };
    let recorder = Recorder::shared();
    battery.set_observer(Box::new(recorder.clone()));
    tracing::info!(seed = battery.seed(), seconds = args.seconds, "session starting");

    let operator = (!args.idle).then(Autopilot::default);
    let mut results = Vec::new();
    let mut summary = Summary {
        seed: battery.seed(),
        seconds: args.seconds,
        operator: operator.is_some(),
        min_health: 100.0,
        ..Summary::default()
    };

    // 1. Run the session, checking per-frame invariants as we go
    battery.start();
    results.extend(run_session(&mut battery, operator, args.seconds, &mut summary));

    // 2. Per-task logs
    let (logs, metrics) = match recorder.lock() {
        Ok(recorder) => (recorder.logs.clone(), recorder.metrics.len()),
        Err(_) => {
            eprintln!("recorder poisoned");
            std::process::exit(1);
        }
    };
    results.extend(validate_logs(&battery, &logs, &mut summary));

    // 3. Final state
    summary.final_health = battery.current_health();
    summary.final_load = battery.current_load();
    results.push(TestResult {
        name: "metrics_observed".into(),
        passed: metrics > 0,
        detail: format!("{} metric emissions", metrics),
    });
    if !args.idle {
        let hits = summary
            .outcomes
            .get("monitoring")
            .and_then(|m| m.get("Hit"))
            .copied()
            .unwrap_or(0);
        results.push(TestResult {
            name: "operator_scores_hits".into(),
            passed: hits > 0 || args.seconds < 60,
            detail: format!("{} monitoring hits", hits),
        });
    }

    // ── Summary ──
    match serde_json::to_string_pretty(&summary) {
        Ok(json) => println!("{}", json),
        Err(e) => tracing::warn!("summary not serializable: {}", e),
    }

    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    println!();
    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || args.verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<BatteryConfig, BatteryError> {
    let mut config = match &args.config {
        Some(path) => BatteryConfig::from_json_file(path)?,
        None => BatteryConfig::default(),
    };
    if let Some(seed) = args.seed {
        config = config.with_seed(seed);
    }
    for task in TaskKind::ALL {
        let settings = config.settings_mut(task);
        if let Some(epm) = args.epm {
            settings.events_per_minute = epm;
        }
        if let Some(difficulty) = args.difficulty {
            settings.difficulty = difficulty;
        }
    }
    config.validate()?;
    Ok(config)
}

// ── 1. Session ──────────────────────────────────────────────────────────

fn run_session(
    battery: &mut Battery,
    operator: Option<Autopilot>,
    seconds: u64,
    summary: &mut Summary,
) -> Vec<TestResult> {
    println!("--- Session ---");
    let mut results = Vec::new();
    let frames = seconds * 1_000 / FRAME_MS;

    let mut health_violations = 0usize;
    let mut tank_violations = 0usize;
    let mut cursor_violations = 0usize;
    let mut max_load: f64 = 0.0;

    for frame in 0..frames {
        if let Some(operator) = &operator {
            operator.act(battery);
        }
        battery.update(FRAME_MS);

        let state = battery.state();
        if !(0.0..=100.0).contains(&state.health) || !(0.0..=100.0).contains(&state.load) {
            health_violations += 1;
        }
        summary.min_health = summary.min_health.min(state.health);
        max_load = max_load.max(state.load);

        if battery
            .resource()
            .tanks()
            .iter()
            .any(|t| t.level < 0.0 || t.level > t.max)
        {
            tank_violations += 1;
        }

        let bound = battery.config().tracking.bound;
        let p = battery.tracking().cursor().position;
        if p.x.abs() > bound || p.y.abs() > bound {
            cursor_violations += 1;
        }

        if frame > 0 && frame % (60_000 / FRAME_MS) == 0 {
            tracing::info!(
                minute = frame * FRAME_MS / 60_000,
                health = state.health,
                load = state.load,
                "session progress"
            );
        }
    }
    summary.max_load = max_load;

    results.push(TestResult {
        name: "clock_advanced".into(),
        passed: battery.now() == frames * FRAME_MS,
        detail: format!("virtual clock at {} ms", battery.now()),
    });
    results.push(TestResult {
        name: "health_and_load_bounded".into(),
        passed: health_violations == 0,
        detail: format!("{} frames out of [0, 100]", health_violations),
    });
    results.push(TestResult {
        name: "tank_levels_within_capacity".into(),
        passed: tank_violations == 0,
        detail: format!("{} frames with a tank out of range", tank_violations),
    });
    results.push(TestResult {
        name: "cursor_within_bounds".into(),
        passed: cursor_violations == 0,
        detail: format!("{} frames with the cursor outside the field", cursor_violations),
    });
    results.push(TestResult {
        name: "aggregator_cycled".into(),
        passed: battery.aggregator().cycles() > 0 || seconds == 0,
        detail: format!("{} aggregation cycles", battery.aggregator().cycles()),
    });

    results
}

// ── 2. Logs ─────────────────────────────────────────────────────────────

fn validate_logs(battery: &Battery, logs: &[LogEntry], summary: &mut Summary) -> Vec<TestResult> {
    println!("--- Logs ---");
    let mut results = Vec::new();

    for task in TaskKind::ALL {
        let mut counts = BTreeMap::new();
        for entry in logs.iter().filter(|e| e.task() == task) {
            if let Some(outcome) = entry_outcome(entry) {
                *counts.entry(format!("{:?}", outcome)).or_insert(0) += 1;
            }
        }
        summary.outcomes.insert(task.to_string(), counts);
    }

    // One outcome per monitoring event
    let mut per_event: HashMap<u64, usize> = HashMap::new();
    for row in battery.monitoring().log() {
        if let Some(id) = row.event_id {
            *per_event.entry(id).or_insert(0) += 1;
        }
    }
    let doubled = per_event.values().filter(|&&n| n > 1).count();
    results.push(TestResult {
        name: "monitoring_single_outcome".into(),
        passed: doubled == 0,
        detail: format!(
            "{} events scored, {} scored more than once",
            per_event.len(),
            doubled
        ),
    });

    // Every event older than its window is resolved
    let now = battery.now();
    let overdue = battery
        .monitoring()
        .events()
        .iter()
        .filter(|e| !e.is_resolved() && e.deadline < now)
        .count();
    results.push(TestResult {
        name: "monitoring_deadlines_enforced".into(),
        passed: overdue == 0,
        detail: format!("{} unresolved events past their deadline", overdue),
    });

    // One outcome per comms message
    let mut per_message: HashMap<u64, usize> = HashMap::new();
    for row in battery.communications().log() {
        *per_message.entry(row.message_id).or_insert(0) += 1;
    }
    let doubled = per_message.values().filter(|&&n| n > 1).count();
    results.push(TestResult {
        name: "comms_single_outcome".into(),
        passed: doubled == 0,
        detail: format!(
            "{} messages scored, {} scored more than once",
            per_message.len(),
            doubled
        ),
    });

    let own_fa = battery
        .communications()
        .log()
        .iter()
        .filter(|r| r.own_callsign && r.outcome == Outcome::FalseAlarm)
        .count();
    results.push(TestResult {
        name: "comms_own_calls_never_false_alarm".into(),
        passed: own_fa == 0,
        detail: format!("{} own-ship false alarms", own_fa),
    });

    summary.pump_failures = battery
        .resource()
        .log()
        .iter()
        .filter(|r| matches!(r, matb_core::records::ResourceRecord::PumpFailure { .. }))
        .count();
    summary.tracking_transitions = battery
        .tracking()
        .log()
        .iter()
        .filter(|r| matches!(r, matb_core::records::TrackingRecord::Transition { .. }))
        .count();

    let resource_samples = battery
        .resource()
        .log()
        .iter()
        .filter(|r| matches!(r, matb_core::records::ResourceRecord::Sample { .. }))
        .count() as u64;
    let resource = &battery.config().resource;
    let expected = if resource.settings.enabled {
        now / resource.sample_ms.max(1)
    } else {
        0
    };
    results.push(TestResult {
        name: "resource_sampled_at_1hz".into(),
        passed: resource_samples == expected,
        detail: format!("{} samples, {} expected", resource_samples, expected),
    });

    results
}

fn entry_outcome(entry: &LogEntry) -> Option<Outcome> {
    match entry {
        LogEntry::Monitoring(row) => Some(row.outcome),
        LogEntry::Communications(row) => Some(row.outcome),
        _ => None,
    }
}
