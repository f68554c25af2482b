//! End-to-end scenarios for the battery engine.
//!
//! Every test drives a seeded `Battery` through its public API on the
//! virtual clock, so results are exact and repeatable.

use matb_core::prelude::*;
use matb_core::records::{MonitoringRecord, ResourceRecord};

// ── Helpers ────────────────────────────────────────────────────────────

/// All schedulers slowed to effectively never fire, random pump failures off.
fn quiet_config() -> BatteryConfig {
    let mut config = BatteryConfig::default().with_seed(2024);
    for task in TaskKind::ALL {
        config.settings_mut(task).events_per_minute = 0.01;
    }
    config.resource.random_failure_chance = 0.0;
    config
}

fn busy_config(seed: u64) -> BatteryConfig {
    let mut config = BatteryConfig::default().with_seed(seed);
    config.monitoring.settings = TaskSettings::new(12.0, 6.0);
    config.communications.settings = TaskSettings::new(6.0, 6.0);
    config.resource.settings = TaskSettings::new(6.0, 6.0);
    config.tracking.settings = TaskSettings::new(4.0, 6.0);
    config
}

fn started(config: BatteryConfig) -> Battery {
    let mut battery = Battery::new(config).unwrap();
    battery.start();
    battery
}

fn run_frames(battery: &mut Battery, millis: Millis) {
    for _ in 0..millis / 16 {
        battery.update(16);
    }
}

fn pump(n: u8) -> PumpId {
    PumpId::new(n).unwrap()
}

// ── Monitoring ─────────────────────────────────────────────────────────

#[test]
fn monitoring_hit_records_response_time() {
    let mut battery = started(quiet_config());
    battery.trigger_monitoring_event(Some(IndicatorLabel::F3));
    battery.update(1_200);

    assert_eq!(battery.respond(IndicatorLabel::F3), Some(Outcome::Hit));
    let row: &MonitoringRecord = battery.monitoring().log().last().unwrap();
    assert_eq!(row.outcome, Outcome::Hit);
    assert_eq!(row.response_time, Some(1_200));

    // nothing more is scored for that event
    battery.update(10_000);
    assert_eq!(battery.monitoring().log().len(), 1);
}

#[test]
fn monitoring_every_event_resolves_once_within_window() {
    let mut battery = started(busy_config(7));
    run_frames(&mut battery, 120_000);

    let events = battery.monitoring().events();
    assert!(events.len() > 10, "only {} events", events.len());
    for event in events.iter().filter(|e| e.created_at + 5_000 <= battery.now()) {
        assert!(matches!(event.outcome, Some(Outcome::Miss)), "{:?}", event);
        let rows: Vec<_> = battery
            .monitoring()
            .log()
            .iter()
            .filter(|r| r.event_id == Some(event.id))
            .collect();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].logged_at - event.created_at <= 5_000);
    }
}

#[test]
fn monitoring_stale_deadline_after_task_reset_is_noop() {
    let mut battery = started(quiet_config());
    battery.trigger_monitoring_event(Some(IndicatorLabel::F1));
    battery.update(2_000);
    battery.reset_task(TaskKind::Monitoring);
    battery.update(10_000);

    assert!(battery.monitoring().log().is_empty());
    assert_eq!(battery.current_health(), 100.0);
}

// ── Communications ─────────────────────────────────────────────────────

#[test]
fn comms_untouched_own_message_misses_after_deadline() {
    let mut battery = started(quiet_config());
    let template = MessageTemplate {
        callsign: "NASA504".into(),
        radio: "COM1".parse().unwrap(),
        frequency: "126.450".parse().unwrap(),
        playback_ms: 4_000,
    };
    battery.inject_message(template).unwrap();

    battery.update(7_900);
    assert!(battery.communications().log().is_empty());
    assert_eq!(battery.current_load(), 20.0);

    battery.update(200);
    let row = battery.communications().log().last().unwrap();
    assert_eq!(row.outcome, Outcome::Miss);
    assert_eq!(row.health_impact, -5.0);
    assert!((battery.current_health() - 95.0).abs() < 1e-9);
}

#[test]
fn comms_tuning_by_steps_scores_immediate_hit() {
    let mut battery = started(quiet_config());
    battery.reset_health(50.0);
    battery.inject_message(MessageTemplate {
        callsign: "NASA504".into(),
        radio: Radio::Com1,
        frequency: Frequency::from_khz(121_550),
        playback_ms: 4_000,
    });

    battery.update(500);
    battery.cycle_radio(2);
    battery.update(500);
    // 118.325 -> 121.550 is 129 steps of 25 kHz
    battery.step_frequency(Radio::Com1, 129);
    battery.update(100);

    let row = battery.communications().log().last().unwrap();
    assert_eq!(row.outcome, Outcome::Hit);
    assert_eq!(row.response_time, Some(1_000));
    assert!((battery.current_health() - 60.0).abs() < 1e-9);
    assert!(battery.communications().active_message().is_none());
}

// ── Resource ───────────────────────────────────────────────────────────

#[test]
fn resource_pump_three_moves_fuel_from_d_to_b() {
    let mut battery = started(quiet_config());
    battery.resource_mut().tank_mut(TankId::B).loss_per_minute = 0.0;
    assert!(battery.toggle_pump(pump(3)));
    battery.update(1_000);

    let moved = 800.0 / 60.0;
    let d = battery.resource().tank(TankId::D).level;
    let b = battery.resource().tank(TankId::B).level;
    assert!((d - (1_000.0 - moved)).abs() < 1e-6, "d = {d}");
    assert!((b - (2_500.0 + moved)).abs() < 1e-6, "b = {b}");
}

#[test]
fn resource_failed_pump_transfers_nothing() {
    let mut battery = started(quiet_config());
    battery.resource_mut().tank_mut(TankId::B).loss_per_minute = 0.0;
    battery.toggle_pump(pump(3));
    assert!(battery.fail_pump(pump(3)));
    assert!(!battery.toggle_pump(pump(3)));

    battery.update(4_900);
    assert_eq!(battery.resource().tank(TankId::D).level, 1_000.0);
    assert_eq!(battery.resource().tank(TankId::B).level, 2_500.0);
    assert_eq!(battery.resource().failed_pumps(), vec![pump(3)]);
}

#[test]
fn resource_levels_bounded_under_load() {
    let mut battery = started(busy_config(11));
    for n in 1..=8 {
        battery.toggle_pump(pump(n));
    }
    for _ in 0..120 {
        battery.update(1_000);
        for tank in battery.resource().tanks() {
            assert!(tank.level >= 0.0 && tank.level <= tank.max);
        }
    }
    let samples = battery
        .resource()
        .log()
        .iter()
        .filter(|r| matches!(r, ResourceRecord::Sample { .. }))
        .count();
    assert_eq!(samples, 120);
}

// ── Tracking ───────────────────────────────────────────────────────────

#[test]
fn tracking_manual_inside_target_earns_health_per_tick() {
    let mut config = quiet_config();
    config.aggregator.cycle_ms = 16;
    let mut battery = started(config);
    battery.reset_health(50.0);

    assert_eq!(battery.toggle_automation(), TrackingMode::Manual);
    let now = battery.now();
    battery
        .tracking_mut()
        .set_position(Vec2::new(10.0, 10.0), now);
    battery.update(16);

    assert!((battery.current_health() - 50.008).abs() < 1e-9);
    assert_eq!(battery.current_load(), 15.0);
}

#[test]
fn tracking_auto_recenters_from_offset() {
    let mut battery = started(quiet_config());
    let now = battery.now();
    battery
        .tracking_mut()
        .set_position(Vec2::new(80.0, -80.0), now);
    run_frames(&mut battery, 5_000);

    assert_eq!(battery.tracking().mode(), TrackingMode::Auto);
    assert!(battery.tracking().cursor().position.length() < 10.0);
    assert_eq!(battery.current_health(), 100.0);
}

#[test]
fn tracking_cursor_bounded_through_forced_episode() {
    let mut battery = started(quiet_config());
    assert!(battery.force_manual_control(30_000, 10.0));
    for frame in 0..(30_000 / 16) {
        if frame % 50 == 0 {
            battery.move_pointer(40.0, -40.0);
        }
        battery.update(16);
        let p = battery.tracking().cursor().position;
        assert!(p.x.abs() <= 150.0 && p.y.abs() <= 150.0);
    }
    battery.update(100);
    assert_eq!(battery.tracking().mode(), TrackingMode::Auto);
}

// ── Aggregate ──────────────────────────────────────────────────────────

#[test]
fn health_clamps_and_resets() {
    let mut battery = started(quiet_config());
    for label in IndicatorLabel::ALL.into_iter().cycle().take(60) {
        battery.respond(label);
        battery.update(300);
    }
    assert_eq!(battery.current_health(), 0.0);

    battery.reset_health(100.0);
    assert_eq!(battery.current_health(), 100.0);
    assert_eq!(battery.current_load(), 0.0);
}

#[test]
fn full_session_keeps_invariants() {
    let mut battery = started(busy_config(99));
    let recorder = Recorder::shared();
    battery.set_observer(Box::new(recorder.clone()));

    for _ in 0..(180_000 / 16) {
        battery.update(16);
        let state = battery.state();
        assert!((0.0..=100.0).contains(&state.health));
        assert!((0.0..=100.0).contains(&state.load));
    }

    let recorder = recorder.lock().unwrap();
    assert!(!recorder.outcomes(TaskKind::Monitoring).is_empty());
    assert!(!recorder.outcomes(TaskKind::Communications).is_empty());
    assert!(recorder
        .logs
        .iter()
        .any(|entry| entry.task() == TaskKind::Tracking));
}

#[test]
fn same_seed_same_session() {
    let run = |seed| {
        let mut battery = started(busy_config(seed));
        let recorder = Recorder::shared();
        battery.set_observer(Box::new(recorder.clone()));
        run_frames(&mut battery, 60_000);
        let logs = recorder.lock().unwrap().logs.clone();
        (logs, battery.current_health())
    };
    let (a_logs, a_health) = run(5);
    let (b_logs, b_health) = run(5);
    assert_eq!(a_logs, b_logs);
    assert_eq!(a_health, b_health);
}
