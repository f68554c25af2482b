//! Scripted operator for headless sessions.
//!
//! Reacts to what is on screen after a fixed human-like delay: presses
//! faulty indicators, tunes the radio for own-ship calls, keeps tanks A and B
//! near their target with the supply pumps, and steers the cursor back to
//! the center while tracking is manual.

use matb_core::prelude::*;

/// Reaction delays and control gains.
#[derive(Debug, Clone, Copy)]
pub struct Autopilot {
    pub monitoring_reaction_ms: Millis,
    pub comms_reaction_ms: Millis,
    /// Pump hysteresis around the tank target
    pub pump_band: f64,
    /// Fraction of the cursor offset corrected per frame
    pub steering_gain: f64,
}

impl Default for Autopilot {
    fn default() -> Self {
        Self {
            monitoring_reaction_ms: 1_500,
            comms_reaction_ms: 2_000,
            pump_band: 150.0,
            steering_gain: 0.3,
        }
    }
}

impl Autopilot {
    /// Act on the current frame.
    pub fn act(&self, battery: &mut Battery) {
        self.monitor(battery);
        self.communicate(battery);
        self.manage_fuel(battery);
        self.steer(battery);
    }

    fn monitor(&self, battery: &mut Battery) {
        let now = battery.now();
        let due: Vec<IndicatorLabel> = battery
            .monitoring()
            .events()
            .iter()
            .filter(|e| !e.is_resolved() && now >= e.created_at + self.monitoring_reaction_ms)
            .map(|e| e.label)
            .collect();
        for label in due {
            battery.respond(label);
        }
    }

    fn communicate(&self, battery: &mut Battery) {
        let now = battery.now();
        let Some(message) = battery.communications().active_message() else {
            return;
        };
        if !message.own_callsign {
            return;
        }
        let heard = message
            .started_at
            .is_some_and(|start| now >= start + self.comms_reaction_ms);
        if !heard {
            return;
        }
        let (radio, frequency) = (message.target_radio, message.target_frequency);
        let panel = battery.communications().panel();
        if panel.frequency(radio) != frequency {
            battery.set_frequency(radio, frequency);
        }
        if battery.communications().panel().selected != radio {
            battery.select_radio(radio);
        }
    }

    fn manage_fuel(&self, battery: &mut Battery) {
        // Supply pumps per target tank.
        for (tank, supplies) in [(TankId::A, [1, 2]), (TankId::B, [3, 4])] {
            let deviation = battery.resource().tank(tank).deviation();
            for n in supplies {
                let Ok(id) = PumpId::new(n) else {
                    continue;
                };
                let state = battery.resource().pump(id).state;
                let want_on = deviation < -self.pump_band;
                let want_off = deviation > self.pump_band;
                if (state == PumpState::Off && want_on) || (state == PumpState::On && want_off) {
                    battery.toggle_pump(id);
                }
            }
        }
    }

    fn steer(&self, battery: &mut Battery) {
        if battery.tracking().mode() != TrackingMode::Manual {
            return;
        }
        let p = battery.tracking().cursor().position;
        battery.move_pointer(-p.x * self.steering_gain, -p.y * self.steering_gain);
    }
}
