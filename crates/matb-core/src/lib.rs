//! MATB Core - Multi-Task Workload Battery Engine
//!
//! A real-time simulation of four concurrent operator tasks (system
//! monitoring, radio communications, fuel resource management and target
//! tracking). Each task generates timed events, accepts operator responses
//! and publishes a `{health_impact, system_load}` metric. A central
//! aggregator folds those streams into one cumulative health score and one
//! instantaneous load score.
//!
//! # Architecture
//!
//! - **Components**: pure data (indicators, messages, snapshots, tanks,
//!   pumps, cursor, metrics)
//! - **Systems**: logic that owns and mutates components (event scheduler,
//!   the four task simulators, the health/load aggregator)
//! - **Engine**: a virtual millisecond clock that fires every simulator's
//!   timers in time order on a single thread
//!
//! # Example
//!
//! ```rust,no_run
//! use matb_core::prelude::*;
//!
//! let mut battery = Battery::new(BatteryConfig::default()).unwrap();
//! battery.start();
//!
//! loop {
//!     battery.update(16); // ~60 FPS
//!     battery.respond(IndicatorLabel::F3);
//!     println!("health {:.1} load {:.1}", battery.current_health(), battery.current_load());
//! }
//! ```

pub mod components;
pub mod config;
pub mod engine;
pub mod error;
pub mod records;
pub mod rng;
pub mod systems;
pub mod timers;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::components::*;
    pub use crate::config::{BatteryConfig, TaskSettings};
    pub use crate::engine::Battery;
    pub use crate::error::BatteryError;
    pub use crate::records::{BatteryObserver, LogEntry, Recorder};
    pub use crate::timers::Millis;
}
