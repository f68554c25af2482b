//! Component definitions for the battery simulation.
//!
//! Components are pure data structs owned by the task simulators.
//! They have no behavior beyond small helpers - that lives in systems.

mod common;
mod comms;
mod monitoring;
mod resource;
mod tracking;

pub use common::*;
pub use comms::*;
pub use monitoring::*;
pub use resource::*;
pub use tracking::*;
