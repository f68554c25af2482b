//! Per-task RNG seeding with ChaCha8.
//!
//! Each simulator gets its own `ChaCha8Rng` seeded from
//! `(session_seed + task stream id)`. Same seed -> same session, always.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::components::TaskKind;

/// Random source owned by every simulator.
pub type SimRng = ChaCha8Rng;

/// Create the deterministic stream for one task of a session.
pub fn task_rng(session_seed: u64, task: TaskKind) -> SimRng {
    let stream = match task {
        TaskKind::Monitoring => 1,
        TaskKind::Communications => 2,
        TaskKind::Resource => 3,
        TaskKind::Tracking => 4,
    };
    ChaCha8Rng::seed_from_u64(session_seed.wrapping_add(stream))
}

/// Fresh session seed when the caller did not pin one.
pub fn entropy_seed() -> u64 {
    rand::thread_rng().gen()
}
