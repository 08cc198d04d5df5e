//! The device-liveness oracle.
//!
//! Whether a device is alive at virtual time `t` is a pure function of
//! `(device_id, t, p_die)`. Changing the death probability rewrites
//! history retroactively; the simulator is a what-if tool, not a
//! replay.

use crush::hash::{hash2, hash3, low16};
use crush::DeviceId;

/// Map a probability to a 16-bit cutoff.
fn cutoff(p: f64) -> u32 {
    (p * 65535.0).round() as u32
}

/// Deterministic Bernoulli trial: passes with probability `1 - p`.
pub fn test_proba2(p: f64, a: i64, b: i64) -> bool {
    low16(hash2(a, b)) >= cutoff(p)
}

/// Three-argument variant, used by the write model.
pub fn test_proba3(p: f64, a: i64, b: i64, c: i64) -> bool {
    low16(hash3(a, b, c)) >= cutoff(p)
}

/// Per-device oracle.
#[derive(Debug, Clone)]
pub struct AliveIntervals {
    id: DeviceId,
    p_die: f64,
}

impl AliveIntervals {
    pub fn new(id: DeviceId, p_die: f64) -> AliveIntervals {
        AliveIntervals { id, p_die }
    }

    pub fn check_at(&self, t: i64) -> bool {
        test_proba2(self.p_die, i64::from(self.id), t)
    }

    pub fn set_death_proba(&mut self, p: f64) {
        self.p_die = p;
    }
}
