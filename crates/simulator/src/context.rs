//! Global simulation state shared by the write model, the iteration
//! driver and the reconciler.

use std::collections::HashMap;

use crush::DeviceId;

use crate::config::SimConfig;
use crate::liveness::AliveIntervals;

/// Per-device value with a fallback default.
#[derive(Debug, Clone)]
pub struct PerDevice<T: Copy> {
    default: T,
    overrides: HashMap<DeviceId, T>,
}

impl<T: Copy> PerDevice<T> {
    pub fn new(default: T) -> PerDevice<T> {
        PerDevice {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn get(&self, id: DeviceId) -> T {
        self.overrides.get(&id).copied().unwrap_or(self.default)
    }

    pub fn set(&mut self, id: DeviceId, value: T) {
        self.overrides.insert(id, value);
    }
}

/// Per-link value with a fallback default, keyed by (from, to).
#[derive(Debug, Clone)]
pub struct PerLink<T: Copy> {
    default: T,
    overrides: HashMap<(DeviceId, DeviceId), T>,
}

impl<T: Copy> PerLink<T> {
    pub fn new(default: T) -> PerLink<T> {
        PerLink {
            default,
            overrides: HashMap::new(),
        }
    }

    pub fn get(&self, from: DeviceId, to: DeviceId) -> T {
        self.overrides
            .get(&(from, to))
            .copied()
            .unwrap_or(self.default)
    }

    pub fn set(&mut self, from: DeviceId, to: DeviceId, value: T) {
        self.overrides.insert((from, to), value);
    }
}

#[derive(Debug, Clone)]
pub struct Context {
    pub current_time: i64,
    pub timestep: i64,
    pub timesteps_to_peer: i64,
    /// Informational; the write model encodes its effective timeouts in
    /// delivery timestamps instead.
    pub timeout: i64,
    /// Transfer cost from the user to a primary.
    pub user_conn_speed: PerDevice<i64>,
    /// Transfer cost between two devices.
    pub conn_speed: PerLink<i64>,
    /// Per-write failure probability.
    pub failure_proba: PerDevice<f64>,
    pub death_proba: f64,
    pub alive_intervals: HashMap<DeviceId, AliveIntervals>,
}

impl Context {
    pub fn from_config(cfg: &SimConfig) -> Context {
        Context {
            current_time: 0,
            timestep: cfg.timestep,
            timesteps_to_peer: cfg.timesteps_to_peer,
            timeout: cfg.timeout,
            user_conn_speed: PerDevice::new(cfg.user_conn_speed),
            conn_speed: PerLink::new(cfg.conn_speed),
            failure_proba: PerDevice::new(cfg.failure_proba),
            death_proba: cfg.death_proba,
            alive_intervals: HashMap::new(),
        }
    }

    /// Fresh context for a reconciled hierarchy: same clock and
    /// tunables, no oracles yet.
    pub fn carried_forward(&self) -> Context {
        Context {
            current_time: self.current_time,
            timestep: self.timestep,
            timesteps_to_peer: self.timesteps_to_peer,
            timeout: self.timeout,
            user_conn_speed: self.user_conn_speed.clone(),
            conn_speed: self.conn_speed.clone(),
            failure_proba: self.failure_proba.clone(),
            death_proba: self.death_proba,
            alive_intervals: HashMap::new(),
        }
    }

    pub fn install_oracle(&mut self, id: DeviceId) {
        self.alive_intervals
            .insert(id, AliveIntervals::new(id, self.death_proba));
    }

    pub fn alive_at(&self, id: DeviceId, t: i64) -> bool {
        self.alive_intervals
            .get(&id)
            .map(|oracle| oracle.check_at(t))
            .unwrap_or(false)
    }

    /// Uniformly reset the death probability on every device, past and
    /// future alike.
    pub fn update_death_proba(&mut self, p: f64) {
        self.death_proba = p;
        for oracle in self.alive_intervals.values_mut() {
            oracle.set_death_proba(p);
        }
    }

    pub fn do_time_step(&mut self) {
        self.current_time += self.timestep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_device_defaults_and_overrides() {
        let mut speeds = PerDevice::new(20i64);
        assert_eq!(speeds.get(1), 20);
        speeds.set(1, 5);
        assert_eq!(speeds.get(1), 5);
        assert_eq!(speeds.get(2), 20);
    }

    #[test]
    fn death_proba_update_reaches_every_oracle() {
        let mut ctx = Context::from_config(&SimConfig {
            death_proba: 1.0,
            ..SimConfig::default()
        });
        for id in 1..=4 {
            ctx.install_oracle(id);
        }
        ctx.update_death_proba(0.0);
        for id in 1..=4 {
            assert!((0..50).all(|t| ctx.alive_at(id, t)));
        }
    }

    #[test]
    fn missing_oracle_reads_dead() {
        let ctx = Context::from_config(&SimConfig::default());
        assert!(!ctx.alive_at(99, 0));
    }
}
