//! Placement-group state: the history of accepted maps, the peering
//! flag and per-device operation logs.

use std::collections::BTreeMap;

use serde::Serialize;

use crush::DeviceId;

use crate::context::Context;
use crate::event::{ObjectId, PgId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Operation {
    pub object: ObjectId,
    pub kind: OpKind,
}

#[derive(Debug, Clone)]
pub struct PlacementGroup {
    pub id: PgId,
    maps: Vec<Vec<DeviceId>>,
    /// Index into `maps` of the last peered map.
    last_sync: usize,
    pub is_peering: bool,
    pub logs: BTreeMap<DeviceId, Vec<Operation>>,
}

impl PlacementGroup {
    pub fn new(id: PgId) -> PlacementGroup {
        PlacementGroup {
            id,
            maps: Vec::new(),
            last_sync: 0,
            is_peering: false,
            logs: BTreeMap::new(),
        }
    }

    /// The last accepted map; empty until the first peering succeeds.
    pub fn current_map(&self) -> Option<&[DeviceId]> {
        self.maps.last().map(Vec::as_slice)
    }

    pub fn maps(&self) -> &[Vec<DeviceId>] {
        &self.maps
    }

    /// Append `m` iff it differs from the last entry.
    pub fn record_if_new(&mut self, m: Vec<DeviceId>) -> bool {
        if self.maps.last().map(Vec::as_slice) == Some(m.as_slice()) {
            return false;
        }
        self.maps.push(m);
        true
    }

    /// Maps accepted since the last successful sync, inclusive.
    pub fn syncing_maps(&self) -> &[Vec<DeviceId>] {
        &self.maps[self.last_sync.min(self.maps.len())..]
    }

    /// Peering verdict: every map still syncing must have at least one
    /// device alive at each of the next `timesteps_to_peer` timesteps.
    pub fn peer(&self, context: &Context) -> (Vec<Vec<DeviceId>>, bool) {
        let syncing = self.syncing_maps();
        let success = syncing.iter().all(|map| {
            (0..context.timesteps_to_peer).all(|j| {
                map.iter()
                    .any(|&d| context.alive_at(d, context.current_time + j * context.timestep))
            })
        });
        (syncing.to_vec(), success)
    }

    pub fn start_peering(&mut self) {
        self.is_peering = true;
    }

    pub fn stop_peering(&mut self) {
        self.is_peering = false;
    }

    /// Accept a peered map: clear the flag, advance the sync point and
    /// record the map.
    pub fn mark_peered(&mut self, m: Vec<DeviceId>) {
        self.is_peering = false;
        self.last_sync = self.maps.len();
        self.record_if_new(m);
    }

    pub fn append_op(&mut self, osd: DeviceId, op: Operation) {
        self.logs.entry(osd).or_default().push(op);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn quiet_context(death_proba: f64, devices: &[DeviceId]) -> Context {
        let mut ctx = Context::from_config(&SimConfig {
            death_proba,
            ..SimConfig::default()
        });
        for &d in devices {
            ctx.install_oracle(d);
        }
        ctx
    }

    #[test]
    fn record_if_new_dedupes_consecutive() {
        let mut pg = PlacementGroup::new(0);
        assert!(pg.record_if_new(vec![1, 2, 3]));
        assert!(!pg.record_if_new(vec![1, 2, 3]));
        assert!(pg.record_if_new(vec![2, 3, 4]));
        assert_eq!(pg.maps().len(), 2);
    }

    #[test]
    fn peer_is_vacuously_true_with_no_maps() {
        let pg = PlacementGroup::new(0);
        let ctx = quiet_context(1.0, &[]);
        let (maps, success) = pg.peer(&ctx);
        assert!(maps.is_empty());
        assert!(success);
    }

    #[test]
    fn peer_fails_when_every_device_is_dead() {
        let mut pg = PlacementGroup::new(0);
        pg.mark_peered(vec![1, 2]);
        // no oracles installed: both devices read as dead
        let ctx = quiet_context(1.0, &[]);
        let (maps, success) = pg.peer(&ctx);
        assert_eq!(maps, vec![vec![1, 2]]);
        assert!(!success);
    }

    #[test]
    fn peer_succeeds_with_live_devices() {
        let mut pg = PlacementGroup::new(0);
        pg.mark_peered(vec![1, 2]);
        let ctx = quiet_context(0.0, &[1, 2]);
        let (_, success) = pg.peer(&ctx);
        assert!(success);
    }

    #[test]
    fn mark_peered_advances_the_sync_point() {
        let mut pg = PlacementGroup::new(0);
        pg.mark_peered(vec![1]);
        pg.mark_peered(vec![2]);
        assert_eq!(pg.syncing_maps(), &[vec![2]]);
        assert_eq!(pg.maps().len(), 2);
        assert!(!pg.is_peering);
    }

    #[test]
    fn logs_accumulate_per_device() {
        let mut pg = PlacementGroup::new(0);
        pg.append_op(
            3,
            Operation {
                object: 42,
                kind: OpKind::Insert,
            },
        );
        pg.append_op(
            3,
            Operation {
                object: 43,
                kind: OpKind::Delete,
            },
        );
        assert_eq!(pg.logs[&3].len(), 2);
    }
}
