//! The simulator: one owned object holding the hierarchy, the
//! placement groups, the clock and the event queue.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crush::hash::{hash1, hash2};
use crush::{DeviceId, Hierarchy, Rule, Tunables, Weight};

use crate::config::SimConfig;
use crate::context::Context;
use crate::error::{Result, SimError};
use crate::event::{Action, Event, EventTag, ObjectId, OpId, PgId};
use crate::pg::{OpKind, Operation, PlacementGroup};
use crate::queue::EventQueue;
use crate::write;

pub struct Simulator {
    pub(crate) hierarchy: Hierarchy,
    pub(crate) rule: Rule,
    pub(crate) tunables: Tunables,
    pub(crate) config: SimConfig,
    /// Declared weight per device; the liveness sweep flips the current
    /// weight between this and out-of-cluster.
    pub(crate) init_weights: BTreeMap<DeviceId, Weight>,
    pub(crate) pgs: Vec<PlacementGroup>,
    pub(crate) context: Context,
    pub(crate) queue: EventQueue,
    next_op_id: OpId,
}

impl Simulator {
    /// Build a simulator over a freshly parsed hierarchy and seed the
    /// queue with the first mainloop iteration at time 0.
    pub fn new(hierarchy: Hierarchy, rules: Vec<Rule>, config: SimConfig) -> Result<Simulator> {
        let rule = rules.into_iter().next().ok_or(SimError::NoRules)?;
        let tunables = Tunables {
            choose_total_tries: config.choose_total_tries,
        };

        let mut context = Context::from_config(&config);
        let mut init_weights = BTreeMap::new();
        for device in hierarchy.devices() {
            init_weights.insert(device.id, device.weight);
            context.install_oracle(device.id);
        }

        let pgs = (0..config.pg_count as PgId)
            .map(PlacementGroup::new)
            .collect();

        let mut queue = EventQueue::new();
        queue.push(Event::new(
            context.current_time,
            EventTag::MainloopIteration,
        ));

        Ok(Simulator {
            hierarchy,
            rule,
            tunables,
            config,
            init_weights,
            pgs,
            context,
            queue,
            next_op_id: 0,
        })
    }

    pub fn current_time(&self) -> i64 {
        self.context.current_time
    }

    pub fn death_proba(&self) -> f64 {
        self.context.death_proba
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn pgs(&self) -> &[PlacementGroup] {
        &self.pgs
    }

    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Uniformly reset every device's death probability.
    pub fn set_death_proba(&mut self, p: f64) {
        self.context.update_death_proba(p);
    }

    /// Dispatch one time-cohort: pop every event sharing the earliest
    /// timestamp, run its action, and collect the observable tags.
    /// Returns `(-1, [])` on an empty queue.
    pub fn step(&mut self) -> Result<(i64, Vec<EventTag>)> {
        let mut batch = Vec::new();
        let Some(now) = self.queue.peek_time() else {
            return Ok((-1, batch));
        };

        while self.queue.peek_time() == Some(now) {
            let Some(event) = self.queue.pop() else {
                break;
            };
            if let Some(action) = event.action {
                self.run_action(action);
            }
            match event.tag {
                EventTag::MainloopIteration => {
                    for child in self.run_iteration()? {
                        self.queue.push(child);
                    }
                }
                tag => batch.push(tag),
            }
        }

        Ok((now, batch))
    }

    /// Route an object to its placement group and enqueue the write
    /// fan-out.
    pub fn insert(&mut self, obj: ObjectId) {
        self.updelsert(obj, OpKind::Insert);
    }

    pub fn update(&mut self, obj: ObjectId) {
        self.updelsert(obj, OpKind::Update);
    }

    pub fn delete(&mut self, obj: ObjectId) {
        self.updelsert(obj, OpKind::Delete);
    }

    fn updelsert(&mut self, obj: ObjectId, kind: OpKind) {
        let index = (hash1(obj) % self.pgs.len() as u64) as usize;
        let op_id = self.next_op_id;
        self.next_op_id += 1;

        let events = write::updelsert(&self.pgs[index], &self.context, obj, kind, op_id);
        debug!(obj, op_id, pg = self.pgs[index].id, n = events.len(), "write fan-out");
        for event in events {
            self.queue.push(event);
        }
    }

    pub(crate) fn run_action(&mut self, action: Action) {
        match action {
            Action::AppendOp { pg, osd, obj, kind } => {
                if let Some(pg) = self.pg_mut(pg) {
                    pg.append_op(osd, Operation { object: obj, kind });
                }
            }
            Action::StartPeering { pg } => {
                if let Some(pg) = self.pg_mut(pg) {
                    pg.start_peering();
                }
            }
            Action::MarkPeered { pg, map } => {
                if let Some(pg) = self.pg_mut(pg) {
                    pg.mark_peered(map);
                }
            }
            Action::StopPeering { pg } => {
                if let Some(pg) = self.pg_mut(pg) {
                    pg.stop_peering();
                }
            }
        }
    }

    fn pg_mut(&mut self, id: PgId) -> Option<&mut PlacementGroup> {
        usize::try_from(id).ok().and_then(|i| self.pgs.get_mut(i))
    }

    /// One mainloop iteration: liveness sweep, per-PG mapping and
    /// peering, clock tick, and the next iteration event.
    fn run_iteration(&mut self) -> Result<Vec<Event>> {
        let mut children = Vec::new();
        let now = self.context.current_time;

        // liveness sweep: flip current weights and surface transitions
        let device_ids: Vec<DeviceId> = self.init_weights.keys().copied().collect();
        for id in device_ids {
            let init = self.init_weights[&id];
            if init == Weight::OUT_OF_CLUSTER {
                // declared out: report it dead every tick
                children.push(Event::new(now, EventTag::OsdFailed { osd: id }));
                continue;
            }
            let current = self.hierarchy.device(id)?.weight;
            if self.context.alive_at(id, now) {
                if current == Weight::OUT_OF_CLUSTER {
                    self.hierarchy.update_device_weight(id, init)?;
                    children.push(Event::new(now, EventTag::OsdRecovered { osd: id }));
                }
            } else if current != Weight::OUT_OF_CLUSTER {
                self.hierarchy.update_device_weight(id, Weight::OUT_OF_CLUSTER)?;
                children.push(Event::new(now, EventTag::OsdFailed { osd: id }));
            }
        }

        // re-map every PG; start peering where the map moved
        for index in 0..self.pgs.len() {
            let candidate = crush::apply(
                &self.hierarchy,
                self.pgs[index].id,
                &self.rule,
                self.config.pool_size,
                &self.tunables,
            )?;

            let pg = &self.pgs[index];
            if pg.is_peering || pg.current_map() == Some(candidate.as_slice()) {
                continue;
            }

            let (prev_maps, success) = pg.peer(&self.context);
            let touched: BTreeSet<DeviceId> = prev_maps.iter().flatten().copied().collect();
            let peering_id = hash2(pg.id, now);

            children.push(Event::with_action(
                now,
                EventTag::PeeringStart {
                    peering_id,
                    pg: pg.id,
                    devices_touched: touched.into_iter().collect(),
                    candidate_map: candidate.clone(),
                },
                Action::StartPeering { pg: pg.id },
            ));

            let when = now + self.context.timestep * self.context.timesteps_to_peer;
            if success {
                children.push(Event::with_action(
                    when,
                    EventTag::PeeringSuccess {
                        peering_id,
                        pg: pg.id,
                    },
                    Action::MarkPeered {
                        pg: pg.id,
                        map: candidate,
                    },
                ));
            } else {
                children.push(Event::with_action(
                    when,
                    EventTag::PeeringFailure {
                        peering_id,
                        pg: pg.id,
                    },
                    Action::StopPeering { pg: pg.id },
                ));
            }
        }

        self.context.do_time_step();
        children.push(Event::new(
            self.context.current_time,
            EventTag::MainloopIteration,
        ));
        Ok(children)
    }
}
