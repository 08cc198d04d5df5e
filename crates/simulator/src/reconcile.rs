//! Queue reconciliation after a mid-simulation hierarchy or rule edit.
//!
//! The clock and placement-group history survive; every in-flight
//! event is classified against the new device set and kept, dropped or
//! downgraded to a failure. Writes whose primary vanished become send
//! failures; writes that lost a replica keep flowing but their final
//! ack is rewritten to a replication failure. Peerings started under
//! the old topology are abandoned — the next iteration restarts them
//! from the new one.

use std::collections::{BTreeMap, HashSet};

use tracing::debug;

use crush::{DeviceId, Hierarchy, Rule, Tunables, Weight};

use crate::error::{Result, SimError};
use crate::event::{Action, Event, EventTag, OpId};
use crate::queue::EventQueue;
use crate::sim::Simulator;

impl Simulator {
    /// Install an edited hierarchy/rule set, rewriting the in-flight
    /// queue per the reconciliation table.
    pub fn adjust(&mut self, hierarchy: Hierarchy, rules: Vec<Rule>) -> Result<()> {
        let rule = rules.into_iter().next().ok_or(SimError::NoRules)?;
        let mut hierarchy = hierarchy;

        let mut context = self.context.carried_forward();
        let mut init_weights = BTreeMap::new();
        let mut sticky_out: Vec<DeviceId> = Vec::new();
        for device in hierarchy.devices() {
            init_weights.insert(device.id, device.weight);
            // a device the old run had marked out stays out until the
            // liveness sweep revives it
            let was_out = self
                .hierarchy
                .device(device.id)
                .map(|old| old.weight == Weight::OUT_OF_CLUSTER)
                .unwrap_or(false);
            if was_out {
                sticky_out.push(device.id);
            }
        }
        for id in init_weights.keys() {
            context.install_oracle(*id);
        }
        for id in sticky_out {
            hierarchy.update_device_weight(id, Weight::OUT_OF_CLUSTER)?;
        }

        let mut queue = EventQueue::new();
        let mut failing_ops: HashSet<OpId> = HashSet::new();
        let mut superseded_peerings: HashSet<u64> = HashSet::new();
        let mut kept = 0usize;
        let mut dropped = 0usize;

        while let Some(event) = self.queue.pop() {
            match event.tag {
                EventTag::MainloopIteration => {
                    queue.push(Event::new(context.current_time, EventTag::MainloopIteration));
                    kept += 1;
                }

                EventTag::SendFailure { .. } => {
                    queue.push(event);
                    kept += 1;
                }

                EventTag::PrimaryRecvSuccess { op_id, obj, pg, map } => {
                    let Some(&primary) = map.first() else {
                        dropped += 1;
                        continue;
                    };
                    if !hierarchy.contains_device(primary) {
                        queue.push(Event::new(
                            event.time,
                            EventTag::SendFailure {
                                obj,
                                reason: format!("couldn't find osd.{}", primary),
                            },
                        ));
                        failing_ops.insert(op_id);
                        kept += 1;
                        continue;
                    }
                    let mut new_map = vec![primary];
                    for &replica in &map[1..] {
                        if hierarchy.contains_device(replica) {
                            new_map.push(replica);
                        } else {
                            failing_ops.insert(op_id);
                        }
                    }
                    queue.push(Event {
                        time: event.time,
                        tag: EventTag::PrimaryRecvSuccess {
                            op_id,
                            obj,
                            pg,
                            map: new_map,
                        },
                        action: event.action,
                    });
                    kept += 1;
                }

                EventTag::PrimaryRecvFailure { osd, .. } => {
                    if hierarchy.contains_device(osd) {
                        queue.push(event);
                        kept += 1;
                    } else {
                        dropped += 1;
                    }
                }

                EventTag::PrimaryRecvAcknowledged { op_id, obj, pg, osd } => {
                    if !hierarchy.contains_device(osd) {
                        dropped += 1;
                        continue;
                    }
                    if failing_ops.contains(&op_id) {
                        queue.push(Event::new(
                            event.time,
                            EventTag::PrimaryReplicationFail { op_id, obj, pg, osd },
                        ));
                    } else {
                        queue.push(event);
                    }
                    kept += 1;
                }

                EventTag::PrimaryReplicationFail { osd, .. }
                | EventTag::ReplicaRecvSuccess { osd, .. }
                | EventTag::ReplicaRecvFailure { osd, .. }
                | EventTag::ReplicaRecvAcknowledged { osd, .. } => {
                    if hierarchy.contains_device(osd) {
                        queue.push(event);
                        kept += 1;
                    } else {
                        dropped += 1;
                    }
                }

                EventTag::PeeringStart { peering_id, .. } => {
                    // the next iteration re-emits peering from the new
                    // topology
                    superseded_peerings.insert(peering_id);
                    dropped += 1;
                }

                EventTag::PeeringSuccess { peering_id, pg } => {
                    if superseded_peerings.contains(&peering_id) {
                        dropped += 1;
                        continue;
                    }
                    // the accepted map was computed under the old
                    // topology; fail the peering but release the flag
                    queue.push(Event::with_action(
                        event.time,
                        EventTag::PeeringFailure { peering_id, pg },
                        Action::StopPeering { pg },
                    ));
                    kept += 1;
                }

                EventTag::PeeringFailure { peering_id, .. } => {
                    if superseded_peerings.contains(&peering_id) {
                        dropped += 1;
                    } else {
                        queue.push(event);
                        kept += 1;
                    }
                }

                EventTag::OsdFailed { osd } | EventTag::OsdRecovered { osd } => {
                    if hierarchy.contains_device(osd) {
                        queue.push(event);
                        kept += 1;
                    } else {
                        dropped += 1;
                    }
                }
            }
        }

        debug!(kept, dropped, failing = failing_ops.len(), "queue reconciled");

        self.hierarchy = hierarchy;
        self.rule = rule;
        self.tunables = Tunables {
            choose_total_tries: self.config.choose_total_tries,
        };
        self.init_weights = init_weights;
        self.context = context;
        self.queue = queue;
        Ok(())
    }
}
