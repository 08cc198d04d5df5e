//! The write fan-out cost model.
//!
//! A single update/delete/insert request becomes a timed fan of
//! events: the primary receives at `t_p`, each replica at
//! `t_p + link cost`, acks one tick after receipt, and the primary
//! reports back one tick after the slowest replica.

use crate::context::Context;
use crate::event::{Action, Event, EventTag, ObjectId, OpId};
use crate::liveness::test_proba3;
use crate::pg::{OpKind, PlacementGroup};

pub(crate) fn updelsert(
    pg: &PlacementGroup,
    context: &Context,
    obj: ObjectId,
    kind: OpKind,
    op_id: OpId,
) -> Vec<Event> {
    let now = context.current_time;
    let map = match pg.current_map() {
        Some(m) if !m.is_empty() => m,
        _ => {
            return vec![Event::new(
                now,
                EventTag::SendFailure {
                    obj,
                    reason: "empty map".to_string(),
                },
            )]
        }
    };

    let primary = map[0];
    let t_p = now + context.user_conn_speed.get(primary);

    let primary_ok = context.alive_at(primary, t_p)
        && test_proba3(
            context.failure_proba.get(primary),
            now,
            obj,
            i64::from(primary),
        );
    if !primary_ok {
        return vec![Event::new(
            t_p,
            EventTag::PrimaryRecvFailure {
                obj,
                pg: pg.id,
                osd: primary,
            },
        )];
    }

    let mut events = vec![Event::with_action(
        t_p,
        EventTag::PrimaryRecvSuccess {
            op_id,
            obj,
            pg: pg.id,
            map: map.to_vec(),
        },
        Action::AppendOp {
            pg: pg.id,
            osd: primary,
            obj,
            kind,
        },
    )];

    let mut max_time = t_p;
    let mut failed = false;
    for &replica in &map[1..] {
        let t_d = t_p + context.conn_speed.get(primary, replica);
        let replica_ok = context.alive_at(replica, t_d)
            && test_proba3(
                context.failure_proba.get(replica),
                now,
                obj,
                i64::from(replica),
            );
        if replica_ok {
            events.push(Event::with_action(
                t_d,
                EventTag::ReplicaRecvSuccess {
                    op_id,
                    obj,
                    pg: pg.id,
                    osd: replica,
                },
                Action::AppendOp {
                    pg: pg.id,
                    osd: replica,
                    obj,
                    kind,
                },
            ));
            events.push(Event::new(
                t_d + 1,
                EventTag::ReplicaRecvAcknowledged {
                    op_id,
                    obj,
                    pg: pg.id,
                    osd: replica,
                },
            ));
            max_time = max_time.max(t_d + 1);
        } else {
            failed = true;
            events.push(Event::new(
                t_d,
                EventTag::ReplicaRecvFailure {
                    op_id,
                    obj,
                    pg: pg.id,
                    osd: replica,
                },
            ));
        }
    }

    let verdict = if failed {
        EventTag::PrimaryReplicationFail {
            op_id,
            obj,
            pg: pg.id,
            osd: primary,
        }
    } else {
        EventTag::PrimaryRecvAcknowledged {
            op_id,
            obj,
            pg: pg.id,
            osd: primary,
        }
    };
    events.push(Event::new(max_time + 1, verdict));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimConfig;

    fn context(death_proba: f64, failure_proba: f64, devices: &[i32]) -> Context {
        let mut ctx = Context::from_config(&SimConfig {
            death_proba,
            failure_proba,
            ..SimConfig::default()
        });
        for &d in devices {
            ctx.install_oracle(d);
        }
        ctx
    }

    fn peered_pg(map: Vec<i32>) -> PlacementGroup {
        let mut pg = PlacementGroup::new(0);
        pg.mark_peered(map);
        pg
    }

    #[test]
    fn empty_map_yields_send_failure() {
        let pg = PlacementGroup::new(0);
        let ctx = context(0.0, 0.0, &[]);
        let events = updelsert(&pg, &ctx, 42, OpKind::Insert, 1);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].tag,
            EventTag::SendFailure { obj: 42, .. }
        ));
        assert_eq!(events[0].time, ctx.current_time);
    }

    #[test]
    fn healthy_write_fans_out_and_acks() {
        let pg = peered_pg(vec![1, 2, 3]);
        let ctx = context(0.0, 0.0, &[1, 2, 3]);
        let events = updelsert(&pg, &ctx, 42, OpKind::Insert, 7);

        let mut success = 0;
        let mut replica_success = 0;
        let mut replica_ack = 0;
        let mut primary_ack = 0;
        let mut recv_times = Vec::new();
        let mut ack_times = Vec::new();
        for e in &events {
            match &e.tag {
                EventTag::PrimaryRecvSuccess { map, .. } => {
                    success += 1;
                    recv_times.push(e.time);
                    assert_eq!(map, &vec![1, 2, 3]);
                }
                EventTag::ReplicaRecvSuccess { .. } => {
                    replica_success += 1;
                    recv_times.push(e.time);
                }
                EventTag::ReplicaRecvAcknowledged { .. } => {
                    replica_ack += 1;
                    ack_times.push(e.time);
                }
                EventTag::PrimaryRecvAcknowledged { .. } => {
                    primary_ack += 1;
                    ack_times.push(e.time);
                }
                other => panic!("unexpected event: {:?}", other),
            }
        }
        assert_eq!(
            (success, replica_success, replica_ack, primary_ack),
            (1, 2, 2, 1)
        );

        // the primary ack trails every receive
        let last_ack = ack_times.iter().max().unwrap();
        assert!(recv_times.iter().all(|t| t < last_ack));
    }

    #[test]
    fn dead_primary_fails_the_write() {
        let pg = peered_pg(vec![1, 2, 3]);
        // no oracles: everything reads dead
        let ctx = context(0.0, 0.0, &[]);
        let events = updelsert(&pg, &ctx, 42, OpKind::Insert, 7);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].tag,
            EventTag::PrimaryRecvFailure { osd: 1, .. }
        ));
    }

    #[test]
    fn dead_replica_turns_into_replication_fail() {
        let pg = peered_pg(vec![1, 2]);
        let mut ctx = context(0.0, 0.0, &[1]);
        // only the primary has an oracle; replica 2 reads dead
        ctx.install_oracle(1);
        let events = updelsert(&pg, &ctx, 42, OpKind::Update, 7);

        assert!(events
            .iter()
            .any(|e| matches!(e.tag, EventTag::ReplicaRecvFailure { osd: 2, .. })));
        assert!(events
            .iter()
            .any(|e| matches!(e.tag, EventTag::PrimaryReplicationFail { osd: 1, .. })));
        assert!(!events
            .iter()
            .any(|e| matches!(e.tag, EventTag::PrimaryRecvAcknowledged { .. })));
    }

    #[test]
    fn op_ids_thread_through_the_fan() {
        let pg = peered_pg(vec![1, 2, 3]);
        let ctx = context(0.0, 0.0, &[1, 2, 3]);
        for e in updelsert(&pg, &ctx, 5, OpKind::Delete, 99) {
            match e.tag {
                EventTag::PrimaryRecvSuccess { op_id, .. }
                | EventTag::PrimaryRecvAcknowledged { op_id, .. }
                | EventTag::ReplicaRecvSuccess { op_id, .. }
                | EventTag::ReplicaRecvAcknowledged { op_id, .. } => assert_eq!(op_id, 99),
                other => panic!("unexpected event: {:?}", other),
            }
        }
    }
}
