//! The event taxonomy and the tagged actions events carry.
//!
//! Callbacks are values, not closures: the scheduler interprets an
//! [`Action`] against the placement groups it owns. That keeps events
//! trivially cloneable and lets the reconciler rewrite an in-flight
//! queue without touching captured state.

use serde::Serialize;

use crush::DeviceId;

use crate::pg::OpKind;

/// Placement group id.
pub type PgId = i64;
/// User object id.
pub type ObjectId = i64;
/// Unique id per write request.
pub type OpId = u64;

/// What happened, for the observer on the other side of the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventTag {
    /// The self-scheduling tick; never serialized outward.
    MainloopIteration,

    PrimaryRecvSuccess {
        op_id: OpId,
        obj: ObjectId,
        pg: PgId,
        map: Vec<DeviceId>,
    },
    PrimaryRecvFailure {
        obj: ObjectId,
        pg: PgId,
        osd: DeviceId,
    },
    PrimaryRecvAcknowledged {
        op_id: OpId,
        obj: ObjectId,
        pg: PgId,
        osd: DeviceId,
    },
    PrimaryReplicationFail {
        op_id: OpId,
        obj: ObjectId,
        pg: PgId,
        osd: DeviceId,
    },

    ReplicaRecvSuccess {
        op_id: OpId,
        obj: ObjectId,
        pg: PgId,
        osd: DeviceId,
    },
    ReplicaRecvFailure {
        op_id: OpId,
        obj: ObjectId,
        pg: PgId,
        osd: DeviceId,
    },
    ReplicaRecvAcknowledged {
        op_id: OpId,
        obj: ObjectId,
        pg: PgId,
        osd: DeviceId,
    },

    PeeringStart {
        peering_id: u64,
        pg: PgId,
        devices_touched: Vec<DeviceId>,
        candidate_map: Vec<DeviceId>,
    },
    PeeringSuccess {
        peering_id: u64,
        pg: PgId,
    },
    PeeringFailure {
        peering_id: u64,
        pg: PgId,
    },

    OsdFailed {
        osd: DeviceId,
    },
    OsdRecovered {
        osd: DeviceId,
    },
    SendFailure {
        obj: ObjectId,
        reason: String,
    },
}

impl EventTag {
    pub fn is_peering_success(&self) -> bool {
        matches!(self, EventTag::PeeringSuccess { .. })
    }
}

/// Side effect to run when the event is dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    AppendOp {
        pg: PgId,
        osd: DeviceId,
        obj: ObjectId,
        kind: OpKind,
    },
    StartPeering {
        pg: PgId,
    },
    MarkPeered {
        pg: PgId,
        map: Vec<DeviceId>,
    },
    StopPeering {
        pg: PgId,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub time: i64,
    pub tag: EventTag,
    pub action: Option<Action>,
}

impl Event {
    pub fn new(time: i64, tag: EventTag) -> Event {
        Event {
            time,
            tag,
            action: None,
        }
    }

    pub fn with_action(time: i64, tag: EventTag, action: Action) -> Event {
        Event {
            time,
            tag,
            action: Some(action),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialized_form_carries_the_type_tag() {
        let tag = EventTag::PrimaryRecvFailure {
            obj: 42,
            pg: 3,
            osd: 7,
        };
        let json = serde_json::to_value(&tag).unwrap();
        assert_eq!(json["type"], "primary_recv_failure");
        assert_eq!(json["obj"], 42);
        assert_eq!(json["osd"], 7);

        let tag = EventTag::OsdFailed { osd: 1 };
        assert_eq!(serde_json::to_value(&tag).unwrap()["type"], "osd_failed");
    }
}
