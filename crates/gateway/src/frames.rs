//! Wire frames: inbound commands and outbound responses, plus the
//! hierarchy tree payload.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crush::{Hierarchy, NodeId};
use simulator::EventTag;

/// Inbound command frame, discriminated by `type`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Load a new map text, resetting the simulator.
    Rule { message: String },
    /// Edit the map mid-run; the in-flight queue is reconciled.
    AdjustRule { message: String },
    /// Dispatch one time-cohort.
    Step,
    /// Insert an object.
    Insert { id: i64 },
    /// Switch the liveness mode: "randomized" or anything else.
    Mode { new_mode: String },
}

/// Outbound response frame.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    HierarchySuccess {
        data: Value,
    },
    HierarchyFail {
        data: String,
    },
    AdjustHierarchySuccess {
        data: Value,
        timestamp: i64,
    },
    Events {
        timestamp: i64,
        events: Vec<EventTag>,
    },
}

/// Serialize the hierarchy tree: buckets as
/// `{name, type: "bucket", children}`, devices as
/// `{name: "osd.<id>", type: "osd"}`.
pub fn hierarchy_to_json(hierarchy: &Hierarchy) -> Value {
    node_to_json(hierarchy, hierarchy.root_id())
}

fn node_to_json(hierarchy: &Hierarchy, id: NodeId) -> Value {
    if id > 0 {
        return json!({
            "name": format!("osd.{}", id),
            "type": "osd",
        });
    }
    match hierarchy.bucket(id) {
        Ok(bucket) => {
            let children: Vec<Value> = bucket
                .children
                .iter()
                .map(|&child| node_to_json(hierarchy, child))
                .collect();
            json!({
                "name": bucket.name,
                "type": "bucket",
                "children": children,
            })
        }
        // unreachable on a parser-built hierarchy
        Err(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_decode_by_type_tag() {
        let cmd: Command = serde_json::from_str(r#"{"type": "insert", "id": 42}"#).unwrap();
        assert_eq!(cmd, Command::Insert { id: 42 });

        let cmd: Command = serde_json::from_str(r#"{"type": "step"}"#).unwrap();
        assert_eq!(cmd, Command::Step);

        let cmd: Command =
            serde_json::from_str(r#"{"type": "mode", "new_mode": "randomized"}"#).unwrap();
        assert_eq!(
            cmd,
            Command::Mode {
                new_mode: "randomized".to_string()
            }
        );

        assert!(serde_json::from_str::<Command>(r#"{"type": "reboot"}"#).is_err());
    }

    #[test]
    fn frames_carry_their_type_tag() {
        let frame = Frame::HierarchyFail {
            data: "bad map".to_string(),
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "hierarchy_fail");
        assert_eq!(value["data"], "bad map");

        let frame = Frame::Events {
            timestamp: -1,
            events: vec![],
        };
        let value = serde_json::to_value(&frame).unwrap();
        assert_eq!(value["type"], "events");
        assert_eq!(value["timestamp"], -1);
    }
}
