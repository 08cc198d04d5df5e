//! Command flows against a session, plus a loopback TCP round trip.

use gateway::{serve, Command, Frame, Session};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

const MAP: &str = "\
device 1 osd.1
device 2 osd.2
device 3 osd.3
device 4 osd.4
device 5 osd.5
device 6 osd.6

host h1 {
    id -2
    alg straw2
    hash 0
    item osd.1 weight 1.0
    item osd.2 weight 1.0
    item osd.3 weight 1.0
}
host h2 {
    id -3
    alg straw2
    hash 0
    item osd.4 weight 1.0
    item osd.5 weight 1.0
    item osd.6 weight 1.0
}
root default {
    id -1
    alg straw2
    hash 0
    item h1
    item h2
}

rule replicated_rule {
    id 0
    type replicated
    min_size 1
    max_size 10
    step take default
    step chooseleaf firstn 2 type host
    step emit
}
";

fn load(session: &mut Session) -> Frame {
    session
        .handle(Command::Rule {
            message: MAP.to_string(),
        })
        .expect("rule always responds")
}

#[test]
fn rule_command_builds_the_tree() {
    let mut session = Session::new();
    let frame = load(&mut session);
    let Frame::HierarchySuccess { data } = frame else {
        panic!("expected hierarchy_success, got {:?}", frame);
    };
    assert_eq!(data["name"], "default");
    assert_eq!(data["type"], "bucket");
    let children = data["children"].as_array().unwrap();
    assert_eq!(children.len(), 2);
    assert_eq!(children[0]["type"], "bucket");
    let osds = children[0]["children"].as_array().unwrap();
    assert_eq!(osds.len(), 3);
    assert_eq!(osds[0]["type"], "osd");
}

#[test]
fn bad_map_reports_hierarchy_fail_and_keeps_state() {
    let mut session = Session::new();
    load(&mut session);

    let frame = session
        .handle(Command::Rule {
            message: "device 1 osd.1\ndevice 1 osd.2\n".to_string(),
        })
        .unwrap();
    let Frame::HierarchyFail { data } = frame else {
        panic!("expected hierarchy_fail, got {:?}", frame);
    };
    assert!(data.contains("already defined"));

    // the previous simulator is still serving
    let frame = session.handle(Command::Step).unwrap();
    assert!(matches!(frame, Frame::Events { timestamp: 0, .. }));
}

#[test]
fn commands_before_any_rule_fail_gracefully() {
    let mut session = Session::new();
    for command in [
        Command::Step,
        Command::Insert { id: 1 },
        Command::Mode {
            new_mode: "randomized".to_string(),
        },
        Command::AdjustRule {
            message: MAP.to_string(),
        },
    ] {
        let frame = session.handle(command).unwrap();
        assert!(matches!(frame, Frame::HierarchyFail { .. }));
    }
}

#[test]
fn step_returns_event_batches() {
    let mut session = Session::new();
    load(&mut session);

    let Frame::Events { timestamp, events } = session.handle(Command::Step).unwrap() else {
        panic!("expected events frame");
    };
    assert_eq!(timestamp, 0);
    let starts = events
        .iter()
        .filter(|e| matches!(e, simulator::EventTag::PeeringStart { .. }))
        .count();
    assert_eq!(starts, 8);
}

#[test]
fn insert_is_silent_and_surfaces_on_step() {
    let mut session = Session::new();
    load(&mut session);
    assert!(session.handle(Command::Insert { id: 42 }).is_none());

    let Frame::Events { events, .. } = session.handle(Command::Step).unwrap() else {
        panic!("expected events frame");
    };
    // no map yet: the write degrades to a send failure in this cohort
    assert!(events
        .iter()
        .any(|e| matches!(e, simulator::EventTag::SendFailure { .. })));
}

#[test]
fn mode_flips_the_death_probability() {
    let mut session = Session::new();
    load(&mut session);

    assert!(session
        .handle(Command::Mode {
            new_mode: "stable".to_string()
        })
        .is_none());
    assert_eq!(session.simulator().unwrap().death_proba(), 0.0);

    session.handle(Command::Mode {
        new_mode: "randomized".to_string(),
    });
    assert_eq!(session.simulator().unwrap().death_proba(), 0.25);
}

#[test]
fn adjust_rule_preserves_the_clock() {
    let mut session = Session::new();
    load(&mut session);
    for _ in 0..3 {
        session.handle(Command::Step);
    }
    let now = session.simulator().unwrap().current_time();
    assert!(now > 0);

    let frame = session
        .handle(Command::AdjustRule {
            message: MAP.to_string(),
        })
        .unwrap();
    let Frame::AdjustHierarchySuccess { timestamp, data } = frame else {
        panic!("expected adjust_hierarchy_success");
    };
    assert_eq!(timestamp, now);
    assert_eq!(data["name"], "default");
}

#[test]
fn undecodable_text_reports_hierarchy_fail() {
    let mut session = Session::new();
    let frame = session.handle_text("not json at all").unwrap();
    assert!(matches!(frame, Frame::HierarchyFail { .. }));
}

#[tokio::test]
async fn tcp_round_trip() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = serve(listener).await;
    });

    let stream = TcpStream::connect(addr).await.unwrap();
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let rule = serde_json::json!({ "type": "rule", "message": MAP }).to_string();
    write_half.write_all(rule.as_bytes()).await.unwrap();
    write_half.write_all(b"\n").await.unwrap();

    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    let reply: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["type"], "hierarchy_success");
    assert_eq!(reply["data"]["name"], "default");

    write_half.write_all(b"{\"type\":\"step\"}\n").await.unwrap();
    line.clear();
    reader.read_line(&mut line).await.unwrap();
    let reply: serde_json::Value = serde_json::from_str(&line).unwrap();
    assert_eq!(reply["type"], "events");
    assert_eq!(reply["timestamp"], 0);
    assert!(reply["events"].as_array().unwrap().len() >= 8);
}
