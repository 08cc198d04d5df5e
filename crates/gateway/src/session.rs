//! Per-connection command execution against an owned simulator.

use tracing::{debug, warn};

use simulator::{SimConfig, Simulator};

use crate::frames::{hierarchy_to_json, Command, Frame};

/// Death probability installed when the first map loads.
const DEFAULT_DEATH_PROBA: f64 = 0.25;

/// One client's simulator and its lifecycle. Commands run strictly
/// sequentially; the simulator is never shared between sessions.
#[derive(Default)]
pub struct Session {
    sim: Option<Simulator>,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    pub fn simulator(&self) -> Option<&Simulator> {
        self.sim.as_ref()
    }

    /// Decode one frame text and execute it. `None` means the command
    /// produces no response (insert, mode).
    pub fn handle_text(&mut self, line: &str) -> Option<Frame> {
        match serde_json::from_str::<Command>(line) {
            Ok(command) => self.handle(command),
            Err(e) => {
                warn!("undecodable command frame: {}", e);
                Some(Frame::HierarchyFail {
                    data: format!("invalid command: {}", e),
                })
            }
        }
    }

    pub fn handle(&mut self, command: Command) -> Option<Frame> {
        match command {
            Command::Rule { message } => Some(self.load_rule(&message)),
            Command::AdjustRule { message } => Some(self.adjust_rule(&message)),
            Command::Step => Some(self.step()),
            Command::Insert { id } => {
                match self.sim.as_mut() {
                    Some(sim) => {
                        sim.insert(id);
                        None
                    }
                    None => Some(no_hierarchy()),
                }
            }
            Command::Mode { new_mode } => {
                match self.sim.as_mut() {
                    Some(sim) => {
                        let p = if new_mode == "randomized" {
                            DEFAULT_DEATH_PROBA
                        } else {
                            0.0
                        };
                        sim.set_death_proba(p);
                        debug!(mode = %new_mode, death_proba = p, "liveness mode switched");
                        None
                    }
                    None => Some(no_hierarchy()),
                }
            }
        }
    }

    fn load_rule(&mut self, message: &str) -> Frame {
        let parsed = match mapparser::parse(message) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Frame::HierarchyFail {
                    data: e.to_string(),
                }
            }
        };

        // a reload keeps the previously chosen death probability
        let death_proba = self
            .sim
            .as_ref()
            .map(Simulator::death_proba)
            .unwrap_or(DEFAULT_DEATH_PROBA);
        let config = SimConfig {
            death_proba,
            ..SimConfig::default()
        };

        let tree = hierarchy_to_json(&parsed.hierarchy);
        match Simulator::new(parsed.hierarchy, parsed.rules, config) {
            Ok(sim) => {
                self.sim = Some(sim);
                Frame::HierarchySuccess { data: tree }
            }
            Err(e) => Frame::HierarchyFail {
                data: e.to_string(),
            },
        }
    }

    fn adjust_rule(&mut self, message: &str) -> Frame {
        let Some(sim) = self.sim.as_mut() else {
            return no_hierarchy();
        };
        let parsed = match mapparser::parse(message) {
            Ok(parsed) => parsed,
            Err(e) => {
                return Frame::HierarchyFail {
                    data: e.to_string(),
                }
            }
        };

        let tree = hierarchy_to_json(&parsed.hierarchy);
        match sim.adjust(parsed.hierarchy, parsed.rules) {
            Ok(()) => Frame::AdjustHierarchySuccess {
                data: tree,
                timestamp: sim.current_time(),
            },
            Err(e) => Frame::HierarchyFail {
                data: e.to_string(),
            },
        }
    }

    fn step(&mut self) -> Frame {
        let Some(sim) = self.sim.as_mut() else {
            return no_hierarchy();
        };
        match sim.step() {
            Ok((timestamp, events)) => Frame::Events { timestamp, events },
            Err(e) => Frame::HierarchyFail {
                data: e.to_string(),
            },
        }
    }
}

fn no_hierarchy() -> Frame {
    Frame::HierarchyFail {
        data: "no hierarchy loaded".to_string(),
    }
}
