//! Discrete-event model of replicated writes, peering and device
//! failure over a CRUSH-mapped pool.
//!
//! Virtual time is an integer; the only advancement primitive is
//! [`Simulator::step`], which dispatches exactly one time-cohort of
//! events. All pseudorandomness flows through the deterministic
//! digests in the `crush` crate, so a given map text and command
//! sequence replays identically everywhere.

pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod liveness;
pub mod pg;
pub mod queue;
mod reconcile;
mod sim;
mod write;

pub use config::SimConfig;
pub use context::Context;
pub use error::{Result, SimError};
pub use event::{Action, Event, EventTag, ObjectId, OpId, PgId};
pub use liveness::AliveIntervals;
pub use pg::{OpKind, Operation, PlacementGroup};
pub use queue::EventQueue;
pub use sim::Simulator;
