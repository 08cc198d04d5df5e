//! The transport face of the simulator: newline-delimited JSON frames
//! over TCP, one simulator per connection, commands executed strictly
//! in arrival order.

pub mod codec;
pub mod error;
pub mod frames;
pub mod server;
pub mod session;

pub use codec::LineCodec;
pub use error::{GatewayError, Result};
pub use frames::{hierarchy_to_json, Command, Frame};
pub use server::serve;
pub use session::Session;
