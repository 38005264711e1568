//! Relay module
//!
//! Moves frames between a line-delimited stream and a message transport in
//! both directions, and decides when a session is over.

mod engine;
pub mod transport;

pub use engine::{relay, Direction, Outcome, RelayReport};
pub use transport::{MessageSink, MessageSource, MessageTransport, TransportError};
