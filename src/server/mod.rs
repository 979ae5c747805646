//! Decision service exposing the limiter over TCP.

mod listener;
mod protocol;

pub use listener::DecisionServer;
pub use protocol::{execute, handle_connection, Command, ParseError, Reply, MAX_LINE_LENGTH};
