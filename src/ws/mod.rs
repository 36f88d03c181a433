//! WebSocket transport: wire protocol, per-connection sessions, room delivery

pub mod dispatcher;
pub mod handler;
pub mod protocol;
