//! IRC wire layer: line framing, outgoing commands, and the connection.

pub mod commands;
pub mod connection;
pub mod reader;
