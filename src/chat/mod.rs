//! Chat layer: parsing, event fan-out, and the session facade.

pub mod bus;
pub mod event;
pub mod message;
pub mod parser;
pub mod session;
