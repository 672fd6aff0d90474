//! Types shared between the arcade server and its clients: engine tuning,
//! 2D vector math and the wire protocol.

pub mod config;
pub mod protocol;
pub mod vec2;
