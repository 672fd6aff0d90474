//! Arcade session server library.
//!
//! This module exposes the engine and server components for use in tests
//! and binaries.

pub use arcade_shared::vec2;

pub mod api;
pub mod collision;
pub mod config;
pub mod entity;
pub mod game_loop;
pub mod gateway;
pub mod ledger;
pub mod physics;
pub mod protocol;
pub mod session;
pub mod spawn;
pub mod state;
pub mod ws;
