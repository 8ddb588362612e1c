//! Worm Arena - authoritative grid worm rounds and the host/peer sync
//! layer around them.
//!
//! The binary in `main.rs` serves sessions over WebSocket. The same
//! session host can be driven in-process through
//! [`sync::transport::LocalTransport`] and [`sync::ClientSession`].

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod sync;
pub mod util;
pub mod ws;
