//! Realtime session layer for a multiplayer typing-race game
//!
//! The core is the match orchestration subsystem in [`game`]: the
//! matchmaking queue with its bot fallback, the room state machine, and
//! the progress-broadcast protocol. Everything else (HTTP surface,
//! WebSocket transport, optional stats persistence) hangs off it.

pub mod app;
pub mod config;
pub mod game;
pub mod http;
pub mod store;
pub mod util;
pub mod ws;
