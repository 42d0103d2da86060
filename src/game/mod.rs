//! Match orchestration core: matchmaking, rooms, bots, and the event
//! loop that owns them

pub mod bot;
pub mod gateway;
pub mod player;
pub mod queue;
pub mod room;
pub mod server;
pub mod texts;

pub use server::{GameHandle, GameStats, GameTimings};
