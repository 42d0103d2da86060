//! External persistence for user stats

pub mod stats;

pub use stats::{StatsError, StatsStore};
