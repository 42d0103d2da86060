//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{GameHandle, GameTimings};
use crate::store::StatsStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub game: GameHandle,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        // Stats persistence is optional; the store is a no-op without
        // its configuration.
        let stats = StatsStore::new(&config);

        // Spawn the game event loop that owns all match state.
        let game = GameHandle::spawn(stats, GameTimings::default());

        Self { config, game }
    }
}
