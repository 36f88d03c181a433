//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::RoomRegistry;
use crate::matchmaking::MatchmakingService;
use crate::ws::dispatcher::Dispatcher;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub dispatcher: Arc<Dispatcher>,
    pub room_registry: Arc<RoomRegistry>,
    pub matchmaking: Arc<MatchmakingService>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let config = Arc::new(config);

        let dispatcher = Arc::new(Dispatcher::new());
        let room_registry = Arc::new(RoomRegistry::new());

        // Matchmaking owns the waiting slot and creates rooms in the registry
        let matchmaking = Arc::new(MatchmakingService::new(
            room_registry.clone(),
            dispatcher.clone(),
        ));

        Self {
            config,
            dispatcher,
            room_registry,
            matchmaking,
        }
    }
}
