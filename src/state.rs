//! Shared application state

use crate::broadcast::RoomChannels;
use crate::config::ServerConfig;
use crate::coordinator::RoundCoordinator;
use crate::gateway::ConnectionGateway;
use crate::scoring::ScoringPolicy;
use crate::store::{InMemoryRoomStore, RoomStore};
use std::sync::Arc;

pub struct AppState {
    pub store: Arc<dyn RoomStore>,
    pub channels: Arc<RoomChannels>,
    pub coordinator: Arc<RoundCoordinator>,
    pub gateway: ConnectionGateway,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        Self::with_store(Arc::new(InMemoryRoomStore::new()), config)
    }

    /// Wire the components around any store implementation.
    pub fn with_store(store: Arc<dyn RoomStore>, config: &ServerConfig) -> Self {
        let channels = Arc::new(RoomChannels::new());
        let coordinator = Arc::new(RoundCoordinator::new(
            store.clone(),
            channels.clone(),
            config.categories.clone(),
            ScoringPolicy::default(),
        ));
        let gateway = ConnectionGateway::new(store.clone(), channels.clone(), coordinator.clone());

        Self {
            store,
            channels,
            coordinator,
            gateway,
        }
    }
}
