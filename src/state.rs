use std::sync::Arc;

use crate::config::Config;
use crate::realtime::{
    broadcaster::Broadcaster,
    notifier::{BroadcastNotifier, Notifier},
    ConnectionRegistry,
};
use crate::services::{directory::SessionDirectory, session::SessionService, store::SessionStore};

#[derive(Clone)]
pub struct AppState {
    pub registry: ConnectionRegistry,
    pub broadcaster: Broadcaster,
    pub directory: Arc<dyn SessionDirectory>,
    pub sessions: Arc<SessionService>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wire the full service graph: one registry, one broadcaster over it,
    /// and the mutation service hooked to the broadcast notifier.
    pub fn new(config: Arc<Config>) -> Self {
        let registry = ConnectionRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone());
        let store = SessionStore::new();
        let directory: Arc<dyn SessionDirectory> = Arc::new(store.clone());
        let notifier: Arc<dyn Notifier> = Arc::new(BroadcastNotifier::new(
            directory.clone(),
            broadcaster.clone(),
        ));
        let sessions = Arc::new(SessionService::new(store, notifier));

        Self {
            registry,
            broadcaster,
            directory,
            sessions,
            config,
        }
    }
}
