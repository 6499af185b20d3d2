use std::{fmt, sync::Arc};

use oculex_core::ResultStore;

use crate::infra::config::Config;
use crate::relay::RelayHub;

/// Process-scoped handles shared by every handler. No ambient singletons:
/// collaborators receive the store and hub through this state explicitly.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<ResultStore>,
    pub relay: Arc<RelayHub>,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

impl AppState {
    pub fn new(config: Arc<Config>, store: Arc<ResultStore>, relay: Arc<RelayHub>) -> Self {
        Self { config, store, relay }
    }
}
