//! Shared WebSocket adapter state.
//!
//! Connections depend on the [`HubService`] port rather than on concrete
//! domain services so the adapter can be exercised with test doubles.

use std::sync::Arc;

use url::{Origin, Url};

use crate::domain::ports::HubService;

/// Dependency bundle for WebSocket upgrades and sessions.
#[derive(Clone)]
pub struct WsState {
    pub hub: Arc<dyn HubService>,
    allowed_origins: Arc<[Origin]>,
}

impl WsState {
    /// Construct state from the hub port and the Origin allow-list.
    pub fn new(hub: Arc<dyn HubService>, allowed_origins: &[Url]) -> Self {
        Self {
            hub,
            allowed_origins: allowed_origins.iter().map(Url::origin).collect(),
        }
    }

    /// Whether `origin` matches an allow-listed scheme, host, and port.
    pub fn allows(&self, origin: &Url) -> bool {
        let origin = origin.origin();
        origin.is_tuple() && self.allowed_origins.contains(&origin)
    }
}
