//! Shared server context, passed explicitly into sessions, the manager and
//! the event listener instead of living behind a global.

use std::sync::Arc;

use protocol::PacketRegistry;

use crate::config::ProxyConfig;
use crate::session::SessionConfig;

pub struct ServerContext {
    pub name: String,
    pub max_players: usize,
    /// Random identity advertised by the transport listener.
    pub server_id: i64,
    pub packets: Arc<PacketRegistry>,
    pub session: SessionConfig,
}

impl ServerContext {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            name: config.server_name.clone(),
            max_players: config.max_players,
            server_id: rand::random(),
            packets: Arc::new(PacketRegistry::with_defaults()),
            session: SessionConfig::from(config),
        }
    }
}
