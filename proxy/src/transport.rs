//! Interface boundary to the underlying datagram transport.
//!
//! The transport library owns sockets, reliability and congestion; the
//! proxy sees connections only through [`Connection`] and plugs into the
//! transport's accept/discovery path through [`EventListener`]. Wrapped
//! frames are registered with the transport under
//! [`protocol::WRAPPED_PACKET_ID`].

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use log::info;
use protocol::{info as protocol_info, WrappedPacket};

use crate::context::ServerContext;
use crate::session_manager::SessionManager;

/// One accepted transport connection.
///
/// Implementations are expected to be internally synchronized; the session
/// calls these from transport I/O threads and from tick workers.
pub trait Connection: Send + Sync {
    fn remote_addr(&self) -> SocketAddr;

    fn is_closed(&self) -> bool;

    /// Hands one wrapped frame to the transport for delivery.
    fn send_frame(&self, frame: WrappedPacket) -> io::Result<()>;

    /// Per-tick maintenance pump (retransmits, acks, ...).
    fn on_tick(&self);

    fn close(&self);
}

/// Verdict on an incoming connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRequestAction {
    Accept,
    Reject,
}

/// Discovery query response record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub game_tag: String,
    pub server_name: String,
    pub protocol_version: i32,
    pub game_version: String,
    pub player_count: usize,
    pub max_players: usize,
    pub sub_motd: String,
    pub gamemode: String,
}

/// Hook invoked by the transport on new-connection requests and
/// out-of-band discovery queries.
pub trait EventListener: Send + Sync {
    fn on_connection_request(&self, addr: SocketAddr) -> ConnectionRequestAction;

    fn on_query(&self, addr: SocketAddr) -> Advertisement;
}

/// The proxy's listener: rejects connections when full and answers
/// discovery queries from the live player count.
pub struct ProxyEventListener {
    context: Arc<ServerContext>,
    manager: Arc<SessionManager>,
}

impl ProxyEventListener {
    pub fn new(context: Arc<ServerContext>, manager: Arc<SessionManager>) -> Self {
        Self { context, manager }
    }
}

impl EventListener for ProxyEventListener {
    fn on_connection_request(&self, addr: SocketAddr) -> ConnectionRequestAction {
        info!("connection request from {}", addr);
        if self.manager.count() >= self.context.max_players {
            ConnectionRequestAction::Reject
        } else {
            ConnectionRequestAction::Accept
        }
    }

    fn on_query(&self, addr: SocketAddr) -> Advertisement {
        info!("query request from {}", addr);
        Advertisement {
            game_tag: protocol_info::GAME_ID.to_string(),
            server_name: self.context.name.clone(),
            protocol_version: protocol_info::CURRENT_PROTOCOL,
            game_version: protocol_info::GAME_VERSION.to_string(),
            player_count: self.manager.player_count(),
            max_players: self.context.max_players,
            sub_motd: String::new(),
            gamemode: "minigames".to_string(),
        }
    }
}
