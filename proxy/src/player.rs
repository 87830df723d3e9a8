//! The player handle associated with each session.
//!
//! The proxy only touches the player at its boundary: identity, display
//! name, the inbound pipeline that decoded packets are forwarded into, and
//! a one-time close. A player is created together with its session and
//! closed with it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use log::debug;
use protocol::DataPacket;
use tokio::sync::mpsc;
use uuid::Uuid;

pub struct Player {
    uuid: Uuid,
    name: RwLock<String>,
    inbound: mpsc::UnboundedSender<Box<dyn DataPacket>>,
    closed: AtomicBool,
}

impl Player {
    /// Creates a player for a connection, returning the handle plus the
    /// receiving end of its inbound pipeline.
    pub fn new(addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Box<dyn DataPacket>>) {
        let (inbound, rx) = mpsc::unbounded_channel();
        let player = Self {
            uuid: Uuid::new_v4(),
            name: RwLock::new(addr.ip().to_string()),
            inbound,
            closed: AtomicBool::new(false),
        };
        (player, rx)
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn name(&self) -> String {
        self.name.read().expect("player name lock poisoned").clone()
    }

    /// Sets the display name once it becomes authoritative (login).
    pub fn set_name(&self, name: impl Into<String>) {
        *self.name.write().expect("player name lock poisoned") = name.into();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Delivers one decoded inbound packet to the downstream consumer.
    pub fn handle_inbound(&self, packet: Box<dyn DataPacket>) {
        if self.inbound.send(packet).is_err() {
            debug!("player {} inbound pipeline is gone, dropping packet", self.uuid);
        }
    }

    /// Marks the player closed. The inbound pipeline stays drainable so the
    /// consumer can finish packets already delivered.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!("player {} closed", self.uuid);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::DisconnectPacket;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:19132".parse().unwrap()
    }

    #[test]
    fn test_player_identity_and_name() {
        let (player, _rx) = Player::new(test_addr());
        assert_eq!(player.name(), "127.0.0.1");

        player.set_name("Steve");
        assert_eq!(player.name(), "Steve");
    }

    #[test]
    fn test_inbound_delivery() {
        let (player, mut rx) = Player::new(test_addr());
        player.handle_inbound(Box::new(DisconnectPacket::new("x", false)));
        let packet = rx.try_recv().unwrap();
        assert_eq!(packet.packet_id(), protocol::packet::DISCONNECT_PACKET);
    }

    #[test]
    fn test_close_is_one_time() {
        let (player, _rx) = Player::new(test_addr());
        assert!(!player.is_closed());
        player.close();
        player.close();
        assert!(player.is_closed());
    }
}
