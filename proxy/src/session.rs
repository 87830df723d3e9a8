//! Per-connection session: the stateful bridge between one transport
//! connection and one application-level player.
//!
//! The session owns the connection's send pipeline (queueing, batching,
//! compression) and receive pipeline (decompression, demultiplexing), and
//! tracks idle time so dead connections get reaped on tick.
//!
//! All operations may be called concurrently from transport I/O threads
//! and tick workers: the outgoing queue is lock-free, the activity
//! timestamp is atomic, and closing is a one-time transition after which
//! queue/touch/disconnect operations fail fast with
//! [`SessionError::Closed`] instead of touching released resources.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam::queue::SegQueue;
use log::{debug, error, warn};
use protocol::{
    compression, varint, DataPacket, DisconnectPacket, OutboundPacket, PacketRegistry,
    ProtocolError, WrappedPacket,
};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::ProxyConfig;
use crate::player::Player;
use crate::transport::Connection;
use crate::utils::get_timestamp;

/// Errors surfaced by session operations.
///
/// `Closed` is a precondition violation (caller misuse), kept distinct
/// from the data-format errors under `Protocol` which indicate a corrupt
/// or hostile peer and are fatal for the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection has been closed")]
    Closed,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("transport send failed")]
    Transport(#[source] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle duration after which the session is disconnected on tick.
    pub timeout: Duration,
    /// Pacing delay between consecutive pass-through frame sends during a
    /// flush. Burst-avoidance policy, not a correctness requirement.
    pub batch_pacing: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(30_000),
            batch_pacing: Duration::from_millis(1),
        }
    }
}

impl From<&ProxyConfig> for SessionConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            timeout: Duration::from_millis(config.session_timeout_ms),
            batch_pacing: Duration::from_millis(config.batch_pacing_ms),
        }
    }
}

pub struct Session {
    connection: Arc<dyn Connection>,
    /// Remote address, immutable for the session's life.
    addr: SocketAddr,
    player: Arc<Player>,
    packets: Arc<PacketRegistry>,
    queue: SegQueue<OutboundPacket>,
    /// Unix millis of the last inbound touch.
    last_known_update: AtomicU64,
    /// Guards against overlapping tick invocations for a slow session.
    ticking: AtomicBool,
    config: SessionConfig,
}

impl Session {
    /// Creates a session (and its player) for an accepted connection,
    /// returning the receiving end of the player's inbound pipeline.
    pub fn new(
        connection: Arc<dyn Connection>,
        packets: Arc<PacketRegistry>,
        config: SessionConfig,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Box<dyn DataPacket>>) {
        let addr = connection.remote_addr();
        let (player, inbound) = Player::new(addr);
        let session = Arc::new(Self {
            connection,
            addr,
            player: Arc::new(player),
            packets,
            queue: SegQueue::new(),
            last_known_update: AtomicU64::new(get_timestamp()),
            ticking: AtomicBool::new(false),
            config,
        });
        (session, inbound)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn player(&self) -> &Arc<Player> {
        &self.player
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    fn check_for_closed(&self) -> Result<(), SessionError> {
        if self.connection.is_closed() {
            Err(SessionError::Closed)
        } else {
            Ok(())
        }
    }

    fn is_timed_out(&self) -> bool {
        self.is_timed_out_at(get_timestamp())
    }

    fn is_timed_out_at(&self, now: u64) -> bool {
        let last = self.last_known_update.load(Ordering::Acquire);
        now.saturating_sub(last) >= self.config.timeout.as_millis() as u64
    }

    /// Records the current time as last activity.
    pub fn touch(&self) -> Result<(), SessionError> {
        self.check_for_closed()?;
        self.last_known_update.store(get_timestamp(), Ordering::Release);
        Ok(())
    }

    /// Periodic maintenance: reaps the session when idle past the timeout,
    /// otherwise pumps the underlying connection. No-op when closed.
    ///
    /// Tick submission is fire-and-forget, so a tick may be requested while
    /// the previous one is still running; the in-progress guard skips the
    /// new request instead of running two ticks concurrently.
    pub fn on_tick(&self) {
        if self
            .ticking
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            debug!("{}: previous tick still running, skipping", self.addr);
            return;
        }
        self.tick_once();
        self.ticking.store(false, Ordering::Release);
    }

    fn tick_once(&self) {
        if self.is_closed() {
            return;
        }

        if self.is_timed_out() {
            if let Err(e) = self.disconnect("disconnect.timeout", false) {
                warn!("{}: timeout disconnect failed: {}", self.addr, e);
            }
            return;
        }

        self.connection.on_tick();
    }

    /// Sends a disconnect notification to the remote peer, then closes the
    /// session. Fails fast if the session is already closed.
    pub fn disconnect(&self, reason: &str, hide_reason: bool) -> Result<(), SessionError> {
        self.check_for_closed()?;

        let notice = DisconnectPacket::new(reason, hide_reason);
        if let Err(e) = self.send_packet(&OutboundPacket::Packet(Box::new(notice))) {
            // The farewell frame is best-effort; the connection still goes.
            warn!("{}: failed to send disconnect notification: {}", self.addr, e);
        }

        self.close();
        Ok(())
    }

    /// Closes the underlying connection and the associated player.
    /// Callers gate on the closed state; this does not re-enter itself.
    pub fn close(&self) {
        self.connection.close();
        self.player.close();
    }

    /// Queues a packet for the next flush, or sends it right away as its
    /// own frame when `immediate` is set.
    ///
    /// `need_ack` is accepted for interface parity and ignored;
    /// acknowledgement is the transport's concern.
    pub fn enqueue(
        &self,
        packet: OutboundPacket,
        _need_ack: bool,
        immediate: bool,
    ) -> Result<(), SessionError> {
        self.check_for_closed()?;

        if immediate {
            self.send_packet(&packet)
        } else {
            self.queue.push(packet);
            Ok(())
        }
    }

    /// Drains the outgoing queue: pre-compressed batches go out as their
    /// own frames (paced to avoid bursting the transport), plain packets
    /// accumulate into one compressed frame sent at the end of the pass.
    pub async fn flush(&self) -> Result<(), SessionError> {
        self.check_for_closed()?;

        let mut group: Vec<Box<dyn DataPacket>> = Vec::new();
        while let Some(item) = self.queue.pop() {
            match item {
                OutboundPacket::Batch(payload) => {
                    if let Err(e) = self.send_frame(WrappedPacket::new(payload)) {
                        warn!("{}: failed to forward batch frame: {}", self.addr, e);
                    }
                    tokio::time::sleep(self.config.batch_pacing).await;
                }
                OutboundPacket::Packet(packet) => group.push(packet),
            }
        }

        if !group.is_empty() {
            let payload = self.compress_packets(group.iter().map(|p| p.as_ref()))?;
            self.send_frame(WrappedPacket::new(payload))?;
        }
        Ok(())
    }

    /// Handles one inbound wrapped frame: decompresses the payload, splits
    /// it into application packets and forwards them to the player.
    ///
    /// Errors here mean a corrupt or hostile frame; the caller is expected
    /// to terminate the session.
    pub fn on_wrapped_packet(&self, frame: &WrappedPacket) -> Result<(), SessionError> {
        for packet in self.decompress_packets(&frame.payload)? {
            self.player.handle_inbound(packet);
        }
        Ok(())
    }

    fn send_packet(&self, packet: &OutboundPacket) -> Result<(), SessionError> {
        let payload = match packet {
            OutboundPacket::Packet(p) => self.compress_packets(std::iter::once(p.as_ref()))?,
            OutboundPacket::Batch(bytes) => bytes.clone(),
        };
        self.send_frame(WrappedPacket::new(payload))
    }

    fn send_frame(&self, frame: WrappedPacket) -> Result<(), SessionError> {
        self.connection
            .send_frame(frame)
            .map_err(SessionError::Transport)
    }

    /// Builds a compressed frame payload from a group of packets: each is
    /// serialized once, written as a varint length prefix plus body into a
    /// scratch buffer, and the whole buffer is deflated as one block.
    ///
    /// A packet that fails to encode is logged and skipped so one bad
    /// packet does not block the rest of the batch.
    pub fn compress_packets<'a, I>(&self, packets: I) -> Result<Vec<u8>, ProtocolError>
    where
        I: IntoIterator<Item = &'a dyn DataPacket>,
    {
        let mut source = Vec::new();
        for packet in packets {
            let owned;
            let bytes: &[u8] = match packet.encoded() {
                Some(cached) => cached,
                None => match packet.encode() {
                    Ok(encoded) => {
                        owned = encoded;
                        &owned
                    }
                    Err(e) => {
                        error!(
                            "{}: failed to encode packet {:#04x}, skipping: {}",
                            self.addr,
                            packet.packet_id(),
                            e
                        );
                        continue;
                    }
                },
            };
            varint::write_unsigned_u32(&mut source, bytes.len() as u32);
            source.extend_from_slice(bytes);
        }
        compression::deflate(&source)
    }

    /// Inflates a frame payload and splits it into application packets.
    ///
    /// Sub-packets with an unregistered type identifier are skipped (the
    /// cursor still advances past them); an empty or truncated body is a
    /// framing error, fatal for the frame.
    pub fn decompress_packets(
        &self,
        compressed: &[u8],
    ) -> Result<Vec<Box<dyn DataPacket>>, ProtocolError> {
        let decompressed = compression::inflate(compressed)?;
        let mut packets = Vec::new();
        let mut buf = decompressed.as_slice();
        while !buf.is_empty() {
            let (length, rest) = varint::read_unsigned_u32(buf)?;
            let body = rest
                .get(..length as usize)
                .ok_or(ProtocolError::UnexpectedEof)?;
            if body.is_empty() {
                return Err(ProtocolError::EmptyPacket);
            }
            buf = &rest[length as usize..];

            match self.packets.get(body[0]) {
                Some(decoder) => packets.push(decoder(body)?),
                None => debug!("{}: unknown packet type {:#04x}, skipping", self.addr, body[0]),
            }
        }
        Ok(packets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::packet::DISCONNECT_PACKET;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    struct MockConnection {
        addr: SocketAddr,
        closed: AtomicBool,
        frames: Mutex<Vec<WrappedPacket>>,
        ticks: AtomicUsize,
    }

    impl MockConnection {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                addr: "127.0.0.1:19132".parse().unwrap(),
                closed: AtomicBool::new(false),
                frames: Mutex::new(Vec::new()),
                ticks: AtomicUsize::new(0),
            })
        }

        fn sent_frames(&self) -> Vec<WrappedPacket> {
            self.frames.lock().unwrap().clone()
        }

        fn tick_count(&self) -> usize {
            self.ticks.load(Ordering::SeqCst)
        }
    }

    impl Connection for MockConnection {
        fn remote_addr(&self) -> SocketAddr {
            self.addr
        }

        fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }

        fn send_frame(&self, frame: WrappedPacket) -> std::io::Result<()> {
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }

        fn on_tick(&self) {
            self.ticks.fetch_add(1, Ordering::SeqCst);
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    fn test_session() -> (
        Arc<Session>,
        Arc<MockConnection>,
        mpsc::UnboundedReceiver<Box<dyn DataPacket>>,
    ) {
        let connection = MockConnection::new();
        let registry = Arc::new(PacketRegistry::with_defaults());
        let (session, inbound) = Session::new(
            connection.clone(),
            registry,
            SessionConfig::default(),
        );
        (session, connection, inbound)
    }

    fn disconnect_bytes(message: &str) -> Vec<u8> {
        DisconnectPacket::new(message, false).encode().unwrap()
    }

    #[test]
    fn test_touch_updates_activity() {
        let (session, _connection, _inbound) = test_session();
        session.last_known_update.store(0, Ordering::SeqCst);
        session.touch().unwrap();
        assert!(session.last_known_update.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_operations_fail_fast_once_closed() {
        let (session, _connection, _inbound) = test_session();
        session.close();

        assert!(matches!(session.touch(), Err(SessionError::Closed)));
        assert!(matches!(
            session.enqueue(
                OutboundPacket::Packet(Box::new(DisconnectPacket::new("x", false))),
                false,
                false
            ),
            Err(SessionError::Closed)
        ));
        assert!(matches!(
            session.disconnect("again", false),
            Err(SessionError::Closed)
        ));
    }

    #[test]
    fn test_timeout_boundary() {
        let (session, _connection, _inbound) = test_session();
        let now = get_timestamp();
        session.last_known_update.store(now, Ordering::SeqCst);

        assert!(!session.is_timed_out_at(now + 29_999));
        assert!(session.is_timed_out_at(now + 30_000));
        assert!(session.is_timed_out_at(now + 60_000));
    }

    #[test]
    fn test_idle_session_is_disconnected_on_tick() {
        let (session, connection, _inbound) = test_session();
        let idle_since = get_timestamp().saturating_sub(31_000);
        session.last_known_update.store(idle_since, Ordering::SeqCst);

        session.on_tick();

        assert!(connection.is_closed());
        assert!(session.player().is_closed());

        // The peer got a disconnect notification carrying the timeout reason.
        let frames = connection.sent_frames();
        assert_eq!(frames.len(), 1);
        let packets = session.decompress_packets(&frames[0].payload).unwrap();
        assert_eq!(packets.len(), 1);
        assert_eq!(
            packets[0].encode().unwrap(),
            disconnect_bytes("disconnect.timeout")
        );
    }

    #[test]
    fn test_live_session_tick_pumps_connection() {
        let (session, connection, _inbound) = test_session();
        session.touch().unwrap();
        session.on_tick();

        assert!(!connection.is_closed());
        assert_eq!(connection.tick_count(), 1);
    }

    #[test]
    fn test_tick_is_noop_when_closed() {
        let (session, connection, _inbound) = test_session();
        session.close();
        session.on_tick();
        assert_eq!(connection.tick_count(), 0);
    }

    #[test]
    fn test_overlapping_tick_is_skipped() {
        let (session, connection, _inbound) = test_session();
        session.ticking.store(true, Ordering::SeqCst);
        session.on_tick();
        assert_eq!(connection.tick_count(), 0);

        session.ticking.store(false, Ordering::SeqCst);
        session.on_tick();
        assert_eq!(connection.tick_count(), 1);
    }

    #[test]
    fn test_immediate_send_bypasses_queue() {
        let (session, connection, _inbound) = test_session();
        session
            .enqueue(
                OutboundPacket::Packet(Box::new(DisconnectPacket::new("now", false))),
                false,
                true,
            )
            .unwrap();

        let frames = connection.sent_frames();
        assert_eq!(frames.len(), 1);
        let packets = session.decompress_packets(&frames[0].payload).unwrap();
        assert_eq!(packets[0].encode().unwrap(), disconnect_bytes("now"));
    }

    #[tokio::test]
    async fn test_flush_coalesces_queued_packets_in_order() {
        let (session, connection, _inbound) = test_session();
        for message in ["first", "second", "third"] {
            session
                .enqueue(
                    OutboundPacket::Packet(Box::new(DisconnectPacket::new(message, false))),
                    false,
                    false,
                )
                .unwrap();
        }

        session.flush().await.unwrap();

        // One compressed frame carrying all three packets, in order.
        let frames = connection.sent_frames();
        assert_eq!(frames.len(), 1);
        let packets = session.decompress_packets(&frames[0].payload).unwrap();
        let bodies: Vec<Vec<u8>> = packets.iter().map(|p| p.encode().unwrap()).collect();
        assert_eq!(
            bodies,
            vec![
                disconnect_bytes("first"),
                disconnect_bytes("second"),
                disconnect_bytes("third")
            ]
        );
    }

    #[tokio::test]
    async fn test_passthrough_batch_becomes_its_own_frame() {
        let (session, connection, _inbound) = test_session();

        let inner = DisconnectPacket::new("batched", false);
        let batch = session
            .compress_packets(std::iter::once(&inner as &dyn DataPacket))
            .unwrap();

        session
            .enqueue(
                OutboundPacket::Packet(Box::new(DisconnectPacket::new("plain", false))),
                false,
                false,
            )
            .unwrap();
        session
            .enqueue(OutboundPacket::Batch(batch.clone()), false, false)
            .unwrap();

        session.flush().await.unwrap();

        let frames = connection.sent_frames();
        assert_eq!(frames.len(), 2);
        // The batch is forwarded verbatim, ahead of the coalesced frame.
        assert_eq!(frames[0].payload, batch);
        let packets = session.decompress_packets(&frames[1].payload).unwrap();
        assert_eq!(packets[0].encode().unwrap(), disconnect_bytes("plain"));
    }

    #[test]
    fn test_inbound_frame_reaches_player() {
        let (session, _connection, mut inbound) = test_session();

        let packet = DisconnectPacket::new("hello", false);
        let payload = session
            .compress_packets(std::iter::once(&packet as &dyn DataPacket))
            .unwrap();

        session
            .on_wrapped_packet(&WrappedPacket::new(payload))
            .unwrap();

        let delivered = inbound.try_recv().unwrap();
        assert_eq!(delivered.encode().unwrap(), disconnect_bytes("hello"));
    }

    #[test]
    fn test_unknown_packet_type_is_skipped() {
        let (session, _connection, _inbound) = test_session();

        // known | unknown | known, each length-prefixed.
        let mut scratch = Vec::new();
        for body in [
            disconnect_bytes("a"),
            vec![0x42, 1, 2, 3],
            disconnect_bytes("b"),
        ] {
            varint::write_unsigned_u32(&mut scratch, body.len() as u32);
            scratch.extend_from_slice(&body);
        }
        let payload = compression::deflate(&scratch).unwrap();

        let packets = session.decompress_packets(&payload).unwrap();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].encode().unwrap(), disconnect_bytes("a"));
        assert_eq!(packets[1].encode().unwrap(), disconnect_bytes("b"));
    }

    #[test]
    fn test_empty_subpacket_is_fatal() {
        let (session, _connection, _inbound) = test_session();

        let mut scratch = Vec::new();
        varint::write_unsigned_u32(&mut scratch, 0);
        let payload = compression::deflate(&scratch).unwrap();

        assert!(matches!(
            session.decompress_packets(&payload),
            Err(ProtocolError::EmptyPacket)
        ));
    }

    #[test]
    fn test_truncated_subpacket_is_fatal() {
        let (session, _connection, _inbound) = test_session();

        let mut scratch = Vec::new();
        varint::write_unsigned_u32(&mut scratch, 10);
        scratch.extend_from_slice(&[DISCONNECT_PACKET, 0]);
        let payload = compression::deflate(&scratch).unwrap();

        assert!(matches!(
            session.decompress_packets(&payload),
            Err(ProtocolError::UnexpectedEof)
        ));
    }

    #[test]
    fn test_corrupt_payload_is_fatal() {
        let (session, _connection, _inbound) = test_session();
        assert!(matches!(
            session.decompress_packets(&[0xDE, 0xAD, 0xBE, 0xEF]),
            Err(ProtocolError::Inflate(_))
        ));
    }

    #[test]
    fn test_disconnect_sends_notice_then_closes() {
        let (session, connection, _inbound) = test_session();
        session.disconnect("disconnect.disconnected", true).unwrap();

        assert!(connection.is_closed());
        let frames = connection.sent_frames();
        assert_eq!(frames.len(), 1);
        let packets = session.decompress_packets(&frames[0].payload).unwrap();
        assert_eq!(
            packets[0].encode().unwrap(),
            DisconnectPacket::new("disconnect.disconnected", true)
                .encode()
                .unwrap()
        );
    }
}
