//! # Bedrock Proxy Session Layer
//!
//! This crate bridges a low-level datagram transport to the packet-oriented
//! application protocol. It owns everything stateful about a connection:
//! the per-connection [`session::Session`] (outgoing queue, batching and
//! compression, inbound demultiplexing, idle timeout, teardown) and the
//! [`session_manager::SessionManager`] that indexes live sessions, drives
//! their periodic tick work on an adaptively sized worker pool, and answers
//! player lookups.
//!
//! ## Module Organization
//!
//! ### Session Module (`session`)
//! One instance per transport connection. Queues outgoing application
//! packets, flushes them as a single compressed wrapped frame (forwarding
//! pre-compressed batches untouched), decompresses and splits inbound
//! frames back into application packets, and tracks idle time against a
//! configurable timeout.
//!
//! ### Session Manager Module (`session_manager`)
//! Concurrent address and player indices over all live sessions, a
//! name-prefix player lookup, and the tick fan-out: one fire-and-forget
//! job per session per tick, executed on the [`ticker::TickPool`] whose
//! size follows the session count.
//!
//! ### Transport Module (`transport`)
//! The interface boundary to the datagram transport: the connection
//! surface the session drives, and the event-listener hook answering
//! connection requests and discovery queries with an advertisement.
//!
//! The wire-level pieces (varint codec, wrapped-packet envelope, zlib
//! helpers, packet abstraction) live in the `protocol` crate.

pub mod config;
pub mod context;
pub mod player;
pub mod session;
pub mod session_manager;
pub mod ticker;
pub mod transport;
pub mod utils;
