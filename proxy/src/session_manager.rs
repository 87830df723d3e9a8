//! Session bookkeeping for the whole proxy.
//!
//! The manager keeps two concurrent indices: connections by remote address
//! and players by identity (populated once a session's player becomes
//! authoritative). Both support concurrent insert/remove/iterate without
//! caller-side locking. It also owns the tick pool and fans out one tick
//! job per live session each cycle, resizing the pool with the session
//! count.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::info;
use uuid::Uuid;

use crate::player::Player;
use crate::session::Session;
use crate::ticker::TickPool;

/// Sessions served per ticker worker.
const SESSIONS_PER_THREAD: usize = 50;

/// Target worker count for a session count, bounded by hardware
/// parallelism.
pub fn pool_size_for(session_count: usize, max_threads: usize) -> usize {
    (session_count / SESSIONS_PER_THREAD).clamp(1, max_threads.max(1))
}

pub struct SessionManager {
    sessions: DashMap<SocketAddr, Arc<Session>>,
    players: DashMap<Uuid, Arc<Player>>,
    ticker: TickPool,
    max_threads: usize,
}

impl SessionManager {
    /// Creates the manager and its tick pool. `max_threads` caps the pool
    /// (callers usually pass the available hardware parallelism). Must be
    /// called from within a tokio runtime.
    pub fn new(max_threads: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            players: DashMap::new(),
            ticker: TickPool::new(),
            max_threads,
        }
    }

    /// Inserts a session if its address is not already present. Returns
    /// whether it was inserted; the pool is resized only on success.
    pub fn add(&self, address: SocketAddr, session: Arc<Session>) -> bool {
        let added = match self.sessions.entry(address) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(session);
                true
            }
        };
        if added {
            info!("session added for {}", address);
            self.adjust_pool_size();
        }
        added
    }

    /// Removes a session (matched by identity, not just address) and its
    /// player index entry.
    pub fn remove(&self, session: &Arc<Session>) -> bool {
        let removed = self
            .sessions
            .remove_if(&session.remote_addr(), |_, existing| {
                Arc::ptr_eq(existing, session)
            })
            .is_some();

        self.players.remove(&session.player().uuid());

        if removed {
            info!("session removed for {}", session.remote_addr());
            self.adjust_pool_size();
        }
        removed
    }

    pub fn get(&self, address: &SocketAddr) -> Option<Arc<Session>> {
        self.sessions.get(address).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of all live sessions.
    pub fn all(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.len()
    }

    /// Indexes a session's player once its identity is authoritative.
    /// Returns false if the identity is already registered.
    pub fn register_player(&self, session: &Arc<Session>) -> bool {
        match self.players.entry(session.player().uuid()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(session.player()));
                true
            }
        }
    }

    pub fn player(&self, uuid: &Uuid) -> Option<Arc<Player>> {
        self.players.get(uuid).map(|entry| Arc::clone(entry.value()))
    }

    /// Case-insensitive name-prefix lookup: among players whose name
    /// starts with the query, picks the shortest one (first encountered
    /// wins ties); an exact-length match ends the scan immediately.
    pub fn find_player(&self, name: &str) -> Option<Arc<Player>> {
        let query = name.to_lowercase();
        let mut found: Option<Arc<Player>> = None;
        let mut delta = usize::MAX;

        for player in self.all_players() {
            let candidate = player.name();
            if candidate.to_lowercase().starts_with(&query) {
                let current = candidate.len().saturating_sub(query.len());
                if current < delta {
                    found = Some(player);
                    delta = current;
                }
                if current == 0 {
                    break;
                }
            }
        }
        found
    }

    /// Snapshot of all registered players.
    pub fn all_players(&self) -> Vec<Arc<Player>> {
        self.players
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn tick_pool_size(&self) -> usize {
        self.ticker.size()
    }

    /// Submits one fire-and-forget tick job per live session.
    pub fn on_tick(&self) {
        for entry in self.sessions.iter() {
            let session = Arc::clone(entry.value());
            self.ticker.submit(Box::new(move || session.on_tick()));
        }
    }

    /// Stops the tick pool. Live sessions are left to their owners.
    pub fn shutdown(&self) {
        self.ticker.shutdown();
    }

    fn adjust_pool_size(&self) {
        self.ticker
            .resize(pool_size_for(self.sessions.len(), self.max_threads));
    }
}
