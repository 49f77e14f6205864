//! Shared chat state: logged-in peers and the recent-message history.
//!
//! Every operation takes the same lock, so registration, fan-out and history
//! updates are observed atomically by all sessions. Delivery to a peer only
//! enqueues into that peer's outbox; the socket write happens in the peer's
//! own writer task, so a stalled client never holds the lock.

use std::collections::VecDeque;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use super::message::{format_message, is_bare_terminator};

/// Default number of messages kept for replay.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Sending side of a connection's outbound queue.
pub type Outbox = mpsc::UnboundedSender<String>;

/// A logged-in connection as seen by the registry.
#[derive(Debug, Clone)]
struct Peer {
    session_id: Uuid,
    login: String,
    outbox: Outbox,
}

#[derive(Debug, Default)]
struct RegistryState {
    /// Peers in registration order.
    peers: Vec<Peer>,
    /// Oldest entry first.
    history: VecDeque<String>,
}

impl RegistryState {
    fn is_taken(&self, login: &str) -> bool {
        self.peers.iter().any(|p| p.login == login)
    }

    fn fan_out(&self, from_login: &str, message: &str) -> usize {
        let mut delivered = 0;
        for peer in self.peers.iter().filter(|p| p.login != from_login) {
            match peer.outbox.send(message.to_string()) {
                Ok(()) => delivered += 1,
                Err(_) => warn!(
                    "Dropped message for {} (session {}): connection is closing",
                    peer.login, peer.session_id
                ),
            }
        }
        delivered
    }

    fn push_history(&mut self, message: String, capacity: usize) {
        self.history.push_back(message);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }
}

/// Registry of logged-in sessions and recent chat history.
///
/// Constructed once per server and shared by handle with every session.
#[derive(Debug)]
pub struct Registry {
    state: Mutex<RegistryState>,
    history_size: usize,
}

impl Registry {
    /// Create a registry keeping at most `history_size` messages.
    pub fn new(history_size: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState {
                peers: Vec::new(),
                history: VecDeque::with_capacity(history_size),
            }),
            history_size,
        }
    }

    /// Get the history capacity.
    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Register `login` for a session.
    ///
    /// Returns false, leaving the registry untouched, if another logged-in
    /// session already holds exactly this login.
    pub async fn try_register(&self, session_id: Uuid, login: &str, outbox: Outbox) -> bool {
        let mut state = self.state.lock().await;
        if state.is_taken(login) {
            return false;
        }
        state.peers.push(Peer {
            session_id,
            login: login.to_string(),
            outbox,
        });
        debug!("Registered {} (total: {})", login, state.peers.len());
        true
    }

    /// Register `login` and replay the greeting plus history to `outbox`.
    ///
    /// Uniqueness check, greeting, history snapshot and insertion happen under
    /// one lock: the new session receives exactly the history as of its login
    /// and every broadcast after it, with no gap and no duplicate.
    pub async fn join(
        &self,
        session_id: Uuid,
        login: &str,
        outbox: Outbox,
        greeting: String,
    ) -> bool {
        let mut state = self.state.lock().await;
        if state.is_taken(login) {
            return false;
        }

        // A closed outbox only means the client is already gone; the
        // disconnect path deregisters it.
        let _ = outbox.send(greeting);
        for entry in &state.history {
            let _ = outbox.send(entry.clone());
        }

        state.peers.push(Peer {
            session_id,
            login: login.to_string(),
            outbox,
        });
        debug!(
            "{} joined with {} history entries (total: {})",
            login,
            state.history.len(),
            state.peers.len()
        );
        true
    }

    /// Remove a session. Removing an unknown session is a no-op.
    ///
    /// Returns true if the session was registered.
    pub async fn deregister(&self, session_id: Uuid) -> bool {
        let mut state = self.state.lock().await;
        let before = state.peers.len();
        state.peers.retain(|p| p.session_id != session_id);
        let removed = state.peers.len() != before;
        if removed {
            debug!(
                "Deregistered session {} (total: {})",
                session_id,
                state.peers.len()
            );
        }
        removed
    }

    /// Get the history, oldest first.
    pub async fn snapshot_history(&self) -> Vec<String> {
        self.state.lock().await.history.iter().cloned().collect()
    }

    /// Append a message to the history, evicting the oldest beyond capacity.
    pub async fn append_history(&self, message: impl Into<String>) {
        let mut state = self.state.lock().await;
        state.push_history(message.into(), self.history_size);
    }

    /// Send `message` to every logged-in session except `from_login`.
    ///
    /// A peer whose queue is closed is skipped without affecting the others.
    /// Returns the number of peers the message was queued for.
    pub async fn broadcast(&self, from_login: &str, message: &str) -> usize {
        self.state.lock().await.fan_out(from_login, message)
    }

    /// Relay `input` from `from_login` and record it in history.
    ///
    /// The input is formatted as `<login> input` and sent to every other
    /// peer. A bare line terminator is relayed but never recorded. Both steps
    /// run under one lock so history order matches delivery order.
    pub async fn publish(&self, from_login: &str, input: &str) -> usize {
        let message = format_message(from_login, input);
        let mut state = self.state.lock().await;
        let delivered = state.fan_out(from_login, &message);
        if !is_bare_terminator(input) {
            state.push_history(message, self.history_size);
        }
        delivered
    }

    /// Get the number of logged-in sessions.
    pub async fn peer_count(&self) -> usize {
        self.state.lock().await.peers.len()
    }

    /// Get logins in registration order.
    pub async fn logins(&self) -> Vec<String> {
        self.state
            .lock()
            .await
            .peers
            .iter()
            .map(|p| p.login.clone())
            .collect()
    }

    /// Check whether a login is currently held.
    pub async fn is_logged_in(&self, login: &str) -> bool {
        self.state.lock().await.is_taken(login)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
