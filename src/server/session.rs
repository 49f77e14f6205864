//! Per-connection chat session.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::chat::{parse_login, Outbox, Registry, CRLF};
use crate::i18n::I18n;

/// Login state of a session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Connected, waiting for `login:<name>`.
    #[default]
    Unauthenticated,
    /// Logged in; every message is relayed as chat.
    Authenticated {
        /// Login held for the rest of the connection.
        login: String,
    },
}

/// What the connection should do after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep reading.
    Continue,
    /// Stop reading and close the connection.
    Close,
}

/// Server-side state of one client connection.
///
/// All output, including to this client, goes through the outbox so the
/// greeting, history replay and relayed messages keep a single order.
pub struct Session {
    id: Uuid,
    peer_addr: SocketAddr,
    state: SessionState,
    registry: Arc<Registry>,
    i18n: Arc<I18n>,
    outbox: Option<Outbox>,
}

impl Session {
    /// Create a session for a freshly accepted connection.
    pub fn new(
        peer_addr: SocketAddr,
        registry: Arc<Registry>,
        i18n: Arc<I18n>,
        outbox: Outbox,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("Created new session {} for {}", id, peer_addr);

        Self {
            id,
            peer_addr,
            state: SessionState::Unauthenticated,
            registry,
            i18n,
            outbox: Some(outbox),
        }
    }

    /// Get the session ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Get the login, if logged in.
    pub fn login(&self) -> Option<&str> {
        match &self.state {
            SessionState::Authenticated { login } => Some(login),
            SessionState::Unauthenticated => None,
        }
    }

    /// Check whether the session has been disconnected.
    pub fn is_closed(&self) -> bool {
        self.outbox.is_none()
    }

    /// Handle one framed message from the client.
    pub async fn handle_message(&mut self, input: &str) -> Flow {
        let Some(outbox) = self.outbox.clone() else {
            return Flow::Close;
        };

        if let SessionState::Authenticated { login } = &self.state {
            let delivered = self.registry.publish(login, input).await;
            debug!("{} relayed a message to {} peers", login, delivered);
            return Flow::Continue;
        }

        self.handle_login(input, outbox).await
    }

    async fn handle_login(&mut self, input: &str, outbox: Outbox) -> Flow {
        let Some(candidate) = parse_login(input) else {
            return Flow::Continue;
        };

        let greeting = format!("{}{}", self.i18n.greeting(candidate), CRLF);
        if self
            .registry
            .join(self.id, candidate, outbox.clone(), greeting)
            .await
        {
            info!(
                "Session {} logged in as {} from {}",
                self.id, candidate, self.peer_addr
            );
            self.state = SessionState::Authenticated {
                login: candidate.to_string(),
            };
            Flow::Continue
        } else {
            info!(
                "Session {} rejected: login {} is taken",
                self.id, candidate
            );
            let _ = outbox.send(self.i18n.login_taken(candidate));
            Flow::Close
        }
    }

    /// Deregister the session and release its outbox.
    ///
    /// Safe to call from either state and more than once.
    pub async fn disconnect(&mut self) {
        if self.outbox.take().is_none() {
            return;
        }
        self.registry.deregister(self.id).await;
        match &self.state {
            SessionState::Authenticated { login } => {
                info!("Session {} ({}) disconnected", self.id, login)
            }
            SessionState::Unauthenticated => debug!("Session {} disconnected", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Harness {
        registry: Arc<Registry>,
        i18n: Arc<I18n>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                registry: Arc::new(Registry::default()),
                i18n: Arc::new(I18n::builtin("ru").unwrap()),
            }
        }

        fn session(&self) -> (Session, mpsc::UnboundedReceiver<String>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let addr: SocketAddr = "127.0.0.1:40000".parse().unwrap();
            let session = Session::new(addr, self.registry.clone(), self.i18n.clone(), tx);
            (session, rx)
        }

        async fn logged_in(&self, login: &str) -> (Session, mpsc::UnboundedReceiver<String>) {
            let (mut session, mut rx) = self.session();
            let flow = session.handle_message(&format!("login:{login}\r\n")).await;
            assert_eq!(flow, Flow::Continue);
            drain(&mut rx);
            (session, rx)
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[tokio::test]
    async fn test_session_starts_unauthenticated() {
        let harness = Harness::new();
        let (session, _rx) = harness.session();
        assert_eq!(session.state(), &SessionState::Unauthenticated);
        assert!(session.login().is_none());
        assert!(!session.is_closed());
    }

    #[tokio::test]
    async fn test_login_success_sends_greeting() {
        let harness = Harness::new();
        let (mut session, mut rx) = harness.session();

        let flow = session.handle_message("login:alice\r\n").await;

        assert_eq!(flow, Flow::Continue);
        assert_eq!(session.login(), Some("alice"));
        assert_eq!(drain(&mut rx), vec!["Привет, alice!\r\n"]);
        assert!(harness.registry.is_logged_in("alice").await);
    }

    #[tokio::test]
    async fn test_login_replays_history_after_greeting() {
        let harness = Harness::new();
        let (mut alice, _rx_a) = harness.logged_in("alice").await;
        alice.handle_message("one\r\n").await;
        alice.handle_message("two\r\n").await;

        let (mut carol, mut rx_c) = harness.session();
        carol.handle_message("login:carol\r\n").await;

        assert_eq!(
            drain(&mut rx_c),
            vec!["Привет, carol!\r\n", "<alice> one\r\n", "<alice> two\r\n"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_login_rejected() {
        let harness = Harness::new();
        let (_alice, _rx_a) = harness.logged_in("alice").await;
        let (mut intruder, mut rx) = harness.session();

        let flow = intruder.handle_message("login:alice\r\n").await;

        assert_eq!(flow, Flow::Close);
        assert!(intruder.login().is_none());
        assert_eq!(
            drain(&mut rx),
            vec!["Логин alice занят, попробуйте другой!"]
        );
        assert_eq!(harness.registry.peer_count().await, 1);

        intruder.disconnect().await;
        assert!(harness.registry.is_logged_in("alice").await);
    }

    #[tokio::test]
    async fn test_non_login_input_ignored_before_login() {
        let harness = Harness::new();
        let (mut session, mut rx) = harness.session();

        assert_eq!(session.handle_message("hello\r\n").await, Flow::Continue);
        assert_eq!(session.handle_message("login:\r\n").await, Flow::Continue);

        assert_eq!(session.state(), &SessionState::Unauthenticated);
        assert!(drain(&mut rx).is_empty());
        assert!(harness.registry.snapshot_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_unauthenticated_session_receives_no_broadcast() {
        let harness = Harness::new();
        let (mut alice, _rx_a) = harness.logged_in("alice").await;
        let (_lurker, mut rx_l) = harness.session();

        alice.handle_message("hello\r\n").await;

        assert!(drain(&mut rx_l).is_empty());
    }

    #[tokio::test]
    async fn test_chat_relayed_to_peers_only() {
        let harness = Harness::new();
        let (mut alice, mut rx_a) = harness.logged_in("alice").await;
        let (_carol, mut rx_c) = harness.logged_in("carol").await;

        alice.handle_message("hello\r\n").await;

        assert_eq!(drain(&mut rx_c), vec!["<alice> hello\r\n"]);
        assert!(drain(&mut rx_a).is_empty());
    }

    #[tokio::test]
    async fn test_relogin_is_chat() {
        let harness = Harness::new();
        let (mut alice, _rx_a) = harness.logged_in("alice").await;
        let (_bob, mut rx_b) = harness.logged_in("bob").await;

        alice.handle_message("login:mallory\r\n").await;

        assert_eq!(alice.login(), Some("alice"));
        assert_eq!(drain(&mut rx_b), vec!["<alice> login:mallory\r\n"]);
        assert!(!harness.registry.is_logged_in("mallory").await);
    }

    #[tokio::test]
    async fn test_empty_line_broadcast_not_recorded() {
        let harness = Harness::new();
        let (mut alice, _rx_a) = harness.logged_in("alice").await;
        let (_bob, mut rx_b) = harness.logged_in("bob").await;

        alice.handle_message("\r\n").await;

        assert_eq!(drain(&mut rx_b), vec!["<alice> \r\n"]);
        assert!(harness.registry.snapshot_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_deregisters_and_is_idempotent() {
        let harness = Harness::new();
        let (mut alice, _rx_a) = harness.logged_in("alice").await;

        alice.disconnect().await;
        assert!(alice.is_closed());
        assert_eq!(harness.registry.peer_count().await, 0);

        alice.disconnect().await;
        assert_eq!(alice.handle_message("late\r\n").await, Flow::Close);
        assert!(harness.registry.snapshot_history().await.is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_closes_outbox() {
        let harness = Harness::new();
        let (mut alice, mut rx_a) = harness.logged_in("alice").await;

        alice.disconnect().await;

        assert!(rx_a.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_english_catalogue() {
        let harness = Harness {
            registry: Arc::new(Registry::default()),
            i18n: Arc::new(I18n::builtin("en").unwrap()),
        };
        let (_alice, _rx_a) = harness.logged_in("alice").await;
        let (mut again, mut rx) = harness.session();

        again.handle_message("login:alice\r\n").await;

        assert_eq!(drain(&mut rx), vec!["Login alice occupied, try another!"]);
    }
}
