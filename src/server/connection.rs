//! Connection driver: ties a TCP stream to a chat session.
//!
//! The stream is split in two. The session task owns the read half; a writer
//! task owns the write half and drains the connection's outbox. Once every
//! outbox sender is gone (the session has disconnected and the registry has
//! forgotten it) the writer flushes what is queued and shuts the socket down.
//! A client that stops reading gets `flush_timeout` to drain its queue before
//! the writer is aborted and the socket dropped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::input::LineFramer;
use super::session::{Flow, Session};
use crate::chat::Registry;
use crate::config::{Config, Framing};
use crate::i18n::I18n;
use crate::Result;

/// Size of a single socket read.
const READ_CHUNK: usize = 4096;

/// Default time allowed for queued output to drain after the session ends.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Handles shared by every connection of a server.
#[derive(Clone)]
pub struct ChatContext {
    /// Shared chat state.
    pub registry: Arc<Registry>,
    /// Server messages.
    pub i18n: Arc<I18n>,
    /// Framing applied to client input.
    pub framing: Framing,
    /// Longest unterminated line before it is flushed as a message.
    pub max_line_bytes: usize,
    /// Disconnect after this long without input.
    pub idle_timeout: Option<Duration>,
    /// Longest wait for queued output once the session has ended.
    pub flush_timeout: Duration,
}

impl ChatContext {
    /// Create a context from explicit parts, with line framing and no idle timeout.
    pub fn new(registry: Arc<Registry>, i18n: Arc<I18n>) -> Self {
        Self {
            registry,
            i18n,
            framing: Framing::Line,
            max_line_bytes: 4096,
            idle_timeout: None,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }

    /// Build a fresh registry and message catalogue from the configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let i18n = I18n::from_config(&config.locale)?;
        let idle_timeout = match config.server.idle_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };

        Ok(Self {
            registry: Arc::new(Registry::new(config.chat.history_size)),
            i18n: Arc::new(i18n),
            framing: config.server.framing,
            max_line_bytes: config.server.max_line_bytes,
            idle_timeout,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        })
    }

    /// Set the idle timeout.
    pub fn with_idle_timeout(mut self, idle_timeout: Option<Duration>) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    /// Set how long queued output may take to drain at disconnect.
    pub fn with_flush_timeout(mut self, flush_timeout: Duration) -> Self {
        self.flush_timeout = flush_timeout;
        self
    }

    /// Set the framing mode.
    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }
}

/// Serve one accepted TCP connection until it closes.
pub async fn serve_connection(stream: TcpStream, peer_addr: SocketAddr, ctx: ChatContext) {
    let (reader, writer) = stream.into_split();
    serve_stream(reader, writer, peer_addr, ctx).await;
}

/// Serve a connection given as separate read and write halves.
///
/// Returns after the session has deregistered and queued output is flushed,
/// or once `flush_timeout` has passed with the client not reading.
pub async fn serve_stream<R, W>(
    mut reader: R,
    writer: W,
    peer_addr: SocketAddr,
    ctx: ChatContext,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbox, queue) = mpsc::unbounded_channel();
    let mut writer_task = tokio::spawn(write_loop(writer, queue, peer_addr));

    let mut session = Session::new(peer_addr, ctx.registry.clone(), ctx.i18n.clone(), outbox);
    let mut framer = LineFramer::new(ctx.framing, ctx.max_line_bytes);
    let mut buf = vec![0u8; READ_CHUNK];

    'read: loop {
        let read = match ctx.idle_timeout {
            Some(limit) => match timeout(limit, reader.read(&mut buf)).await {
                Ok(read) => read,
                Err(_) => {
                    info!("Session {} idle for {:?}, closing", session.id(), limit);
                    break;
                }
            },
            None => reader.read(&mut buf).await,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!("Read from {} failed: {}", peer_addr, e);
                break;
            }
        };

        for message in framer.push(&buf[..n]) {
            if session.handle_message(&message).await == Flow::Close {
                break 'read;
            }
        }
    }

    session.disconnect().await;
    drop(session);

    match timeout(ctx.flush_timeout, &mut writer_task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Writer task for {} ended abnormally: {}", peer_addr, e),
        Err(_) => {
            warn!(
                "Client {} did not drain its output within {:?}, dropping connection",
                peer_addr, ctx.flush_timeout
            );
            writer_task.abort();
        }
    }
    debug!("Connection from {} closed", peer_addr);
}

/// Write queued messages to the client until the queue closes.
async fn write_loop<W>(
    mut writer: W,
    mut queue: mpsc::UnboundedReceiver<String>,
    peer: SocketAddr,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = queue.recv().await {
        if let Err(e) = writer.write_all(message.as_bytes()).await {
            // Dropping the queue makes later sends to this client fail fast.
            debug!("Write to {} failed: {}", peer, e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}
