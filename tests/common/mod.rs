//! Test helpers for end-to-end chat tests.
//!
//! Provides TestServer and TestClient for driving a real listener over TCP.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use linechat::config::{Config, ServerConfig};
use linechat::{ChatContext, ChatServer, Registry};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a client waits before concluding nothing else is coming.
pub const SILENCE: Duration = Duration::from_millis(300);

/// A chat server bound to an ephemeral port on loopback.
pub struct TestServer {
    addr: SocketAddr,
    ctx: ChatContext,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server with the default configuration.
    pub async fn new() -> Result<Self, Box<dyn std::error::Error>> {
        Self::with_config(Config::default()).await
    }

    /// Start a server with the given configuration; host and port are overridden.
    pub async fn with_config(mut config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        config.server = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            ..config.server
        };

        let ctx = ChatContext::from_config(&config)?;
        let server = ChatServer::bind(&config.server).await?;
        let addr = server.local_addr()?;
        let (stop, stopped) = oneshot::channel::<()>();

        let served = ctx.clone();
        let handle = tokio::spawn(async move {
            let _ = server
                .run_until(
                    move |stream, peer| {
                        linechat::server::serve_connection(stream, peer, served.clone())
                    },
                    async {
                        let _ = stopped.await;
                    },
                )
                .await;
        });

        Ok(Self {
            addr,
            ctx,
            stop: Some(stop),
            handle,
        })
    }

    /// Get the server address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Get the server's registry.
    pub fn registry(&self) -> &Registry {
        &self.ctx.registry
    }

    /// Connect a new client.
    pub async fn connect(&self) -> Result<TestClient, std::io::Error> {
        TestClient::connect(self.addr).await
    }

    /// Connect a client and log in, consuming the greeting.
    pub async fn login(&self, login: &str) -> Result<TestClient, std::io::Error> {
        let mut client = self.connect().await?;
        client.send_line(&format!("login:{login}")).await?;
        client.recv_until(&format!("{login}!\r\n")).await?;
        Ok(client)
    }

    /// Wait until the registry holds `count` logged-in sessions.
    pub async fn wait_for_peers(&self, count: usize) -> bool {
        let deadline = tokio::time::Instant::now() + DEFAULT_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if self.registry().peer_count().await == count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    /// Stop accepting connections and wait for the accept loop to end.
    pub async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let _ = (&mut self.handle).await;
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Test client speaking the raw line protocol.
pub struct TestClient {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl TestClient {
    /// Connect to the server at the given address.
    pub async fn connect(addr: SocketAddr) -> Result<Self, std::io::Error> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self {
            stream,
            buffer: Vec::with_capacity(1024),
        })
    }

    /// Send raw bytes to the server.
    pub async fn send_raw(&mut self, data: &[u8]) -> Result<(), std::io::Error> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    /// Send a line terminated with CRLF.
    pub async fn send_line(&mut self, line: &str) -> Result<(), std::io::Error> {
        self.send_raw(format!("{line}\r\n").as_bytes()).await
    }

    /// Receive until `pattern` appears; returns everything received up to it.
    pub async fn recv_until(&mut self, pattern: &str) -> Result<String, std::io::Error> {
        self.recv_until_timeout(pattern, DEFAULT_TIMEOUT).await
    }

    /// Receive until `pattern` appears, with a custom timeout.
    ///
    /// Bytes after the pattern stay buffered for the next call.
    pub async fn recv_until_timeout(
        &mut self,
        pattern: &str,
        duration: Duration,
    ) -> Result<String, std::io::Error> {
        let result = timeout(duration, async {
            let mut buf = [0u8; 1024];
            loop {
                if let Some(found) = self.take_through(pattern) {
                    return Ok(found);
                }
                match self.stream.read(&mut buf).await {
                    Ok(0) => {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            format!("Connection closed before pattern: {pattern}"),
                        ))
                    }
                    Ok(n) => self.buffer.extend_from_slice(&buf[..n]),
                    Err(e) => return Err(e),
                }
            }
        })
        .await;

        match result {
            Ok(r) => r,
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("Timeout waiting for pattern: {pattern}"),
            )),
        }
    }

    /// Read everything until the server closes the connection.
    pub async fn recv_to_close(&mut self) -> Result<String, std::io::Error> {
        let mut rest = std::mem::take(&mut self.buffer);
        timeout(DEFAULT_TIMEOUT, self.stream.read_to_end(&mut rest))
            .await
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::TimedOut, "server kept open"))??;
        Ok(String::from_utf8_lossy(&rest).into_owned())
    }

    /// Collect whatever arrives within the silence window.
    pub async fn recv_pending(&mut self) -> Result<String, std::io::Error> {
        let mut buf = [0u8; 1024];
        loop {
            match timeout(SILENCE, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(n)) => self.buffer.extend_from_slice(&buf[..n]),
                Ok(Err(e)) => return Err(e),
            }
        }
        let pending = std::mem::take(&mut self.buffer);
        Ok(String::from_utf8_lossy(&pending).into_owned())
    }

    /// Assert that nothing arrives within the silence window.
    pub async fn expect_silence(&mut self) -> Result<(), std::io::Error> {
        let pending = self.recv_pending().await?;
        if pending.is_empty() {
            Ok(())
        } else {
            Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("Unexpected data: {pending:?}"),
            ))
        }
    }

    fn take_through(&mut self, pattern: &str) -> Option<String> {
        let needle = pattern.as_bytes();
        let end = self
            .buffer
            .windows(needle.len())
            .position(|w| w == needle)?
            + needle.len();
        let taken: Vec<u8> = self.buffer.drain(..end).collect();
        Some(String::from_utf8_lossy(&taken).into_owned())
    }
}
