//! Chat server module.
//!
//! This module provides the TCP listener, input framing and the
//! per-connection session that drives the shared chat registry.

mod connection;
pub mod input;
mod listener;
mod session;

pub use connection::{serve_connection, serve_stream, ChatContext};
pub use input::LineFramer;
pub use listener::{ChatServer, ConnectionPermit};
pub use session::{Flow, Session, SessionState};

use std::future::Future;

use crate::config::Config;
use crate::Result;

/// Bind the configured address and serve chat clients until `shutdown` completes.
///
/// A bind failure is returned before any client is served.
pub async fn serve<S>(config: &Config, shutdown: S) -> Result<()>
where
    S: Future<Output = ()>,
{
    let ctx = ChatContext::from_config(config)?;
    let server = ChatServer::bind(&config.server).await?;

    server
        .run_until(
            move |stream, addr| serve_connection(stream, addr, ctx.clone()),
            shutdown,
        )
        .await
}
