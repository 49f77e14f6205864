//! linechat - a line-oriented TCP chat relay.
//!
//! Clients connect, claim a unique login with `login:<name>`, and every line
//! they send afterwards is relayed to all other logged-in clients. New
//! clients receive the most recent messages on join.

pub mod chat;
pub mod config;
pub mod error;
pub mod i18n;
pub mod logging;
pub mod server;

pub use chat::{Outbox, Registry};
pub use config::{Config, Framing};
pub use error::{LinechatError, Result};
pub use i18n::I18n;
pub use server::{serve, ChatContext, ChatServer, Session, SessionState};
