//! Chat module for linechat.
//!
//! This module provides the shared chat state:
//! - Login registration with uniqueness among logged-in sessions
//! - Fan-out of chat lines to every other logged-in session
//! - A bounded history replayed to newly joined sessions

mod message;
mod registry;

pub use message::{
    format_message, is_bare_terminator, parse_login, trim_terminator, CRLF, LOGIN_PREFIX,
};
pub use registry::{Outbox, Registry, DEFAULT_HISTORY_SIZE};
