//! Chat line helpers.

/// Prefix of the only command accepted before login.
pub const LOGIN_PREFIX: &str = "login:";

/// Line terminator appended to server-originated lines.
pub const CRLF: &str = "\r\n";

/// Format a chat line as relayed to peers and kept in history.
///
/// `input` is forwarded verbatim, including its terminator.
pub fn format_message(login: &str, input: &str) -> String {
    format!("<{login}> {input}")
}

/// Check whether a message is nothing but a line terminator.
pub fn is_bare_terminator(input: &str) -> bool {
    input == "\r\n" || input == "\n"
}

/// Strip one trailing line terminator (`\r\n`, `\n` or `\r`).
pub fn trim_terminator(input: &str) -> &str {
    input
        .strip_suffix("\r\n")
        .or_else(|| input.strip_suffix('\n'))
        .or_else(|| input.strip_suffix('\r'))
        .unwrap_or(input)
}

/// Extract the requested login from a `login:<name>` command.
///
/// Returns `None` when the input is not a login command or names nobody.
/// A bare `login:` is ignored rather than claiming the empty login, which
/// older relays accepted and greeted as `Привет, !`.
pub fn parse_login(input: &str) -> Option<&str> {
    let name = trim_terminator(input.strip_prefix(LOGIN_PREFIX)?);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
