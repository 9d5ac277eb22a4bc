// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Framework command parsing: string match on `/name` at message start, with
//! an optional `@botname` suffix stripped before lookup.

/// A recognised framework command with its (already trimmed) argument text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    New,
    Compact,
    Help,
    Queue(String),
    Status,
    Model(Option<String>),
    Approve(Option<String>),
    Deny(Option<String>),
}

impl Command {
    /// `/new` and `/compact` run immediately without entering the queue.
    pub fn bypasses_queue(&self) -> bool {
        matches!(self, Command::New | Command::Compact)
    }

    /// `/start` is omitted from `/help`'s listing.
    pub fn is_hidden(&self) -> bool {
        matches!(self, Command::Start)
    }
}

/// Parse a message's leading `/command[@botname] [args]` into a [`Command`].
/// Returns `None` for non-command text or an unrecognised command name, both
/// of which fall through to the agent unchanged.
pub fn parse_command(content: &str) -> Option<Command> {
    let content = content.trim();
    let rest = content.strip_prefix('/')?;
    let mut parts = rest.splitn(2, char::is_whitespace);
    let mut name = parts.next().unwrap_or("").to_string();
    let args = parts.next().unwrap_or("").trim().to_string();

    if let Some(at) = name.find('@') {
        name.truncate(at);
    }

    match name.to_lowercase().as_str() {
        "start" => Some(Command::Start),
        "new" => Some(Command::New),
        "compact" => Some(Command::Compact),
        "help" => Some(Command::Help),
        "queue" => Some(Command::Queue(args)),
        "status" => Some(Command::Status),
        "model" => Some(Command::Model(if args.is_empty() { None } else { Some(args) })),
        "approve" => Some(Command::Approve(if args.is_empty() { None } else { Some(args) })),
        "deny" => Some(Command::Deny(if args.is_empty() { None } else { Some(args) })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_command() {
        assert_eq!(parse_command("/status"), Some(Command::Status));
    }

    #[test]
    fn strips_bot_mention_suffix() {
        assert_eq!(parse_command("/queue@MyBot steer"), Some(Command::Queue("steer".to_string())));
    }

    #[test]
    fn parses_args() {
        assert_eq!(parse_command("/model anthropic:claude-3"), Some(Command::Model(Some("anthropic:claude-3".to_string()))));
        assert_eq!(parse_command("/model"), Some(Command::Model(None)));
    }

    #[test]
    fn non_command_text_returns_none() {
        assert_eq!(parse_command("hello there"), None);
    }

    #[test]
    fn unknown_command_returns_none() {
        assert_eq!(parse_command("/frobnicate"), None);
    }

    #[test]
    fn new_and_compact_bypass_queue() {
        assert!(Command::New.bypasses_queue());
        assert!(Command::Compact.bypasses_queue());
        assert!(!Command::Status.bypasses_queue());
    }

    #[test]
    fn approve_and_deny_carry_the_approval_id() {
        assert_eq!(parse_command("/approve abc12345"), Some(Command::Approve(Some("abc12345".to_string()))));
        assert_eq!(parse_command("/deny abc12345"), Some(Command::Deny(Some("abc12345".to_string()))));
        assert_eq!(parse_command("/approve"), Some(Command::Approve(None)));
    }
}
