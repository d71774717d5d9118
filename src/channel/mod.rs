//! Pattern-match channels: the byte-stream primitive the command engine
//! drives.
//!
//! A channel offers `write`, an `expect` that waits for the first of a
//! list of patterns (or end of stream, or a deadline), and accessors for
//! the text before and including the last match.
//!
//! # Main Components
//!
//! - [`PatternChannel`] - the read/write/match primitive
//! - [`Connector`] - opens channels to device addresses
//! - [`ExpectBuffer`] - shared matching logic for channel implementations
//! - [`SshConnector`] - SSHv2 channels over `async-ssh2-tokio`
//! - [`ReplayChannel`] - offline channels fed from recorded transcripts

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

use crate::config::{ConnectMethod, Timeouts};
use crate::credential::Credential;
use crate::error::ApiError;

pub use buffer::ExpectBuffer;
pub use replay::{ReplayChannel, ReplayConnector, ReplayEvent, ReplayLog};
pub use ssh::{SshChannel, SshConnector};

mod buffer;
mod replay;
mod ssh;

/// A compiled pattern to wait for.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Matches `text` literally.
    ///
    /// Fails only if the escaped text exceeds the regex size limit.
    pub fn literal(text: &str) -> Result<Self, regex::Error> {
        Regex::new(&regex::escape(text)).map(Self)
    }

    /// Compiles `pattern` as a regular expression.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Self)
    }

    pub fn as_regex(&self) -> &Regex {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<Regex> for Pattern {
    fn from(re: Regex) -> Self {
        Self(re)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

/// Result of waiting for a list of patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The pattern at this index of the list matched first.
    Matched(usize),
    /// The stream ended before any pattern matched.
    Eof,
    /// The deadline passed before any pattern matched.
    Timeout,
}

/// Failures writing to or closing a channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// The remote side or the I/O task is gone.
    #[error("channel closed")]
    Closed,

    #[error("channel I/O error: {0}")]
    Io(String),
}

/// Bytes moved over a channel since the counters were last taken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Traffic {
    pub sent: u64,
    pub received: u64,
}

impl Traffic {
    pub fn add(&mut self, other: Traffic) {
        self.sent += other.sent;
        self.received += other.received;
    }
}

/// An open, ordered, interactive text stream to a device CLI.
pub trait PatternChannel: Send {
    /// Writes `data` to the device.
    fn write(&mut self, data: &str) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Waits until one of `patterns` matches the unread input.
    ///
    /// On a match, [`before`](Self::before) holds the text preceding it and
    /// [`after`](Self::after) the matched text; both are consumed.
    fn expect(
        &mut self,
        patterns: &[Pattern],
        timeout: Duration,
    ) -> impl Future<Output = MatchOutcome> + Send;

    /// Text before the most recent match, or all unread text after
    /// `Eof`/`Timeout`.
    fn before(&self) -> &str;

    /// Text of the most recent match.
    fn after(&self) -> &str;

    /// Tears the channel down.
    fn close(&mut self) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Returns and resets the traffic counters.
    fn take_traffic(&mut self) -> Traffic;
}

/// Opens channels to device addresses.
pub trait Connector: Send + Sync {
    type Channel: PatternChannel + 'static;

    fn open(
        &self,
        address: SocketAddr,
        method: ConnectMethod,
        credential: Option<&Credential>,
        timeouts: Timeouts,
    ) -> impl Future<Output = Result<Self::Channel, ApiError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_patterns_escape_metacharacters() {
        let p = Pattern::literal("router(config)#").expect("literal");
        assert!(p.as_regex().is_match("router(config)#"));
        assert!(!p.as_regex().is_match("routerconfig#"));
    }

    #[test]
    fn invalid_regex_is_reported() {
        assert!(Pattern::regex("[").is_err());
    }
}
