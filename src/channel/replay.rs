//! Offline channels driven by recorded device transcripts.
//!
//! A transcript is a sequence of output chunks, optionally terminated by
//! an end of stream. Chunks are released one at a time whenever an expect
//! cannot be satisfied from the text already received, so a transcript
//! reads the way the device answered. Everything written to the channel
//! is logged for later inspection.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::trace;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{
    ChannelError, Connector, ExpectBuffer, MatchOutcome, Pattern, PatternChannel, Traffic,
};
use crate::config::{ConnectMethod, Timeouts};
use crate::credential::Credential;
use crate::error::ApiError;

/// One recorded step of device output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReplayEvent {
    Output { data: String },
    Eof,
}

impl ReplayEvent {
    pub fn output(data: impl Into<String>) -> Self {
        ReplayEvent::Output { data: data.into() }
    }
}

#[derive(Debug, Default)]
struct LogInner {
    writes: Vec<String>,
    closed: bool,
}

/// Shared view of what was written to a replay channel.
///
/// Clones observe the same log, so a test can keep one after handing the
/// channel to a device.
#[derive(Debug, Clone, Default)]
pub struct ReplayLog {
    inner: Arc<Mutex<LogInner>>,
}

impl ReplayLog {
    fn with<R>(&self, f: impl FnOnce(&mut LogInner) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Every write, in order.
    pub fn writes(&self) -> Vec<String> {
        self.with(|log| log.writes.clone())
    }

    /// Number of writes exactly equal to `data`.
    pub fn count_writes(&self, data: &str) -> usize {
        self.with(|log| log.writes.iter().filter(|w| *w == data).count())
    }

    pub fn is_closed(&self) -> bool {
        self.with(|log| log.closed)
    }
}

/// A [`PatternChannel`] that replays a transcript.
#[derive(Debug)]
pub struct ReplayChannel {
    events: VecDeque<ReplayEvent>,
    buffer: ExpectBuffer,
    ended: bool,
    sent: u64,
    log: ReplayLog,
}

impl ReplayChannel {
    pub fn new(events: impl IntoIterator<Item = ReplayEvent>) -> Self {
        Self {
            events: events.into_iter().collect(),
            buffer: ExpectBuffer::new(),
            ended: false,
            sent: 0,
            log: ReplayLog::default(),
        }
    }

    /// Builds a transcript of plain output chunks.
    pub fn from_chunks<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(chunks.into_iter().map(ReplayEvent::output))
    }

    /// Appends an end of stream after the remaining chunks.
    pub fn then_eof(mut self) -> Self {
        self.events.push_back(ReplayEvent::Eof);
        self
    }

    /// Loads a transcript from JSONL, one event per line.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, serde_json::Error> {
        let mut events = Vec::new();
        for line in jsonl.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str::<ReplayEvent>(line)?);
        }
        Ok(Self::new(events))
    }

    /// Exports the events not yet replayed as JSONL.
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        let mut lines = Vec::with_capacity(self.events.len());
        for event in &self.events {
            lines.push(serde_json::to_string(event)?);
        }
        Ok(lines.join("\n"))
    }

    /// Handle on the write log.
    pub fn log(&self) -> ReplayLog {
        self.log.clone()
    }

    /// Events not yet released.
    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    fn expect_now(&mut self, patterns: &[Pattern]) -> MatchOutcome {
        loop {
            if let Some(index) = self.buffer.try_match(patterns) {
                trace!("replay matched pattern {}: {:?}", index, self.buffer.after());
                return MatchOutcome::Matched(index);
            }
            if self.ended {
                self.buffer.mark_eof();
                return MatchOutcome::Eof;
            }
            match self.events.pop_front() {
                Some(ReplayEvent::Output { data }) => {
                    trace!("replay chunk: {:?}", data);
                    self.buffer.push(&data);
                }
                Some(ReplayEvent::Eof) => {
                    self.ended = true;
                }
                None => {
                    self.buffer.mark_timeout();
                    return MatchOutcome::Timeout;
                }
            }
        }
    }
}

impl PatternChannel for ReplayChannel {
    async fn write(&mut self, data: &str) -> Result<(), ChannelError> {
        if self.log.is_closed() {
            return Err(ChannelError::Closed);
        }
        self.sent += data.len() as u64;
        self.log.with(|log| log.writes.push(data.to_string()));
        Ok(())
    }

    async fn expect(&mut self, patterns: &[Pattern], _timeout: Duration) -> MatchOutcome {
        self.expect_now(patterns)
    }

    fn before(&self) -> &str {
        self.buffer.before()
    }

    fn after(&self) -> &str {
        self.buffer.after()
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        self.log.with(|log| log.closed = true);
        Ok(())
    }

    fn take_traffic(&mut self) -> Traffic {
        Traffic {
            sent: std::mem::take(&mut self.sent),
            received: self.buffer.take_received(),
        }
    }
}

/// A [`Connector`] handing out prepared outcomes in order.
///
/// Each `open` pops the next outcome; once exhausted, opens fail with a
/// connect error.
#[derive(Debug, Default)]
pub struct ReplayConnector {
    outcomes: Mutex<VecDeque<Result<ReplayChannel, ApiError>>>,
    opened: Mutex<Vec<(SocketAddr, ConnectMethod)>>,
}

impl ReplayConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a channel for the next successful open.
    pub fn push_channel(&self, channel: ReplayChannel) -> ReplayLog {
        let log = channel.log();
        self.lock_outcomes().push_back(Ok(channel));
        log
    }

    /// Queues a failed open.
    pub fn push_failure(&self, err: ApiError) {
        self.lock_outcomes().push_back(Err(err));
    }

    /// Every address an open was attempted on.
    pub fn opened(&self) -> Vec<(SocketAddr, ConnectMethod)> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_outcomes(
        &self,
    ) -> std::sync::MutexGuard<'_, VecDeque<Result<ReplayChannel, ApiError>>> {
        self.outcomes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Connector for ReplayConnector {
    type Channel = ReplayChannel;

    async fn open(
        &self,
        address: SocketAddr,
        method: ConnectMethod,
        _credential: Option<&Credential>,
        _timeouts: Timeouts,
    ) -> Result<ReplayChannel, ApiError> {
        self.opened
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((address, method));
        self.lock_outcomes()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::connect(format!("{address} refused connection"))))
    }
}
