//! Command protocol engine.
//!
//! Runs exactly one command exchange against an already connected
//! [`PatternChannel`]: synchronise to the prompt, send the command, wait
//! for the device to start answering, then drain output through any pager
//! interruptions until the prompt comes back.
//!
//! Every failure is classified where it is detected. End of stream is
//! retryable; a missing prompt is not, since it usually means the channel
//! is in an unknown state or the device is overloaded. The engine never
//! retries on its own and never returns partial output.

use std::fmt;
use std::time::Duration;

use log::{debug, trace};
use regex::Regex;

use crate::channel::{ChannelError, MatchOutcome, Pattern, PatternChannel, Traffic};
use crate::config::Timeouts;
use crate::error::ApiError;
use crate::filter;

#[cfg(windows)]
const LINE_SEPARATOR: &str = "\r\n";
#[cfg(not(windows))]
const LINE_SEPARATOR: &str = "\n";

/// The prompt that ends a command's output.
#[derive(Debug, Clone)]
pub enum Prompt {
    /// Exact prompt text, e.g. `router#`.
    Literal(String),
    /// A prompt pattern, for prompts that vary.
    Pattern(Regex),
}

impl Prompt {
    pub fn literal(text: impl Into<String>) -> Self {
        Prompt::Literal(text.into())
    }

    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(Prompt::Pattern)
    }

    fn to_pattern(&self) -> Result<Pattern, ApiError> {
        match self {
            Prompt::Literal(text) => Pattern::literal(text)
                .map_err(|e| ApiError::invalid_request(format!("unusable prompt: {e}"))),
            Prompt::Pattern(re) => Ok(Pattern::from(re.clone())),
        }
    }

    /// Removes a re-echoed prompt fragment: everything from the last
    /// occurrence of a literal prompt onwards.
    fn trim_echo<'a>(&self, text: &'a str) -> &'a str {
        match self {
            Prompt::Literal(prompt) if !prompt.is_empty() => match text.rfind(prompt.as_str()) {
                Some(index) => &text[..index],
                None => text,
            },
            _ => text,
        }
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prompt::Literal(text) => write!(f, "{text:?}"),
            Prompt::Pattern(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Literal(text.to_string())
    }
}

/// Per-command knobs.
#[derive(Debug, Clone)]
pub struct CommandOptions {
    /// Overrides both the short and the long response timeout.
    pub timeout: Option<Duration>,
    /// Expected after the echoed command.
    pub expect_trailer: String,
    /// Appended to the command when sending it.
    pub command_trailer: String,
    /// Wait for the device to echo the command before collecting output.
    pub expect_command: bool,
    /// Pagination prompt; `None` disables pager handling.
    pub pager: Option<Pattern>,
    /// Sent to advance past a pager prompt.
    pub pager_response: String,
}

impl Default for CommandOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            expect_trailer: "\r\n".to_string(),
            command_trailer: "\n".to_string(),
            expect_command: true,
            pager: None,
            pager_response: " ".to_string(),
        }
    }
}

impl CommandOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_pager(mut self, pager: Pattern) -> Self {
        self.pager = Some(pager);
        self
    }

    pub fn with_pager_response(mut self, response: impl Into<String>) -> Self {
        self.pager_response = response.into();
        self
    }

    pub fn with_expect_trailer(mut self, trailer: impl Into<String>) -> Self {
        self.expect_trailer = trailer.into();
        self
    }

    pub fn with_command_trailer(mut self, trailer: impl Into<String>) -> Self {
        self.command_trailer = trailer.into();
        self
    }

    /// For channels that do not echo input.
    pub fn without_echo(mut self) -> Self {
        self.expect_command = false;
        self
    }
}

/// Protocol phase of a command exchange, used in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    SyncPrompt,
    SendCommand,
    AwaitEcho,
    Drain,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::SyncPrompt => "sync-prompt",
            Phase::SendCommand => "send-command",
            Phase::AwaitEcho => "await-echo",
            Phase::Drain => "drain",
            Phase::Done => "done",
        };
        f.write_str(name)
    }
}

/// What ended one wait of the drain loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainEvent {
    Pager,
    Prompt,
    Eof,
    Timeout,
}

impl DrainEvent {
    fn classify(outcome: MatchOutcome, has_pager: bool) -> Self {
        match (outcome, has_pager) {
            (MatchOutcome::Matched(0), true) => DrainEvent::Pager,
            (MatchOutcome::Matched(_), _) => DrainEvent::Prompt,
            (MatchOutcome::Eof, _) => DrainEvent::Eof,
            (MatchOutcome::Timeout, _) => DrainEvent::Timeout,
        }
    }
}

/// A connected channel plus the settings used to talk to it.
#[derive(Debug)]
pub struct Transport<C> {
    channel: C,
    timeouts: Timeouts,
    strip_ansi: bool,
    dos2unix: bool,
}

impl<C: PatternChannel> Transport<C> {
    pub fn new(channel: C, timeouts: Timeouts) -> Self {
        Self {
            channel,
            timeouts,
            strip_ansi: false,
            dos2unix: false,
        }
    }

    /// Filter terminal escape sequences out of command output.
    pub fn with_strip_ansi(mut self, strip_ansi: bool) -> Self {
        self.strip_ansi = strip_ansi;
        self
    }

    /// Convert CRLF to LF in command output.
    pub fn with_dos2unix(mut self, dos2unix: bool) -> Self {
        self.dos2unix = dos2unix;
        self
    }

    pub fn timeouts(&self) -> &Timeouts {
        &self.timeouts
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Writes raw text; a closed channel is reported as a retryable
    /// command error.
    pub async fn write(&mut self, data: &str) -> Result<(), ApiError> {
        self.channel.write(data).await.map_err(|err| match err {
            ChannelError::Closed => ApiError::command_retryable("EOF received while writing"),
            ChannelError::Io(msg) => ApiError::command_retryable(msg),
        })
    }

    pub async fn expect(&mut self, patterns: &[Pattern], timeout: Duration) -> MatchOutcome {
        self.channel.expect(patterns, timeout).await
    }

    /// Text of the most recent match.
    pub fn after(&self) -> &str {
        self.channel.after()
    }

    pub fn before(&self) -> &str {
        self.channel.before()
    }

    pub fn take_traffic(&mut self) -> Traffic {
        self.channel.take_traffic()
    }

    /// Closes the channel within the disconnect timeout.
    pub async fn close(&mut self) -> Result<(), ApiError> {
        let limit = self.timeouts.disconnect;
        match tokio::time::timeout(limit, self.channel.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(ApiError::disconnect(err.to_string())),
            Err(_) => Err(ApiError::disconnect(format!(
                "channel did not close within {limit:?}"
            ))),
        }
    }

    /// Executes `command` and returns its output.
    ///
    /// The output is the text after the echoed command (and its trailer)
    /// up to the next prompt, with pager prompts removed.
    pub async fn command(
        &mut self,
        command: &str,
        prompt: &Prompt,
        opts: &CommandOptions,
    ) -> Result<String, ApiError> {
        let timeout_long = opts.timeout.unwrap_or(self.timeouts.resp_long);
        let timeout_short = opts.timeout.unwrap_or(self.timeouts.resp_short);
        let eof = || ApiError::command_retryable(format!("EOF received during command {command:?}"));

        let prompt_pattern = prompt.to_pattern()?;

        // Find the prompt and flush anything left over from earlier output.
        debug!("command {:?}: phase {}", command, Phase::SyncPrompt);
        self.write(&opts.command_trailer).await?;
        match self
            .expect(std::slice::from_ref(&prompt_pattern), timeout_short)
            .await
        {
            MatchOutcome::Matched(_) => {}
            MatchOutcome::Eof => return Err(eof()),
            MatchOutcome::Timeout => {
                return Err(ApiError::command_fatal(
                    "CLI prompt not found prior to sending command.",
                ));
            }
        }

        debug!("command {:?}: phase {}", command, Phase::SendCommand);
        self.write(&format!("{command}{}", opts.command_trailer))
            .await?;

        debug!("command {:?}: phase {}", command, Phase::AwaitEcho);
        let start = if opts.expect_command {
            format!(
                "{}{}",
                regex::escape(command),
                regex::escape(&opts.expect_trailer)
            )
        } else if opts.expect_trailer.is_empty() {
            regex::escape(LINE_SEPARATOR)
        } else {
            regex::escape(&opts.expect_trailer)
        };
        let start = Pattern::regex(&start)
            .map_err(|e| ApiError::invalid_request(format!("unusable command text: {e}")))?;
        if self.expect(&[start], timeout_short).await != MatchOutcome::Matched(0) {
            return Err(ApiError::command_retryable(
                "Device did not start response within short response timeout.",
            ));
        }

        debug!("command {:?}: phase {}", command, Phase::Drain);
        let mut patterns = Vec::with_capacity(2);
        if let Some(pager) = opts.pager.as_ref() {
            patterns.push(pager.clone());
        }
        patterns.push(prompt_pattern);

        let mut response: Vec<String> = Vec::new();
        loop {
            let outcome = self.expect(&patterns, timeout_long).await;
            match DrainEvent::classify(outcome, opts.pager.is_some()) {
                DrainEvent::Pager => {
                    trace!("command {:?}: pager after {} chunks", command, response.len());
                    response.push(self.clean(self.channel.before()));
                    self.write(&opts.pager_response).await?;
                }
                DrainEvent::Prompt => {
                    let cleaned = self.clean(self.channel.before());
                    response.push(prompt.trim_echo(&cleaned).to_string());
                    debug!("command {:?}: phase {}", command, Phase::Done);
                    return Ok(response.concat());
                }
                DrainEvent::Eof => return Err(eof()),
                DrainEvent::Timeout => {
                    return Err(ApiError::command_fatal(format!(
                        "Command executed, CLI prompt not seen after {:.1} sec",
                        timeout_long.as_secs_f64()
                    )));
                }
            }
        }
    }

    fn clean(&self, text: &str) -> String {
        let text = if self.strip_ansi {
            filter::strip_ansi(text)
        } else {
            text.to_string()
        };
        if self.dos2unix {
            filter::dos2unix(&text)
        } else {
            text
        }
    }
}
