//! SSHv2 channels over `async-ssh2-tokio`.
//!
//! A PTY shell is opened on the device and bridged to a pair of mpsc
//! channels by a background I/O task; the [`SshChannel`] side only ever
//! talks to those channels.

use std::net::SocketAddr;
use std::time::Duration;

use async_ssh2_tokio::Config;
use async_ssh2_tokio::client::{AuthMethod, Client};
use log::{debug, trace};
use russh::ChannelMsg;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{
    ChannelError, Connector, ExpectBuffer, MatchOutcome, Pattern, PatternChannel, Traffic,
};
use crate::config::{ConnectMethod, ConnectionSecurityOptions, Timeouts};
use crate::credential::Credential;
use crate::error::ApiError;

/// Opens SSHv2 PTY shells.
#[derive(Debug, Clone)]
pub struct SshConnector {
    security: ConnectionSecurityOptions,
    terminal_width: u32,
    terminal_height: u32,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self::new(ConnectionSecurityOptions::default())
    }
}

impl SshConnector {
    pub fn new(security: ConnectionSecurityOptions) -> Self {
        Self {
            security,
            terminal_width: 511,
            terminal_height: 24,
        }
    }

    /// Sets the PTY size requested from the device.
    pub fn with_terminal_size(mut self, width: u32, height: u32) -> Self {
        self.terminal_width = width;
        self.terminal_height = height;
        self
    }

    async fn connect_shell(
        &self,
        address: SocketAddr,
        credential: &Credential,
        timeouts: Timeouts,
    ) -> Result<SshChannel, ApiError> {
        let config = Config {
            preferred: self.security.preferred(),
            inactivity_timeout: Some(timeouts.resp_long),
            ..Default::default()
        };

        let client = tokio::time::timeout(
            timeouts.connect,
            Client::connect_with_config(
                (address.ip().to_string(), address.port()),
                &credential.username,
                AuthMethod::with_password(&credential.password),
                self.security.server_check.clone(),
                config,
            ),
        )
        .await
        .map_err(|_| {
            ApiError::connect(format!(
                "{address} did not complete SSH setup within {:?}",
                timeouts.connect
            ))
        })?
        .map_err(|e| ApiError::connect(format!("{address} SSH connect failed: {e}")))?;
        debug!("{} SSH connection established", address);

        let mut channel = client
            .get_channel()
            .await
            .map_err(|e| ApiError::connect(format!("{address} channel open failed: {e}")))?;
        channel
            .request_pty(
                false,
                "vt100",
                self.terminal_width,
                self.terminal_height,
                0,
                0,
                &[],
            )
            .await
            .map_err(|e| ApiError::connect(format!("{address} PTY request failed: {e}")))?;
        channel
            .request_shell(false)
            .await
            .map_err(|e| ApiError::connect(format!("{address} shell request failed: {e}")))?;
        debug!("{} shell request successful", address);

        let (sender_to_shell, mut receiver_from_user) = mpsc::channel::<String>(256);
        let (sender_to_user, receiver_from_shell) = mpsc::channel::<String>(256);

        let io_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(data) = receiver_from_user.recv() => {
                        if let Err(e) = channel.data(data.as_bytes()).await {
                            debug!("{} failed to send data to shell: {:?}", address, e);
                            break;
                        }
                    },
                    Some(msg) = channel.wait() => {
                        match msg {
                            ChannelMsg::Data { ref data } => {
                                let text = String::from_utf8_lossy(data).into_owned();
                                if sender_to_user.send(text).await.is_err() {
                                    debug!("{} shell output receiver dropped", address);
                                    break;
                                }
                            }
                            ChannelMsg::ExitStatus { exit_status } => {
                                debug!("{} shell exited with status {}", address, exit_status);
                                let _ = channel.eof().await;
                                break;
                            }
                            ChannelMsg::Eof => {
                                debug!("{} shell sent EOF", address);
                                break;
                            }
                            _ => {}
                        }
                    },
                    else => break,
                }
            }
            debug!("{} SSH I/O task ended", address);
        });

        Ok(SshChannel {
            address,
            client,
            sender: sender_to_shell,
            recv: receiver_from_shell,
            io_task,
            buffer: ExpectBuffer::new(),
            sent: 0,
        })
    }
}

impl Connector for SshConnector {
    type Channel = SshChannel;

    async fn open(
        &self,
        address: SocketAddr,
        method: ConnectMethod,
        credential: Option<&Credential>,
        timeouts: Timeouts,
    ) -> Result<SshChannel, ApiError> {
        if method != ConnectMethod::Sshv2 {
            return Err(ApiError::connect(format!(
                "{address}: connect method {method} is not supported by the SSH connector"
            )));
        }
        let credential = credential.ok_or_else(|| {
            ApiError::connect(format!("{address}: SSH login requires a credential"))
        })?;
        self.connect_shell(address, credential, timeouts).await
    }
}

/// A PTY shell on an SSH connection.
pub struct SshChannel {
    address: SocketAddr,
    // Keeps the SSH connection alive for the lifetime of the channel.
    client: Client,
    sender: Sender<String>,
    recv: Receiver<String>,
    io_task: JoinHandle<()>,
    buffer: ExpectBuffer,
    sent: u64,
}

impl SshChannel {
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Whether the underlying SSH connection is still open.
    pub fn is_connected(&self) -> bool {
        !self.client.is_closed()
    }
}

impl PatternChannel for SshChannel {
    async fn write(&mut self, data: &str) -> Result<(), ChannelError> {
        trace!("{} write: {:?}", self.address, data);
        self.sender
            .send(data.to_string())
            .await
            .map_err(|_| ChannelError::Closed)?;
        self.sent += data.len() as u64;
        Ok(())
    }

    async fn expect(&mut self, patterns: &[Pattern], timeout: Duration) -> MatchOutcome {
        if let Some(index) = self.buffer.try_match(patterns) {
            return MatchOutcome::Matched(index);
        }
        let deadline = Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.recv.recv()).await {
                Err(_) => {
                    trace!("{} expect timed out after {:?}", self.address, timeout);
                    self.buffer.mark_timeout();
                    return MatchOutcome::Timeout;
                }
                Ok(None) => {
                    trace!("{} expect hit end of stream", self.address);
                    self.buffer.mark_eof();
                    return MatchOutcome::Eof;
                }
                Ok(Some(data)) => {
                    trace!("{} read: {:?}", self.address, data);
                    self.buffer.push(&data);
                    if let Some(index) = self.buffer.try_match(patterns) {
                        return MatchOutcome::Matched(index);
                    }
                }
            }
        }
    }

    fn before(&self) -> &str {
        self.buffer.before()
    }

    fn after(&self) -> &str {
        self.buffer.after()
    }

    async fn close(&mut self) -> Result<(), ChannelError> {
        debug!("{} closing SSH channel", self.address);
        self.recv.close();
        self.io_task.abort();
        self.client
            .disconnect()
            .await
            .map_err(|e| ChannelError::Io(e.to_string()))
    }

    fn take_traffic(&mut self) -> Traffic {
        Traffic {
            sent: std::mem::take(&mut self.sent),
            received: self.buffer.take_received(),
        }
    }
}
