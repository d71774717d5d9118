//! Profile-driven CLI device.

use std::net::SocketAddr;
use std::sync::Arc;

use log::{debug, info, warn};
use tokio::time::Instant;

use super::profile::{self, CompiledPrompts, VendorProfile};
use super::{ApiMethod, Credential, DeviceCapability, DeviceInfo};
use crate::channel::{Connector, MatchOutcome, PatternChannel, Traffic};
use crate::config::{ConnectMethod, Timeouts};
use crate::credential;
use crate::engine::{CommandOptions, Prompt, Transport};
use crate::error::ApiError;

/// A network device whose CLI is described by a [`VendorProfile`].
///
/// Connecting walks the device's addresses in order and logs in on the
/// first one that opens. After login the device is switched to privileged
/// mode when the credential carries an enable secret and the profile
/// allows it, and paging is disabled.
pub struct NetworkDevice<K: Connector> {
    info: DeviceInfo,
    profile: VendorProfile,
    prompts: CompiledPrompts,
    connector: Arc<K>,
    timeouts: Timeouts,
    connect_method: ConnectMethod,
    port: Option<u16>,
    transport: Option<Transport<K::Channel>>,
    prompt: Option<Prompt>,
    traffic: Traffic,
}

impl<K: Connector> NetworkDevice<K> {
    pub fn new(
        info: DeviceInfo,
        profile: VendorProfile,
        connector: Arc<K>,
    ) -> Result<Self, ApiError> {
        let prompts = profile.compile()?;
        Ok(Self {
            info,
            connect_method: profile.default_connect_method,
            profile,
            prompts,
            connector,
            timeouts: Timeouts::default(),
            port: None,
            transport: None,
            prompt: None,
            traffic: Traffic::default(),
        })
    }

    /// Builds a device using the built-in profile named by `info.vendor`.
    pub fn for_vendor(info: DeviceInfo, connector: Arc<K>) -> Result<Self, ApiError> {
        let profile = profile::by_vendor(&info.vendor)?;
        Self::new(info, profile, connector)
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Overrides the profile's default connect method.
    pub fn with_connect_method(mut self, method: ConnectMethod) -> Self {
        self.connect_method = method;
        self
    }

    /// Overrides the connect method's default port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn profile(&self) -> &VendorProfile {
        &self.profile
    }

    pub fn connect_method(&self) -> ConnectMethod {
        self.connect_method
    }

    /// The prompt captured at login, once connected.
    pub fn prompt(&self) -> Option<&Prompt> {
        self.prompt.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn command_options(&self) -> CommandOptions {
        match self.prompts.pager.as_ref() {
            Some(pager) => CommandOptions::default().with_pager(pager.clone()),
            None => CommandOptions::default(),
        }
    }

    async fn run(&mut self, command: &str) -> Result<String, ApiError> {
        let opts = self.command_options();
        let (Some(transport), Some(prompt)) = (self.transport.as_mut(), self.prompt.as_ref()) else {
            return Err(ApiError::command_retryable(format!(
                "{} is not connected",
                self.info.name
            )));
        };
        transport.command(command, prompt, &opts).await
    }
}

fn reject_mode(mode: Option<&str>) -> Result<(), ApiError> {
    match mode {
        None => Ok(()),
        Some(mode) => Err(ApiError::invalid_mode(format!(
            "mode {mode:?} is not supported"
        ))),
    }
}

/// Runs the username/password dialogue and returns the prompt text.
async fn login<C: PatternChannel>(
    transport: &mut Transport<C>,
    prompts: &CompiledPrompts,
    credential: Option<&Credential>,
    device: &str,
) -> Result<String, ApiError> {
    let patterns = [
        prompts.login.clone(),
        prompts.password.clone(),
        prompts.prompt.clone(),
    ];
    let limit = transport.timeouts().connect;
    let deadline = Instant::now() + limit;
    let mut sent_username = false;
    let mut sent_password = false;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let secret = match transport.expect(&patterns, remaining).await {
            MatchOutcome::Matched(0) if sent_username => None,
            MatchOutcome::Matched(0) => {
                sent_username = true;
                credential.map(|c| c.username.as_str())
            }
            MatchOutcome::Matched(1) if sent_password => None,
            MatchOutcome::Matched(1) => {
                sent_password = true;
                credential.map(|c| c.password.as_str())
            }
            MatchOutcome::Matched(_) => return Ok(transport.after().trim().to_string()),
            MatchOutcome::Eof => {
                return Err(ApiError::connect(format!(
                    "{device}: connection closed during login"
                )));
            }
            MatchOutcome::Timeout => {
                return Err(ApiError::connect(format!(
                    "{device}: no CLI prompt within {limit:?} of connecting"
                )));
            }
        };
        let Some(secret) = secret else {
            let reason = if credential.is_none() {
                "device asked for a credential but none is set"
            } else {
                "authentication failed"
            };
            return Err(ApiError::connect(format!("{device}: {reason}")));
        };
        transport
            .write(&format!("{secret}\n"))
            .await
            .map_err(|e| ApiError::connect(format!("{device}: {}", e.message())))?;
    }
}

/// Enters privileged mode and returns the new prompt text.
async fn enable<C: PatternChannel>(
    transport: &mut Transport<C>,
    profile: &VendorProfile,
    prompts: &CompiledPrompts,
    secret: &str,
    device: &str,
) -> Result<String, ApiError> {
    let failed = |reason: &str| ApiError::connect(format!("{device}: enable failed: {reason}"));
    let patterns = [prompts.password.clone(), prompts.prompt.clone()];
    let short = transport.timeouts().resp_short;

    transport
        .write(&format!("{}\n", profile.enable_command))
        .await
        .map_err(|e| failed(e.message()))?;
    let mut sent_secret = false;
    loop {
        match transport.expect(&patterns, short).await {
            MatchOutcome::Matched(0) if sent_secret => return Err(failed("secret rejected")),
            MatchOutcome::Matched(0) => {
                transport
                    .write(&format!("{secret}\n"))
                    .await
                    .map_err(|e| failed(e.message()))?;
                sent_secret = true;
            }
            MatchOutcome::Matched(_) => break,
            MatchOutcome::Eof => return Err(failed("connection closed")),
            MatchOutcome::Timeout => return Err(failed("no prompt")),
        }
    }

    let prompt = transport.after().trim().to_string();
    if !prompt.ends_with(profile.enable_char) {
        return Err(failed("still at an unprivileged prompt"));
    }
    Ok(prompt)
}

impl<K: Connector> DeviceCapability for NetworkDevice<K> {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn connect(&mut self, credential: Option<&Credential>) -> Result<(), ApiError> {
        if self.transport.is_some() {
            return Ok(());
        }
        if !self.info.has_addresses() {
            return Err(ApiError::device_without_address(format!(
                "{} has no usable address",
                self.info.name
            )));
        }

        let port = self
            .port
            .unwrap_or_else(|| self.connect_method.default_port());
        let addresses = self.info.addresses.clone();
        let mut last_error: Option<ApiError> = None;
        let mut opened = None;
        for ip in addresses {
            let address = SocketAddr::new(ip, port);
            debug!(
                "{} connecting to {} via {} as {}",
                self.info.name,
                address,
                self.connect_method,
                credential::describe(credential)
            );
            match self
                .connector
                .open(address, self.connect_method, credential, self.timeouts)
                .await
            {
                Ok(channel) => {
                    opened = Some(channel);
                    break;
                }
                Err(e) => {
                    warn!("{} {} failed: {}", self.info.name, address, e);
                    last_error = Some(e);
                }
            }
        }
        let Some(channel) = opened else {
            let cause = last_error
                .map(|e| e.message().to_string())
                .unwrap_or_default();
            return Err(ApiError::connect(format!(
                "{}: no address accepted a connection; last error: {cause}",
                self.info.name
            )));
        };

        let mut transport = Transport::new(channel, self.timeouts)
            .with_strip_ansi(self.profile.strip_ansi)
            .with_dos2unix(self.profile.dos2unix);

        let mut prompt = match login(&mut transport, &self.prompts, credential, &self.info.name).await
        {
            Ok(prompt) => prompt,
            Err(e) => {
                let _ = transport.close().await;
                self.traffic.add(transport.take_traffic());
                return Err(e);
            }
        };

        let secret = credential.and_then(|c| c.enable_password.as_deref());
        if let Some(secret) = secret {
            if !self.profile.can_escalate_privilege() {
                debug!("{} cannot be enabled", self.info.name);
            } else if !prompt.ends_with(self.profile.enable_char) {
                match enable(
                    &mut transport,
                    &self.profile,
                    &self.prompts,
                    secret,
                    &self.info.name,
                )
                .await
                {
                    Ok(enabled) => prompt = enabled,
                    Err(e) => {
                        let _ = transport.close().await;
                        self.traffic.add(transport.take_traffic());
                        return Err(e);
                    }
                }
            }
        }

        let prompt = if prompt.is_empty() {
            Prompt::Pattern(self.prompts.prompt.as_regex().clone())
        } else {
            Prompt::Literal(prompt)
        };

        if let Some(command) = self.profile.pager_disable_command.as_deref() {
            debug!("{} disabling pager", self.info.name);
            let opts = self.command_options();
            if let Err(e) = transport.command(command, &prompt, &opts).await {
                let _ = transport.close().await;
                self.traffic.add(transport.take_traffic());
                return Err(ApiError::connect(format!(
                    "{}: {command:?} failed after login: {}",
                    self.info.name,
                    e.message()
                )));
            }
        }

        info!("{} connected, prompt {}", self.info.name, prompt);
        self.transport = Some(transport);
        self.prompt = Some(prompt);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ApiError> {
        self.prompt = None;
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };
        let logout = format!("{}\n", self.profile.logout_command);
        if let Err(e) = transport.write(&logout).await {
            debug!("{} logout not sent: {}", self.info.name, e);
        }
        let result = transport.close().await;
        self.traffic.add(transport.take_traffic());
        debug!("{} disconnected", self.info.name);
        result
    }

    fn supports(&self, method: ApiMethod) -> bool {
        matches!(method, ApiMethod::Command | ApiMethod::GetConfig)
    }

    fn take_traffic(&mut self) -> Traffic {
        let mut traffic = std::mem::take(&mut self.traffic);
        if let Some(transport) = self.transport.as_mut() {
            traffic.add(transport.take_traffic());
        }
        traffic
    }

    async fn command(&mut self, command: String, mode: Option<String>) -> Result<String, ApiError> {
        reject_mode(mode.as_deref())?;
        self.run(&command).await
    }

    async fn get_config(&mut self, source: String, mode: Option<String>) -> Result<String, ApiError> {
        reject_mode(mode.as_deref())?;
        let command = self.profile.config_command(&source)?.to_string();
        self.run(&command).await
    }
}
