//! Error taxonomy for device sessions and command exchanges.
//!
//! Errors are grouped in two levels: a broad category ([`Error`]) and, for
//! the API category, a specific [`ErrorKind`] carried by [`ApiError`]
//! together with the classification flags that drive retry and reconnect
//! decisions upstream.

use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Specific kind of an API-facing failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum ErrorKind {
    #[serde(rename = "ConnectError")]
    Connect,
    #[serde(rename = "CommandError")]
    Command,
    #[serde(rename = "DeviceWithoutAddressError")]
    DeviceWithoutAddress,
    #[serde(rename = "DisconnectError")]
    Disconnect,
    #[serde(rename = "InvalidDeviceError")]
    InvalidDevice,
    #[serde(rename = "InvalidModeError")]
    InvalidMode,
    #[serde(rename = "InvalidRequestError")]
    InvalidRequest,
    #[serde(rename = "NoAddressesError")]
    NoAddresses,
    #[serde(rename = "NoSuchDeviceError")]
    NoSuchDevice,
    #[serde(rename = "NoSuchVendorError")]
    NoSuchVendor,
    #[serde(rename = "NoSessionCreatedError")]
    NoSessionCreated,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 11] = [
        ErrorKind::Connect,
        ErrorKind::Command,
        ErrorKind::DeviceWithoutAddress,
        ErrorKind::Disconnect,
        ErrorKind::InvalidDevice,
        ErrorKind::InvalidMode,
        ErrorKind::InvalidRequest,
        ErrorKind::NoAddresses,
        ErrorKind::NoSuchDevice,
        ErrorKind::NoSuchVendor,
        ErrorKind::NoSessionCreated,
    ];

    /// Wire name of the kind, as reported to RPC clients.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Connect => "ConnectError",
            ErrorKind::Command => "CommandError",
            ErrorKind::DeviceWithoutAddress => "DeviceWithoutAddressError",
            ErrorKind::Disconnect => "DisconnectError",
            ErrorKind::InvalidDevice => "InvalidDeviceError",
            ErrorKind::InvalidMode => "InvalidModeError",
            ErrorKind::InvalidRequest => "InvalidRequestError",
            ErrorKind::NoAddresses => "NoAddressesError",
            ErrorKind::NoSuchDevice => "NoSuchDeviceError",
            ErrorKind::NoSuchVendor => "NoSuchVendorError",
            ErrorKind::NoSessionCreated => "NoSessionCreatedError",
        }
    }

    /// Generic description used when no specific message is available.
    pub fn description(self) -> &'static str {
        match self {
            ErrorKind::Connect => "There was an error connecting to a device.",
            ErrorKind::Command => "There was an error whilst executing a command on a device.",
            ErrorKind::DeviceWithoutAddress => "The device does not have an IP address.",
            ErrorKind::Disconnect => "There was an error disconnecting from a device.",
            ErrorKind::InvalidDevice => "The device is not yet initialised.",
            ErrorKind::InvalidMode => "The mode chosen for the API call was unsupported by the device.",
            ErrorKind::InvalidRequest => {
                "The method name being requested was not defined by the device API."
            }
            ErrorKind::NoAddresses => "The device name has no addresses associated with it.",
            ErrorKind::NoSuchDevice => "The device name requested is not known to the system.",
            ErrorKind::NoSuchVendor => "The vendor requested does not exist as a device model.",
            ErrorKind::NoSessionCreated => "No session could be created for the requested arguments.",
        }
    }

    /// Numeric status code used by RPC front ends, if the kind has one.
    pub fn code(self) -> Option<u32> {
        match self {
            ErrorKind::Connect => Some(1),
            ErrorKind::Disconnect => Some(2),
            ErrorKind::InvalidDevice => Some(3),
            ErrorKind::InvalidMode => Some(4),
            ErrorKind::InvalidRequest => Some(5),
            ErrorKind::NoAddresses => Some(6),
            ErrorKind::NoSuchVendor => Some(7),
            ErrorKind::NoSessionCreated => Some(8),
            ErrorKind::Command | ErrorKind::DeviceWithoutAddress | ErrorKind::NoSuchDevice => None,
        }
    }

    /// Whether failures of this kind ask callers to back off reconnecting.
    pub fn dampens_reconnect(self) -> bool {
        matches!(self, ErrorKind::Connect)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified failure raised in response to an API call.
///
/// `retryable` tells the caller the same request may succeed if issued
/// again on a fresh connection; `dampen_reconnect` tells it to back off
/// before reconnecting.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
    retryable: bool,
    dampen_reconnect: bool,
}

impl ApiError {
    /// Creates an error of the given kind with the kind's default flags.
    ///
    /// An empty message is replaced by the kind's generic description.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        let message = if message.is_empty() {
            kind.description().to_string()
        } else {
            message
        };
        Self {
            kind,
            message,
            retryable: false,
            dampen_reconnect: kind.dampens_reconnect(),
        }
    }

    /// Overrides the retryable flag.
    pub fn with_retry(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn connect(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Connect, message)
    }

    /// A command failure that may succeed when retried on a new connection.
    pub fn command_retryable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Command, message).with_retry(true)
    }

    /// A command failure that must not be retried automatically.
    pub fn command_fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Command, message)
    }

    pub fn disconnect(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disconnect, message)
    }

    pub fn invalid_device(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidDevice, message)
    }

    pub fn invalid_mode(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidMode, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn device_without_address(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::DeviceWithoutAddress, message)
    }

    pub fn no_addresses(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoAddresses, message)
    }

    pub fn no_such_device(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchDevice, message)
    }

    pub fn no_such_vendor(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSuchVendor, message)
    }

    pub fn no_session_created(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoSessionCreated, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    pub fn dampens_reconnect(&self) -> bool {
        self.dampen_reconnect
    }

    /// Numeric status code for RPC front ends, see [`ErrorKind::code`].
    pub fn code(&self) -> Option<u32> {
        self.kind.code()
    }
}

/// Configuration loading errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config is missing required section '{0}'")]
    MissingRequiredSection(String),

    #[error("unknown configuration file format: {0}")]
    UnknownFileFormat(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Credential store errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("no credential matches host '{0}'")]
    NoMatchingCredential(String),

    #[error("credential is missing required field '{0}'")]
    MissingField(String),

    #[error("unknown credentials file format: {0}")]
    UnknownFileFormat(String),
}

/// Top-level error category.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl Error {
    /// The API error carried by this error, if it belongs to that category.
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Error::Api(err) => Some(err),
            _ => None,
        }
    }
}
