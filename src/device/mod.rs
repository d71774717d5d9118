//! Device capabilities: what a session can ask a device to do.
//!
//! A capability owns one device connection and exposes a fixed set of
//! request methods ([`ApiMethod`]). Requests arrive as a method name plus
//! a JSON argument map and are decoded into a typed [`DeviceRequest`]
//! before dispatch.
//!
//! # Main Components
//!
//! - [`DeviceCapability`] - the interface a [`Session`](crate::session::Session) drives
//! - [`DeviceInfo`] - name, vendor and usable addresses of a device
//! - [`NetworkDevice`] - profile-driven CLI device over any [`Connector`](crate::channel::Connector)
//! - [`profile`] - built-in vendor profiles

use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::str::FromStr;

use log::warn;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::Traffic;
use crate::error::ApiError;

pub use crate::credential::Credential;
pub use network::NetworkDevice;
pub use profile::VendorProfile;

mod network;
pub mod profile;

/// Identity and reachable addresses of a device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: String,
    pub addresses: Vec<IpAddr>,
}

impl DeviceInfo {
    /// Builds device info from address strings.
    ///
    /// Anything that is not a single host address, including any
    /// `address/prefix` form, is dropped with a warning.
    pub fn new<I, S>(name: impl Into<String>, vendor: impl Into<String>, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let name = name.into();
        let addresses = addresses
            .into_iter()
            .filter_map(|raw| {
                let raw = raw.as_ref().trim();
                if raw.contains('/') {
                    warn!("{}: ignoring network address {:?}", name, raw);
                    return None;
                }
                match raw.parse::<IpAddr>() {
                    Ok(ip) => Some(ip),
                    Err(_) => {
                        warn!("{}: ignoring unparseable address {:?}", name, raw);
                        None
                    }
                }
            })
            .collect();
        Self {
            name,
            vendor: vendor.into(),
            addresses,
        }
    }

    pub fn has_addresses(&self) -> bool {
        !self.addresses.is_empty()
    }
}

/// The request methods a session will dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ApiMethod {
    Command,
    GetConfig,
    SetConfig,
    CopyFile,
    UploadFile,
    DownloadFile,
    DeleteFile,
    Lock,
    Unlock,
}

impl ApiMethod {
    pub const ALL: [ApiMethod; 9] = [
        ApiMethod::Command,
        ApiMethod::GetConfig,
        ApiMethod::SetConfig,
        ApiMethod::CopyFile,
        ApiMethod::UploadFile,
        ApiMethod::DownloadFile,
        ApiMethod::DeleteFile,
        ApiMethod::Lock,
        ApiMethod::Unlock,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ApiMethod::Command => "command",
            ApiMethod::GetConfig => "get_config",
            ApiMethod::SetConfig => "set_config",
            ApiMethod::CopyFile => "copy_file",
            ApiMethod::UploadFile => "upload_file",
            ApiMethod::DownloadFile => "download_file",
            ApiMethod::DeleteFile => "delete_file",
            ApiMethod::Lock => "lock",
            ApiMethod::Unlock => "unlock",
        }
    }
}

impl fmt::Display for ApiMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApiMethod {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ApiMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| ApiError::invalid_request(format!("unknown request method {s:?}")))
    }
}

/// Request arguments as received from a caller.
pub type RequestArgs = serde_json::Map<String, Value>;

fn default_config_source() -> String {
    "running".to_string()
}

/// A decoded request with typed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum DeviceRequest {
    Command {
        command: String,
        #[serde(default)]
        mode: Option<String>,
    },
    GetConfig {
        #[serde(default = "default_config_source")]
        source: String,
        #[serde(default)]
        mode: Option<String>,
    },
    SetConfig {
        destination: String,
        source: String,
        #[serde(default)]
        mode: Option<String>,
    },
    CopyFile {
        source: String,
        destination: String,
        #[serde(default)]
        overwrite: bool,
    },
    UploadFile {
        source: String,
        destination: String,
        #[serde(default)]
        overwrite: bool,
    },
    DownloadFile {
        source: String,
        destination: String,
        #[serde(default)]
        overwrite: bool,
    },
    DeleteFile {
        filename: String,
    },
    Lock,
    Unlock,
}

impl DeviceRequest {
    /// Decodes `args` as the arguments of `method`.
    ///
    /// A `device_name` entry is dropped; capabilities already know which
    /// device they are.
    pub fn from_args(method: ApiMethod, mut args: RequestArgs) -> Result<Self, ApiError> {
        args.remove("device_name");
        args.insert(
            "method".to_string(),
            Value::String(method.as_str().to_string()),
        );
        serde_json::from_value(Value::Object(args))
            .map_err(|e| ApiError::invalid_request(format!("invalid arguments for {method}: {e}")))
    }

    pub fn method(&self) -> ApiMethod {
        match self {
            DeviceRequest::Command { .. } => ApiMethod::Command,
            DeviceRequest::GetConfig { .. } => ApiMethod::GetConfig,
            DeviceRequest::SetConfig { .. } => ApiMethod::SetConfig,
            DeviceRequest::CopyFile { .. } => ApiMethod::CopyFile,
            DeviceRequest::UploadFile { .. } => ApiMethod::UploadFile,
            DeviceRequest::DownloadFile { .. } => ApiMethod::DownloadFile,
            DeviceRequest::DeleteFile { .. } => ApiMethod::DeleteFile,
            DeviceRequest::Lock => ApiMethod::Lock,
            DeviceRequest::Unlock => ApiMethod::Unlock,
        }
    }
}

fn not_implemented<T>(method: ApiMethod) -> std::future::Ready<Result<T, ApiError>> {
    std::future::ready(Err(ApiError::invalid_request(format!(
        "{method} is not implemented by this device"
    ))))
}

/// A connection to one device plus the request methods it implements.
///
/// Request methods default to an `InvalidRequestError`; implementors
/// override the ones they support and report them through
/// [`supports`](Self::supports).
pub trait DeviceCapability: Send {
    fn info(&self) -> &DeviceInfo;

    /// Opens the device connection and logs in.
    fn connect(
        &mut self,
        credential: Option<&Credential>,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Closes the device connection.
    fn disconnect(&mut self) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn supports(&self, method: ApiMethod) -> bool;

    /// Returns and resets byte counters for the connection.
    fn take_traffic(&mut self) -> Traffic {
        Traffic::default()
    }

    fn command(
        &mut self,
        command: String,
        mode: Option<String>,
    ) -> impl Future<Output = Result<String, ApiError>> + Send {
        let _ = (command, mode);
        not_implemented(ApiMethod::Command)
    }

    fn get_config(
        &mut self,
        source: String,
        mode: Option<String>,
    ) -> impl Future<Output = Result<String, ApiError>> + Send {
        let _ = (source, mode);
        not_implemented(ApiMethod::GetConfig)
    }

    fn set_config(
        &mut self,
        destination: String,
        source: String,
        mode: Option<String>,
    ) -> impl Future<Output = Result<String, ApiError>> + Send {
        let _ = (destination, source, mode);
        not_implemented(ApiMethod::SetConfig)
    }

    fn copy_file(
        &mut self,
        source: String,
        destination: String,
        overwrite: bool,
    ) -> impl Future<Output = Result<String, ApiError>> + Send {
        let _ = (source, destination, overwrite);
        not_implemented(ApiMethod::CopyFile)
    }

    fn upload_file(
        &mut self,
        source: String,
        destination: String,
        overwrite: bool,
    ) -> impl Future<Output = Result<String, ApiError>> + Send {
        let _ = (source, destination, overwrite);
        not_implemented(ApiMethod::UploadFile)
    }

    fn download_file(
        &mut self,
        source: String,
        destination: String,
        overwrite: bool,
    ) -> impl Future<Output = Result<String, ApiError>> + Send {
        let _ = (source, destination, overwrite);
        not_implemented(ApiMethod::DownloadFile)
    }

    fn delete_file(
        &mut self,
        filename: String,
    ) -> impl Future<Output = Result<String, ApiError>> + Send {
        let _ = filename;
        not_implemented(ApiMethod::DeleteFile)
    }

    fn lock(&mut self) -> impl Future<Output = Result<(), ApiError>> + Send {
        not_implemented(ApiMethod::Lock)
    }

    fn unlock(&mut self) -> impl Future<Output = Result<(), ApiError>> + Send {
        not_implemented(ApiMethod::Unlock)
    }

    /// Dispatches a decoded request to its method.
    ///
    /// Text results become JSON strings; `lock` and `unlock` yield `null`.
    fn handle(
        &mut self,
        request: DeviceRequest,
    ) -> impl Future<Output = Result<Value, ApiError>> + Send {
        async move {
            let text = match request {
                DeviceRequest::Command { command, mode } => self.command(command, mode).await?,
                DeviceRequest::GetConfig { source, mode } => self.get_config(source, mode).await?,
                DeviceRequest::SetConfig {
                    destination,
                    source,
                    mode,
                } => self.set_config(destination, source, mode).await?,
                DeviceRequest::CopyFile {
                    source,
                    destination,
                    overwrite,
                } => self.copy_file(source, destination, overwrite).await?,
                DeviceRequest::UploadFile {
                    source,
                    destination,
                    overwrite,
                } => self.upload_file(source, destination, overwrite).await?,
                DeviceRequest::DownloadFile {
                    source,
                    destination,
                    overwrite,
                } => self.download_file(source, destination, overwrite).await?,
                DeviceRequest::DeleteFile { filename } => self.delete_file(filename).await?,
                DeviceRequest::Lock => {
                    self.lock().await?;
                    return Ok(Value::Null);
                }
                DeviceRequest::Unlock => {
                    self.unlock().await?;
                    return Ok(Value::Null);
                }
            };
            Ok(Value::String(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn args(value: Value) -> RequestArgs {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn network_addresses_are_dropped() {
        let info = DeviceInfo::new("r1", "ios", ["10.0.0.1/24", "10.0.0.2/32"]);
        assert!(info.addresses.is_empty());
        assert!(!info.has_addresses());
    }

    #[test]
    fn host_addresses_are_kept_in_order() {
        let info = DeviceInfo::new("r1", "ios", ["192.0.2.7", "bogus", " 2001:db8::1 "]);
        let expected: Vec<IpAddr> = vec![
            "192.0.2.7".parse().expect("v4"),
            "2001:db8::1".parse().expect("v6"),
        ];
        assert_eq!(info.addresses, expected);
    }

    #[test]
    fn method_names_parse_and_unknown_names_are_invalid_requests() {
        for method in ApiMethod::ALL {
            assert_eq!(method.as_str().parse::<ApiMethod>(), Ok(method));
        }
        let err = "reboot".parse::<ApiMethod>().expect_err("not whitelisted");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn request_arguments_decode_without_device_name() {
        let request = DeviceRequest::from_args(
            ApiMethod::Command,
            args(json!({"device_name": "r1", "command": "show version"})),
        )
        .expect("decode");
        assert_eq!(
            request,
            DeviceRequest::Command {
                command: "show version".to_string(),
                mode: None,
            }
        );
        assert_eq!(request.method(), ApiMethod::Command);
    }

    #[test]
    fn get_config_defaults_to_running() {
        let request =
            DeviceRequest::from_args(ApiMethod::GetConfig, RequestArgs::new()).expect("decode");
        assert_eq!(
            request,
            DeviceRequest::GetConfig {
                source: "running".to_string(),
                mode: None,
            }
        );
        let lock = DeviceRequest::from_args(ApiMethod::Lock, RequestArgs::new()).expect("decode");
        assert_eq!(lock, DeviceRequest::Lock);
    }

    #[test]
    fn missing_arguments_are_invalid_requests() {
        let err = DeviceRequest::from_args(ApiMethod::Command, RequestArgs::new())
            .expect_err("command is required");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.message().contains("command"));
    }

    struct Bare(DeviceInfo);

    impl DeviceCapability for Bare {
        fn info(&self) -> &DeviceInfo {
            &self.0
        }

        async fn connect(&mut self, _credential: Option<&Credential>) -> Result<(), ApiError> {
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), ApiError> {
            Ok(())
        }

        fn supports(&self, _method: ApiMethod) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn unimplemented_methods_fail_with_invalid_request() {
        let mut device = Bare(DeviceInfo::new("r1", "ios", ["192.0.2.1"]));
        let err = device
            .handle(DeviceRequest::Lock)
            .await
            .expect_err("not implemented");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(err.message().contains("lock"));
        assert_eq!(device.take_traffic(), Traffic::default());
    }
}
