//! # rnotch - Network Device CLI Session Engine
//!
//! `rnotch` drives the interactive command line of network devices
//! (routers, switches, firewalls) for automation. It runs one command at a
//! time over a pattern-matching channel, turns device output into clean
//! text, and classifies every failure so callers know whether to retry.
//!
//! ## Features
//!
//! - **Command Protocol Engine**: prompt resync, echo detection, pager handling
//! - **Classified Errors**: every failure is retryable or fatal, and connect
//!   failures ask callers to back off before reconnecting
//! - **Sessions**: lazy connect, one in-flight request per device
//!   connection, automatic teardown after a failed request
//! - **Vendor Profiles**: data-driven prompts and commands for IOS, ASA,
//!   ScreenOS, Nortel ESR and JunOS
//! - **Offline Replay**: recorded transcripts stand in for live devices
//! - **Async/Await**: built on Tokio, SSHv2 through `async-ssh2-tokio`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use rnotch::channel::SshConnector;
//! use rnotch::device::{Credential, DeviceInfo, NetworkDevice};
//! use rnotch::session::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let info = DeviceInfo::new("core1", "junos", ["192.0.2.10"]);
//!     let device = NetworkDevice::for_vendor(info, Arc::new(SshConnector::default()))?;
//!     let session = Session::new(Some(device))
//!         .with_credential(Credential::new("netops", "secret"));
//!
//!     let mut args = serde_json::Map::new();
//!     args.insert("command".into(), "show version".into());
//!     let output = session.request("command", args).await?;
//!     println!("{}", output.as_str().unwrap_or_default());
//!
//!     session.disconnect().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Main Components
//!
//! - [`session::Session`] - serialized request dispatch to one device
//! - [`session::SessionPool`] - sessions cached by [`session::SessionKey`]
//! - [`device::DeviceCapability`] - what a session asks a device to do
//! - [`device::NetworkDevice`] - profile-driven CLI device
//! - [`engine::Transport`] - the command protocol engine
//! - [`channel`] - pattern-match channels (SSH, replay)
//! - [`error::ApiError`] - classified errors
//! - [`config`] - timeouts, connect methods and SSH algorithm lists

pub mod channel;
pub mod config;
pub mod credential;
pub mod device;
pub mod engine;
pub mod error;
pub mod filter;
pub mod session;

pub use error::{ApiError, Error, ErrorKind};
