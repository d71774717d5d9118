//! Sessions: serialized request dispatch to one device connection.
//!
//! A [`Session`] binds a [`SessionKey`] and a credential to a device
//! capability. It connects lazily, runs at most one request at a time,
//! and drops the connection whenever a request fails so the next one
//! starts from a fresh login.
//!
//! # Main Components
//!
//! - [`Session`] - one device connection plus its request lock
//! - [`SessionKey`] - the request attributes selecting a session
//! - [`SessionStatus`] - flags, timestamps and counters read by pools
//! - [`SessionPool`] - moka-backed cache of sessions by key
//! - [`ErrorCounters`] - error counts shared across sessions

use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use log::{debug, error, warn};
use serde::Serialize;
use serde_json::Value;

use crate::channel::Traffic;
use crate::credential::{self, Credential};
use crate::device::{ApiMethod, DeviceCapability, DeviceInfo, DeviceRequest, RequestArgs};
use crate::error::ApiError;

pub use counters::ErrorCounters;
pub use key::SessionKey;
pub use pool::SessionPool;

mod counters;
mod key;
mod pool;

/// Point-in-time view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub connected: bool,
    /// No request is running.
    pub idle: bool,
    pub connect_time: Option<SystemTime>,
    pub disconnect_time: Option<SystemTime>,
    pub last_request: Option<SystemTime>,
    pub last_response: Option<SystemTime>,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub connect_errors: u64,
    pub disconnect_errors: u64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self {
            connected: false,
            idle: true,
            connect_time: None,
            disconnect_time: None,
            last_request: None,
            last_response: None,
            bytes_sent: 0,
            bytes_received: 0,
            connect_errors: 0,
            disconnect_errors: 0,
        }
    }
}

impl SessionStatus {
    fn absorb(&mut self, traffic: Traffic) {
        self.bytes_sent += traffic.sent;
        self.bytes_received += traffic.received;
    }
}

struct Inner<D> {
    device: Option<D>,
    credential: Option<Credential>,
}

/// A device connection shared by all requests with the same key.
pub struct Session<D: DeviceCapability> {
    key: Option<SessionKey>,
    info: Option<DeviceInfo>,
    exclusive: tokio::sync::Mutex<Inner<D>>,
    status: Mutex<SessionStatus>,
    counters: Arc<ErrorCounters>,
}

impl<D: DeviceCapability> Session<D> {
    /// Creates a disconnected session, optionally bound to a device.
    pub fn new(device: Option<D>) -> Self {
        let info = device.as_ref().map(|d| d.info().clone());
        Self {
            key: None,
            info,
            exclusive: tokio::sync::Mutex::new(Inner {
                device,
                credential: None,
            }),
            status: Mutex::new(SessionStatus::default()),
            counters: Arc::new(ErrorCounters::new()),
        }
    }

    pub fn with_key(mut self, key: SessionKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Reports errors into `counters` instead of a private set.
    pub fn with_counters(mut self, counters: Arc<ErrorCounters>) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.exclusive.get_mut().credential = Some(credential);
        self
    }

    pub fn key(&self) -> Option<&SessionKey> {
        self.key.as_ref()
    }

    /// The bound device, if any.
    pub fn info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    pub fn counters(&self) -> &Arc<ErrorCounters> {
        &self.counters
    }

    pub fn status(&self) -> SessionStatus {
        self.status_mut(|s| s.clone())
    }

    pub fn is_connected(&self) -> bool {
        self.status_mut(|s| s.connected)
    }

    pub fn is_idle(&self) -> bool {
        self.status_mut(|s| s.idle)
    }

    /// The current credential. Waits for an in-flight request.
    pub async fn credential(&self) -> Option<Credential> {
        self.exclusive.lock().await.credential.clone()
    }

    fn name(&self) -> &str {
        self.info.as_ref().map_or("<unbound>", |i| i.name.as_str())
    }

    fn status_mut<R>(&self, f: impl FnOnce(&mut SessionStatus) -> R) -> R {
        let mut guard = self.status.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    fn observe(&self, err: ApiError) -> ApiError {
        self.counters.record(err.kind());
        err
    }

    /// Connects the bound device if not already connected.
    ///
    /// Unbound sessions are left alone. Connect errors are returned as-is.
    pub async fn connect(&self) -> Result<(), ApiError> {
        let mut inner = self.exclusive.lock().await;
        self.connect_locked(&mut inner).await
    }

    /// Disconnects the bound device.
    ///
    /// The session is marked disconnected even when the device reports a
    /// teardown failure.
    pub async fn disconnect(&self) -> Result<(), ApiError> {
        let mut inner = self.exclusive.lock().await;
        self.disconnect_locked(&mut inner).await
    }

    /// Switches to a new credential.
    ///
    /// A changed credential drops the current connection. If the session
    /// was connected it reconnects with the new credential; a failed
    /// reconnect leaves it disconnected until the next request.
    pub async fn set_credential(&self, credential: Credential) {
        let mut inner = self.exclusive.lock().await;
        if inner.credential.as_ref() == Some(&credential) {
            return;
        }
        let was_connected = self.is_connected();
        debug!(
            "{} credential {} -> {}",
            self.name(),
            credential::describe(inner.credential.as_ref()),
            credential::describe(Some(&credential))
        );

        if let Err(e) = self.disconnect_locked(&mut inner).await {
            error!("{} disconnect for credential change failed: {}", self.name(), e);
        }
        inner.credential = Some(credential);
        if was_connected {
            if let Err(e) = self.connect_locked(&mut inner).await {
                debug!("{} reconnect with new credential failed: {}", self.name(), e);
            }
        }
    }

    /// Runs one request against the device.
    ///
    /// `method` must name an [`ApiMethod`]; `args` are its arguments. The
    /// session connects first if needed. Any error from the device call
    /// disconnects the session before it is returned.
    pub async fn request(&self, method: &str, args: RequestArgs) -> Result<Value, ApiError> {
        let mut inner = self.exclusive.lock().await;
        let _idle = IdleOnDrop(&self.status);
        self.request_locked(&mut inner, method, args).await
    }

    async fn request_locked(
        &self,
        inner: &mut Inner<D>,
        method: &str,
        args: RequestArgs,
    ) -> Result<Value, ApiError> {
        let method: ApiMethod = method.parse().map_err(|e| self.observe(e))?;
        if inner.device.is_none() {
            return Err(self.observe(ApiError::invalid_device(format!(
                "no device bound to session for {method}"
            ))));
        }
        self.connect_locked(inner).await?;

        let Some(device) = inner.device.as_mut() else {
            return Err(self.observe(ApiError::invalid_device("")));
        };
        if !device.supports(method) {
            return Err(self.observe(ApiError::invalid_request(format!(
                "{method} is not supported by {}",
                self.name()
            ))));
        }
        let request = DeviceRequest::from_args(method, args).map_err(|e| self.observe(e))?;

        self.status_mut(|s| {
            s.idle = false;
            s.last_request = Some(SystemTime::now());
        });
        debug!("{} request {}", self.name(), method);

        match device.handle(request).await {
            Ok(value) => {
                let traffic = device.take_traffic();
                self.status_mut(|s| {
                    s.last_response = Some(SystemTime::now());
                    s.absorb(traffic);
                });
                Ok(value)
            }
            Err(e) => {
                warn!("{} {} failed, dropping connection: {}", self.name(), method, e);
                let e = self.observe(e);
                if let Err(de) = self.disconnect_locked(inner).await {
                    debug!("{} disconnect after failure: {}", self.name(), de);
                }
                Err(e)
            }
        }
    }

    async fn connect_locked(&self, inner: &mut Inner<D>) -> Result<(), ApiError> {
        if self.is_connected() {
            return Ok(());
        }
        let Inner { device, credential } = inner;
        let Some(device) = device.as_mut() else {
            return Ok(());
        };

        debug!(
            "{} connecting as {}",
            self.name(),
            credential::describe(credential.as_ref())
        );
        let result = device.connect(credential.as_ref()).await;
        let traffic = device.take_traffic();
        self.status_mut(|s| {
            s.absorb(traffic);
            match &result {
                Ok(()) => {
                    s.connected = true;
                    s.idle = true;
                    s.connect_time = Some(SystemTime::now());
                }
                Err(_) => s.connect_errors += 1,
            }
        });
        result.map_err(|e| self.observe(e))
    }

    async fn disconnect_locked(&self, inner: &mut Inner<D>) -> Result<(), ApiError> {
        if !self.is_connected() {
            return Ok(());
        }
        let Some(device) = inner.device.as_mut() else {
            return Ok(());
        };

        debug!("{} disconnecting", self.name());
        let result = device.disconnect().await;
        let traffic = device.take_traffic();
        self.status_mut(|s| {
            s.absorb(traffic);
            s.connected = false;
            s.idle = true;
            s.disconnect_time = Some(SystemTime::now());
            if result.is_err() {
                s.disconnect_errors += 1;
            }
        });
        result.map_err(|e| self.observe(e))
    }
}

/// Marks the session idle when a request ends, including a cancelled one.
struct IdleOnDrop<'a>(&'a Mutex<SessionStatus>);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        let mut guard = self.0.lock().unwrap_or_else(|e| e.into_inner());
        guard.idle = true;
    }
}

impl<D: DeviceCapability> PartialEq for Session<D> {
    /// Sessions are equal when bound to the same device.
    fn eq(&self, other: &Self) -> bool {
        self.info == other.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::error::ErrorKind;
    use serde_json::json;

    #[derive(Default)]
    struct Calls {
        connects: usize,
        disconnects: usize,
        commands: usize,
    }

    struct FakeDevice {
        info: DeviceInfo,
        calls: Arc<Mutex<Calls>>,
        fail_command: bool,
        stall: Option<Duration>,
    }

    impl FakeDevice {
        fn new(calls: &Arc<Mutex<Calls>>) -> Self {
            Self {
                info: DeviceInfo::new("r1", "ios", ["192.0.2.1"]),
                calls: Arc::clone(calls),
                fail_command: false,
                stall: None,
            }
        }

        fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
            self.calls.lock().expect("calls")
        }
    }

    impl DeviceCapability for FakeDevice {
        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        async fn connect(&mut self, _credential: Option<&Credential>) -> Result<(), ApiError> {
            self.calls().connects += 1;
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), ApiError> {
            self.calls().disconnects += 1;
            Err(ApiError::disconnect("peer already gone"))
        }

        fn supports(&self, method: ApiMethod) -> bool {
            method == ApiMethod::Command
        }

        fn take_traffic(&mut self) -> Traffic {
            Traffic {
                sent: 4,
                received: 10,
            }
        }

        async fn command(
            &mut self,
            command: String,
            _mode: Option<String>,
        ) -> Result<String, ApiError> {
            self.calls().commands += 1;
            if let Some(stall) = self.stall {
                tokio::time::sleep(stall).await;
            }
            if self.fail_command {
                return Err(ApiError::command_retryable("EOF received during command"));
            }
            Ok(format!("ran {command}"))
        }
    }

    fn args(value: Value) -> RequestArgs {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    #[tokio::test]
    async fn request_connects_lazily_and_returns_text() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let session = Session::new(Some(FakeDevice::new(&calls)));
        assert!(!session.is_connected());

        let value = session
            .request("command", args(json!({"command": "show clock"})))
            .await
            .expect("request");
        assert_eq!(value, json!("ran show clock"));

        let status = session.status();
        assert!(status.connected && status.idle);
        assert!(status.connect_time.is_some());
        assert!(status.last_request.is_some() && status.last_response.is_some());
        assert_eq!(status.bytes_received, 20);
        assert_eq!(calls.lock().expect("calls").connects, 1);
    }

    #[tokio::test]
    async fn unknown_methods_are_rejected_before_connecting() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let session = Session::new(Some(FakeDevice::new(&calls)));
        let err = session
            .request("reload", RequestArgs::new())
            .await
            .expect_err("not whitelisted");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert_eq!(calls.lock().expect("calls").connects, 0);
        assert_eq!(session.counters().count(ErrorKind::InvalidRequest), 1);
    }

    #[tokio::test]
    async fn unsupported_methods_are_invalid_requests() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let session = Session::new(Some(FakeDevice::new(&calls)));
        let err = session
            .request("get_config", RequestArgs::new())
            .await
            .expect_err("unsupported");
        assert_eq!(err.kind(), ErrorKind::InvalidRequest);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn failed_call_disconnects_even_when_teardown_fails() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut device = FakeDevice::new(&calls);
        device.fail_command = true;
        let session = Session::new(Some(device));

        let err = session
            .request("command", args(json!({"command": "show clock"})))
            .await
            .expect_err("device failed");
        assert_eq!(err.kind(), ErrorKind::Command);
        assert!(err.is_retryable());

        let status = session.status();
        assert!(!status.connected);
        assert!(status.idle);
        assert_eq!(status.disconnect_errors, 1);
        assert_eq!(calls.lock().expect("calls").disconnects, 1);
        assert_eq!(session.counters().count(ErrorKind::Disconnect), 1);
    }

    #[tokio::test]
    async fn cancelled_request_leaves_session_idle() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let mut device = FakeDevice::new(&calls);
        device.stall = Some(Duration::from_secs(5));
        let session = Session::new(Some(device));

        let outcome = tokio::time::timeout(
            Duration::from_millis(50),
            session.request("command", args(json!({"command": "show tech-support"}))),
        )
        .await;
        assert!(outcome.is_err());
        assert_eq!(calls.lock().expect("calls").commands, 1);
        assert!(session.is_idle());

        // The request lock was released with the dropped future.
        assert!(session.credential().await.is_none());
    }

    #[tokio::test]
    async fn same_credential_is_a_no_op() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let cred = Credential::new("ops", "pw");
        let session = Session::new(Some(FakeDevice::new(&calls))).with_credential(cred.clone());
        session.connect().await.expect("connect");

        session.set_credential(cred.clone()).await;
        assert_eq!(calls.lock().expect("calls").disconnects, 0);
        assert_eq!(session.credential().await, Some(cred));
    }

    #[tokio::test]
    async fn sessions_compare_by_device() {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let a = Session::new(Some(FakeDevice::new(&calls)));
        let b = Session::new(Some(FakeDevice::new(&calls)))
            .with_credential(Credential::new("other", "pw"));
        assert!(a == b);
        let unbound: Session<FakeDevice> = Session::new(None);
        assert!(a != unbound);
    }
}
