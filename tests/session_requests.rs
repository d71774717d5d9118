use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rnotch::channel::{ReplayChannel, ReplayConnector};
use rnotch::device::{
    ApiMethod, Credential, DeviceCapability, DeviceInfo, NetworkDevice, RequestArgs,
};
use rnotch::error::{ApiError, ErrorKind};
use rnotch::session::Session;
use serde_json::{Value, json};

const IOS_SHOW_VERSION: &str = include_str!("fixtures/ios_show_version.jsonl");
const IOS_EOF_MID_COMMAND: &str = include_str!("fixtures/ios_eof_mid_command.jsonl");

/// Records every lifecycle call and flags overlapping commands.
#[derive(Clone, Default)]
struct Probe {
    events: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
}

impl Probe {
    fn push(&self, event: impl Into<String>) {
        self.events.lock().expect("events").push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().expect("events").clone()
    }

    fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

struct Instrumented {
    info: DeviceInfo,
    probe: Probe,
    /// Usernames the fake device refuses.
    refuse_user: Option<String>,
}

impl Instrumented {
    fn new(probe: &Probe) -> Self {
        Self {
            info: DeviceInfo::new("lab-r1", "ios", ["192.0.2.1"]),
            probe: probe.clone(),
            refuse_user: None,
        }
    }
}

impl DeviceCapability for Instrumented {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    async fn connect(&mut self, credential: Option<&Credential>) -> Result<(), ApiError> {
        self.probe.push("connect");
        let user = credential.map(|c| c.username.clone());
        if user.is_some() && user == self.refuse_user {
            return Err(ApiError::connect("authentication failed"));
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ApiError> {
        self.probe.push("disconnect");
        Ok(())
    }

    fn supports(&self, method: ApiMethod) -> bool {
        method == ApiMethod::Command
    }

    async fn command(&mut self, command: String, _mode: Option<String>) -> Result<String, ApiError> {
        if self.probe.in_flight.swap(true, Ordering::SeqCst) {
            self.probe.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.probe.in_flight.store(false, Ordering::SeqCst);
        self.probe.push(format!("command:{command}"));

        if command == "reload" {
            return Err(ApiError::command_fatal(
                "Command executed, CLI prompt not seen after 180.0 sec",
            ));
        }
        Ok(format!("output of {command}"))
    }
}

fn command_args(command: &str) -> RequestArgs {
    match json!({"device_name": "lab-r1", "command": command}) {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn unbound_session_rejects_requests_without_connecting() {
    let session: Session<Instrumented> = Session::new(None);
    let err = session
        .request("command", command_args("show version"))
        .await
        .expect_err("no device");
    assert_eq!(err.kind(), ErrorKind::InvalidDevice);

    let status = session.status();
    assert!(!status.connected);
    assert!(status.connect_time.is_none());
    assert_eq!(status.connect_errors, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_never_overlap() {
    let probe = Probe::default();
    let session = Arc::new(Session::new(Some(Instrumented::new(&probe))));

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                session
                    .request("command", command_args(&format!("show run | i {i}")))
                    .await
            })
        })
        .collect();
    for task in tasks {
        let value = task.await.expect("join").expect("request");
        assert!(value.as_str().is_some_and(|s| s.starts_with("output of")));
    }

    assert_eq!(probe.overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(probe.count("connect"), 1);
    assert!(session.is_idle());
}

#[tokio::test]
async fn failed_request_leaves_session_disconnected_and_next_request_reconnects() {
    let probe = Probe::default();
    let session = Session::new(Some(Instrumented::new(&probe)));

    let err = session
        .request("command", command_args("reload"))
        .await
        .expect_err("prompt timeout");
    assert_eq!(err.kind(), ErrorKind::Command);
    assert!(!err.is_retryable());
    assert!(!session.is_connected());
    assert!(session.is_idle());

    session
        .request("command", command_args("show clock"))
        .await
        .expect("fresh connection");
    assert_eq!(
        probe.events(),
        vec![
            "connect",
            "command:reload",
            "disconnect",
            "connect",
            "command:show clock"
        ]
    );
}

#[tokio::test]
async fn credential_change_reconnects_exactly_once() {
    let probe = Probe::default();
    let session = Session::new(Some(Instrumented::new(&probe)))
        .with_credential(Credential::new("netops", "old"));
    session.connect().await.expect("connect");

    session.set_credential(Credential::new("netops", "new")).await;

    assert_eq!(probe.events(), vec!["connect", "disconnect", "connect"]);
    assert!(session.is_connected());
    assert_eq!(
        session.credential().await.map(|c| c.password),
        Some("new".to_string())
    );
}

#[tokio::test]
async fn refused_credential_leaves_session_disconnected_without_error() {
    let probe = Probe::default();
    let mut device = Instrumented::new(&probe);
    device.refuse_user = Some("intruder".to_string());
    let session = Session::new(Some(device)).with_credential(Credential::new("netops", "pw"));
    session.connect().await.expect("connect");

    session.set_credential(Credential::new("intruder", "guess")).await;

    assert_eq!(probe.count("disconnect"), 1);
    assert_eq!(probe.count("connect"), 2);
    let status = session.status();
    assert!(!status.connected);
    assert_eq!(status.connect_errors, 1);
}

#[tokio::test]
async fn credential_change_on_idle_session_does_not_connect() {
    let probe = Probe::default();
    let session = Session::new(Some(Instrumented::new(&probe)));
    session.set_credential(Credential::new("netops", "pw")).await;
    assert!(probe.events().is_empty());
}

#[tokio::test]
async fn network_address_yields_device_without_address() {
    let connector = Arc::new(ReplayConnector::new());
    let info = DeviceInfo::new("lab-r2", "ios", ["10.0.0.1/24"]);
    assert!(info.addresses.is_empty());
    let device = NetworkDevice::for_vendor(info, Arc::clone(&connector)).expect("profile");
    let session = Session::new(Some(device));

    let err = session
        .request("command", command_args("show version"))
        .await
        .expect_err("no address");
    assert_eq!(err.kind(), ErrorKind::DeviceWithoutAddress);
    assert!(connector.opened().is_empty());
}

#[tokio::test]
async fn ios_transcript_end_to_end() {
    let connector = Arc::new(ReplayConnector::new());
    let channel = ReplayChannel::from_jsonl(IOS_SHOW_VERSION).expect("fixture");
    let log = connector.push_channel(channel);
    let info = DeviceInfo::new("lab-r1", "ios", ["192.0.2.1"]);
    let device = NetworkDevice::for_vendor(info, Arc::clone(&connector)).expect("profile");
    let session = Session::new(Some(device))
        .with_credential(Credential::new("netops", "pw").with_enable_password("en"));

    let value = session
        .request("command", command_args("show version"))
        .await
        .expect("show version");
    assert_eq!(
        value,
        json!(
            "Cisco IOS Software, C2900 Software (C2900-UNIVERSALK9-M)\r\n\
             ROM: System Bootstrap, Version 15.0(1r)M15\r\n\
             router uptime is 1 week, 2 days\r\n"
        )
    );
    assert_eq!(log.count_writes(" "), 2);
    assert_eq!(log.count_writes("en\n"), 1);

    session.disconnect().await.expect("disconnect");
    assert_eq!(log.writes().last().map(String::as_str), Some("exit\n"));
    assert!(log.is_closed());
    let status = session.status();
    assert!(status.bytes_sent > 0 && status.bytes_received > 0);
}

#[tokio::test]
async fn ios_end_of_stream_is_retryable_and_drops_connection() {
    let connector = Arc::new(ReplayConnector::new());
    let log =
        connector.push_channel(ReplayChannel::from_jsonl(IOS_EOF_MID_COMMAND).expect("fixture"));
    let info = DeviceInfo::new("lab-r1", "ios", ["192.0.2.1"]);
    let device = NetworkDevice::for_vendor(info, Arc::clone(&connector)).expect("profile");
    let session = Session::new(Some(device));

    let err = session
        .request("command", command_args("show tech-support"))
        .await
        .expect_err("stream ended");
    assert_eq!(err.kind(), ErrorKind::Command);
    assert!(err.is_retryable());
    assert!(!session.is_connected());
    assert!(log.is_closed());
    assert_eq!(session.counters().count(ErrorKind::Command), 1);
}
