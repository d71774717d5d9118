use std::env;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use rnotch::channel::SshConnector;
use rnotch::device::{Credential, DeviceInfo, NetworkDevice};
use rnotch::session::Session;

fn print_usage() {
    eprintln!(
        "Usage: cargo run --example show_version -- <vendor> <address> <user> <password> [enable-password]"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        print_usage();
        process::exit(2);
    }
    let (vendor, address, user, password) = (&args[1], &args[2], &args[3], &args[4]);

    let mut credential = Credential::new(user.as_str(), password.as_str());
    if let Some(enable) = args.get(5) {
        credential = credential.with_enable_password(enable.as_str());
    }

    let info = DeviceInfo::new(address.as_str(), vendor.as_str(), [address.as_str()]);
    let device = NetworkDevice::for_vendor(info, Arc::new(SshConnector::default()))
        .with_context(|| format!("no profile for vendor {vendor}"))?;
    let session = Session::new(Some(device)).with_credential(credential);

    let mut request = serde_json::Map::new();
    request.insert("command".into(), "show version".into());
    let output = session
        .request("command", request)
        .await
        .with_context(|| format!("show version on {address} failed"))?;
    println!("{}", output.as_str().unwrap_or_default());

    if let Err(e) = session.disconnect().await {
        eprintln!("disconnect: {e}");
    }
    let status = session.status();
    println!(
        "sent={} received={} bytes",
        status.bytes_sent, status.bytes_received
    );
    Ok(())
}
