//! Anonymous usage reporting
//!
//! A single best-effort request sent when the target starts. It runs on a
//! detached thread and its outcome never reaches the session.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use reqwest::blocking::Client;
use tracing::debug;

const COLLECTOR_URL: &str = "http://collector.singer.io/i";
const TIMEOUT: Duration = Duration::from_secs(10);

/// Query parameters identifying this target and `version`
pub fn usage_params(version: &str) -> [(&'static str, String); 5] {
    [
        ("e", "se".to_string()),
        ("aid", "singer".to_string()),
        ("se_ca", "target-ndjson".to_string()),
        ("se_ac", "open".to_string()),
        ("se_la", version.to_string()),
    ]
}

/// Send the usage report in the background
pub fn spawn_usage_report(version: &str) -> JoinHandle<()> {
    let params = usage_params(version);
    thread::spawn(move || {
        if let Err(e) = send_usage_report(&params) {
            debug!("Collection request failed: {}", e);
        }
    })
}

fn send_usage_report(params: &[(&'static str, String)]) -> reqwest::Result<()> {
    let client = Client::builder().timeout(TIMEOUT).build()?;
    client
        .get(COLLECTOR_URL)
        .query(params)
        .send()?
        .error_for_status()?;
    Ok(())
}
