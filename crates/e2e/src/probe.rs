//! Reachability probe for the application under test

use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

use crate::error::{E2eError, E2eResult};

const PROBE_INTERVAL: Duration = Duration::from_millis(250);
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll `base_url` until it answers with any HTTP status
///
/// Returns the number of attempts it took.
pub async fn wait_until_reachable(base_url: &str, limit: Duration) -> E2eResult<usize> {
    let client = reqwest::Client::builder()
        .timeout(PROBE_REQUEST_TIMEOUT)
        .build()?;

    let deadline = Instant::now() + limit;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match client.get(base_url).send().await {
            Ok(resp) => {
                info!("{} reachable ({}) after {} attempt(s)", base_url, resp.status(), attempts);
                return Ok(attempts);
            }
            Err(e) => {
                if attempts == 1 {
                    info!("Waiting for {} ...", base_url);
                }
                // Connection refused is expected while the application starts
                if !e.is_connect() {
                    warn!("Probe error: {}", e);
                }
            }
        }

        if Instant::now() >= deadline {
            return Err(E2eError::AppUnreachable(attempts));
        }
        sleep(PROBE_INTERVAL).await;
    }
}
