//! Periodic self-ping of the health endpoint.

use std::time::Duration;
use tokio::task::JoinHandle;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Ping `url` once and log the outcome. Returns the status code on success.
pub async fn ping_once(client: &reqwest::Client, url: &str) -> Option<u16> {
    match client.get(url).send().await {
        Ok(resp) => {
            let status = resp.status().as_u16();
            log::info!("Keep-alive ping status: {status}");
            Some(status)
        }
        Err(e) => {
            log::error!("Keep-alive ping error: {e}");
            None
        }
    }
}

/// Spawn the prober. The first ping goes out immediately, then one per `every`.
pub fn spawn(url: String, every: Duration) -> JoinHandle<()> {
    log::info!("Keep-alive pinger started. Pinging {url} every {}s", every.as_secs());
    tokio::spawn(async move {
        let client = match reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build() {
            Ok(client) => client,
            Err(e) => {
                log::error!("Keep-alive pinger disabled: {e}");
                return;
            }
        };
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            ping_once(&client, &url).await;
        }
    })
}
