//! HTTP probe
//!
//! Reachability, not health: any answer that proves the server is alive
//! counts as up, including bot-blocking and rate-limit responses.

use std::time::Duration;

use anyhow::Context;
use tokio::time::Instant;
use tracing::{instrument, trace};

use super::{ProbeResult, round_millis};

/// Server errors that still prove the server is up
const TOLERATED_5XX: [u16; 1] = [503];

#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client, timeout })
    }

    #[instrument(skip(self))]
    pub async fn check(&self, url: &str) -> ProbeResult {
        let start = Instant::now();
        let response = self.client.get(url).send().await;
        let latency_ms = round_millis(start.elapsed());

        match response {
            Ok(response) => {
                let status = response.status();
                let code = status.as_u16();
                let detail = status
                    .canonical_reason()
                    .map(str::to_string)
                    .unwrap_or_else(|| code.to_string());

                trace!("{url} answered {code} in {latency_ms}ms");

                if is_reachable_status(code) {
                    ProbeResult::up(latency_ms, Some(code), detail)
                } else {
                    ProbeResult::down(latency_ms, Some(code), detail)
                }
            }
            Err(e) if e.is_timeout() => {
                trace!("{url} timed out");
                ProbeResult::timed_out(self.timeout)
            }
            Err(e) => {
                trace!("{url} failed: {e}");
                let code = e.status().map(|status| status.as_u16());
                let reachable = code.is_some_and(is_reachable_status);
                ProbeResult {
                    reachable,
                    latency_ms,
                    code,
                    detail: Some(e.to_string()),
                }
            }
        }
    }
}

/// Whether a response with this status proves the server is alive
///
/// Any answer below 500 (including 403 and 429) means the server responded.
/// Of the server errors only 503 is tolerated.
pub fn is_reachable_status(code: u16) -> bool {
    code < 500 || TOLERATED_5XX.contains(&code)
}
