//! Raw TCP connect probe

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::{Instant, timeout};
use tracing::{instrument, trace};

use super::{ProbeResult, round_millis};

#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Reachable strictly on a completed connect
    #[instrument(skip(self))]
    pub async fn check(&self, addr: SocketAddr) -> ProbeResult {
        let start = Instant::now();

        match timeout(self.timeout, TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => {
                let latency_ms = round_millis(start.elapsed());
                trace!("{addr} connected in {latency_ms}ms");
                ProbeResult::up(latency_ms, Some(200), "Connected")
            }
            Ok(Err(e)) => {
                trace!("{addr} connect failed: {e}");
                ProbeResult::down(round_millis(start.elapsed()), None, e.to_string())
            }
            Err(_) => {
                trace!("{addr} connect timed out");
                ProbeResult::down(round_millis(self.timeout), None, "Connection Timeout")
            }
        }
    }
}
