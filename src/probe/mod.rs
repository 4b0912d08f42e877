//! Probe strategies
//!
//! A probe performs one reachability check against a service target and
//! returns a [`ProbeResult`]. Ordinary network failures are *results*
//! (`reachable == false`), never errors.
//!
//! ## Target classification
//!
//! ```text
//! "10.0.0.5"            → TCP connect to 10.0.0.5:80
//! "10.0.0.5:5432"       → TCP connect to 10.0.0.5:5432
//! "[::1]:22"            → TCP connect to [::1]:22
//! "https://example.com" → HTTP GET
//! "example.com/health"  → HTTP GET http://example.com/health
//! ```

pub mod http;
pub mod tcp;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use self::http::HttpProbe;
use self::tcp::TcpProbe;

/// Port used for TCP targets given without one
pub const DEFAULT_TCP_PORT: u16 = 80;

/// Outcome of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub reachable: bool,

    /// Latency rounded to the nearest millisecond; the probe timeout on timeout
    pub latency_ms: u64,

    /// HTTP status code, `200` for a successful TCP connect
    pub code: Option<u16>,

    /// Status text or failure reason
    pub detail: Option<String>,
}

impl ProbeResult {
    pub fn up(latency_ms: u64, code: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            reachable: true,
            latency_ms,
            code,
            detail: Some(detail.into()),
        }
    }

    pub fn down(latency_ms: u64, code: Option<u16>, detail: impl Into<String>) -> Self {
        Self {
            reachable: false,
            latency_ms,
            code,
            detail: Some(detail.into()),
        }
    }

    /// Result reported when a probe exceeded its timeout
    pub fn timed_out(timeout: Duration) -> Self {
        Self::down(round_millis(timeout), None, "timed out")
    }
}

/// Round a duration to the nearest millisecond
pub fn round_millis(duration: Duration) -> u64 {
    ((duration.as_micros() + 500) / 1000) as u64
}

/// What kind of check a target string calls for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeTarget {
    Http { url: String },
    Tcp { addr: SocketAddr },
}

impl ProbeTarget {
    pub fn parse(target: &str) -> Self {
        let target = target.trim();

        if let Ok(addr) = target.parse::<SocketAddr>() {
            return ProbeTarget::Tcp { addr };
        }

        if let Ok(ip) = target.parse::<IpAddr>() {
            return ProbeTarget::Tcp {
                addr: SocketAddr::new(ip, DEFAULT_TCP_PORT),
            };
        }

        let url = if target.starts_with("http://") || target.starts_with("https://") {
            target.to_string()
        } else {
            format!("http://{target}")
        };

        ProbeTarget::Http { url }
    }
}

/// A health check strategy
///
/// Implementations must not return early with a panic or error for network
/// failures; they report them as an unreachable [`ProbeResult`].
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, target: &str) -> ProbeResult;
}

/// Default strategy: picks HTTP or TCP based on the target string
#[derive(Debug, Clone)]
pub struct ProbeStrategy {
    http: HttpProbe,
    tcp: TcpProbe,
}

impl ProbeStrategy {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            http: HttpProbe::new(timeout)?,
            tcp: TcpProbe::new(timeout),
        })
    }
}

#[async_trait]
impl Probe for ProbeStrategy {
    async fn probe(&self, target: &str) -> ProbeResult {
        match ProbeTarget::parse(target) {
            ProbeTarget::Http { url } => self.http.check(&url).await,
            ProbeTarget::Tcp { addr } => self.tcp.check(addr).await,
        }
    }
}
