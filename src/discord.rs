//! Discord message model and REST transport
//!
//! The notifier only needs two calls: create a message and edit it in place.
//! [`ChatTransport`] is that seam; [`DiscordTransport`] implements it over the
//! Discord REST API with a bot token.
//!
//! ## Connection state
//!
//! ```text
//! Connected ──transport failure──▶ Backoff { attempt: 1, until: now + 1s }
//!     ▲                                 │ failure after `until`
//!     │                                 ▼
//!     └────────── success ──── Backoff { attempt: n+1, until: now + min(2^n s, 60s) }
//! ```
//!
//! Calls made before `until` fail fast with [`ChatError::Unavailable`]
//! without touching the network. A 429 opens the same kind of window for the
//! `retry_after` the API asked for, without counting as a failed attempt.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::NotificationConfig;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

impl EmbedField {
    pub fn new(name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            inline,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

#[derive(Default)]
pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(mut self, content: impl ToString) -> Self {
        self.content = Some(content.to_string());
        self
    }

    pub fn add_embed(mut self, embed: Embed) -> Self {
        self.embeds.push(embed);
        self
    }

    pub fn build(self) -> Message {
        Message {
            content: self.content,
            embeds: self.embeds,
        }
    }
}

/// Location of a posted message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: String,
    pub message_id: String,
}

/// Result of editing a message in place
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    Edited,

    /// The message is gone or can no longer be edited by us
    NotFound,
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat transport unavailable, next attempt in {retry_in:?}")]
    Unavailable { retry_in: Duration },

    #[error("rate limited by chat API (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("chat API rejected request with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("chat transport error: {0}")]
    Transport(String),
}

/// Posts and edits messages on a chat channel
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Channel the status message is posted to
    fn channel_id(&self) -> &str;

    async fn send(&self, message: &Message) -> Result<MessageRef, ChatError> {
        self.send_to(self.channel_id(), message).await
    }

    async fn send_to(&self, channel_id: &str, message: &Message) -> Result<MessageRef, ChatError>;

    async fn edit(&self, target: &MessageRef, message: &Message) -> Result<EditOutcome, ChatError>;
}

/// Exponential backoff bounds
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Delay after the `attempt`-th consecutive failure (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .saturating_mul(1u32 << exponent)
            .min(self.max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Backoff { attempt: u32, until: Instant },
}

/// Used when a 429 carries no usable `retry_after`
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Reconnect state machine shared by all calls of one transport
#[derive(Debug)]
pub struct ConnectionGuard {
    policy: ReconnectPolicy,
    state: Mutex<ConnectionState>,
    rate_limited_until: Mutex<Option<Instant>>,
}

impl ConnectionGuard {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(ConnectionState::Connected),
            rate_limited_until: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail fast while a backoff or rate limit window is open
    pub fn check(&self) -> Result<(), ChatError> {
        let rate_limited_until = *self
            .rate_limited_until
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if let Some(until) = rate_limited_until {
            let now = Instant::now();
            if now < until {
                return Err(ChatError::Unavailable {
                    retry_in: until - now,
                });
            }
        }

        match self.state() {
            ConnectionState::Backoff { until, .. } => {
                let now = Instant::now();
                if now < until {
                    Err(ChatError::Unavailable {
                        retry_in: until - now,
                    })
                } else {
                    Ok(())
                }
            }
            ConnectionState::Connected => Ok(()),
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let ConnectionState::Backoff { attempt, .. } = *state {
            info!("chat transport reconnected after {attempt} failed attempts");
        }
        *state = ConnectionState::Connected;
    }

    /// Hold every call until the API's rate limit window has passed
    pub fn record_rate_limit(&self, retry_after: Duration) {
        let until = Instant::now() + retry_after;
        let mut window = self
            .rate_limited_until
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if window.is_none_or(|current| current < until) {
            *window = Some(until);
        }
        debug!("chat transport rate limited for {retry_after:?}");
    }

    pub fn record_failure(&self) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let attempt = match *state {
            ConnectionState::Connected => 1,
            ConnectionState::Backoff { attempt, .. } => attempt.saturating_add(1),
        };
        let delay = self.policy.delay_for(attempt);
        *state = ConnectionState::Backoff {
            attempt,
            until: Instant::now() + delay,
        };
        warn!("chat transport unavailable, backing off for {delay:?} (attempt {attempt})");
        delay
    }
}

#[derive(Deserialize)]
struct CreatedMessage {
    id: String,
}

#[derive(Deserialize)]
struct RateLimitBody {
    retry_after: Option<f64>,
}

/// Discord REST transport authenticated as a bot
pub struct DiscordTransport {
    client: Client,
    api_base: String,
    token: String,
    channel_id: String,
    guard: ConnectionGuard,
}

impl DiscordTransport {
    pub fn new(config: &NotificationConfig) -> anyhow::Result<Self> {
        Self::with_policy(config, ReconnectPolicy::default())
    }

    pub fn with_policy(config: &NotificationConfig, policy: ReconnectPolicy) -> anyhow::Result<Self> {
        if config.token.trim().is_empty() {
            anyhow::bail!("notification token is empty");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            channel_id: config.channel_id.clone(),
            guard: ConnectionGuard::new(policy),
        })
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.guard.state()
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response, ChatError> {
        self.guard.check()?;

        let response = match request
            .header(AUTHORIZATION, format!("Bot {}", self.token))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.guard.record_failure();
                return Err(ChatError::Transport(e.to_string()));
            }
        };

        if response.status().is_server_error() {
            self.guard.record_failure();
            return Err(ChatError::Transport(format!(
                "server error {}",
                response.status()
            )));
        }

        self.guard.record_success();

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .json::<RateLimitBody>()
                .await
                .ok()
                .and_then(|body| body.retry_after)
                .filter(|secs| secs.is_finite() && *secs >= 0.0)
                .map(Duration::from_secs_f64);
            self.guard
                .record_rate_limit(retry_after.unwrap_or(DEFAULT_RETRY_AFTER));
            return Err(ChatError::RateLimited { retry_after });
        }

        Ok(response)
    }

    async fn rejection(response: reqwest::Response) -> ChatError {
        let status = response.status();
        ChatError::Rejected {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        }
    }
}

#[async_trait]
impl ChatTransport for DiscordTransport {
    fn channel_id(&self) -> &str {
        &self.channel_id
    }

    #[instrument(skip(self, message))]
    async fn send_to(&self, channel_id: &str, message: &Message) -> Result<MessageRef, ChatError> {
        let url = format!("{}/channels/{}/messages", self.api_base, channel_id);
        let response = self.execute(self.client.post(&url).json(message)).await?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let created: CreatedMessage = response
            .json()
            .await
            .map_err(|e| ChatError::Transport(format!("invalid create response: {e}")))?;

        debug!("posted message {}", created.id);
        Ok(MessageRef {
            channel_id: channel_id.to_string(),
            message_id: created.id,
        })
    }

    #[instrument(skip(self, message), fields(message_id = %target.message_id))]
    async fn edit(&self, target: &MessageRef, message: &Message) -> Result<EditOutcome, ChatError> {
        let url = format!(
            "{}/channels/{}/messages/{}",
            self.api_base, target.channel_id, target.message_id
        );
        let response = self.execute(self.client.patch(&url).json(message)).await?;

        match response.status() {
            status if status.is_success() => Ok(EditOutcome::Edited),
            StatusCode::NOT_FOUND | StatusCode::FORBIDDEN => {
                debug!("status message is no longer editable ({})", response.status());
                Ok(EditOutcome::NotFound)
            }
            _ => Err(Self::rejection(response).await),
        }
    }
}
