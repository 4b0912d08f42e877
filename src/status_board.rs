//! Summary message rendering
//!
//! Builds the single status embed the notifier keeps edited in place:
//! operational services, outages and fleet metrics. Also builds the
//! one-off alert posted to alert channels when a service changes status.

use chrono::{DateTime, Utc};

use crate::actors::messages::StatusTransitionEvent;
use crate::discord::{Embed, EmbedField, EmbedFooter, Message, MessageBuilder};
use crate::registry::{ServiceRecord, SystemStats};

/// Discord rejects field values longer than this
pub const MAX_FIELD_LEN: usize = 1024;

pub const COLOR_OPERATIONAL: u32 = 0x00ff00;
pub const COLOR_PARTIAL: u32 = 0xffaa00;
pub const COLOR_OUTAGE: u32 = 0xff0000;

const OPERATIONAL_FIELD: &str = "🟢 Operational Services";
const OUTAGE_FIELD: &str = "🔴 Service Outages";
const METRICS_FIELD: &str = "📈 Real-Time Metrics";

#[derive(Debug, Clone)]
pub struct StatusBoard {
    title: String,
    footer: String,
}

impl StatusBoard {
    pub fn new(title: impl Into<String>, footer: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            footer: footer.into(),
        }
    }

    /// Full summary of the fleet
    pub fn render(&self, services: &[ServiceRecord], now: DateTime<Utc>) -> Message {
        let stats = SystemStats::from_records(services);
        let online = stats.online_count;
        let total = stats.total_services;

        let (emoji, color) = if online == total {
            ("🟢", COLOR_OPERATIONAL)
        } else if online == 0 {
            ("🔴", COLOR_OUTAGE)
        } else {
            ("🟡", COLOR_PARTIAL)
        };

        let embed = Embed {
            title: Some(format!("📊 {}", self.title)),
            description: Some(format!(
                "{emoji} **System Status:** {}",
                status_message(online, total)
            )),
            color: Some(color),
            fields: vec![
                EmbedField::new(OPERATIONAL_FIELD, operational_lines(services), false),
                EmbedField::new(OUTAGE_FIELD, outage_lines(services, now), false),
                EmbedField::new(METRICS_FIELD, metrics_lines(&stats), false),
            ],
            footer: Some(EmbedFooter {
                text: format!("{} • Live Updates", self.footer),
            }),
            timestamp: Some(now.to_rfc3339()),
        };

        MessageBuilder::new().add_embed(embed).build()
    }

    /// Update only the latency numbers of a previously rendered summary
    ///
    /// Which list each service sits in, the header and the colour are kept
    /// from `previous`; they only change on transitions, which trigger a full
    /// [`render`](Self::render). Each operational line gets its latency and
    /// uptime rewritten from `services`, and the metrics block is recomputed.
    pub fn refresh_latency(
        &self,
        previous: &Message,
        services: &[ServiceRecord],
        now: DateTime<Utc>,
    ) -> Message {
        let mut message = previous.clone();
        let Some(embed) = message.embeds.first_mut() else {
            return self.render(services, now);
        };

        let stats = SystemStats::from_records(services);
        for field in embed.fields.iter_mut() {
            match field.name.as_str() {
                OPERATIONAL_FIELD => {
                    let refreshed = refresh_operational_lines(&field.value, services);
                    if refreshed.chars().count() <= MAX_FIELD_LEN {
                        field.value = refreshed;
                    }
                }
                METRICS_FIELD => field.value = metrics_lines(&stats),
                _ => {}
            }
        }
        embed.timestamp = Some(now.to_rfc3339());

        message
    }

    /// One-off alert for a single status change
    pub fn alert(&self, event: &StatusTransitionEvent, record: &ServiceRecord) -> Message {
        let (status, color) = if event.new_status {
            ("🟢 Online", COLOR_OPERATIONAL)
        } else {
            ("🔴 Offline", COLOR_OUTAGE)
        };
        let code = record
            .last_status_code
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string());

        let embed = Embed {
            title: Some(format!("Service Status Change: {}", event.name)),
            color: Some(color),
            fields: vec![
                EmbedField::new("Status", status, true),
                EmbedField::new("Response Time", format!("{}ms", event.latency_ms), true),
                EmbedField::new("Status Code", code, true),
                EmbedField::new("Target", &record.target, false),
            ],
            footer: Some(EmbedFooter {
                text: self.footer.clone(),
            }),
            timestamp: Some(event.timestamp.to_rfc3339()),
            ..Embed::default()
        };

        MessageBuilder::new().add_embed(embed).build()
    }
}

fn status_message(online: usize, total: usize) -> String {
    if online == total {
        "All Systems Operational".to_string()
    } else if online == 0 {
        "Major System Outage".to_string()
    } else {
        format!("Partial Outage ({online}/{total} Online)")
    }
}

fn operational_line(service: &ServiceRecord) -> String {
    format!(
        "`{}` • {}ms • {:.2}% uptime",
        service.name,
        service.last_latency_ms,
        service.uptime_percentage()
    )
}

fn operational_lines(services: &[ServiceRecord]) -> String {
    let lines: Vec<String> = services
        .iter()
        .filter(|s| s.status)
        .map(operational_line)
        .collect();

    join_field(lines, "None")
}

/// Rewrite the numbers of already listed services, keeping every other line
fn refresh_operational_lines(value: &str, services: &[ServiceRecord]) -> String {
    value
        .lines()
        .map(|line| {
            line_service_name(line)
                .and_then(|name| services.iter().find(|s| s.name == name))
                .map(operational_line)
                .unwrap_or_else(|| line.to_string())
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Name between the leading backticks of a rendered line
fn line_service_name(line: &str) -> Option<&str> {
    let (name, _) = line.strip_prefix('`')?.split_once("` • ")?;
    Some(name)
}

fn outage_lines(services: &[ServiceRecord], now: DateTime<Utc>) -> String {
    let lines: Vec<String> = services
        .iter()
        .filter(|s| !s.status)
        .map(|s| {
            let since = s.down_since.or(s.last_checked_at).unwrap_or(now);
            format!("`{}` • Down for: {}", s.name, format_downtime(since, now))
        })
        .collect();

    join_field(lines, "No outages detected")
}

fn metrics_lines(stats: &SystemStats) -> String {
    [
        format!("• Response Time: `{}ms`", stats.avg_latency_ms.round() as u64),
        format!("• Degraded Services: `{}`", stats.degraded_services),
        format!("• System Uptime: `{:.2}%`", stats.overall_uptime),
    ]
    .join("\n")
}

/// `"45m"` below an hour, `"1h 5m"` above
pub fn format_downtime(since: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - since).num_minutes().max(0);
    if minutes >= 60 {
        format!("{}h {}m", minutes / 60, minutes % 60)
    } else {
        format!("{minutes}m")
    }
}

/// Join lines, dropping whole lines that would overflow a field
fn join_field(lines: Vec<String>, empty: &str) -> String {
    if lines.is_empty() {
        return empty.to_string();
    }

    let total = lines.len();
    let mut value = String::new();
    for (shown, line) in lines.into_iter().enumerate() {
        let more = format!("\n… and {} more", total - shown);
        let separator = usize::from(!value.is_empty());
        if value.chars().count() + separator + line.chars().count() + more.chars().count()
            > MAX_FIELD_LEN
        {
            value.push_str(&more);
            break;
        }
        if separator == 1 {
            value.push('\n');
        }
        value.push_str(&line);
    }
    value
}
