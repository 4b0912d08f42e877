use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, trace, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uptime_monitor::{
    actors::{
        notifier::NotifierHandle,
        scheduler::{SchedulerHandle, Sinks},
        storage::StorageHandle,
    },
    config::{Config, read_config_file},
    discord::{ChatTransport, DiscordTransport},
    live::{DEFAULT_LIVE_CAPACITY, LiveBroadcaster},
    probe::ProbeStrategy,
    registry::ServiceRegistry,
    status_board::StatusBoard,
    storage::open_store,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (JSON, or TOML with a `.toml` extension)
    #[arg(short)]
    file: String,
}

fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("uptime_monitor=debug,uptime_hub=debug"));
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let mut config = read_config_file(&args.file)?;
    config.apply_env_overrides(|key| std::env::var(key).ok());

    run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store = open_store(&config.storage).await?;

    let registry = Arc::new(ServiceRegistry::new(config.monitor.history_capacity));
    registry.hydrate(store.as_ref(), &config.services).await?;

    let storage = StorageHandle::spawn(store.clone());

    let live = LiveBroadcaster::new(registry.clone(), DEFAULT_LIVE_CAPACITY);
    let heartbeat = live.spawn_heartbeat(HEARTBEAT_INTERVAL);

    let notifier = match &config.notification {
        Some(notification) => {
            let transport: Arc<dyn ChatTransport> = Arc::new(DiscordTransport::new(notification)?);
            let board = StatusBoard::new(&notification.title, &notification.footer);
            info!("posting status to channel {}", notification.channel_id);
            if !notification.alert_channel_ids.is_empty() {
                info!("alerting {} extra channels on status changes", notification.alert_channel_ids.len());
            }
            Some(NotifierHandle::spawn_with_alerts(
                transport,
                store.clone(),
                board,
                notification.alert_channel_ids.clone(),
            ))
        }
        None => {
            info!("no notification channel configured");
            None
        }
    };

    let probe = Arc::new(ProbeStrategy::new(config.monitor.probe_timeout())?);
    let sinks = Sinks {
        live: live.clone(),
        notifier: notifier.clone(),
        storage: Some(storage.clone()),
    };
    let scheduler = SchedulerHandle::spawn(&config.monitor, registry.clone(), probe, sinks);

    #[cfg(feature = "api")]
    {
        if let Some(settings) = &config.api {
            let mut state = uptime_monitor::api::ApiState::new(registry.clone(), live.clone())
                .with_storage(storage.clone())
                .with_scheduler(scheduler.clone());
            if let Some(notifier) = &notifier {
                state = state.with_notifier(notifier.clone());
            }
            uptime_monitor::api::spawn_api_server(settings, state).await?;
        }
    }
    #[cfg(not(feature = "api"))]
    {
        if config.api.is_some() {
            warn!("api section ignored, built without the `api` feature");
        }
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    if let Err(e) = scheduler.shutdown().await {
        warn!("scheduler did not stop cleanly: {e}");
    }
    heartbeat.abort();
    if let Some(notifier) = &notifier {
        notifier.shutdown().await;
    }
    if let Err(e) = storage.flush().await {
        error!("failed to flush pending writes: {e}");
    }
    storage.shutdown().await;
    if let Err(e) = store.close().await {
        error!("failed to close store: {e}");
    }

    Ok(())
}
