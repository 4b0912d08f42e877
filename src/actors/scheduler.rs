//! SchedulerActor - Drives the probe ticks
//!
//! ## State machine
//!
//! ```text
//!            timer / TickNow
//!   Idle ───────────────────▶ Ticking ──all probes settled──▶ Idle
//!    │                           │
//!    │ Shutdown                  │ Shutdown
//!    ▼                           ▼
//! Stopped ◀──settled or grace── Draining
//! ```
//!
//! Within a tick every service is probed on its own task, so one hanging
//! target costs at most its timeout. The next tick only starts once the
//! current one settled; a service never has two probes in flight.
//!
//! ## Fan-out
//!
//! - every tick: snapshot to the live sink, records to the storage writer
//! - per transition: transition event to the live sink
//! - ticks with transitions: one batch to the notifier
//!
//! All sinks are fire-and-forget; the tick never waits on a subscriber or
//! the chat API. A lighter timer pushes only latency numbers in between.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, Interval, MissedTickBehavior, interval, timeout};
use tracing::{debug, error, info, instrument, trace, warn};

use super::messages::{SchedulerCommand, SchedulerState, StatusTransitionEvent, TickReport};
use super::notifier::NotifierHandle;
use super::storage::StorageHandle;
use crate::config::MonitorSettings;
use crate::live::LiveBroadcaster;
use crate::probe::{Probe, ProbeResult, round_millis};
use crate::registry::{LatencySample, ProbeTask, ServiceRegistry};

/// Extra time granted to a probe beyond its own timeout before it is abandoned
const PROBE_TIMEOUT_SLACK: Duration = Duration::from_secs(1);

/// Where tick results go
#[derive(Clone)]
pub struct Sinks {
    pub live: LiveBroadcaster,
    pub notifier: Option<NotifierHandle>,
    pub storage: Option<StorageHandle>,
}

struct TickContext {
    registry: Arc<ServiceRegistry>,
    probe: Arc<dyn Probe>,
    sinks: Sinks,
    probe_timeout: Duration,
}

pub struct SchedulerActor {
    ctx: Arc<TickContext>,
    tick_interval: Duration,
    latency_refresh_interval: Duration,
    drain_grace: Duration,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    state: SchedulerState,
    ticks: u64,
}

impl SchedulerActor {
    pub fn new(
        settings: &MonitorSettings,
        registry: Arc<ServiceRegistry>,
        probe: Arc<dyn Probe>,
        sinks: Sinks,
        command_rx: mpsc::Receiver<SchedulerCommand>,
    ) -> Self {
        Self {
            ctx: Arc::new(TickContext {
                registry,
                probe,
                sinks,
                probe_timeout: settings.probe_timeout(),
            }),
            tick_interval: settings.tick_interval(),
            latency_refresh_interval: settings.latency_refresh_interval(),
            drain_grace: settings.drain_grace(),
            command_rx,
            state: SchedulerState::Idle,
            ticks: 0,
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!(
            "starting scheduler (tick every {:?}, probe timeout {:?})",
            self.tick_interval, self.ctx.probe_timeout
        );

        let refresher = spawn_latency_refresher(self.ctx.clone(), self.latency_refresh_interval);

        let mut ticker = interval(self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        let shutdown_waiter = match self.tick(Vec::new()).await {
            Some(waiter) => waiter,
            None => self.idle_loop(&mut ticker).await,
        };

        refresher.abort();
        self.state = SchedulerState::Stopped;
        info!("scheduler stopped after {} ticks", self.ticks);

        if let Some(respond_to) = shutdown_waiter {
            let _ = respond_to.send(());
        }
    }

    /// Wait for the timer or commands until a shutdown is requested
    async fn idle_loop(&mut self, ticker: &mut Interval) -> Option<oneshot::Sender<()>> {
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(waiter) = self.tick(Vec::new()).await {
                        break waiter;
                    }
                }

                cmd = self.command_rx.recv() => match cmd {
                    Some(SchedulerCommand::TickNow { respond_to }) => {
                        debug!("received TickNow command");
                        if let Some(waiter) = self.tick(vec![respond_to]).await {
                            break waiter;
                        }
                    }

                    Some(SchedulerCommand::GetState { respond_to }) => {
                        let _ = respond_to.send(self.state);
                    }

                    Some(SchedulerCommand::Shutdown { respond_to }) => {
                        debug!("received shutdown command");
                        break Some(respond_to);
                    }

                    None => {
                        warn!("command channel closed, shutting down");
                        break None;
                    }
                },
            }
        }
    }

    /// Run one tick while still serving commands
    ///
    /// Returns `Some` when a shutdown was requested during the tick; the
    /// inner value is the waiter to notify once stopped (`None` if the command
    /// channel closed).
    async fn tick(
        &mut self,
        mut waiters: Vec<oneshot::Sender<TickReport>>,
    ) -> Option<Option<oneshot::Sender<()>>> {
        self.ticks += 1;
        self.state = SchedulerState::Ticking;

        let tick = run_tick(self.ctx.clone(), self.ticks);
        tokio::pin!(tick);

        let mut shutdown = None;
        let report = loop {
            tokio::select! {
                report = &mut tick => break Some(report),

                cmd = self.command_rx.recv() => {
                    let respond_to = match cmd {
                        Some(SchedulerCommand::TickNow { respond_to }) => {
                            // Joins the tick in flight
                            waiters.push(respond_to);
                            continue;
                        }
                        Some(SchedulerCommand::GetState { respond_to }) => {
                            let _ = respond_to.send(self.state);
                            continue;
                        }
                        Some(SchedulerCommand::Shutdown { respond_to }) => Some(respond_to),
                        None => None,
                    };

                    self.state = SchedulerState::Draining;
                    debug!("draining in-flight probes (grace {:?})", self.drain_grace);
                    shutdown = Some(respond_to);

                    match timeout(self.drain_grace, &mut tick).await {
                        Ok(report) => break Some(report),
                        Err(_) => {
                            warn!("abandoning in-flight probes after {:?}", self.drain_grace);
                            break None;
                        }
                    }
                }
            }
        };

        if let Some(report) = report {
            for waiter in waiters {
                let _ = waiter.send(report.clone());
            }
        }

        if shutdown.is_none() {
            self.state = SchedulerState::Idle;
        }
        shutdown
    }
}

/// Probe every service concurrently, apply the results and fan out
#[instrument(skip(ctx))]
async fn run_tick(ctx: Arc<TickContext>, tick: u64) -> TickReport {
    let started_at = Utc::now();
    let start = Instant::now();

    let tasks = ctx.registry.probe_tasks().await;
    let probed = tasks.len();
    trace!("probing {probed} services");

    let mut probes = JoinSet::new();
    for task in tasks {
        probes.spawn(probe_one(ctx.probe.clone(), task, ctx.probe_timeout));
    }

    let mut applied = 0;
    let mut transitions: Vec<StatusTransitionEvent> = Vec::new();
    while let Some(joined) = probes.join_next().await {
        let (task, result, at) = match joined {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("probe task failed: {e}");
                continue;
            }
        };

        match ctx.registry.apply_probe(&task, &result, at).await {
            Ok(event) => {
                applied += 1;
                transitions.extend(event);
            }
            Err(e) => trace!("discarding probe result: {e}"),
        }
    }

    let snapshot = ctx.registry.snapshot().await;

    ctx.sinks.live.publish_snapshot(snapshot.clone());
    for event in &transitions {
        ctx.sinks.live.publish_transition(event.clone());
    }

    if !transitions.is_empty()
        && let Some(notifier) = &ctx.sinks.notifier
    {
        notifier.notify_transitions(transitions.clone(), snapshot.clone());
    }

    if let Some(storage) = &ctx.sinks.storage {
        storage.save_records(snapshot);
    }

    let report = TickReport {
        tick,
        probed,
        applied,
        transitions,
        started_at,
        duration_ms: round_millis(start.elapsed()),
    };
    debug!(
        "tick {} done: {} probed, {} transitions in {}ms",
        report.tick,
        report.probed,
        report.transitions.len(),
        report.duration_ms
    );
    report
}

/// Run one probe, turning panics and overruns into unreachable results
async fn probe_one(
    probe: Arc<dyn Probe>,
    task: ProbeTask,
    probe_timeout: Duration,
) -> (ProbeTask, ProbeResult, DateTime<Utc>) {
    let guarded = AssertUnwindSafe(probe.probe(&task.target)).catch_unwind();

    let result = match timeout(probe_timeout + PROBE_TIMEOUT_SLACK, guarded).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => {
            error!("probe for {} panicked", task.name);
            ProbeResult::down(0, None, "probe failed")
        }
        Err(_) => {
            warn!("probe for {} overran its timeout", task.name);
            ProbeResult::timed_out(probe_timeout)
        }
    };

    (task, result, Utc::now())
}

/// Push latency numbers between ticks without touching counters
fn spawn_latency_refresher(ctx: Arc<TickContext>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let snapshot = ctx.registry.snapshot().await;
            let latencies = snapshot
                .iter()
                .map(|record| LatencySample {
                    name: record.name.clone(),
                    status: record.status,
                    latency_ms: record.last_latency_ms,
                })
                .collect();

            ctx.sinks.live.publish_latencies(latencies);
            if let Some(notifier) = &ctx.sinks.notifier {
                notifier.refresh_latency(snapshot);
            }
        }
    })
}

/// Handle for the SchedulerActor
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn spawn(
        settings: &MonitorSettings,
        registry: Arc<ServiceRegistry>,
        probe: Arc<dyn Probe>,
        sinks: Sinks,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = SchedulerActor::new(settings, registry, probe, sinks, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Run a tick now and wait for its report
    pub async fn tick_now(&self) -> anyhow::Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::TickNow { respond_to: tx })
            .await?;

        Ok(rx.await?)
    }

    pub async fn state(&self) -> SchedulerState {
        let (tx, rx) = oneshot::channel();
        if self
            .sender
            .send(SchedulerCommand::GetState { respond_to: tx })
            .await
            .is_err()
        {
            return SchedulerState::Stopped;
        }

        rx.await.unwrap_or(SchedulerState::Stopped)
    }

    /// Stop ticking; resolves once in-flight probes settled or were abandoned
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::Shutdown { respond_to: tx })
            .await?;

        rx.await?;
        Ok(())
    }
}
