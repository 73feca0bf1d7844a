//! Application entry point — headless pipeline monitor.
//!
//! # Startup sequence
//!
//! 1. Initialise logging.
//! 2. Load [`AppConfig`] and [`SessionStore`] from disk (defaults on first run).
//! 3. Build the [`HttpJobClient`] from the server config.
//! 4. List the service's models and log the default evaluation pick.
//! 5. Subscribe to the status channel and follow it with the state machine.
//! 6. Report stage changes, new log lines and host metrics until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use whisper_lab::{
    channel::StatusChannel,
    config::{AppConfig, SessionStore},
    pipeline::{new_shared_pipeline, PipelineStateMachine, StageStatus},
    remote::{default_selector, HttpJobClient, RemoteJobClient, SystemMetrics},
};

/// How often the monitor checks the shared view for changes.
const REPORT_INTERVAL: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Reporter
// ---------------------------------------------------------------------------

/// Remembers what has been logged so only changes are reported.
#[derive(Default)]
struct Reporter {
    logged_lines: usize,
    stages: Vec<(String, StageStatus)>,
    degraded: bool,
}

impl Reporter {
    fn report(&mut self, machine: &PipelineStateMachine) {
        let view = machine.view();

        // a new run (or a server restart) starts the log over
        if view.state.log_lines.len() < self.logged_lines {
            self.logged_lines = 0;
        }
        for line in &view.state.log_lines[self.logged_lines..] {
            log::info!("[remote] {line}");
        }
        self.logged_lines = view.state.log_lines.len();

        let stages: Vec<_> = machine
            .stage_statuses()
            .into_iter()
            .map(|s| (s.name, s.status))
            .collect();
        if stages != self.stages {
            let summary: Vec<_> = stages
                .iter()
                .map(|(name, status)| format!("{name}: {status:?}"))
                .collect();
            log::info!(
                "pipeline {} [{}]",
                view.state.status,
                summary.join(", ")
            );
            self.stages = stages;
        }

        if view.transport_degraded != self.degraded {
            if view.transport_degraded {
                log::warn!("status push unavailable, polling");
            } else {
                log::info!("status push connected");
            }
            self.degraded = view.transport_degraded;
        }
    }
}

fn report_metrics(metrics: &SystemMetrics) {
    log::debug!("system: {}", metrics.0);
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("whisper-lab starting up");

    // 2. Configuration + session
    let config = AppConfig::load().unwrap_or_else(|e| {
        log::warn!("Failed to load config ({e}); using defaults");
        AppConfig::default()
    });
    let session = SessionStore::load().unwrap_or_else(|e| {
        log::warn!("Failed to load session ({e}); starting empty");
        SessionStore::default()
    });

    // 3. Service client
    let client: Arc<dyn RemoteJobClient> = Arc::new(HttpJobClient::from_config(&config.server));
    log::info!("service at {}", config.server.base_url);

    // 4. Model listing
    match client.list_models().await {
        Ok(models) => {
            let pick = session
                .last_model_a
                .clone()
                .or_else(|| default_selector(&models));
            log::info!(
                "{} model(s) available; evaluation default: {}",
                models.len(),
                pick.map(|m| m.label()).unwrap_or_else(|| "none".into())
            );
        }
        Err(e) => log::warn!("could not list models: {e}"),
    }

    // 5. Status channel → state machine
    let machine = Arc::new(PipelineStateMachine::new(
        Arc::clone(&client),
        new_shared_pipeline(),
        session,
    ));
    let (metrics_tx, mut metrics_rx) = mpsc::channel::<SystemMetrics>(8);
    let subscription = StatusChannel::subscribe(Arc::clone(&client), config.channel.clone());
    let follower = {
        let machine = Arc::clone(&machine);
        tokio::spawn(async move { machine.follow(subscription, Some(metrics_tx)).await })
    };

    // 6. Report until Ctrl-C
    let mut reporter = Reporter::default();
    let mut ticker = tokio::time::interval(REPORT_INTERVAL);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = &mut shutdown => {
                if let Err(e) = result {
                    log::error!("failed to listen for Ctrl-C: {e}");
                }
                break;
            }
            Some(metrics) = metrics_rx.recv() => report_metrics(&metrics),
            _ = ticker.tick() => reporter.report(&machine),
        }
    }

    follower.abort();
    machine.session().save()?;
    log::info!("whisper-lab shutting down");
    Ok(())
}
