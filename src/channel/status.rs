//! `StatusChannel` — pipeline snapshots over push, with polling fallback.
//!
//! ```text
//! subscribe()
//!    │
//!    ├─ bootstrap fetch ─────────────────────────▶ Status
//!    │
//!    └─ loop
//!         ├─ open_events() ─ ok ─▶ PushConnected
//!         │       │                 Status / SystemMetrics …
//!         │       └─ error / end of stream
//!         ├─ TransportLost
//!         ├─ fallback fetch ─────────────────────▶ Status
//!         └─ poll every poll_interval ───────────▶ Status …
//!               (until the next reconnect attempt, or forever)
//! ```

use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBackoff, ExponentialBuilder};
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::{ChannelConfig, ReconnectPolicy};
use crate::remote::{PushStream, RemoteJobClient};

use super::event::{decode, ChannelEvent};

/// Capacity of the event queue between the channel task and its consumer.
const EVENT_BUFFER: usize = 64;

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A live subscription.  Owns the background task; dropping it (or calling
/// [`close`](Self::close)) aborts the task.
pub struct Subscription {
    events: mpsc::Receiver<ChannelEvent>,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Next event, or `None` once the channel task has stopped.
    pub async fn recv(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// ---------------------------------------------------------------------------
// StatusChannel
// ---------------------------------------------------------------------------

pub struct StatusChannel;

impl StatusChannel {
    /// Start delivering pipeline events.  Must be called inside a tokio
    /// runtime.
    pub fn subscribe(client: Arc<dyn RemoteJobClient>, config: ChannelConfig) -> Subscription {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let task = tokio::spawn(run(client, config, tx));
        Subscription { events: rx, task }
    }
}

// ---------------------------------------------------------------------------
// Channel task
// ---------------------------------------------------------------------------

enum PushEnd {
    ReceiverGone,
    Lost { reason: String, received: bool },
}

fn backoff(policy: &ReconnectPolicy) -> ExponentialBackoff {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(policy.min_delay_ms))
        .with_max_delay(Duration::from_millis(policy.max_delay_ms))
        .with_max_times(policy.max_attempts)
        .build()
}

async fn run(
    client: Arc<dyn RemoteJobClient>,
    config: ChannelConfig,
    tx: mpsc::Sender<ChannelEvent>,
) {
    if !fetch_and_emit(client.as_ref(), &tx).await {
        return;
    }

    let mut retries = config.reconnect.as_ref().map(backoff);

    loop {
        let reason = match client.open_events().await {
            Ok(stream) => {
                log::debug!("channel: push stream open");
                if tx.send(ChannelEvent::PushConnected).await.is_err() {
                    return;
                }
                match pump(stream, &tx).await {
                    PushEnd::ReceiverGone => return,
                    PushEnd::Lost { reason, received } => {
                        // a stream that delivered events counts as a recovery
                        if received {
                            retries = config.reconnect.as_ref().map(backoff);
                        }
                        reason
                    }
                }
            }
            Err(e) => e.to_string(),
        };

        log::warn!("channel: push transport lost: {reason}");
        if tx.send(ChannelEvent::TransportLost { reason }).await.is_err() {
            return;
        }
        if !fetch_and_emit(client.as_ref(), &tx).await {
            return;
        }

        let deadline = retries
            .as_mut()
            .and_then(Iterator::next)
            .map(|delay| Instant::now() + delay);
        match deadline {
            Some(_) => log::debug!("channel: polling until next push reconnect"),
            None => log::info!("channel: falling back to polling"),
        }

        if !poll(client.as_ref(), &tx, config.poll_interval(), deadline).await {
            return;
        }
        log::debug!("channel: reconnecting push stream");
    }
}

/// Forward push events until the stream fails or ends.
async fn pump(mut stream: PushStream, tx: &mpsc::Sender<ChannelEvent>) -> PushEnd {
    let mut received = false;

    while let Some(item) = stream.next().await {
        let event = match item {
            Ok(event) => event,
            Err(e) => {
                return PushEnd::Lost {
                    reason: e.to_string(),
                    received,
                }
            }
        };
        received = true;

        match decode(&event) {
            Ok(Some(decoded)) => {
                if tx.send(decoded).await.is_err() {
                    return PushEnd::ReceiverGone;
                }
            }
            Ok(None) => log::debug!("channel: ignoring push event '{}'", event.kind),
            Err(e) => log::warn!("channel: undecodable '{}' event: {e}", event.kind),
        }
    }

    PushEnd::Lost {
        reason: "push stream closed by server".into(),
        received,
    }
}

/// Poll on `interval` until `deadline` (or forever).  Returns `false` once
/// the consumer is gone.
async fn poll(
    client: &dyn RemoteJobClient,
    tx: &mpsc::Sender<ChannelEvent>,
    interval: Duration,
    deadline: Option<Instant>,
) -> bool {
    loop {
        let next_poll = Instant::now() + interval;
        match deadline {
            Some(deadline) if deadline <= next_poll => {
                tokio::time::sleep_until(deadline).await;
                return true;
            }
            _ => {
                tokio::time::sleep_until(next_poll).await;
                if !fetch_and_emit(client, tx).await {
                    return false;
                }
            }
        }
    }
}

/// Fetch one snapshot and emit it.  Fetch failures are logged and skipped.
/// Returns `false` once the consumer is gone.
async fn fetch_and_emit(client: &dyn RemoteJobClient, tx: &mpsc::Sender<ChannelEvent>) -> bool {
    match client.pipeline_status().await {
        Ok(snapshot) => tx.send(ChannelEvent::Status(snapshot)).await.is_ok(),
        Err(e) => {
            log::warn!("channel: status fetch failed: {e}");
            !tx.is_closed()
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
