//! Typed events delivered by the status channel.

use crate::remote::{
    PipelineSnapshot, PushEvent, SystemMetrics, EVENT_SYSTEM_STATS, EVENT_TRAINING_STATUS,
};

/// What a [`Subscription`](super::Subscription) yields, whatever transport
/// produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// A complete pipeline snapshot from push, bootstrap or poll.
    Status(PipelineSnapshot),
    /// Host metrics, forwarded untouched.
    SystemMetrics(SystemMetrics),
    /// The push stream is open; snapshots now arrive as the service sends
    /// them.
    PushConnected,
    /// The push stream failed or ended.  Snapshots keep coming from polling.
    TransportLost { reason: String },
}

/// Decode one raw push event.
///
/// Returns `Ok(None)` for event kinds the channel does not know.
pub fn decode(event: &PushEvent) -> Result<Option<ChannelEvent>, serde_json::Error> {
    match event.kind.as_str() {
        EVENT_TRAINING_STATUS => {
            let snapshot: PipelineSnapshot = serde_json::from_str(&event.data)?;
            Ok(Some(ChannelEvent::Status(snapshot)))
        }
        EVENT_SYSTEM_STATS => {
            let value: serde_json::Value = serde_json::from_str(&event.data)?;
            Ok(Some(ChannelEvent::SystemMetrics(SystemMetrics(value))))
        }
        _ => Ok(None),
    }
}
