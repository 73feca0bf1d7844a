//! Realtime status channel.
//!
//! Delivers [`ChannelEvent`]s for the training pipeline: snapshots arrive
//! over the service's push stream when it is up and from polling the status
//! endpoint when it is not, so the consumer never has to care which.
//! Host metrics ride along on the same subscription.

pub mod event;
pub mod status;

pub use event::{decode, ChannelEvent};
pub use status::{StatusChannel, Subscription};
