//! Client-side orchestration for a remote Whisper inference and fine-tuning
//! service: batch evaluation of audio samples and tracking of the training
//! pipeline over push and poll.

pub mod channel;
pub mod config;
pub mod evaluate;
pub mod pipeline;
pub mod remote;

use std::sync::{Mutex, MutexGuard};

/// Lock `mutex`, taking over the data if a previous holder panicked.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
