//! Audio error types

use crate::backend::{InstanceId, SoundRef};
use crate::bridge::BindingState;
use resound_core::ResoundError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by backends and the programmer-sound bridge.
///
/// Gameplay-facing operations never surface these; they are logged and the
/// operation degrades to silence.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Event not found: {0}")]
    EventNotFound(String),

    #[error("Invalid instance: {0}")]
    InvalidInstance(InstanceId),

    #[error("No audio device available")]
    NoDevice,

    #[error("Failed to decode '{path}': {message}")]
    DecodeFailed { path: PathBuf, message: String },

    #[error("Unknown sound: {0}")]
    UnknownSound(SoundRef),

    #[error("No programmer sound bound to {0}")]
    UnknownBinding(InstanceId),

    #[error("Programmer sound binding for {0} was already freed")]
    BindingAlreadyFreed(InstanceId),

    #[error("Invalid binding transition for {instance}: {from:?} -> {to:?}")]
    InvalidTransition {
        instance: InstanceId,
        from: BindingState,
        to: BindingState,
    },

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<AudioError> for ResoundError {
    fn from(err: AudioError) -> Self {
        ResoundError::AudioError(err.to_string())
    }
}
