//! Handles to live event instances

use crate::backend::{AudioBackend, InstanceId};

/// One instance posted by an emitter.
///
/// Validity is never stored; it is asked of the backend, which may destroy
/// the instance at any time (playback finished, engine teardown).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SoundHandle {
    instance: InstanceId,
    event: String,
    file_backed: bool,
    released: bool,
}

impl SoundHandle {
    pub(crate) fn new(instance: InstanceId, event: &str, file_backed: bool, released: bool) -> Self {
        Self {
            instance,
            event: event.to_string(),
            file_backed,
            released,
        }
    }

    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    /// Event name the instance was posted with
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether a programmer-sound binding streams a file into this instance
    pub fn is_file_backed(&self) -> bool {
        self.file_backed
    }

    /// Whether engine-side ownership was released at post time
    pub fn is_released(&self) -> bool {
        self.released
    }

    pub(crate) fn mark_released(&mut self) {
        self.released = true;
    }

    pub fn is_valid(&self, backend: &dyn AudioBackend) -> bool {
        backend.is_valid(self.instance)
    }
}
