//! Native audio engine capability interface
//!
//! `AudioBackend` is the seam between the per-entity lifecycle code and
//! whatever actually produces sound. `KiraBackend` drives Kira; `MockBackend`
//! records calls for tests.

use crate::error::AudioError;
use bitflags::bitflags;
use resound_core::Attributes3D;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Opaque id of one event instance inside the backend
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct InstanceId(pub u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

/// Opaque reference to a decoded sound owned by a `SoundLoader`
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct SoundRef(pub u64);

impl fmt::Display for SoundRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sound#{}", self.0)
    }
}

/// How a stop request treats the instance's release envelope
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum StopMode {
    /// Cut immediately
    #[default]
    Immediate,
    /// Let the instance fade out
    AllowFadeOut,
}

bitflags! {
    /// Flags passed to `SoundLoader::decode_file`
    #[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
    pub struct DecodeMode: u32 {
        const LOOP_NORMAL = 1 << 0;
        const CREATE_COMPRESSED_SAMPLE = 1 << 1;
        const NONBLOCKING = 1 << 2;

        /// Mode used for programmer sounds streamed from external files
        const PROGRAMMER_SOUND = Self::LOOP_NORMAL.bits()
            | Self::CREATE_COMPRESSED_SAMPLE.bits()
            | Self::NONBLOCKING.bits();
    }
}

/// Lifecycle callbacks delivered by the backend for an instance
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CallbackKind {
    /// The instance needs sample data for its programmer sound
    CreateSound,
    /// The instance no longer needs the programmer sound
    DestroySound,
    /// The instance itself is gone; final callback for this id
    Destroyed,
}

/// Properties exchanged with the backend during programmer-sound callbacks.
///
/// On `CreateSound` the callback writes `sound`; on `DestroySound` the backend
/// passes back whatever was written.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProgrammerSoundProps {
    pub sound: Option<SoundRef>,
    pub subsound_index: i32,
}

/// Callback registered per instance. May be invoked from a context other
/// than the simulation tick.
pub type EventCallback = Arc<dyn Fn(CallbackKind, InstanceId, &mut ProgrammerSoundProps) + Send + Sync>;

/// Decodes files into sounds the backend can play.
///
/// Shared with callbacks, so it must be usable from any thread.
pub trait SoundLoader: Send + Sync {
    fn decode_file(&self, path: &Path, mode: DecodeMode) -> Result<SoundRef, AudioError>;

    fn release_sound(&self, sound: SoundRef) -> Result<(), AudioError>;
}

/// Capabilities consumed from the native audio engine
pub trait AudioBackend {
    /// Instantiate an event by symbolic name
    fn create_instance(&mut self, event_name: &str) -> Result<InstanceId, AudioError>;

    fn start(&mut self, instance: InstanceId) -> Result<(), AudioError>;

    fn stop(&mut self, instance: InstanceId, mode: StopMode) -> Result<(), AudioError>;

    /// Give up engine-side ownership; the instance is destroyed once it stops
    fn release(&mut self, instance: InstanceId) -> Result<(), AudioError>;

    /// Whether the instance still exists in the engine
    fn is_valid(&self, instance: InstanceId) -> bool;

    /// Path of the event the instance was created from
    fn event_path(&self, instance: InstanceId) -> Option<String>;

    fn set_attributes(&mut self, instance: InstanceId, attributes: &Attributes3D) -> Result<(), AudioError>;

    fn set_parameter(&mut self, instance: InstanceId, name: &str, value: f32) -> Result<(), AudioError>;

    fn set_parameter_label(&mut self, instance: InstanceId, name: &str, label: &str) -> Result<(), AudioError>;

    fn set_callback(&mut self, instance: InstanceId, callback: EventCallback) -> Result<(), AudioError>;

    /// Loader used by programmer-sound callbacks
    fn loader(&self) -> Arc<dyn SoundLoader>;

    /// Move the listener that spatial instances are heard from
    fn set_listener(&mut self, _attributes: &Attributes3D) {}

    /// Pump the engine once per frame
    fn update(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_programmer_sound_mode() {
        let mode = DecodeMode::PROGRAMMER_SOUND;
        assert!(mode.contains(DecodeMode::LOOP_NORMAL));
        assert!(mode.contains(DecodeMode::CREATE_COMPRESSED_SAMPLE));
        assert!(mode.contains(DecodeMode::NONBLOCKING));
    }

    #[test]
    fn test_default_props_are_empty() {
        let props = ProgrammerSoundProps::default();
        assert!(props.sound.is_none());
        assert_eq!(props.subsound_index, 0);
    }

    #[test]
    fn test_ids_display() {
        assert_eq!(InstanceId(3).to_string(), "instance#3");
        assert_eq!(SoundRef(9).to_string(), "sound#9");
    }
}
