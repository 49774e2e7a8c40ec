//! Programmer-sound bridge: streams external files into event instances
//!
//! `post_file` binds a file path to an instance; the backend then drives the
//! binding through its callbacks:
//!
//! ```text
//! Unbound -> AwaitingLoad -> { Loaded -> Releasing -> AwaitingLoad ... } -> Freed
//! ```
//!
//! Bindings live in a table keyed by `InstanceId`. The table entry is the only
//! owner of a binding and is erased exactly when `Destroyed` arrives.
//! Callbacks may run on a thread other than the simulation tick; the table
//! lock is only held for lookups, never while decoding.

use crate::backend::{
    CallbackKind, DecodeMode, EventCallback, InstanceId, ProgrammerSoundProps, SoundLoader, SoundRef,
};
use crate::error::AudioError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Lifecycle state of a programmer-sound binding
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum BindingState {
    Unbound,
    AwaitingLoad,
    Loaded,
    Releasing,
    Freed,
}

impl BindingState {
    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: BindingState) -> bool {
        use BindingState::*;
        matches!(
            (self, next),
            (Unbound, AwaitingLoad)
                | (AwaitingLoad, Loaded)
                | (AwaitingLoad, Freed)
                | (Loaded, Releasing)
                | (Releasing, AwaitingLoad)
                | (Releasing, Freed)
        )
    }
}

/// A file bound to one instance
#[derive(Debug)]
pub struct ProgrammerSoundBinding {
    file_path: PathBuf,
    decode_mode: DecodeMode,
    loaded_sound: Option<SoundRef>,
    state: BindingState,
}

impl ProgrammerSoundBinding {
    fn new(file_path: PathBuf, decode_mode: DecodeMode) -> Self {
        Self {
            file_path,
            decode_mode,
            loaded_sound: None,
            state: BindingState::Unbound,
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn loaded_sound(&self) -> Option<SoundRef> {
        self.loaded_sound
    }

    pub fn state(&self) -> BindingState {
        self.state
    }

    fn transition(&mut self, instance: InstanceId, next: BindingState) -> Result<(), AudioError> {
        if !self.state.can_transition_to(next) {
            return Err(AudioError::InvalidTransition {
                instance,
                from: self.state,
                to: next,
            });
        }
        log::trace!("{instance}: programmer sound {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }
}

/// Owns every live programmer-sound binding and answers backend callbacks
pub struct ProgrammerSoundBridge {
    loader: Arc<dyn SoundLoader>,
    bindings: Mutex<HashMap<InstanceId, ProgrammerSoundBinding>>,
    freed: AtomicUsize,
}

impl ProgrammerSoundBridge {
    pub fn new(loader: Arc<dyn SoundLoader>) -> Self {
        Self {
            loader,
            bindings: Mutex::new(HashMap::new()),
            freed: AtomicUsize::new(0),
        }
    }

    /// Bind `file_path` to `instance`, moving it to `AwaitingLoad`.
    ///
    /// Call immediately before starting playback. A stale binding left under
    /// the same id is freed first.
    pub fn bind(
        &self,
        instance: InstanceId,
        file_path: impl Into<PathBuf>,
        decode_mode: DecodeMode,
    ) -> Result<BindingState, AudioError> {
        let mut binding = ProgrammerSoundBinding::new(file_path.into(), decode_mode);
        binding.transition(instance, BindingState::AwaitingLoad)?;

        let stale = self.bindings.lock().insert(instance, binding);
        if let Some(stale) = stale {
            log::error!("{instance}: replaced a programmer sound binding that was never freed");
            self.release_loaded(instance, stale.loaded_sound);
            self.freed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(BindingState::AwaitingLoad)
    }

    /// Build the callback to register on file-backed instances
    pub fn callback(self: &Arc<Self>) -> EventCallback {
        let bridge = Arc::clone(self);
        Arc::new(move |kind: CallbackKind, instance: InstanceId, props: &mut ProgrammerSoundProps| {
            if let Err(e) = bridge.dispatch(kind, instance, props) {
                log::error!("Audio: programmer sound callback {kind:?} failed: {e}");
            }
        })
    }

    /// Route one backend callback to its transition
    pub fn dispatch(
        &self,
        kind: CallbackKind,
        instance: InstanceId,
        props: &mut ProgrammerSoundProps,
    ) -> Result<BindingState, AudioError> {
        match kind {
            CallbackKind::CreateSound => self.create_sound(instance, props),
            CallbackKind::DestroySound => self.destroy_sound(instance, props),
            CallbackKind::Destroyed => self.destroyed(instance),
        }
    }

    fn create_sound(
        &self,
        instance: InstanceId,
        props: &mut ProgrammerSoundProps,
    ) -> Result<BindingState, AudioError> {
        let (path, mode) = {
            let mut bindings = self.bindings.lock();
            let binding = bindings
                .get_mut(&instance)
                .ok_or(AudioError::UnknownBinding(instance))?;
            // A looping instance may ask again after releasing its last sound
            if binding.state == BindingState::Releasing {
                binding.transition(instance, BindingState::AwaitingLoad)?;
            }
            if binding.state != BindingState::AwaitingLoad {
                return Err(AudioError::InvalidTransition {
                    instance,
                    from: binding.state,
                    to: BindingState::Loaded,
                });
            }
            (binding.file_path.clone(), binding.decode_mode)
        };

        let sound = match self.loader.decode_file(&path, mode) {
            Ok(sound) => sound,
            Err(e) => {
                // Leaving the output empty makes the instance play silence
                log::warn!("Audio: {instance} could not load '{}': {e}", path.display());
                props.sound = None;
                return Ok(BindingState::AwaitingLoad);
            }
        };

        let stored = {
            let mut bindings = self.bindings.lock();
            match bindings.get_mut(&instance) {
                Some(binding) => {
                    binding.transition(instance, BindingState::Loaded)?;
                    binding.loaded_sound = Some(sound);
                    true
                }
                None => false,
            }
        };
        if !stored {
            self.release_loaded(instance, Some(sound));
            return Err(AudioError::UnknownBinding(instance));
        }

        props.sound = Some(sound);
        props.subsound_index = -1;
        Ok(BindingState::Loaded)
    }

    fn destroy_sound(
        &self,
        instance: InstanceId,
        props: &mut ProgrammerSoundProps,
    ) -> Result<BindingState, AudioError> {
        let sound = {
            let mut bindings = self.bindings.lock();
            let binding = bindings
                .get_mut(&instance)
                .ok_or(AudioError::UnknownBinding(instance))?;
            if binding.state == BindingState::AwaitingLoad {
                // The load failed, so there is nothing to release
                return Ok(BindingState::AwaitingLoad);
            }
            binding.transition(instance, BindingState::Releasing)?;
            binding.loaded_sound.take()
        };
        props.sound = None;
        self.release_loaded(instance, sound);
        Ok(BindingState::Releasing)
    }

    fn destroyed(&self, instance: InstanceId) -> Result<BindingState, AudioError> {
        let Some(mut binding) = self.bindings.lock().remove(&instance) else {
            return Err(AudioError::BindingAlreadyFreed(instance));
        };

        if binding.state == BindingState::Loaded {
            log::debug!("{instance}: destroyed while its programmer sound was still loaded");
            binding.transition(instance, BindingState::Releasing)?;
            self.release_loaded(instance, binding.loaded_sound.take());
        }
        binding.transition(instance, BindingState::Freed)?;
        self.freed.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "{instance}: released programmer sound binding for '{}'",
            binding.file_path.display()
        );
        Ok(BindingState::Freed)
    }

    fn release_loaded(&self, instance: InstanceId, sound: Option<SoundRef>) {
        if let Some(sound) = sound {
            if let Err(e) = self.loader.release_sound(sound) {
                log::warn!("Audio: {instance} failed to release {sound}: {e}");
            }
        }
    }

    /// Current state of the binding for `instance`, `None` once freed
    pub fn state(&self, instance: InstanceId) -> Option<BindingState> {
        self.bindings.lock().get(&instance).map(|b| b.state)
    }

    /// Sound currently loaded for `instance`
    pub fn loaded_sound(&self, instance: InstanceId) -> Option<SoundRef> {
        self.bindings.lock().get(&instance).and_then(|b| b.loaded_sound)
    }

    /// File bound to `instance`
    pub fn file_path(&self, instance: InstanceId) -> Option<PathBuf> {
        self.bindings.lock().get(&instance).map(|b| b.file_path.clone())
    }

    /// Number of bindings not yet freed
    pub fn bound_count(&self) -> usize {
        self.bindings.lock().len()
    }

    /// Total bindings freed over the bridge's lifetime
    pub fn freed_count(&self) -> usize {
        self.freed.load(Ordering::Relaxed)
    }
}
