//! Per-entity event lifecycle
//!
//! An `EventEmitter` owns every instance one entity has posted, the entity's
//! parameter cache, and its last known position. It never holds the backend;
//! each operation borrows it for the duration of the call.

use crate::backend::{
    AudioBackend, CallbackKind, DecodeMode, EventCallback, InstanceId, ProgrammerSoundProps, StopMode,
};
use crate::bridge::ProgrammerSoundBridge;
use crate::handle::SoundHandle;
use crate::params::ParameterCache;
use crate::voice::VoiceType;
use resound_core::{Attributes3D, EntityId, Vec3};
use std::path::Path;
use std::sync::Arc;

/// Audio state of one entity
#[derive(Debug)]
pub struct EventEmitter {
    entity: EntityId,
    handles: Vec<SoundHandle>,
    params: ParameterCache,
    attributes: Attributes3D,
    voice: VoiceType,
}

impl EventEmitter {
    pub fn new(entity: EntityId) -> Self {
        Self {
            entity,
            handles: Vec::new(),
            params: ParameterCache::new(),
            attributes: Attributes3D::default(),
            voice: VoiceType::default(),
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn voice(&self) -> VoiceType {
        self.voice
    }

    pub fn set_voice(&mut self, voice: VoiceType) {
        self.voice = voice;
    }

    pub fn position(&self) -> Vec3 {
        self.attributes.position
    }

    /// Position used for the next post; live instances pick it up on `tick`
    pub fn set_position(&mut self, position: Vec3) {
        self.attributes.position = position;
    }

    pub fn attributes(&self) -> &Attributes3D {
        &self.attributes
    }

    pub fn params(&self) -> &ParameterCache {
        &self.params
    }

    /// Handles in post order, including any not yet observed invalid
    pub fn handles(&self) -> &[SoundHandle] {
        &self.handles
    }

    /// Number of tracked handles
    pub fn active_count(&self) -> usize {
        self.handles.len()
    }

    /// Post an event by name.
    ///
    /// With `keep` unset the instance is released right after starting and
    /// destroys itself when playback ends.
    pub fn post(&mut self, backend: &mut dyn AudioBackend, event: &str, keep: bool) -> Option<SoundHandle> {
        let instance = self.create(backend, event)?;
        self.register(backend, instance, lifecycle_callback(self.entity));
        self.prepare(backend, instance);
        self.launch(backend, instance, event, false, keep)
    }

    /// Post a template event whose programmer sound streams `file_path`
    pub fn post_file(
        &mut self,
        backend: &mut dyn AudioBackend,
        bridge: &Arc<ProgrammerSoundBridge>,
        template: &str,
        file_path: &Path,
        keep: bool,
    ) -> Option<SoundHandle> {
        if !file_path.exists() {
            log::warn!(
                "Audio: {} posting missing file '{}'",
                self.entity,
                file_path.display()
            );
        }

        let instance = self.create(backend, template)?;
        self.register(backend, instance, bridge.callback());
        self.prepare(backend, instance);
        if let Err(e) = bridge.bind(instance, file_path, DecodeMode::PROGRAMMER_SOUND) {
            log::error!("Audio: {instance} could not bind '{}': {e}", file_path.display());
        }
        self.launch(backend, instance, template, true, keep)
    }

    /// Stop the oldest valid instance of `event`. Returns whether one was found.
    pub fn stop(&mut self, backend: &mut dyn AudioBackend, event: &str, mode: StopMode) -> bool {
        let found = self.handles.iter().find(|handle| {
            backend.is_valid(handle.instance())
                && backend.event_path(handle.instance()).as_deref() == Some(event)
        });
        let Some(instance) = found.map(SoundHandle::instance) else {
            log::debug!("Audio: {} has no live '{event}' to stop", self.entity);
            return false;
        };
        if let Err(e) = backend.stop(instance, mode) {
            log::debug!("Audio: failed to stop {instance}: {e}");
        }
        true
    }

    /// Stop one specific instance this emitter posted.
    ///
    /// A kept instance is released as well so the engine can destroy it.
    pub fn stop_handle(&mut self, backend: &mut dyn AudioBackend, handle: &SoundHandle, mode: StopMode) -> bool {
        let Some(owned) = self
            .handles
            .iter_mut()
            .find(|h| h.instance() == handle.instance())
        else {
            return false;
        };
        if !owned.is_valid(backend) {
            return false;
        }
        if let Err(e) = backend.stop(owned.instance(), mode) {
            log::debug!("Audio: failed to stop {}: {e}", owned.instance());
            return false;
        }
        if !owned.is_released() {
            match backend.release(owned.instance()) {
                Ok(()) => owned.mark_released(),
                Err(e) => log::debug!("Audio: failed to release {}: {e}", owned.instance()),
            }
        }
        true
    }

    /// Stop every valid instance. Returns how many were stopped.
    pub fn stop_all(&mut self, backend: &mut dyn AudioBackend, mode: StopMode) -> usize {
        let mut stopped = 0;
        for handle in &self.handles {
            if !handle.is_valid(backend) {
                continue;
            }
            match backend.stop(handle.instance(), mode) {
                Ok(()) => stopped += 1,
                Err(e) => log::debug!("Audio: failed to stop {}: {e}", handle.instance()),
            }
        }
        stopped
    }

    /// Release every kept instance so the engine destroys it once stopped
    pub fn release_kept(&mut self, backend: &mut dyn AudioBackend) -> usize {
        let mut released = 0;
        for handle in &mut self.handles {
            if handle.is_released() || !handle.is_valid(backend) {
                continue;
            }
            match backend.release(handle.instance()) {
                Ok(()) => {
                    handle.mark_released();
                    released += 1;
                }
                Err(e) => log::debug!("Audio: failed to release {}: {e}", handle.instance()),
            }
        }
        released
    }

    /// Cache a float parameter and push it to every valid instance
    pub fn set_float(&mut self, backend: &mut dyn AudioBackend, name: &str, value: f32) {
        self.params.set_float(name, value);
        for handle in &self.handles {
            if !handle.is_valid(backend) {
                continue;
            }
            if let Err(e) = backend.set_parameter(handle.instance(), name, value) {
                log::debug!("Audio: {} rejected '{name}': {e}", handle.instance());
            }
        }
    }

    /// Cache a label parameter and push it to every valid instance
    pub fn set_label(&mut self, backend: &mut dyn AudioBackend, name: &str, label: &str) {
        self.params.set_label(name, label);
        for handle in &self.handles {
            if !handle.is_valid(backend) {
                continue;
            }
            if let Err(e) = backend.set_parameter_label(handle.instance(), name, label) {
                log::debug!("Audio: {} rejected '{name}': {e}", handle.instance());
            }
        }
    }

    /// Per-frame sync: move valid instances to `position` and drop the rest.
    ///
    /// Returns the number of handles reaped.
    pub fn tick(&mut self, backend: &mut dyn AudioBackend, position: Vec3) -> usize {
        self.attributes.position = position;

        let mut dead = Vec::new();
        for handle in &self.handles {
            if !handle.is_valid(backend) {
                dead.push(handle.instance());
                continue;
            }
            if let Err(e) = backend.set_attributes(handle.instance(), &self.attributes) {
                log::debug!("Audio: {} rejected attributes: {e}", handle.instance());
            }
        }

        if !dead.is_empty() {
            self.handles.retain(|h| !dead.contains(&h.instance()));
            log::trace!("Audio: {} reaped {} finished instance(s)", self.entity, dead.len());
        }
        dead.len()
    }

    fn create(&self, backend: &mut dyn AudioBackend, event: &str) -> Option<InstanceId> {
        match backend.create_instance(event) {
            Ok(instance) => Some(instance),
            Err(e) => {
                log::warn!("Audio: {} could not post '{event}': {e}", self.entity);
                None
            }
        }
    }

    fn register(&self, backend: &mut dyn AudioBackend, instance: InstanceId, callback: EventCallback) {
        if let Err(e) = backend.set_callback(instance, callback) {
            log::debug!("Audio: {instance} rejected callback: {e}");
        }
    }

    fn prepare(&self, backend: &mut dyn AudioBackend, instance: InstanceId) {
        if let Err(e) = backend.set_attributes(instance, &self.attributes) {
            log::debug!("Audio: {instance} rejected attributes: {e}");
        }
        self.params.apply_to(backend, instance);
    }

    fn launch(
        &mut self,
        backend: &mut dyn AudioBackend,
        instance: InstanceId,
        event: &str,
        file_backed: bool,
        keep: bool,
    ) -> Option<SoundHandle> {
        if let Err(e) = backend.start(instance) {
            log::warn!("Audio: failed to start '{event}' on {}: {e}", self.entity);
        }
        if !keep {
            if let Err(e) = backend.release(instance) {
                log::debug!("Audio: failed to release {instance}: {e}");
            }
        }
        let handle = SoundHandle::new(instance, event, file_backed, !keep);
        self.handles.push(handle.clone());
        Some(handle)
    }
}

fn lifecycle_callback(entity: EntityId) -> EventCallback {
    Arc::new(move |kind: CallbackKind, instance: InstanceId, _: &mut ProgrammerSoundProps| {
        log::trace!("Audio: {entity} {instance} callback {kind:?}");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::BindingState;
    use crate::mock::{MockBackend, MockLoader};

    fn setup() -> (MockBackend, EventEmitter) {
        let backend = MockBackend::with_events(["SFX/x", "SFX/y", "SFX/custom", "SFX/custom_loop"]);
        (backend, EventEmitter::new(EntityId::new()))
    }

    #[test]
    fn test_post_starts_and_releases() {
        let (mut backend, mut emitter) = setup();
        emitter.set_position(Vec3::new(1.0, 2.0, 3.0));

        let handle = emitter.post(&mut backend, "SFX/x", false).unwrap();
        let inst = backend.instance(handle.instance()).unwrap();
        assert!(inst.started);
        assert!(inst.released);
        assert!(inst.has_callback());
        assert_eq!(inst.attributes.unwrap().position, Vec3::new(1.0, 2.0, 3.0));
        assert!(!handle.is_file_backed());
        assert_eq!(emitter.active_count(), 1);
    }

    #[test]
    fn test_keep_skips_release() {
        let (mut backend, mut emitter) = setup();
        let handle = emitter.post(&mut backend, "SFX/x", true).unwrap();
        assert!(!backend.instance(handle.instance()).unwrap().released);
        assert!(!handle.is_released());
    }

    #[test]
    fn test_unknown_event_returns_none() {
        let (mut backend, mut emitter) = setup();
        assert!(emitter.post(&mut backend, "SFX/nope", false).is_none());
        assert_eq!(emitter.active_count(), 0);
        assert_eq!(backend.instance_count(), 0);
    }

    #[test]
    fn test_cached_parameters_reach_new_instance() {
        let (mut backend, mut emitter) = setup();
        emitter.set_float(&mut backend, "Pitch", 0.5);
        emitter.set_label(&mut backend, "Surface", "Grass");

        let handle = emitter.post(&mut backend, "SFX/x", false).unwrap();
        let inst = backend.instance(handle.instance()).unwrap();
        assert_eq!(inst.float("Pitch"), Some(0.5));
        assert_eq!(inst.label("Surface"), Some("Grass"));
        assert_eq!(inst.float_writes.len(), 1);
        assert_eq!(inst.label_writes.len(), 1);
    }

    #[test]
    fn test_set_float_pushes_to_live_instances() {
        let (mut backend, mut emitter) = setup();
        let a = emitter.post(&mut backend, "SFX/x", false).unwrap();
        let b = emitter.post(&mut backend, "SFX/y", false).unwrap();
        backend.destroy(b.instance());

        emitter.set_float(&mut backend, "Intensity", 0.8);
        assert_eq!(backend.instance(a.instance()).unwrap().float("Intensity"), Some(0.8));
        assert_eq!(emitter.params().float("Intensity"), Some(0.8));
    }

    #[test]
    fn test_set_label_pushes_to_live_instances() {
        let (mut backend, mut emitter) = setup();
        let a = emitter.post(&mut backend, "SFX/x", true).unwrap();
        let b = emitter.post(&mut backend, "SFX/y", true).unwrap();
        let gone = emitter.post(&mut backend, "SFX/x", false).unwrap();
        backend.destroy(gone.instance());

        emitter.set_label(&mut backend, "Surface", "Gravel");
        assert_eq!(backend.instance(a.instance()).unwrap().label("Surface"), Some("Gravel"));
        assert_eq!(backend.instance(b.instance()).unwrap().label("Surface"), Some("Gravel"));
        assert_eq!(emitter.params().label("Surface"), Some("Gravel"));
    }

    #[test]
    fn test_rejected_writes_do_not_stop_the_rest() {
        let (mut backend, mut emitter) = setup();
        let a = emitter.post(&mut backend, "SFX/x", true).unwrap();
        let b = emitter.post(&mut backend, "SFX/y", true).unwrap();
        backend.reject_writes(a.instance());

        emitter.set_float(&mut backend, "Intensity", 0.4);
        emitter.set_label(&mut backend, "Surface", "Snow");
        assert_eq!(emitter.tick(&mut backend, Vec3::new(2.0, 0.0, 0.0)), 0);

        let rejected = backend.instance(a.instance()).unwrap();
        assert!(rejected.float_writes.is_empty());
        assert!(rejected.label_writes.is_empty());
        let accepted = backend.instance(b.instance()).unwrap();
        assert_eq!(accepted.float("Intensity"), Some(0.4));
        assert_eq!(accepted.label("Surface"), Some("Snow"));
        assert_eq!(accepted.attributes.unwrap().position, Vec3::new(2.0, 0.0, 0.0));
        assert_eq!(emitter.active_count(), 2);
    }

    #[test]
    fn test_stop_hits_oldest_match_only() {
        let (mut backend, mut emitter) = setup();
        let first = emitter.post(&mut backend, "SFX/x", false).unwrap();
        let second = emitter.post(&mut backend, "SFX/x", false).unwrap();

        assert!(emitter.stop(&mut backend, "SFX/x", StopMode::Immediate));
        assert_eq!(
            backend.instance(first.instance()).unwrap().stop_mode,
            Some(StopMode::Immediate)
        );
        assert!(!backend.instance(second.instance()).unwrap().is_stopped());
        assert!(second.is_valid(&backend));
    }

    #[test]
    fn test_stop_skips_dead_match() {
        let (mut backend, mut emitter) = setup();
        let first = emitter.post(&mut backend, "SFX/x", false).unwrap();
        let second = emitter.post(&mut backend, "SFX/x", false).unwrap();
        backend.destroy(first.instance());

        assert!(emitter.stop(&mut backend, "SFX/x", StopMode::AllowFadeOut));
        assert_eq!(
            backend.instance(second.instance()).unwrap().stop_mode,
            Some(StopMode::AllowFadeOut)
        );
    }

    #[test]
    fn test_stop_requires_exact_name() {
        let (mut backend, mut emitter) = setup();
        emitter.post(&mut backend, "SFX/x", false).unwrap();
        assert!(!emitter.stop(&mut backend, "SFX/", StopMode::Immediate));
        assert!(!emitter.stop(&mut backend, "SFX/y", StopMode::Immediate));
    }

    #[test]
    fn test_stop_all_skips_invalid() {
        let (mut backend, mut emitter) = setup();
        let a = emitter.post(&mut backend, "SFX/x", false).unwrap();
        let b = emitter.post(&mut backend, "SFX/y", false).unwrap();
        let c = emitter.post(&mut backend, "SFX/x", false).unwrap();
        backend.destroy(b.instance());

        assert_eq!(emitter.stop_all(&mut backend, StopMode::Immediate), 2);
        assert!(backend.instance(a.instance()).unwrap().is_stopped());
        assert!(backend.instance(c.instance()).unwrap().is_stopped());
    }

    #[test]
    fn test_stop_handle_releases_kept_instance() {
        let (mut backend, mut emitter) = setup();
        let held = emitter.post(&mut backend, "SFX/x", true).unwrap();

        assert!(emitter.stop_handle(&mut backend, &held, StopMode::AllowFadeOut));
        let inst = backend.instance(held.instance()).unwrap();
        assert!(inst.released);
        assert_eq!(inst.stop_mode, Some(StopMode::AllowFadeOut));

        backend.update();
        assert!(!held.is_valid(&backend));
        assert!(!emitter.stop_handle(&mut backend, &held, StopMode::Immediate));
    }

    #[test]
    fn test_stop_handle_ignores_foreign_handle() {
        let (mut backend, mut emitter) = setup();
        let mut other = EventEmitter::new(EntityId::new());
        let theirs = other.post(&mut backend, "SFX/x", true).unwrap();
        assert!(!emitter.stop_handle(&mut backend, &theirs, StopMode::Immediate));
        assert!(!backend.instance(theirs.instance()).unwrap().is_stopped());
    }

    #[test]
    fn test_release_kept_only_touches_kept() {
        let (mut backend, mut emitter) = setup();
        emitter.post(&mut backend, "SFX/x", false).unwrap();
        let held = emitter.post(&mut backend, "SFX/x", true).unwrap();

        assert_eq!(emitter.release_kept(&mut backend), 1);
        assert!(backend.instance(held.instance()).unwrap().released);
        assert!(emitter.handles().iter().all(SoundHandle::is_released));
        assert_eq!(emitter.release_kept(&mut backend), 0);
    }

    #[test]
    fn test_tick_moves_live_and_reaps_dead() {
        let (mut backend, mut emitter) = setup();
        let a = emitter.post(&mut backend, "SFX/x", false).unwrap();
        let b = emitter.post(&mut backend, "SFX/y", false).unwrap();
        let c = emitter.post(&mut backend, "SFX/x", false).unwrap();
        backend.finish(a.instance());
        backend.finish(c.instance());
        backend.update();

        let target = Vec3::new(5.0, 0.0, -2.0);
        assert_eq!(emitter.tick(&mut backend, target), 2);
        assert_eq!(emitter.active_count(), 1);
        assert_eq!(emitter.handles()[0].instance(), b.instance());
        assert_eq!(
            backend.instance(b.instance()).unwrap().attributes.unwrap().position,
            target
        );
        assert_eq!(emitter.position(), target);
        assert!(emitter.handles().iter().all(|h| h.is_valid(&backend)));
    }

    #[test]
    fn test_post_file_binds_before_start() {
        let loader = Arc::new(MockLoader::with_files(["boom.wav"]));
        let mut backend = MockBackend::with_events(["SFX/custom"]).with_loader(loader.clone());
        let bridge = Arc::new(ProgrammerSoundBridge::new(backend.loader()));
        let mut emitter = EventEmitter::new(EntityId::new());

        let handle = emitter
            .post_file(&mut backend, &bridge, "SFX/custom", Path::new("boom.wav"), false)
            .unwrap();
        let id = handle.instance();
        assert!(handle.is_file_backed());
        assert!(backend.instance(id).unwrap().started);
        assert_eq!(bridge.state(id), Some(BindingState::AwaitingLoad));

        let props = backend.fire(id, CallbackKind::CreateSound).unwrap();
        assert!(props.sound.is_some());
        assert_eq!(bridge.state(id), Some(BindingState::Loaded));

        backend.finish(id);
        backend.update();
        assert_eq!(bridge.state(id), None);
        assert_eq!(bridge.freed_count(), 1);
        assert_eq!(loader.live_count(), 0);
    }

    #[test]
    fn test_post_file_applies_cached_state() {
        let loader = Arc::new(MockLoader::with_files(["step.ogg"]));
        let mut backend = MockBackend::with_events(["SFX/custom"]).with_loader(loader);
        let bridge = Arc::new(ProgrammerSoundBridge::new(backend.loader()));
        let mut emitter = EventEmitter::new(EntityId::new());
        emitter.set_position(Vec3::new(-4.0, 0.0, 6.0));
        emitter.set_float(&mut backend, "Pitch", 1.2);
        emitter.set_label(&mut backend, "Surface", "Wood");

        let handle = emitter
            .post_file(&mut backend, &bridge, "SFX/custom", Path::new("step.ogg"), false)
            .unwrap();
        let inst = backend.instance(handle.instance()).unwrap();
        assert_eq!(inst.float_writes, vec![("Pitch".to_string(), 1.2)]);
        assert_eq!(inst.label_writes, vec![("Surface".to_string(), "Wood".to_string())]);
        assert_eq!(inst.attributes.unwrap().position, Vec3::new(-4.0, 0.0, 6.0));
        assert!(inst.started);
    }

    #[test]
    fn test_post_file_missing_still_posts() {
        let mut backend = MockBackend::with_events(["SFX/custom"]);
        let bridge = Arc::new(ProgrammerSoundBridge::new(backend.loader()));
        let mut emitter = EventEmitter::new(EntityId::new());

        let handle = emitter
            .post_file(&mut backend, &bridge, "SFX/custom", Path::new("/no/such/file.wav"), false)
            .unwrap();
        let props = backend.fire(handle.instance(), CallbackKind::CreateSound).unwrap();
        assert!(props.sound.is_none());
        assert_eq!(bridge.state(handle.instance()), Some(BindingState::AwaitingLoad));
    }
}
