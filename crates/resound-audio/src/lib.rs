//! Resound Audio - per-entity sound event lifecycle
//!
//! - `AudioBackend` - capability interface of the native engine (`KiraBackend`, `MockBackend`)
//! - `EventEmitter` - one entity's live instances, parameters, and position
//! - `ProgrammerSoundBridge` - streams external files into template events
//! - `AudioSystem` - facade resolving emitters per entity and ticking them each frame

pub mod backend;
pub mod bridge;
pub mod config;
pub mod emitter;
pub mod error;
pub mod handle;
pub mod kira_backend;
pub mod mock;
pub mod params;
pub mod voice;

pub use backend::{AudioBackend, CallbackKind, DecodeMode, InstanceId, SoundLoader, SoundRef, StopMode};
pub use bridge::{BindingState, ProgrammerSoundBridge};
pub use config::{AudioConfig, EventDefinition};
pub use emitter::EventEmitter;
pub use error::AudioError;
pub use handle::SoundHandle;
pub use kira_backend::KiraBackend;
pub use params::ParameterCache;
pub use voice::VoiceType;

use resound_core::{Attributes3D, EntityId, Vec3};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Where entities are each frame
pub trait TransformSource {
    fn world_position(&self, entity: EntityId) -> Option<Vec3>;
}

impl TransformSource for HashMap<EntityId, Vec3> {
    fn world_position(&self, entity: EntityId) -> Option<Vec3> {
        self.get(&entity).copied()
    }
}

/// Top-level audio system: one emitter per entity plus a listener-attached
/// emitter for background music
pub struct AudioSystem<B: AudioBackend> {
    backend: B,
    bridge: Arc<ProgrammerSoundBridge>,
    config: AudioConfig,
    emitters: HashMap<EntityId, EventEmitter>,
    bgm: EventEmitter,
    listener: Attributes3D,
}

impl<B: AudioBackend> AudioSystem<B> {
    pub fn new(backend: B, config: AudioConfig) -> Self {
        let bridge = Arc::new(ProgrammerSoundBridge::new(backend.loader()));
        Self {
            backend,
            bridge,
            config,
            emitters: HashMap::new(),
            bgm: EventEmitter::new(EntityId::from_raw(0)),
            listener: Attributes3D::default(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn bridge(&self) -> &Arc<ProgrammerSoundBridge> {
        &self.bridge
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    /// Emitter for `entity`, created on first use
    pub fn emitter(&mut self, entity: EntityId) -> &mut EventEmitter {
        resolve(&mut self.emitters, entity)
    }

    pub fn get_emitter(&self, entity: EntityId) -> Option<&EventEmitter> {
        self.emitters.get(&entity)
    }

    pub fn has_emitter(&self, entity: EntityId) -> bool {
        self.emitters.contains_key(&entity)
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    pub fn bgm(&self) -> &EventEmitter {
        &self.bgm
    }

    /// Post an event on an entity. `keep` holds the instance for `stop_handle`.
    pub fn post(&mut self, entity: EntityId, event: &str, keep: bool) -> Option<SoundHandle> {
        resolve(&mut self.emitters, entity).post(&mut self.backend, event, keep)
    }

    /// Stream an external file through a template event
    pub fn post_file(&mut self, entity: EntityId, template: &str, file_path: &Path, keep: bool) -> Option<SoundHandle> {
        resolve(&mut self.emitters, entity).post_file(&mut self.backend, &self.bridge, template, file_path, keep)
    }

    /// Stream an external file through the configured one-shot or looping template
    pub fn post_custom_sfx(&mut self, entity: EntityId, file_path: &Path, looping: bool, keep: bool) -> Option<SoundHandle> {
        let template = self.config.custom_template(looping).to_string();
        self.post_file(entity, &template, file_path, keep)
    }

    /// Post a voice line named after the entity's voice type, e.g. `hurt`
    pub fn post_voice(&mut self, entity: EntityId, key: &str) -> Option<SoundHandle> {
        let emitter = resolve(&mut self.emitters, entity);
        let event = voice::voice_event(&self.config.voice_event_prefix, emitter.voice(), key);
        emitter.post(&mut self.backend, &event, false)
    }

    pub fn set_voice_type(&mut self, entity: EntityId, voice: VoiceType) {
        resolve(&mut self.emitters, entity).set_voice(voice);
    }

    /// Stop paths never create an emitter; an entity without one has nothing to stop
    pub fn stop(&mut self, entity: EntityId, event: &str, mode: StopMode) -> bool {
        self.emitters
            .get_mut(&entity)
            .is_some_and(|emitter| emitter.stop(&mut self.backend, event, mode))
    }

    pub fn stop_handle(&mut self, entity: EntityId, handle: &SoundHandle, mode: StopMode) -> bool {
        self.emitters
            .get_mut(&entity)
            .is_some_and(|emitter| emitter.stop_handle(&mut self.backend, handle, mode))
    }

    pub fn stop_all(&mut self, entity: EntityId, mode: StopMode) -> usize {
        self.emitters
            .get_mut(&entity)
            .map_or(0, |emitter| emitter.stop_all(&mut self.backend, mode))
    }

    pub fn set_float(&mut self, entity: EntityId, name: &str, value: f32) {
        resolve(&mut self.emitters, entity).set_float(&mut self.backend, name, value);
    }

    pub fn set_label(&mut self, entity: EntityId, name: &str, label: &str) {
        resolve(&mut self.emitters, entity).set_label(&mut self.backend, name, label);
    }

    /// Position used by the entity's next post, before the next tick
    pub fn set_position(&mut self, entity: EntityId, position: Vec3) {
        resolve(&mut self.emitters, entity).set_position(position);
    }

    /// Stop everything the entity is playing and forget it
    pub fn destroy_entity(&mut self, entity: EntityId) {
        let Some(mut emitter) = self.emitters.remove(&entity) else {
            return;
        };
        let stopped = emitter.stop_all(&mut self.backend, StopMode::Immediate);
        emitter.release_kept(&mut self.backend);
        log::debug!("Audio: removed emitter for {entity} ({stopped} instance(s) stopped)");
    }

    /// Replace the background music with a looping external file
    pub fn play_custom_bgm(&mut self, file_path: &Path) -> Option<SoundHandle> {
        self.stop_bgm(StopMode::AllowFadeOut);
        let template = self.config.custom_template(true).to_string();
        self.bgm.set_position(self.listener.position);
        self.bgm
            .post_file(&mut self.backend, &self.bridge, &template, file_path, true)
    }

    /// Stop the background music. Returns how many instances were stopped.
    pub fn stop_bgm(&mut self, mode: StopMode) -> usize {
        let mut stopped = 0;
        for handle in self.bgm.handles().to_vec() {
            if self.bgm.stop_handle(&mut self.backend, &handle, mode) {
                stopped += 1;
            }
        }
        stopped
    }

    pub fn set_listener(&mut self, attributes: Attributes3D) {
        self.listener = attributes;
        self.backend.set_listener(&attributes);
    }

    pub fn set_listener_position(&mut self, position: Vec3) {
        let mut attributes = self.listener;
        attributes.position = position;
        self.set_listener(attributes);
    }

    /// Pump the backend, then move every emitter's instances to its entity's
    /// current position and reap finished ones.
    ///
    /// Entities missing from `transforms` keep their last position. Returns the
    /// number of handles reaped.
    pub fn tick(&mut self, transforms: &impl TransformSource) -> usize {
        self.backend.update();

        let mut reaped = 0;
        for (entity, emitter) in &mut self.emitters {
            let position = transforms
                .world_position(*entity)
                .unwrap_or_else(|| emitter.position());
            reaped += emitter.tick(&mut self.backend, position);
        }
        reaped += self.bgm.tick(&mut self.backend, self.listener.position);
        reaped
    }

    /// Stop every instance immediately and drop all emitters
    pub fn shutdown(&mut self) {
        for emitter in self.emitters.values_mut().chain(std::iter::once(&mut self.bgm)) {
            emitter.stop_all(&mut self.backend, StopMode::Immediate);
            emitter.release_kept(&mut self.backend);
        }
        self.backend.update();
        self.emitters.clear();
        log::debug!("Audio: shut down ({} binding(s) still pending)", self.bridge.bound_count());
    }
}

fn resolve(emitters: &mut HashMap<EntityId, EventEmitter>, entity: EntityId) -> &mut EventEmitter {
    emitters.entry(entity).or_insert_with(|| {
        log::debug!("Audio: created emitter for {entity}");
        EventEmitter::new(entity)
    })
}
