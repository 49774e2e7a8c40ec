//! `AudioBackend` over Kira's AudioManager
//!
//! Events resolve through `AudioConfig::events`. Every instance gets its own
//! spatial sub-track so it can be moved independently. Events without a
//! `file` are programmer-sound templates: `start` asks the instance callback
//! for a sound, and `update` delivers the teardown callbacks once a released
//! instance has stopped. Programmer sounds loaded with `DecodeMode::NONBLOCKING`
//! are streamed, so Kira decodes them on its own thread. Degrades gracefully
//! when no audio device is available.

use crate::backend::{
    AudioBackend, CallbackKind, DecodeMode, EventCallback, InstanceId, ProgrammerSoundProps, SoundLoader,
    SoundRef, StopMode,
};
use crate::config::{AudioConfig, EventDefinition};
use crate::error::AudioError;
use kira::listener::ListenerHandle;
use kira::sound::static_sound::{StaticSoundData, StaticSoundHandle};
use kira::sound::streaming::{StreamingSoundData, StreamingSoundHandle};
use kira::sound::{FromFileError, PlaybackState};
use kira::track::{SpatialTrackBuilder, SpatialTrackDistances, SpatialTrackHandle};
use kira::{AudioManager, DefaultBackend, Easing, Tween};
use parking_lot::Mutex;
use resound_core::{Attributes3D, Vec3};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Smooth tween duration for parameter changes (avoids clicks)
const PARAM_TWEEN: Tween = Tween {
    duration: Duration::from_millis(16),
    easing: Easing::Linear,
    start_time: kira::StartTime::Immediate,
};

const SNAP: Tween = Tween {
    duration: Duration::ZERO,
    easing: Easing::Linear,
    start_time: kira::StartTime::Immediate,
};

/// Sound data ready to play on an instance's track
enum SoundData {
    Static(StaticSoundData),
    Streaming(StreamingSoundData<FromFileError>),
}

impl SoundData {
    fn play(
        self,
        track: &mut SpatialTrackHandle,
        volume: kira::Decibels,
        rate: kira::PlaybackRate,
        looping: bool,
    ) -> Result<PlayingSound, String> {
        match self {
            SoundData::Static(mut data) => {
                data = data.volume(volume).playback_rate(rate);
                if looping {
                    data = data.loop_region(..);
                }
                track.play(data).map(PlayingSound::Static).map_err(|e| e.to_string())
            }
            SoundData::Streaming(mut data) => {
                data = data.volume(volume).playback_rate(rate);
                if looping {
                    data = data.loop_region(..);
                }
                track.play(data).map(PlayingSound::Streaming).map_err(|e| e.to_string())
            }
        }
    }
}

enum PlayingSound {
    Static(StaticSoundHandle),
    Streaming(StreamingSoundHandle<FromFileError>),
}

impl PlayingSound {
    fn state(&self) -> PlaybackState {
        match self {
            PlayingSound::Static(handle) => handle.state(),
            PlayingSound::Streaming(handle) => handle.state(),
        }
    }

    fn stop(&mut self, tween: Tween) {
        match self {
            PlayingSound::Static(handle) => handle.stop(tween),
            PlayingSound::Streaming(handle) => handle.stop(tween),
        }
    }

    fn set_volume(&mut self, volume: kira::Decibels, tween: Tween) {
        match self {
            PlayingSound::Static(handle) => handle.set_volume(volume, tween),
            PlayingSound::Streaming(handle) => handle.set_volume(volume, tween),
        }
    }

    fn set_playback_rate(&mut self, rate: kira::PlaybackRate, tween: Tween) {
        match self {
            PlayingSound::Static(handle) => handle.set_playback_rate(rate, tween),
            PlayingSound::Streaming(handle) => handle.set_playback_rate(rate, tween),
        }
    }
}

/// One event instance living on its own spatial track
struct KiraInstance {
    event: String,
    definition: EventDefinition,
    track: SpatialTrackHandle,
    sound: Option<PlayingSound>,
    callback: Option<EventCallback>,
    props: ProgrammerSoundProps,
    started: bool,
    released: bool,
    volume: f64,
    pitch: f64,
    /// Parameters Kira has no mapping for
    extra: HashMap<String, f32>,
    labels: HashMap<String, String>,
}

impl KiraInstance {
    fn is_finished(&self) -> bool {
        match &self.sound {
            Some(sound) => sound.state() == PlaybackState::Stopped,
            None => true,
        }
    }
}

/// Kira-driven audio backend
pub struct KiraBackend {
    manager: Option<AudioManager<DefaultBackend>>,
    listener: Option<ListenerHandle>,
    config: AudioConfig,
    sound_cache: HashMap<PathBuf, StaticSoundData>,
    loader: Arc<KiraSoundLoader>,
    instances: HashMap<InstanceId, KiraInstance>,
    next_instance: u64,
}

impl KiraBackend {
    pub fn new(config: AudioConfig) -> Self {
        // Try to create the audio manager; gracefully fail if no device
        let manager = AudioManager::<DefaultBackend>::new(kira::AudioManagerSettings::default())
            .map_err(|e| log::warn!("Audio: no device available ({e}), running silent"))
            .ok();

        Self {
            manager,
            listener: None,
            config,
            sound_cache: HashMap::new(),
            loader: Arc::new(KiraSoundLoader::new()),
            instances: HashMap::new(),
            next_instance: 0,
        }
    }

    /// Whether audio is actually available
    pub fn is_available(&self) -> bool {
        self.manager.is_some()
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Last value of a float parameter with no Kira mapping
    pub fn parameter(&self, instance: InstanceId, name: &str) -> Option<f32> {
        self.instances.get(&instance)?.extra.get(name).copied()
    }

    pub fn parameter_label(&self, instance: InstanceId, name: &str) -> Option<&str> {
        self.instances
            .get(&instance)?
            .labels
            .get(name)
            .map(String::as_str)
    }

    /// Create the listener at the given position (typically the player/camera)
    pub fn create_listener(&mut self, position: Vec3) -> Result<(), AudioError> {
        let Some(manager) = &mut self.manager else {
            return Ok(());
        };

        let handle = manager
            .add_listener(to_glam_vec3(position), glam::Quat::IDENTITY)
            .map_err(|e| AudioError::Backend(format!("Failed to create listener: {e}")))?;

        self.listener = Some(handle);
        Ok(())
    }

    /// Move and orient the listener
    pub fn update_listener(&mut self, attributes: &Attributes3D) {
        let Some(listener) = &mut self.listener else {
            return;
        };

        let forward = to_glam_vec3(attributes.forward)
            .try_normalize()
            .unwrap_or(glam::Vec3::NEG_Z);
        let orientation = glam::Quat::from_rotation_arc(glam::Vec3::NEG_Z, forward);

        listener.set_position(to_glam_vec3(attributes.position), SNAP);
        listener.set_orientation(orientation, SNAP);
    }

    fn spatial_track(&mut self, def: &EventDefinition) -> Result<SpatialTrackHandle, AudioError> {
        if self.listener.is_none() {
            self.create_listener(Vec3::ZERO)?;
        }
        let manager = self.manager.as_mut().ok_or(AudioError::NoDevice)?;
        let listener_id = self
            .listener
            .as_ref()
            .map(ListenerHandle::id)
            .ok_or_else(|| AudioError::Backend("No listener created".into()))?;

        let builder = SpatialTrackBuilder::new()
            .distances(SpatialTrackDistances {
                min_distance: def.min_distance,
                max_distance: def.max_distance,
            })
            .attenuation_function(Some(Easing::OutPowf(2.0)));

        manager
            .add_spatial_sub_track(listener_id, glam::Vec3::ZERO, builder)
            .map_err(|e| AudioError::Backend(format!("Failed to create spatial track: {e}")))
    }

    /// Decoded data for a file event, loaded on first use
    fn file_sound(&mut self, path: &Path) -> Result<StaticSoundData, AudioError> {
        if let Some(data) = self.sound_cache.get(path) {
            return Ok(data.clone());
        }
        let data = StaticSoundData::from_file(path).map_err(|e| AudioError::DecodeFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        self.sound_cache.insert(path.to_path_buf(), data.clone());
        Ok(data)
    }

    /// Ask the instance's callback for a programmer sound
    fn programmer_sound(&mut self, instance: InstanceId) -> Option<SoundData> {
        let inst = self.instances.get_mut(&instance)?;
        let callback = inst.callback.clone()?;
        let mut props = std::mem::take(&mut inst.props);
        callback(CallbackKind::CreateSound, instance, &mut props);
        let data = props.sound.and_then(|sound| self.loader.take_sound(sound));
        if let Some(inst) = self.instances.get_mut(&instance) {
            inst.props = props;
        }
        data
    }

    fn get_mut(&mut self, instance: InstanceId) -> Result<&mut KiraInstance, AudioError> {
        self.instances
            .get_mut(&instance)
            .ok_or(AudioError::InvalidInstance(instance))
    }

    fn destroy(&mut self, instance: InstanceId) {
        let Some(inst) = self.instances.remove(&instance) else {
            return;
        };
        if let Some(callback) = inst.callback {
            let mut props = inst.props;
            if props.sound.is_some() {
                callback(CallbackKind::DestroySound, instance, &mut props);
            }
            callback(CallbackKind::Destroyed, instance, &mut props);
        }
        log::trace!("Audio: destroyed {instance} ('{}')", inst.event);
    }
}

impl AudioBackend for KiraBackend {
    fn create_instance(&mut self, event_name: &str) -> Result<InstanceId, AudioError> {
        let def = self
            .config
            .event(event_name)
            .cloned()
            .ok_or_else(|| AudioError::EventNotFound(event_name.to_string()))?;
        let track = self.spatial_track(&def)?;

        self.next_instance += 1;
        let id = InstanceId(self.next_instance);
        self.instances.insert(
            id,
            KiraInstance {
                event: event_name.to_string(),
                definition: def,
                track,
                sound: None,
                callback: None,
                props: ProgrammerSoundProps::default(),
                started: false,
                released: false,
                volume: 1.0,
                pitch: 1.0,
                extra: HashMap::new(),
                labels: HashMap::new(),
            },
        );
        Ok(id)
    }

    fn start(&mut self, instance: InstanceId) -> Result<(), AudioError> {
        let inst = self.get_mut(instance)?;
        if inst.started {
            return Ok(());
        }
        inst.started = true;
        let def = inst.definition.clone();

        let data = match &def.file {
            Some(path) => Some(SoundData::Static(self.file_sound(path)?)),
            None => self.programmer_sound(instance),
        };
        // A template whose load failed plays silence
        let Some(data) = data else {
            return Ok(());
        };

        let inst = self.get_mut(instance)?;
        let volume = amplitude_to_db(def.volume * inst.volume);
        let rate = kira::PlaybackRate(inst.pitch);
        let handle = data
            .play(&mut inst.track, volume, rate, def.looping)
            .map_err(|e| AudioError::Backend(format!("Failed to play '{}': {e}", inst.event)))?;
        inst.sound = Some(handle);
        Ok(())
    }

    fn stop(&mut self, instance: InstanceId, mode: StopMode) -> Result<(), AudioError> {
        let tween = match mode {
            StopMode::Immediate => SNAP,
            StopMode::AllowFadeOut => Tween {
                duration: self.config.fade_out(),
                ..Default::default()
            },
        };
        let inst = self.get_mut(instance)?;
        if let Some(handle) = &mut inst.sound {
            handle.stop(tween);
        }
        Ok(())
    }

    fn release(&mut self, instance: InstanceId) -> Result<(), AudioError> {
        self.get_mut(instance)?.released = true;
        Ok(())
    }

    fn is_valid(&self, instance: InstanceId) -> bool {
        self.instances.contains_key(&instance)
    }

    fn event_path(&self, instance: InstanceId) -> Option<String> {
        self.instances.get(&instance).map(|inst| inst.event.clone())
    }

    fn set_attributes(&mut self, instance: InstanceId, attributes: &Attributes3D) -> Result<(), AudioError> {
        let inst = self.get_mut(instance)?;
        inst.track.set_position(to_glam_vec3(attributes.position), SNAP);
        Ok(())
    }

    fn set_parameter(&mut self, instance: InstanceId, name: &str, value: f32) -> Result<(), AudioError> {
        let inst = self.get_mut(instance)?;
        match name.to_ascii_lowercase().as_str() {
            "volume" => {
                inst.volume = value as f64;
                let db = amplitude_to_db(inst.definition.volume * inst.volume);
                if let Some(handle) = &mut inst.sound {
                    handle.set_volume(db, PARAM_TWEEN);
                }
            }
            "pitch" => {
                inst.pitch = value as f64;
                if let Some(handle) = &mut inst.sound {
                    handle.set_playback_rate(kira::PlaybackRate(inst.pitch), PARAM_TWEEN);
                }
            }
            _ => {
                inst.extra.insert(name.to_string(), value);
            }
        }
        Ok(())
    }

    fn set_parameter_label(&mut self, instance: InstanceId, name: &str, label: &str) -> Result<(), AudioError> {
        self.get_mut(instance)?
            .labels
            .insert(name.to_string(), label.to_string());
        Ok(())
    }

    fn set_callback(&mut self, instance: InstanceId, callback: EventCallback) -> Result<(), AudioError> {
        self.get_mut(instance)?.callback = Some(callback);
        Ok(())
    }

    fn loader(&self) -> Arc<dyn SoundLoader> {
        self.loader.clone()
    }

    fn set_listener(&mut self, attributes: &Attributes3D) {
        if self.listener.is_none() {
            if let Err(e) = self.create_listener(attributes.position) {
                log::warn!("Audio: {e}");
                return;
            }
        }
        self.update_listener(attributes);
    }

    fn update(&mut self) {
        let done: Vec<InstanceId> = self
            .instances
            .iter()
            .filter(|(_, inst)| inst.released && inst.is_finished())
            .map(|(id, _)| *id)
            .collect();
        for id in done {
            self.destroy(id);
        }
    }
}

/// A loaded programmer sound
enum LoadedSound {
    Static(StaticSoundData),
    /// Taken by the first instance that plays it
    Streaming(Option<StreamingSoundData<FromFileError>>),
}

/// Loads files for programmer sounds.
///
/// `NONBLOCKING` opens the file for streaming and returns; the audio thread
/// decodes it during playback. Without it the whole file is decoded up front.
pub struct KiraSoundLoader {
    sounds: Mutex<HashMap<SoundRef, LoadedSound>>,
    next: AtomicU64,
}

impl Default for KiraSoundLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl KiraSoundLoader {
    pub fn new() -> Self {
        Self {
            sounds: Mutex::new(HashMap::new()),
            next: AtomicU64::new(1),
        }
    }

    /// Playable data for a live sound. A streamed sound can be taken once.
    fn take_sound(&self, sound: SoundRef) -> Option<SoundData> {
        match self.sounds.lock().get_mut(&sound)? {
            LoadedSound::Static(data) => Some(SoundData::Static(data.clone())),
            LoadedSound::Streaming(data) => data.take().map(SoundData::Streaming),
        }
    }

    pub fn is_streaming(&self, sound: SoundRef) -> bool {
        matches!(self.sounds.lock().get(&sound), Some(LoadedSound::Streaming(_)))
    }

    pub fn live_count(&self) -> usize {
        self.sounds.lock().len()
    }
}

impl SoundLoader for KiraSoundLoader {
    fn decode_file(&self, path: &Path, mode: DecodeMode) -> Result<SoundRef, AudioError> {
        log::trace!("Audio: loading '{}' ({mode:?})", path.display());
        let decode_failed = |e: FromFileError| AudioError::DecodeFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let loaded = if mode.contains(DecodeMode::NONBLOCKING) {
            LoadedSound::Streaming(Some(StreamingSoundData::from_file(path).map_err(decode_failed)?))
        } else {
            LoadedSound::Static(StaticSoundData::from_file(path).map_err(decode_failed)?)
        };
        let sound = SoundRef(self.next.fetch_add(1, Ordering::Relaxed));
        self.sounds.lock().insert(sound, loaded);
        Ok(sound)
    }

    fn release_sound(&self, sound: SoundRef) -> Result<(), AudioError> {
        self.sounds
            .lock()
            .remove(&sound)
            .map(|_| ())
            .ok_or(AudioError::UnknownSound(sound))
    }
}

/// Convert a resound Vec3 to glam
fn to_glam_vec3(v: Vec3) -> glam::Vec3 {
    glam::Vec3::new(v.x, v.y, v.z)
}

/// Convert linear amplitude (0.0 to 2.0) to decibels
fn amplitude_to_db(amplitude: f64) -> kira::Decibels {
    if amplitude <= 0.0 {
        kira::Decibels(-60.0) // silence
    } else {
        kira::Decibels((20.0 * (amplitude as f32).log10()).max(-60.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AudioConfig {
        AudioConfig::from_toml_str(
            r#"
            [events."SFX/custom"]
            [events."SFX/missing"]
            file = "/no/such/sound.ogg"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_graceful_degradation() {
        // CI environments typically have no audio device
        let mut backend = KiraBackend::new(config());
        backend.update();
        backend.set_listener(&Attributes3D::from_position(Vec3::new(0.0, 1.0, 0.0)));

        match backend.create_instance("SFX/custom") {
            Ok(id) => {
                assert!(backend.is_available());
                assert!(backend.is_valid(id));
                assert_eq!(backend.event_path(id).as_deref(), Some("SFX/custom"));

                backend.set_parameter(id, "Intensity", 0.3).unwrap();
                backend.set_parameter_label(id, "Surface", "Grass").unwrap();
                assert_eq!(backend.parameter(id, "Intensity"), Some(0.3));
                assert_eq!(backend.parameter_label(id, "Surface"), Some("Grass"));
            }
            Err(e) => {
                assert!(!backend.is_available());
                assert!(matches!(e, AudioError::NoDevice));
                assert_eq!(backend.instance_count(), 0);
            }
        }
    }

    #[test]
    fn test_unknown_event() {
        let mut backend = KiraBackend::new(config());
        let result = backend.create_instance("SFX/nope");
        assert!(matches!(result, Err(AudioError::EventNotFound(name)) if name == "SFX/nope"));
    }

    #[test]
    fn test_operations_on_unknown_instance() {
        let mut backend = KiraBackend::new(config());
        let ghost = InstanceId(42);
        assert!(!backend.is_valid(ghost));
        assert!(backend.event_path(ghost).is_none());
        assert!(matches!(backend.start(ghost), Err(AudioError::InvalidInstance(_))));
        assert!(backend.stop(ghost, StopMode::Immediate).is_err());
        assert!(backend.set_parameter(ghost, "volume", 0.5).is_err());
    }

    #[test]
    fn test_missing_file_fails_start() {
        let mut backend = KiraBackend::new(config());
        let Ok(id) = backend.create_instance("SFX/missing") else {
            return; // no device
        };
        assert!(matches!(backend.start(id), Err(AudioError::DecodeFailed { .. })));
    }

    #[test]
    fn test_released_template_without_sound_is_destroyed() {
        let mut backend = KiraBackend::new(config());
        let Ok(id) = backend.create_instance("SFX/custom") else {
            return; // no device
        };
        backend.start(id).unwrap();
        backend.update();
        assert!(backend.is_valid(id));

        backend.release(id).unwrap();
        backend.update();
        assert!(!backend.is_valid(id));
    }

    #[test]
    fn test_loader_missing_file() {
        let loader = KiraSoundLoader::new();
        let result = loader.decode_file(Path::new("/no/such/file.wav"), DecodeMode::PROGRAMMER_SOUND);
        assert!(matches!(result, Err(AudioError::DecodeFailed { .. })));
        assert!(matches!(
            loader.release_sound(SoundRef(7)),
            Err(AudioError::UnknownSound(_))
        ));
        assert_eq!(loader.live_count(), 0);
    }

    /// Write a short 16-bit mono PCM file
    fn write_wav(frames: u32) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("resound_kira_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tone.wav");

        let data_len = frames * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
        bytes.extend_from_slice(&1u16.to_le_bytes()); // mono
        bytes.extend_from_slice(&44_100u32.to_le_bytes());
        bytes.extend_from_slice(&(44_100u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames {
            let sample = if i % 100 < 50 { 8_000i16 } else { -8_000 };
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    #[test]
    fn test_nonblocking_load_streams_instead_of_decoding() {
        let path = write_wav(44_100);
        let loader = KiraSoundLoader::new();

        let sound = loader.decode_file(&path, DecodeMode::PROGRAMMER_SOUND).unwrap();
        assert!(loader.is_streaming(sound));

        // The stream is handed to one instance only
        assert!(matches!(loader.take_sound(sound), Some(SoundData::Streaming(_))));
        assert!(loader.take_sound(sound).is_none());

        loader.release_sound(sound).unwrap();
        assert_eq!(loader.live_count(), 0);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_blocking_load_decodes_up_front() {
        let path = write_wav(4_410);
        let loader = KiraSoundLoader::new();

        let sound = loader.decode_file(&path, DecodeMode::LOOP_NORMAL).unwrap();
        assert!(!loader.is_streaming(sound));
        assert!(matches!(loader.take_sound(sound), Some(SoundData::Static(_))));
        assert!(matches!(loader.take_sound(sound), Some(SoundData::Static(_))));
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_streamed_template_start_returns_playing() {
        let path = write_wav(44_100);
        let mut backend = KiraBackend::new(config());
        let Ok(id) = backend.create_instance("SFX/custom") else {
            return; // no device
        };
        let loader = backend.loader();
        let sound = loader.decode_file(&path, DecodeMode::PROGRAMMER_SOUND).unwrap();
        let callback: EventCallback = Arc::new(
            move |kind: CallbackKind, _: InstanceId, props: &mut ProgrammerSoundProps| {
                if kind == CallbackKind::CreateSound {
                    props.sound = Some(sound);
                }
            },
        );
        backend.set_callback(id, callback).unwrap();

        backend.start(id).unwrap();
        let state = backend.instances.get(&id).and_then(|inst| inst.sound.as_ref()).map(PlayingSound::state);
        assert!(matches!(state, Some(state) if state != PlaybackState::Stopped));
        backend.stop(id, StopMode::Immediate).unwrap();
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_amplitude_to_db() {
        assert_eq!(amplitude_to_db(0.0), kira::Decibels(-60.0));
        assert_eq!(amplitude_to_db(1.0), kira::Decibels(0.0));
        assert!(amplitude_to_db(0.5).0 < 0.0);
        assert_eq!(amplitude_to_db(1e-9), kira::Decibels(-60.0));
    }
}
