//! Mock backend for testing
//!
//! Records every call made against it and lets callers drive instance
//! lifetimes by hand: finish playback, destroy instances, and fire
//! programmer-sound callbacks without any audio device.

use crate::backend::{
    AudioBackend, CallbackKind, DecodeMode, EventCallback, InstanceId, ProgrammerSoundProps,
    SoundLoader, SoundRef, StopMode,
};
use crate::error::AudioError;
use parking_lot::Mutex;
use resound_core::Attributes3D;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

/// Everything the mock knows about one instance
#[derive(Default)]
pub struct MockInstance {
    pub event: String,
    pub started: bool,
    pub released: bool,
    pub finished: bool,
    /// Mode of the most recent stop, if any
    pub stop_mode: Option<StopMode>,
    pub stop_count: usize,
    pub attributes: Option<Attributes3D>,
    pub attribute_writes: usize,
    pub float_writes: Vec<(String, f32)>,
    pub label_writes: Vec<(String, String)>,
    pub props: ProgrammerSoundProps,
    /// Attribute and parameter writes fail while set
    pub rejects_writes: bool,
    callback: Option<EventCallback>,
}

impl MockInstance {
    /// Last value written for a float parameter
    pub fn float(&self, name: &str) -> Option<f32> {
        self.float_writes
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    /// Last label written for a label parameter
    pub fn label(&self, name: &str) -> Option<&str> {
        self.label_writes
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop_mode.is_some()
    }
}

/// Backend that plays nothing and remembers everything
#[derive(Default)]
pub struct MockBackend {
    events: HashSet<String>,
    instances: BTreeMap<InstanceId, MockInstance>,
    next_id: u64,
    loader: Arc<MockLoader>,
    listener: Option<Attributes3D>,
    updates: usize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that resolves the given event names
    pub fn with_events<I, S>(events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            events: events.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Use a specific loader (e.g. one with registered files)
    pub fn with_loader(mut self, loader: Arc<MockLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn add_event(&mut self, name: &str) {
        self.events.insert(name.to_string());
    }

    pub fn mock_loader(&self) -> &Arc<MockLoader> {
        &self.loader
    }

    pub fn instance(&self, id: InstanceId) -> Option<&MockInstance> {
        self.instances.get(&id)
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn update_count(&self) -> usize {
        self.updates
    }

    pub fn listener(&self) -> Option<&Attributes3D> {
        self.listener.as_ref()
    }

    /// Make every attribute and parameter write on `id` fail
    pub fn reject_writes(&mut self, id: InstanceId) {
        if let Some(inst) = self.instances.get_mut(&id) {
            inst.rejects_writes = true;
        }
    }

    /// Simulate playback reaching its end
    pub fn finish(&mut self, id: InstanceId) {
        if let Some(inst) = self.instances.get_mut(&id) {
            inst.finished = true;
        }
    }

    /// Invoke the instance's callback as the engine would.
    ///
    /// Returns the properties after the callback ran, or `None` when the
    /// instance is gone or has no callback.
    pub fn fire(&mut self, id: InstanceId, kind: CallbackKind) -> Option<ProgrammerSoundProps> {
        let inst = self.instances.get_mut(&id)?;
        let callback = inst.callback.clone()?;
        let mut props = std::mem::take(&mut inst.props);
        callback(kind, id, &mut props);
        inst.props = props.clone();
        Some(props)
    }

    /// Destroy an instance, delivering the engine's teardown callbacks
    pub fn destroy(&mut self, id: InstanceId) {
        let Some(inst) = self.instances.remove(&id) else {
            return;
        };
        if let Some(callback) = inst.callback {
            let mut props = inst.props;
            if props.sound.is_some() {
                callback(CallbackKind::DestroySound, id, &mut props);
            }
            callback(CallbackKind::Destroyed, id, &mut props);
        }
    }

    fn get_mut(&mut self, id: InstanceId) -> Result<&mut MockInstance, AudioError> {
        self.instances
            .get_mut(&id)
            .ok_or(AudioError::InvalidInstance(id))
    }

    fn writable(&mut self, id: InstanceId) -> Result<&mut MockInstance, AudioError> {
        let inst = self.get_mut(id)?;
        if inst.rejects_writes {
            return Err(AudioError::Backend(format!("{id} rejected the write")));
        }
        Ok(inst)
    }
}

impl AudioBackend for MockBackend {
    fn create_instance(&mut self, event_name: &str) -> Result<InstanceId, AudioError> {
        if !self.events.contains(event_name) {
            return Err(AudioError::EventNotFound(event_name.to_string()));
        }
        self.next_id += 1;
        let id = InstanceId(self.next_id);
        self.instances.insert(
            id,
            MockInstance {
                event: event_name.to_string(),
                ..MockInstance::default()
            },
        );
        Ok(id)
    }

    fn start(&mut self, instance: InstanceId) -> Result<(), AudioError> {
        self.get_mut(instance)?.started = true;
        Ok(())
    }

    fn stop(&mut self, instance: InstanceId, mode: StopMode) -> Result<(), AudioError> {
        let inst = self.get_mut(instance)?;
        inst.stop_mode = Some(mode);
        inst.stop_count += 1;
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
        self.instances.get(&instance).map(|i| i.event.clone())
    }

    fn set_attributes(&mut self, instance: InstanceId, attributes: &Attributes3D) -> Result<(), AudioError> {
        let inst = self.writable(instance)?;
        inst.attributes = Some(*attributes);
        inst.attribute_writes += 1;
        Ok(())
    }

    fn set_parameter(&mut self, instance: InstanceId, name: &str, value: f32) -> Result<(), AudioError> {
        self.writable(instance)?
            .float_writes
            .push((name.to_string(), value));
        Ok(())
    }

    fn set_parameter_label(&mut self, instance: InstanceId, name: &str, label: &str) -> Result<(), AudioError> {
        self.writable(instance)?
            .label_writes
            .push((name.to_string(), label.to_string()));
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
        self.listener = Some(*attributes);
    }

    fn update(&mut self) {
        self.updates += 1;
        let done: Vec<InstanceId> = self
            .instances
            .iter()
            .filter(|(_, inst)| inst.released && (inst.finished || inst.is_stopped()))
            .map(|(id, _)| *id)
            .collect();
        for id in done {
            self.destroy(id);
        }
    }
}

/// Loader that "decodes" registered paths (or files that exist on disk)
#[derive(Default)]
pub struct MockLoader {
    files: Mutex<HashSet<PathBuf>>,
    live: Mutex<HashMap<SoundRef, PathBuf>>,
    next: AtomicU64,
    decodes: AtomicUsize,
    releases: AtomicUsize,
    last_mode: Mutex<Option<DecodeMode>>,
}

impl MockLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, P>(files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let loader = Self::default();
        loader
            .files
            .lock()
            .extend(files.into_iter().map(Into::into));
        loader
    }

    pub fn add_file(&self, path: impl Into<PathBuf>) {
        self.files.lock().insert(path.into());
    }

    /// Sounds decoded and not yet released
    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Successful decodes
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::Relaxed)
    }

    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::Relaxed)
    }

    pub fn last_mode(&self) -> Option<DecodeMode> {
        *self.last_mode.lock()
    }

    pub fn path_of(&self, sound: SoundRef) -> Option<PathBuf> {
        self.live.lock().get(&sound).cloned()
    }
}

impl SoundLoader for MockLoader {
    fn decode_file(&self, path: &Path, mode: DecodeMode) -> Result<SoundRef, AudioError> {
        *self.last_mode.lock() = Some(mode);
        if !self.files.lock().contains(path) && !path.exists() {
            return Err(AudioError::DecodeFailed {
                path: path.to_path_buf(),
                message: "file not found".into(),
            });
        }
        let sound = SoundRef(self.next.fetch_add(1, Ordering::Relaxed) + 1);
        self.live.lock().insert(sound, path.to_path_buf());
        self.decodes.fetch_add(1, Ordering::Relaxed);
        Ok(sound)
    }

    fn release_sound(&self, sound: SoundRef) -> Result<(), AudioError> {
        if self.live.lock().remove(&sound).is_none() {
            return Err(AudioError::UnknownSound(sound));
        }
        self.releases.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
