//! Audio configuration loaded from TOML
//!
//! ```toml
//! custom_event = "SFX/custom"
//! custom_loop_event = "SFX/custom_loop"
//! fade_out_ms = 250
//!
//! [events."SFX/footstep"]
//! file = "sfx/footstep.ogg"
//! volume = 0.8
//!
//! [events."SFX/custom"]          # no file: programmer-sound template
//! [events."SFX/custom_loop"]
//! looping = true
//! ```

use resound_core::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime audio settings
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// One-shot template used for streamed files
    pub custom_event: String,
    /// Looping template used for streamed files
    pub custom_loop_event: String,
    /// Prefix of voice-line events; the voice label and key are appended
    pub voice_event_prefix: String,
    /// Fade length used for `StopMode::AllowFadeOut`
    pub fade_out_ms: u64,
    /// Event definitions resolved by the Kira backend
    pub events: HashMap<String, EventDefinition>,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            custom_event: "SFX/custom".into(),
            custom_loop_event: "SFX/custom_loop".into(),
            voice_event_prefix: "Char/Voice/vo_".into(),
            fade_out_ms: 250,
            events: HashMap::new(),
        }
    }
}

impl AudioConfig {
    /// Load from a TOML file. Relative event files resolve against the
    /// file's directory.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Template event for streamed files
    pub fn custom_template(&self, looping: bool) -> &str {
        if looping {
            &self.custom_loop_event
        } else {
            &self.custom_event
        }
    }

    pub fn fade_out(&self) -> Duration {
        Duration::from_millis(self.fade_out_ms)
    }

    pub fn event(&self, name: &str) -> Option<&EventDefinition> {
        self.events.get(name)
    }

    /// Event names in sorted order
    pub fn event_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.events.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn resolve_relative(&mut self, base: &Path) {
        for def in self.events.values_mut() {
            if let Some(file) = &def.file {
                if file.is_relative() {
                    def.file = Some(base.join(file));
                }
            }
        }
    }
}

/// One playable event
#[derive(Clone, Debug, Deserialize)]
pub struct EventDefinition {
    /// Audio file to play; `None` makes this a programmer-sound template
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub looping: bool,
    #[serde(default = "default_volume")]
    pub volume: f64,
    #[serde(default = "default_min_distance")]
    pub min_distance: f32,
    #[serde(default = "default_max_distance")]
    pub max_distance: f32,
}

impl Default for EventDefinition {
    fn default() -> Self {
        Self {
            file: None,
            looping: false,
            volume: default_volume(),
            min_distance: default_min_distance(),
            max_distance: default_max_distance(),
        }
    }
}

impl EventDefinition {
    pub fn is_programmer_sound(&self) -> bool {
        self.file.is_none()
    }
}

fn default_volume() -> f64 {
    1.0
}

fn default_min_distance() -> f32 {
    1.0
}

fn default_max_distance() -> f32 {
    25.0
}
