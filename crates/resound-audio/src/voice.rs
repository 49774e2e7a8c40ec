//! Character voice categories

use serde::{Deserialize, Serialize};

/// Voice category of an entity; selects which voice-line bank is used
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceType {
    #[default]
    Duck,
    Robot,
    Wolf,
    Human,
    Mute,
}

impl VoiceType {
    /// Lowercase label used in event names
    pub fn label(&self) -> &'static str {
        match self {
            VoiceType::Duck => "duck",
            VoiceType::Robot => "robot",
            VoiceType::Wolf => "wolf",
            VoiceType::Human => "human",
            VoiceType::Mute => "mute",
        }
    }
}

/// Event name for a voice line, e.g. `Char/Voice/vo_duck_hurt`
pub fn voice_event(prefix: &str, voice: VoiceType, key: &str) -> String {
    format!("{prefix}{}_{key}", voice.label())
}
