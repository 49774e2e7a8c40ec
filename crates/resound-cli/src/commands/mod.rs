//! CLI command implementations

pub mod events;
pub mod file;
pub mod play;

use anyhow::{Context, Result};
use resound_audio::{AudioBackend, AudioConfig, AudioSystem, EventDefinition, StopMode};
use resound_core::{EntityId, Vec3};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_millis(16);

/// Load the config, falling back to defaults when the file is absent.
///
/// The custom templates are always defined so files can be streamed without
/// any config at all.
pub fn load_config(path: &str) -> Result<AudioConfig> {
    let mut config = if Path::new(path).exists() {
        AudioConfig::load(path).with_context(|| format!("Failed to load audio config '{}'", path))?
    } else {
        log::warn!("Audio config '{}' not found, using defaults", path);
        AudioConfig::default()
    };

    let one_shot = config.custom_event.clone();
    let looping = config.custom_loop_event.clone();
    config.events.entry(one_shot).or_default();
    config.events.entry(looping).or_insert_with(|| EventDefinition {
        looping: true,
        ..EventDefinition::default()
    });
    Ok(config)
}

/// Tick the system until `entity` has nothing left playing or `limit` elapses,
/// then fade out whatever remains.
pub fn run_until_silent<B: AudioBackend>(
    audio: &mut AudioSystem<B>,
    entity: EntityId,
    position: Vec3,
    limit: Option<Duration>,
) {
    let transforms = HashMap::from([(entity, position)]);
    let started = Instant::now();

    loop {
        audio.tick(&transforms);
        let active = audio
            .get_emitter(entity)
            .map(|e| e.active_count())
            .unwrap_or(0);
        if active == 0 {
            break;
        }
        if limit.is_some_and(|limit| started.elapsed() >= limit) {
            let stopped = audio.stop_all(entity, StopMode::AllowFadeOut);
            log::info!("Time limit reached, fading out {} instance(s)", stopped);
            break;
        }
        std::thread::sleep(FRAME);
    }

    // Let the fade finish before tearing down
    let fade_end = Instant::now() + audio.config().fade_out();
    while Instant::now() < fade_end {
        audio.tick(&transforms);
        std::thread::sleep(FRAME);
    }
    audio.shutdown();
}
