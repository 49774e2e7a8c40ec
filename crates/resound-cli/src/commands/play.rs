//! Play command - posts one event on a demo entity

use super::{load_config, run_until_silent};
use anyhow::Result;
use resound_audio::{AudioSystem, KiraBackend};
use resound_core::{EntityId, Vec3};
use std::time::Duration;

pub struct PlayArgs {
    pub config: String,
    pub event: String,
    pub seconds: Option<Duration>,
    pub params: Vec<(String, f32)>,
    pub at: [f32; 3],
}

pub fn run(args: PlayArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    if config.event(&args.event).is_none() {
        anyhow::bail!("Event not found in '{}': {}", args.config, args.event);
    }

    let backend = KiraBackend::new(config.clone());
    if !backend.is_available() {
        println!("Warning: no audio device, running silent");
    }
    let mut audio = AudioSystem::new(backend, config);
    audio.set_listener_position(Vec3::ZERO);

    let entity = EntityId::new();
    let position = Vec3::from_array(args.at);
    audio.set_position(entity, position);
    for (name, value) in &args.params {
        audio.set_float(entity, name, *value);
    }

    if audio.post(entity, &args.event, false).is_none() {
        anyhow::bail!("Failed to post '{}'", args.event);
    }
    println!("Playing: {}", args.event);

    run_until_silent(&mut audio, entity, position, args.seconds);
    Ok(())
}
