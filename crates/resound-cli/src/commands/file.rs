//! File command - streams an external file through the custom template

use super::{load_config, run_until_silent};
use anyhow::Result;
use resound_audio::{AudioSystem, KiraBackend};
use resound_core::{EntityId, Vec3};
use std::path::Path;
use std::time::Duration;

pub struct FileArgs {
    pub config: String,
    pub path: String,
    pub looping: bool,
    pub seconds: Option<Duration>,
}

pub fn run(args: FileArgs) -> Result<()> {
    let config = load_config(&args.config)?;
    let backend = KiraBackend::new(config.clone());
    if !backend.is_available() {
        println!("Warning: no audio device, running silent");
    }
    let mut audio = AudioSystem::new(backend, config);
    audio.set_listener_position(Vec3::ZERO);

    let entity = EntityId::new();
    let position = Vec3::new(0.0, 0.0, -1.0);
    audio.set_position(entity, position);

    // A looping file never finishes on its own; keep it so it can be stopped
    if audio
        .post_custom_sfx(entity, Path::new(&args.path), args.looping, args.looping)
        .is_none()
    {
        anyhow::bail!("Failed to post '{}'", args.path);
    }
    println!("Streaming: {}{}", args.path, if args.looping { " (loop)" } else { "" });

    let limit = args.seconds;
    if args.looping && limit.is_none() {
        println!("Looping until interrupted (Ctrl+C)");
    }
    run_until_silent(&mut audio, entity, position, limit);
    Ok(())
}
