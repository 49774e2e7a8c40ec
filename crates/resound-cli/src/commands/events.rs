//! Events command - lists the configured events

use super::load_config;
use anyhow::Result;

pub fn run(config_path: &str) -> Result<()> {
    let config = load_config(config_path)?;

    println!("Events ({}):", config.events.len());
    for name in config.event_names() {
        let Some(def) = config.event(name) else {
            continue;
        };
        let source = match &def.file {
            Some(path) => path.display().to_string(),
            None => "<programmer sound>".to_string(),
        };
        let looping = if def.looping { " (loop)" } else { "" };
        println!("  {}{} : {}", name, looping, source);
        println!(
            "    volume {:.2}, distance {:.1} .. {:.1}",
            def.volume, def.min_distance, def.max_distance
        );
    }

    println!();
    println!("Custom templates: {} / {}", config.custom_event, config.custom_loop_event);
    println!("Voice prefix: {}", config.voice_event_prefix);
    Ok(())
}
