//! Resound CLI - audition audio events and stream files from the command line

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{events, file, play};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "resound")]
#[command(about = "Audition per-entity audio events", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the audio config
    #[arg(long, global = true, default_value = "audio.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured events
    Events,

    /// Post an event on a demo entity and play it to the end
    Play {
        /// Event name (e.g., "SFX/footstep")
        event: String,

        /// Stop after this many seconds
        #[arg(long, value_parser = parse_seconds)]
        seconds: Option<Duration>,

        /// Float parameter applied before posting (name=value, repeatable)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, f32)>,

        /// Emitter position relative to the listener (comma-separated x,y,z)
        #[arg(long, value_parser = parse_vec3, default_value = "0,0,-2")]
        at: [f32; 3],
    },

    /// Stream an external audio file through the custom template
    File {
        /// Audio file to play
        path: String,

        /// Use the looping template
        #[arg(long = "loop")]
        looping: bool,

        /// Stop after this many seconds
        #[arg(long, value_parser = parse_seconds)]
        seconds: Option<Duration>,
    },
}

fn parse_param(s: &str) -> Result<(String, f32), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{}'", s))?;
    let value: f32 = value.trim().parse().map_err(|e| format!("invalid value: {}", e))?;
    Ok((name.trim().to_string(), value))
}

fn parse_seconds(s: &str) -> Result<Duration, String> {
    let seconds: f64 = s.trim().parse().map_err(|e| format!("invalid seconds: {}", e))?;
    Duration::try_from_secs_f64(seconds).map_err(|_| format!("expected a non-negative duration, got '{}'", s))
}

fn parse_vec3(s: &str) -> Result<[f32; 3], String> {
    let parts: Vec<&str> = s.split(',').collect();
    if parts.len() != 3 {
        return Err(format!("expected 3 comma-separated values, got {}", parts.len()));
    }
    let x: f32 = parts[0].trim().parse().map_err(|e| format!("invalid x: {}", e))?;
    let y: f32 = parts[1].trim().parse().map_err(|e| format!("invalid y: {}", e))?;
    let z: f32 = parts[2].trim().parse().map_err(|e| format!("invalid z: {}", e))?;
    Ok([x, y, z])
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Events => events::run(&cli.config),
        Commands::Play {
            event,
            seconds,
            params,
            at,
        } => play::run(play::PlayArgs {
            config: cli.config,
            event,
            seconds,
            params,
            at,
        }),
        Commands::File {
            path,
            looping,
            seconds,
        } => file::run(file::FileArgs {
            config: cli.config,
            path,
            looping,
            seconds,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("Pitch=0.5"), Ok(("Pitch".to_string(), 0.5)));
        assert!(parse_param("Pitch").is_err());
        assert!(parse_param("Pitch=loud").is_err());
    }

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("1.5"), Ok(Duration::from_millis(1500)));
        assert_eq!(parse_seconds("0"), Ok(Duration::ZERO));
        assert!(parse_seconds("-2").is_err());
        assert!(parse_seconds("NaN").is_err());
        assert!(parse_seconds("inf").is_err());
        assert!(parse_seconds("soon").is_err());
    }

    #[test]
    fn test_cli_rejects_negative_seconds() {
        let result = Cli::try_parse_from(["resound", "play", "SFX/x", "--seconds=-1"]);
        assert!(result.is_err());

        let cli = Cli::parse_from(["resound", "play", "SFX/x", "--seconds", "0.25"]);
        assert!(matches!(cli.command, Commands::Play { seconds: Some(d), .. } if d == Duration::from_millis(250)));
    }

    #[test]
    fn test_parse_vec3() {
        assert_eq!(parse_vec3("1, 2, -3"), Ok([1.0, 2.0, -3.0]));
        assert!(parse_vec3("1,2").is_err());
    }

    #[test]
    fn test_cli_parses_file_command() {
        let cli = Cli::parse_from(["resound", "file", "boom.wav", "--loop", "--config", "a.toml"]);
        assert_eq!(cli.config, "a.toml");
        assert!(matches!(cli.command, Commands::File { looping: true, .. }));
    }
}
