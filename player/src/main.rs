//! Reamp command-line player
//!
//! Plays the given files in order through the effects rack:
//!
//! ```text
//! reamp [--preset NAME] [--reverb MIX] [--config FILE] FILE...
//! ```
//!
//! Logging is controlled with `RUST_LOG` (default `reamp=info`).

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use reamp_core::{
    find_preset, AudioEngine, CpalOutput, DecoderTransport, EngineConfig, PlaybackState, Player,
    PRESETS,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Event poll interval (~60 Hz)
const POLL_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser, Debug)]
#[command(name = "reamp")]
#[command(about = "Play tracks through an EQ, delay, reverb and compressor rack", long_about = None)]
struct Args {
    /// Tracks to play, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// EQ preset (Flat, Rock, Bass, Vocal, Jazz)
    #[arg(short, long, value_parser = parse_preset)]
    preset: Option<String>,

    /// Reverb mix, 0.0 (dry) to 1.0
    #[arg(short, long)]
    reverb: Option<f32>,

    /// Engine config as JSON
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn parse_preset(name: &str) -> Result<String, String> {
    match find_preset(name) {
        Some(_) => Ok(name.to_string()),
        None => {
            let names: Vec<&str> = PRESETS.iter().map(|(name, _)| *name).collect();
            Err(format!("expected one of {}", names.join(", ")))
        }
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<EngineConfig> {
    let Some(path) = path else {
        return Ok(EngineConfig::default());
    };
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    Ok(EngineConfig::from_json(&json)?)
}

fn main() -> Result<()> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reamp=info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;

    info!("Starting Reamp");

    let transport = DecoderTransport::new(config.effects.source_buffer_frames)?;
    let engine = AudioEngine::new(config, CpalOutput::new());
    let mut player = Player::new(engine, transport);
    player.init().context("opening audio output")?;

    if let Some(name) = &args.preset {
        if !player.engine().apply_preset(name) {
            bail!("unknown preset {name}");
        }
    }
    if let Some(mix) = args.reverb {
        player.engine().set_reverb_mix(mix);
    }

    let total = args.files.len();
    player.on_track_change(move |index, track| {
        println!("[{}/{}] {}", index + 1, total, track.name());
    });
    player.on_time_update(|position| debug!("position {:.2}s", position));

    player.add_to_playlist(args.files);

    loop {
        player.poll_events();

        match player.state() {
            PlaybackState::NoTrack => break,
            // A track that failed to load or start: move on, or finish
            PlaybackState::Stopped | PlaybackState::Paused => {
                if player.playlist().next_index().is_none() {
                    break;
                }
                player.next();
            }
            _ => {}
        }

        thread::sleep(POLL_INTERVAL);
    }

    info!("Playlist finished");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_files_and_options() {
        let args = Args::try_parse_from([
            "reamp", "--preset", "Rock", "a.wav", "--reverb", "0.3", "b.mp3",
        ])
        .unwrap();
        assert_eq!(args.files, vec![PathBuf::from("a.wav"), PathBuf::from("b.mp3")]);
        assert_eq!(args.preset.as_deref(), Some("Rock"));
        assert_eq!(args.reverb, Some(0.3));
        assert!(args.config.is_none());
    }

    #[test]
    fn test_parse_requires_files() {
        assert!(Args::try_parse_from(["reamp", "--preset", "Jazz"]).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_option() {
        assert!(Args::try_parse_from(["reamp", "--loud", "a.wav"]).is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_preset() {
        let err = Args::try_parse_from(["reamp", "--preset", "Polka", "a.wav"]).unwrap_err();
        assert!(err.to_string().contains("Rock"));
        assert!(Args::try_parse_from(["reamp", "--preset", "jazz", "a.wav"]).is_ok());
    }

    #[test]
    fn test_parse_missing_value() {
        assert!(Args::try_parse_from(["reamp", "a.wav", "--reverb"]).is_err());
        assert!(Args::try_parse_from(["reamp", "a.wav", "--reverb", "lots"]).is_err());
    }

    #[test]
    fn test_default_config_without_file() {
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }
}
