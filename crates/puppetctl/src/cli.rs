use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "puppetctl",
    author,
    version,
    about = "Inspect puppet model packages and stage configurations"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Summarise a model manifest or archive and check every referenced file resolves.
    Inspect(InspectArgs),
    /// Validate a stage configuration and the models it declares.
    Check(CheckArgs),
    /// Print the mouth-openness envelope an audio file would drive.
    Lipsync(LipsyncArgs),
    /// Print resolved configuration paths.
    Where,
}

#[derive(Parser, Debug)]
pub struct InspectArgs {
    /// Manifest (`.model3.json`) or archive (`.zip`) path or URL.
    #[arg(value_name = "MODEL")]
    pub model: String,

    /// Emit the report as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Stage config to validate. Defaults to `stage.toml` in the config directory.
    #[arg(value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only validate the config itself; do not open the declared models.
    #[arg(long)]
    pub skip_models: bool,
}

#[derive(Parser, Debug)]
pub struct LipsyncArgs {
    /// Audio file path or URL (WAV or MP3).
    #[arg(value_name = "AUDIO")]
    pub audio: String,

    /// Sampling rate of the printed envelope, in frames per second (1-240).
    #[arg(long, value_name = "FPS", default_value_t = 30, value_parser = parse_fps)]
    pub fps: u32,

    /// Play the clip through the default output device while sampling in real time.
    #[arg(long)]
    pub play: bool,

    /// Width of the level bar drawn next to each sample.
    #[arg(long, value_name = "COLUMNS", default_value_t = 40)]
    pub width: usize,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_fps(value: &str) -> Result<u32, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("fps must not be empty".to_string());
    }

    let fps: u32 = trimmed
        .parse()
        .map_err(|_| format!("invalid frame rate '{trimmed}'; expected a whole number"))?;
    if !(1..=240).contains(&fps) {
        return Err(format!("frame rate {fps} is out of range; use 1-240"));
    }
    Ok(fps)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fps() {
        assert_eq!(parse_fps("60").unwrap(), 60);
        assert_eq!(parse_fps(" 1 ").unwrap(), 1);
        assert!(parse_fps("0").is_err());
        assert!(parse_fps("241").is_err());
        assert!(parse_fps("fast").is_err());
        assert!(parse_fps("").is_err());
    }

    #[test]
    fn inspect_takes_model_and_json_flag() {
        let cli = Cli::try_parse_from(["puppetctl", "inspect", "Haru.zip", "--json"]).unwrap();
        match cli.command {
            Command::Inspect(args) => {
                assert_eq!(args.model, "Haru.zip");
                assert!(args.json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn check_config_is_optional() {
        let cli = Cli::try_parse_from(["puppetctl", "check", "--skip-models"]).unwrap();
        match cli.command {
            Command::Check(args) => {
                assert!(args.config.is_none());
                assert!(args.skip_models);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn lipsync_defaults() {
        let cli = Cli::try_parse_from(["puppetctl", "lipsync", "voice.wav"]).unwrap();
        match cli.command {
            Command::Lipsync(args) => {
                assert_eq!(args.fps, 30);
                assert_eq!(args.width, 40);
                assert!(!args.play);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
