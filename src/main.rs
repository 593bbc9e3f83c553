use crate::AppError::ConfigError;
use clap::Parser;
use config::Config;
use gp5_reader::{parse_gp_reader, GpError, Song};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

mod config;

fn main() {
    let result = main_result();
    std::process::exit(match result {
        Ok(()) => 0,
        Err(err) => {
            // use Display instead of Debug for user friendly error messages
            log::error!("{err}");
            1
        }
    });
}

pub fn main_result() -> Result<(), AppError> {
    // setup logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("gp5_reader=info"))
        .init();

    // args
    let args = CliArgs::parse();

    // read local config
    let local_config = Config::read_config()?;

    // check if tab file exists
    let tab_file_path = local_config.resolve_tab_path(PathBuf::from(args.tab_file_path));
    if !tab_file_path.exists() {
        let err = ConfigError(format!("Tab file not found {tab_file_path:?}"));
        return Err(err);
    }
    log::info!("Decoding tab file {tab_file_path:?}");

    let file = File::open(&tab_file_path)?;
    let song = parse_gp_reader(BufReader::new(file))?;

    if args.json {
        let json = serde_json::to_string_pretty(&song)
            .map_err(|err| AppError::OtherError(format!("Could not serialize song {err:}")))?;
        println!("{json}");
    } else {
        print_summary(&song);
    }
    Ok(())
}

fn print_summary(song: &Song) {
    let info = &song.song_info;
    println!("{} - {} ({})", info.artist, info.title, song.version);
    println!(
        "Tempo: {} bpm, key: {}, measures: {}",
        song.tempo.value,
        song.key_signature,
        song.measure_headers.len()
    );
    for track in &song.tracks {
        let beat_count: usize = track
            .measures
            .iter()
            .flat_map(|m| &m.voices)
            .map(|v| v.beats.len())
            .sum();
        println!(
            "Track {}: {} ({} strings{}), {beat_count} beats",
            track.number,
            track.name,
            track.strings.len(),
            if track.percussion { ", percussion" } else { "" }
        );
    }
}

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    /// Path to the Guitar Pro 5 file, relative paths fall back to the configured tabs folder.
    #[arg(long)]
    tab_file_path: String,
    /// Print the whole decoded song as JSON.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    ConfigError(String),
    #[error("parsing error: {0}")]
    ParsingError(GpError),
    #[error("other error: {0}")]
    OtherError(String),
}

impl From<GpError> for AppError {
    fn from(error: GpError) -> Self {
        match error {
            GpError::ConfigError(s) => Self::ConfigError(s),
            GpError::IoError(s) => Self::OtherError(s),
            e => Self::ParsingError(e),
        }
    }
}

impl From<io::Error> for AppError {
    fn from(error: io::Error) -> Self {
        Self::OtherError(error.to_string())
    }
}
