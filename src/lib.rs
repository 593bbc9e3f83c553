//! gp5-reader - Guitar Pro 5 tablature decoder
//!
//! This library provides:
//! - Decoding of Guitar Pro 5.00 and 5.10 (.gp5) files into a score model
//! - Version tag parsing and validation
//!
//! # Example
//!
//! ```no_run
//! use gp5_reader::parse_gp_data;
//!
//! let file_data = std::fs::read("song.gp5").unwrap();
//! let song = parse_gp_data(&file_data).unwrap();
//! println!("{} by {}", song.song_info.title, song.song_info.artist);
//! ```

pub mod error;
pub mod parser;

// Re-export main types for convenience
pub use error::GpError;
pub use parser::decoder_base::SongReader;
pub use parser::gp5_parser::{parse_gp_data, parse_gp_reader, Gp5Parser};
pub use parser::gp_version::GpVersion;
pub use parser::song_parser::{
    Beat, BeatEffects, Chord, Duration, DurationValue, KeySignature, Measure, MeasureHeader,
    MidiChannel, Note, NoteEffect, Song, SongInfo, Tempo, TimeSignature, Track, Voice,
    QUARTER_TIME,
};
