use crate::parser::decoder_base::{DecoderBase, SongReader};
use crate::parser::gp_version::GpVersion;
use crate::parser::music_parser::MusicParser;
use crate::parser::primitive_parser::{parse_u32, skip, GpResult};
use crate::parser::song_parser::{
    apply_directions, parse_directions, parse_info, parse_key_signature, parse_lyrics,
    parse_measure_headers, parse_midi_channels, parse_page_setup, parse_tempo, RseMasterEffect,
    Song,
};
use crate::GpError;
use nom::Parser;
use std::io::Read;

pub const GP5_00: &str = "FICHIER GUITAR PRO v5.00";
pub const GP5_10: &str = "FICHIER GUITAR PRO v5.10";

/// Reserved block between the lyrics and the page setup.
const RESERVED_AFTER_LYRICS: usize = 19;

/// Layout differences between the 5.00 and 5.10 files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gp5Capabilities {
    pub tempo_hidden_flag: bool,
    pub leading_byte_on_every_track: bool,
    pub tracks_trailer_len: usize,
    pub rse_effect_number_as_int: bool,
    pub rse_equalizer_and_effect: bool,
    pub mix_table_padding_byte: bool,
    pub mix_table_hide_tempo: bool,
    pub mix_table_rse_effect: bool,
}

impl Gp5Capabilities {
    pub const fn for_version(version: &GpVersion) -> Self {
        let initial_release = version.minor() == 0;
        Gp5Capabilities {
            tempo_hidden_flag: !initial_release,
            leading_byte_on_every_track: initial_release,
            tracks_trailer_len: if initial_release { 2 } else { 1 },
            rse_effect_number_as_int: !initial_release,
            rse_equalizer_and_effect: !initial_release,
            mix_table_padding_byte: initial_release,
            mix_table_hide_tempo: !initial_release,
            mix_table_rse_effect: !initial_release,
        }
    }
}

/// Decoder for Guitar Pro 5.x files.
#[derive(Debug, Clone)]
pub struct Gp5Parser {
    base: DecoderBase,
}

impl Default for Gp5Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Gp5Parser {
    pub fn new() -> Self {
        // both constants are well-formed tags
        let supported_versions = [GP5_00, GP5_10]
            .into_iter()
            .filter_map(|v| GpVersion::parse(v).ok())
            .collect();
        Gp5Parser {
            base: DecoderBase::new(supported_versions),
        }
    }

    /// Version of the last file whose header was accepted.
    pub const fn version(&self) -> Option<&GpVersion> {
        self.base.version()
    }

    fn parse_song<'a>(&mut self, i: &'a [u8]) -> GpResult<'a, Song> {
        let (i, version) = self.base.read_and_validate_version(i)?;
        let caps = Gp5Capabilities::for_version(&version);
        log::debug!("Capabilities: {caps:?}");

        let (i, (song_info, lyrics)) = (parse_info, parse_lyrics).parse(i)?;
        let i = skip(i, RESERVED_AFTER_LYRICS)?;
        let (i, (page_setup, tempo, key_signature, octave)) =
            (parse_page_setup, parse_tempo(caps), parse_key_signature, parse_u32).parse(i)?;
        let (i, (midi_channels, directions, master_reverb)) =
            (parse_midi_channels, parse_directions, parse_u32).parse(i)?;
        let (i, (measure_count, track_count)) = (parse_u32, parse_u32).parse(i)?;
        log::debug!("Measure count: {measure_count}, track count: {track_count}");

        let (i, mut measure_headers) = parse_measure_headers(i, measure_count, tempo.value)?;
        apply_directions(&mut measure_headers, &directions);

        let song = Song {
            version,
            song_info,
            lyrics,
            page_setup,
            tempo,
            key_signature,
            octave,
            master_effect: RseMasterEffect {
                reverb: master_reverb,
            },
            measure_headers,
            tracks: vec![],
        };

        let mut parser = MusicParser::new(song, midi_channels, caps);
        let (i, ()) = parser.parse_music_data(i, track_count as usize)?;
        Ok((i, parser.into_song()))
    }
}

impl SongReader for Gp5Parser {
    fn read_song(&mut self, data: &[u8]) -> Result<Song, GpError> {
        let (rest, song) = self.parse_song(data).map_err(|err| {
            let err = GpError::from(err);
            log::error!("Failed to decode GP5 data: {err}");
            err
        })?;
        if !rest.is_empty() {
            log::debug!("{} trailing bytes after the last measure", rest.len());
        }
        Ok(song)
    }
}

/// Decode a complete Guitar Pro 5 file image.
pub fn parse_gp_data(file_data: &[u8]) -> Result<Song, GpError> {
    Gp5Parser::new().read_song(file_data)
}

/// Decode a Guitar Pro 5 file from any byte stream, read to its end first.
pub fn parse_gp_reader(mut reader: impl Read) -> Result<Song, GpError> {
    let mut file_data = Vec::new();
    reader.read_to_end(&mut file_data)?;
    parse_gp_data(&file_data)
}
