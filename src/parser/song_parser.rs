use crate::parser::decoder_base::DecoderBase;
use crate::parser::gp5_parser::Gp5Capabilities;
use crate::parser::gp_version::GpVersion;
use crate::parser::primitive_parser::{
    parse_bool, parse_byte_size_string, parse_i8, parse_int, parse_int_byte_sized_string,
    parse_int_sized_string, parse_short, parse_u16, parse_u32, parse_u8, skip, GpResult,
};
use crate::GpError;
use nom::combinator::{cond, flat_map, map};
use nom::multi::count;
use nom::Parser;
use serde::Serialize;
use std::fmt;

// GP4 docs at <https://dguitar.sourceforge.net/GP4format.html>
// GP5 docs thanks to Tuxguitar and <https://github.com/slundi/guitarpro> for the help

pub const MAX_VOICES: usize = 2;

pub const QUARTER_TIME: u32 = 960;

pub const MIDI_CHANNEL_COUNT: usize = 64;
pub const DEFAULT_PERCUSSION_CHANNEL: u8 = 9;

pub const LYRICS_LINE_COUNT: usize = 5;
pub const TRACK_NAME_SIZE: usize = 40;
pub const TUNING_SLOT_COUNT: usize = 7;

pub const BEND_EFFECT_MAX_POSITION_LENGTH: f32 = 12.0;
pub const SEMITONE_LENGTH: f32 = 1.0;
pub const GP_BEND_SEMITONE: f32 = 25.0;
pub const GP_BEND_POSITION: f32 = 60.0;

pub const MIN_VELOCITY: i16 = 15;
pub const VELOCITY_INCREMENT: i16 = 16;
pub const DEFAULT_VELOCITY: i16 = MIN_VELOCITY + VELOCITY_INCREMENT * 5; // FORTE

/// Convert Guitar Pro dynamic value to raw MIDI velocity
pub const fn convert_velocity(v: i16) -> i16 {
    MIN_VELOCITY + (VELOCITY_INCREMENT * v) - VELOCITY_INCREMENT
}

/// Failure for an enumerated field holding an unknown value.
pub(crate) fn invalid_value(field: &'static str, value: impl Into<i64>) -> nom::Err<GpError> {
    let value = value.into();
    log::error!("Invalid {field} value: {value}");
    nom::Err::Failure(GpError::invalid_value(field, value))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Song {
    pub version: GpVersion,
    pub song_info: SongInfo,
    pub lyrics: Lyrics,
    pub page_setup: PageSetup,
    pub tempo: Tempo,
    pub key_signature: KeySignature,
    pub octave: u32,
    pub master_effect: RseMasterEffect,
    pub measure_headers: Vec<MeasureHeader>,
    pub tracks: Vec<Track>,
}

impl Song {
    /// Total length of the song in ticks.
    pub fn length(&self) -> u64 {
        self.measure_headers
            .iter()
            .map(|header| u64::from(header.length()))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SongInfo {
    pub title: String,
    pub subtitle: String,
    pub artist: String,
    pub album: String,
    pub lyrics_writer: String,
    pub music_writer: String,
    pub copyright: String,
    pub tab_author: String,
    pub instructions: String,
    pub comments: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LyricLine {
    pub starting_measure: u32,
    pub lyrics: String,
}

impl LyricLine {
    pub fn new(starting_measure: u32, lyrics: &str) -> Self {
        LyricLine {
            starting_measure,
            lyrics: lyrics.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Lyrics {
    pub track_number: u32,
    pub lines: Vec<LyricLine>,
}

/// Bit set of the elements printed in page headers and footers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderFooterElements(pub u16);

impl HeaderFooterElements {
    pub const NONE: Self = Self(0x0000);
    pub const TITLE: Self = Self(0x0001);
    pub const SUBTITLE: Self = Self(0x0002);
    pub const ARTIST: Self = Self(0x0004);
    pub const ALBUM: Self = Self(0x0008);
    pub const WORDS_BY: Self = Self(0x0010);
    pub const MUSIC_BY: Self = Self(0x0020);
    pub const WORDS_AND_MUSIC_BY: Self = Self(0x0040);
    pub const COPYRIGHT: Self = Self(0x0080);
    pub const PAGE_NUMBER: Self = Self(0x0100);
    pub const ALL: Self = Self(0x01FF);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageSetup {
    pub width: u32,
    pub height: u32,
    pub margin_left: u32,
    pub margin_right: u32,
    pub margin_top: u32,
    pub margin_bottom: u32,
    pub score_size_proportion: f32,
    pub header_and_footer: HeaderFooterElements,
    pub title: String,
    pub subtitle: String,
    pub artist: String,
    pub album: String,
    pub words: String,
    pub music: String,
    pub words_and_music: String,
    pub copyright: String,
    pub page_number: String,
}

impl Default for PageSetup {
    fn default() -> Self {
        PageSetup {
            width: 210,
            height: 297,
            margin_left: 10,
            margin_right: 10,
            margin_top: 15,
            margin_bottom: 10,
            score_size_proportion: 1.0,
            header_and_footer: HeaderFooterElements::ALL,
            title: "%TITLE%".to_string(),
            subtitle: "%SUBTITLE%".to_string(),
            artist: "%ARTIST%".to_string(),
            album: "%ALBUM%".to_string(),
            words: "Words by %WORDS%".to_string(),
            music: "Music by %MUSIC%".to_string(),
            words_and_music: "Words & Music by %WORDSMUSIC%".to_string(),
            copyright: "Copyright %COPYRIGHT%\nAll Rights Reserved - International Copyright Secured"
                .to_string(),
            page_number: "Page %N%/%P%".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tempo {
    pub name: String,
    pub value: u32,
    pub hidden: bool,
}

impl Default for Tempo {
    fn default() -> Self {
        Tempo {
            name: String::new(),
            value: 120,
            hidden: false,
        }
    }
}

/// Key signature as the number of sharps (positive) or flats (negative).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(i8)]
pub enum KeySignature {
    FMajorFlat = -8,
    CMajorFlat = -7,
    GMajorFlat = -6,
    DMajorFlat = -5,
    AMajorFlat = -4,
    EMajorFlat = -3,
    BMajorFlat = -2,
    FMajor = -1,
    #[default]
    CMajor = 0,
    GMajor = 1,
    DMajor = 2,
    AMajor = 3,
    EMajor = 4,
    BMajor = 5,
    FMajorSharp = 6,
    CMajorSharp = 7,
    GMajorSharp = 8,
}

pub const KEY_SIGNATURES: [&str; 17] = [
    "F♭ major", "C♭ major", "G♭ major", "D♭ major", "A♭ major", "E♭ major", "B♭ major", "F major",
    "C major", "G major", "D major", "A major", "E major", "B major", "F# major", "C# major",
    "G# major",
];

impl KeySignature {
    pub const fn from_root(root: i8) -> Option<Self> {
        let key = match root {
            -8 => Self::FMajorFlat,
            -7 => Self::CMajorFlat,
            -6 => Self::GMajorFlat,
            -5 => Self::DMajorFlat,
            -4 => Self::AMajorFlat,
            -3 => Self::EMajorFlat,
            -2 => Self::BMajorFlat,
            -1 => Self::FMajor,
            0 => Self::CMajor,
            1 => Self::GMajor,
            2 => Self::DMajor,
            3 => Self::AMajor,
            4 => Self::EMajor,
            5 => Self::BMajor,
            6 => Self::FMajorSharp,
            7 => Self::CMajorSharp,
            8 => Self::GMajorSharp,
            _ => return None,
        };
        Some(key)
    }

    pub const fn root(self) -> i8 {
        self as i8
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let index = (8 + self.root()) as usize;
        write!(f, "{}", KEY_SIGNATURES[index])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MidiChannel {
    pub channel: u8,
    pub effect_channel: u8,
    pub instrument: i32,
    pub volume: i16,
    pub balance: i16,
    pub chorus: i16,
    pub reverb: i16,
    pub phaser: i16,
    pub tremolo: i16,
    pub bank: u8,
}

impl MidiChannel {
    pub const fn is_percussion_channel(&self) -> bool {
        self.channel % 16 == DEFAULT_PERCUSSION_CHANNEL
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RseMasterEffect {
    pub reverb: u32,
}

/// Note value, the discriminant is the fraction of a whole note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize)]
#[repr(u8)]
pub enum DurationValue {
    Whole = 1,
    Half = 2,
    #[default]
    Quarter = 4,
    Eighth = 8,
    Sixteenth = 16,
    ThirtySecond = 32,
    SixtyFourth = 64,
    HundredTwentyEighth = 128,
}

impl DurationValue {
    pub const fn from_value(value: i64) -> Option<Self> {
        let v = match value {
            1 => Self::Whole,
            2 => Self::Half,
            4 => Self::Quarter,
            8 => Self::Eighth,
            16 => Self::Sixteenth,
            32 => Self::ThirtySecond,
            64 => Self::SixtyFourth,
            128 => Self::HundredTwentyEighth,
            _ => return None,
        };
        Some(v)
    }

    /// Beat durations are stored as `value = 2^(exponent + 2)`, from -2 (whole) to 5 (128th).
    pub const fn from_exponent(exponent: i8) -> Option<Self> {
        if exponent < -2 || exponent > 5 {
            return None;
        }
        Self::from_value(1 << (exponent + 2))
    }

    pub const fn value(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tuplet {
    pub enters: u8,
    pub times: u8,
}

impl Tuplet {
    pub const fn new(enters: u8, times: u8) -> Self {
        Tuplet { enters, times }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Duration {
    pub value: DurationValue,
    pub dotted: bool,
    pub double_dotted: bool,
    pub tuplet: Option<Tuplet>,
}

impl Duration {
    pub fn new(value: DurationValue) -> Self {
        Duration {
            value,
            ..Default::default()
        }
    }

    /// Actual length in ticks, a quarter note being `QUARTER_TIME`.
    pub fn calc_time(&self) -> u32 {
        let mut time = QUARTER_TIME * 4 / u32::from(self.value.value());
        if self.dotted {
            time += time / 2;
        } else if self.double_dotted {
            time += time * 3 / 4;
        }
        match self.tuplet {
            Some(tuplet) => time * u32::from(tuplet.times) / u32::from(tuplet.enters),
            None => time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSignature {
    pub numerator: i8,
    pub denominator: Duration,
    pub beams: [u8; 4],
}

impl Default for TimeSignature {
    fn default() -> Self {
        TimeSignature {
            numerator: 4,
            denominator: Duration::default(),
            beams: [2, 2, 2, 2],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub const fn rgb(&self) -> u32 {
        (self.red as u32) << 16 | (self.green as u32) << 8 | self.blue as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Marker {
    pub title: String,
    pub color: Color,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TripletFeel {
    #[default]
    None,
    Eighth,
    Sixteenth,
}

/// Navigation signs, the first five mark a target, the others jump to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DirectionSign {
    Coda,
    DoubleCoda,
    Segno,
    SegnoSegno,
    Fine,
    DaCapo,
    DaCapoAlCoda,
    DaCapoAlDoubleCoda,
    DaCapoAlFine,
    DaSegno,
    DaSegnoAlCoda,
    DaSegnoAlDoubleCoda,
    DaSegnoAlFine,
    DaSegnoSegno,
    DaSegnoSegnoAlCoda,
    DaSegnoSegnoAlDoubleCoda,
    DaSegnoSegnoAlFine,
    DaCoda,
    DaDoubleCoda,
}

impl DirectionSign {
    /// Wire order of the navigation table.
    pub const ALL: [DirectionSign; 19] = [
        Self::Coda,
        Self::DoubleCoda,
        Self::Segno,
        Self::SegnoSegno,
        Self::Fine,
        Self::DaCapo,
        Self::DaCapoAlCoda,
        Self::DaCapoAlDoubleCoda,
        Self::DaCapoAlFine,
        Self::DaSegno,
        Self::DaSegnoAlCoda,
        Self::DaSegnoAlDoubleCoda,
        Self::DaSegnoAlFine,
        Self::DaSegnoSegno,
        Self::DaSegnoSegnoAlCoda,
        Self::DaSegnoSegnoAlDoubleCoda,
        Self::DaSegnoSegnoAlFine,
        Self::DaCoda,
        Self::DaDoubleCoda,
    ];

    pub const fn is_from(self) -> bool {
        !matches!(
            self,
            Self::Coda | Self::DoubleCoda | Self::Segno | Self::SegnoSegno | Self::Fine
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Coda => "Coda",
            Self::DoubleCoda => "Double Coda",
            Self::Segno => "Segno",
            Self::SegnoSegno => "Segno Segno",
            Self::Fine => "Fine",
            Self::DaCapo => "Da Capo",
            Self::DaCapoAlCoda => "Da Capo al Coda",
            Self::DaCapoAlDoubleCoda => "Da Capo al Double Coda",
            Self::DaCapoAlFine => "Da Capo al Fine",
            Self::DaSegno => "Da Segno",
            Self::DaSegnoAlCoda => "Da Segno al Coda",
            Self::DaSegnoAlDoubleCoda => "Da Segno al Double Coda",
            Self::DaSegnoAlFine => "Da Segno al Fine",
            Self::DaSegnoSegno => "Da Segno Segno",
            Self::DaSegnoSegnoAlCoda => "Da Segno Segno al Coda",
            Self::DaSegnoSegnoAlDoubleCoda => "Da Segno Segno al Double Coda",
            Self::DaSegnoSegnoAlFine => "Da Segno Segno al Fine",
            Self::DaCoda => "Da Coda",
            Self::DaDoubleCoda => "Da Double Coda",
        }
    }
}

impl fmt::Display for DirectionSign {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasureHeader {
    /// 1-based position in the song
    pub number: u32,
    pub start: u32,
    pub time_signature: TimeSignature,
    pub key_signature: KeySignature,
    pub tempo: u32,
    pub marker: Option<Marker>,
    pub repeat_open: bool,
    pub repeat_alternative: u8,
    /// zero-based repeat count, -1 when the measure closes no repeat
    pub repeat_close: i8,
    pub double_bar: bool,
    pub triplet_feel: TripletFeel,
    pub direction: Option<DirectionSign>,
    pub from_direction: Option<DirectionSign>,
}

impl Default for MeasureHeader {
    fn default() -> Self {
        MeasureHeader {
            number: 1,
            start: QUARTER_TIME,
            time_signature: TimeSignature::default(),
            key_signature: KeySignature::CMajor,
            tempo: 120,
            marker: None,
            repeat_open: false,
            repeat_alternative: 0,
            repeat_close: -1,
            double_bar: false,
            triplet_feel: TripletFeel::None,
            direction: None,
            from_direction: None,
        }
    }
}

impl MeasureHeader {
    pub fn length(&self) -> u32 {
        let numerator = u32::try_from(self.time_signature.numerator).unwrap_or(0);
        numerator * self.time_signature.denominator.calc_time()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuitarString {
    /// 1-based, 1 is the highest string
    pub number: u8,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TrackSettings {
    pub tablature: bool,
    pub notation: bool,
    pub diagrams_are_below: bool,
    pub show_rhythm: bool,
    pub force_horizontal: bool,
    pub force_channels: bool,
    pub diagram_list: bool,
    pub diagrams_in_score: bool,
    pub auto_let_ring: bool,
    pub auto_brush: bool,
    pub extend_rhythmic: bool,
}

impl TrackSettings {
    pub const fn from_flags(flags: u16) -> Self {
        // 0x0100 is not assigned
        TrackSettings {
            tablature: flags & 0x0001 != 0,
            notation: flags & 0x0002 != 0,
            diagrams_are_below: flags & 0x0004 != 0,
            show_rhythm: flags & 0x0008 != 0,
            force_horizontal: flags & 0x0010 != 0,
            force_channels: flags & 0x0020 != 0,
            diagram_list: flags & 0x0040 != 0,
            diagrams_in_score: flags & 0x0080 != 0,
            auto_let_ring: flags & 0x0200 != 0,
            auto_brush: flags & 0x0400 != 0,
            extend_rhythmic: flags & 0x0800 != 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Accentuation {
    #[default]
    None,
    VerySoft,
    Soft,
    Medium,
    Strong,
    VeryStrong,
}

impl Accentuation {
    pub const fn from_value(value: u8) -> Option<Self> {
        let a = match value {
            0 => Self::None,
            1 => Self::VerySoft,
            2 => Self::Soft,
            3 => Self::Medium,
            4 => Self::Strong,
            5 => Self::VeryStrong,
            _ => return None,
        };
        Some(a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RseInstrument {
    pub instrument: i32,
    pub unknown: i32,
    pub sound_bank: i32,
    pub effect_number: i32,
    pub effect: String,
    pub effect_category: String,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct RseEqualizer {
    /// in dB
    pub knobs: Vec<f32>,
    pub gain: f32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct TrackRse {
    pub humanize: u8,
    pub auto_accentuation: Accentuation,
    pub instrument: RseInstrument,
    pub equalizer: Option<RseEqualizer>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Track {
    pub number: u32,
    pub name: String,
    pub percussion: bool,
    pub twelve_stringed_guitar: bool,
    pub banjo: bool,
    pub visible: bool,
    pub solo: bool,
    pub mute: bool,
    pub use_rse: bool,
    pub indicate_tuning: bool,
    pub strings: Vec<GuitarString>,
    pub port: i32,
    pub channel: Option<MidiChannel>,
    pub fret_count: i32,
    pub offset: i32,
    pub color: Color,
    pub settings: TrackSettings,
    pub rse: TrackRse,
    pub measures: Vec<Measure>,
}

impl Default for Track {
    fn default() -> Self {
        Track {
            number: 1,
            name: String::new(),
            percussion: false,
            twelve_stringed_guitar: false,
            banjo: false,
            visible: true,
            solo: false,
            mute: false,
            use_rse: false,
            indicate_tuning: false,
            strings: vec![],
            port: 1,
            channel: None,
            fret_count: 24,
            offset: 0,
            color: Color::default(),
            settings: TrackSettings::default(),
            rse: TrackRse::default(),
            measures: vec![],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LineBreak {
    #[default]
    None,
    Break,
    Protect,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Measure {
    pub track_index: usize,
    pub header_index: usize,
    pub voices: Vec<Voice>,
    pub line_break: LineBreak,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Voice {
    pub beats: Vec<Beat>,
}

impl Voice {
    /// Most recent beat starting at `start`, created at the end of the voice if none.
    pub fn beat_at(&mut self, start: u32) -> &mut Beat {
        let index = match self.beats.iter().rposition(|b| b.start == start) {
            Some(index) => index,
            None => {
                self.beats.push(Beat {
                    start,
                    ..Default::default()
                });
                self.beats.len() - 1
            }
        };
        &mut self.beats[index]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BeatStatus {
    Empty,
    #[default]
    Normal,
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum VoiceDirection {
    #[default]
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TupletBracket {
    #[default]
    None,
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Octave {
    #[default]
    None,
    Ottava,
    Quindicesima,
    OttavaBassa,
    QuindicesimaBassa,
}

impl Octave {
    pub const fn from_value(value: u8) -> Option<Self> {
        let o = match value {
            0 => Self::None,
            1 => Self::Ottava,
            2 => Self::Quindicesima,
            3 => Self::OttavaBassa,
            4 => Self::QuindicesimaBassa,
            _ => return None,
        };
        Some(o)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BeatDisplay {
    pub break_beam: bool,
    pub force_beam: bool,
    pub beam_direction: VoiceDirection,
    pub tuplet_bracket: TupletBracket,
    pub break_secondary: u8,
    pub break_secondary_tuplet: bool,
    pub force_bracket: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BeatStrokeDirection {
    #[default]
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BeatStroke {
    pub direction: BeatStrokeDirection,
    /// note value of the stroke, 0 without stroke
    pub value: u8,
}

impl BeatStroke {
    fn stroke_value(value: i8) -> u8 {
        let duration = match value {
            1 => DurationValue::HundredTwentyEighth,
            2 => DurationValue::SixtyFourth,
            3 => DurationValue::ThirtySecond,
            4 => DurationValue::Sixteenth,
            5 => DurationValue::Eighth,
            6 => DurationValue::Quarter,
            _ => DurationValue::SixtyFourth,
        };
        duration.value()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SlapEffect {
    #[default]
    None,
    Tapping,
    Slapping,
    Popping,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MixTableItem {
    pub value: i8,
    pub duration: i8,
    pub all_tracks: bool,
}

impl MixTableItem {
    pub const fn new(value: i8) -> Self {
        MixTableItem {
            value,
            duration: 0,
            all_tracks: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WahEffect {
    pub value: i8,
    pub display: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MixTableChange {
    pub instrument: Option<MixTableItem>,
    pub rse: RseInstrument,
    pub volume: Option<MixTableItem>,
    pub balance: Option<MixTableItem>,
    pub chorus: Option<MixTableItem>,
    pub reverb: Option<MixTableItem>,
    pub phaser: Option<MixTableItem>,
    pub tremolo: Option<MixTableItem>,
    pub tempo_name: String,
    pub tempo: Option<i32>,
    pub tempo_duration: i8,
    pub hide_tempo: bool,
    pub use_rse: bool,
    pub wah: Option<WahEffect>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BeatEffects {
    pub stroke: BeatStroke,
    pub rasgueado: bool,
    pub pick_stroke: BeatStrokeDirection,
    pub chord: Option<Chord>,
    pub fade_in: bool,
    pub tremolo_bar: Option<BendEffect>,
    pub mix_table_change: Option<MixTableChange>,
    pub slap: SlapEffect,
    pub vibrato: bool,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Beat {
    pub notes: Vec<Note>,
    pub duration: Duration,
    pub text: String,
    pub start: u32,
    pub effect: BeatEffects,
    pub octave: Octave,
    pub display: BeatDisplay,
    pub status: BeatStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Fingering {
    Unknown,
    Open,
    Thumb,
    Index,
    Middle,
    Annular,
    Little,
}

impl Fingering {
    pub const fn from_value(value: i8) -> Option<Self> {
        let f = match value {
            -2 => Self::Unknown,
            -1 => Self::Open,
            0 => Self::Thumb,
            1 => Self::Index,
            2 => Self::Middle,
            3 => Self::Annular,
            4 => Self::Little,
            _ => return None,
        };
        Some(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Barre {
    pub fret: u8,
    pub start: u8,
    pub end: u8,
}

/// Fields only present in the new chord diagram layout.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ChordDetails {
    pub sharp: bool,
    pub root: u8,
    pub chord_type: u8,
    pub extension: u8,
    pub bass: i32,
    pub tonality: i32,
    pub add: bool,
    pub fifth: u8,
    pub ninth: u8,
    pub eleventh: u8,
    pub barres: Vec<Barre>,
    pub omissions: Vec<bool>,
    pub fingerings: Vec<Fingering>,
    pub show: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chord {
    pub name: String,
    pub first_fret: i32,
    /// fret per string, -1 when the string is not fingered
    pub strings: Vec<i32>,
    pub details: Option<ChordDetails>,
}

impl Chord {
    pub fn new(string_count: usize) -> Self {
        Chord {
            name: String::new(),
            first_fret: 0,
            strings: vec![-1; string_count],
            details: None,
        }
    }

    pub const fn is_new_format(&self) -> bool {
        self.details.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum BendType {
    #[default]
    None,
    Bend,
    BendRelease,
    BendReleaseBend,
    Prebend,
    PrebendRelease,
    Dip,
    Dive,
    ReleaseUp,
    InvertedDip,
    Return,
    ReleaseDown,
}

impl BendType {
    pub const fn from_value(value: i8) -> Option<Self> {
        let t = match value {
            0 => Self::None,
            1 => Self::Bend,
            2 => Self::BendRelease,
            3 => Self::BendReleaseBend,
            4 => Self::Prebend,
            5 => Self::PrebendRelease,
            6 => Self::Dip,
            7 => Self::Dive,
            8 => Self::ReleaseUp,
            9 => Self::InvertedDip,
            10 => Self::Return,
            11 => Self::ReleaseDown,
            _ => return None,
        };
        Some(t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BendPoint {
    pub position: u8,
    pub value: i8,
    pub vibrato: bool,
}

impl BendPoint {
    pub fn get_time(&self, duration: u32) -> u32 {
        let time = duration as f32 * f32::from(self.position) / BEND_EFFECT_MAX_POSITION_LENGTH;
        time as u32
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BendEffect {
    pub kind: BendType,
    pub value: i32,
    pub points: Vec<BendPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum GraceEffectTransition {
    /// No transition
    #[default]
    None,
    /// Slide from the grace note to the real one.
    Slide,
    /// Perform a bend from the grace note to the real one.
    Bend,
    /// Perform a hammer on.
    Hammer,
}

impl GraceEffectTransition {
    pub const fn from_value(value: u8) -> Option<Self> {
        let t = match value {
            0 => Self::None,
            1 => Self::Slide,
            2 => Self::Bend,
            3 => Self::Hammer,
            _ => return None,
        };
        Some(t)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraceEffect {
    /// note value of the grace note
    pub duration: u8,
    pub fret: i8,
    pub is_dead: bool,
    pub is_on_beat: bool,
    pub transition: GraceEffectTransition,
    pub velocity: i16,
}

impl GraceEffect {
    pub fn duration_time(&self) -> u32 {
        QUARTER_TIME * 4 / u32::from(self.duration.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum HarmonicEffect {
    Natural,
    Artificial {
        semitone: u8,
        accidental: i8,
        octave: Octave,
    },
    Tapped {
        right_hand_fret: u8,
    },
    Pinch,
    Semi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SlideType {
    IntoFromAbove,
    IntoFromBelow,
    ShiftSlideTo,
    LegatoSlideTo,
    OutDownwards,
    OutUpWards,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrillEffect {
    pub fret: i8,
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TremoloPickingEffect {
    pub duration: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NoteType {
    #[default]
    Rest,
    Normal,
    Tie,
    Dead,
    Unknown(u8),
}

impl NoteType {
    pub const fn get_note_type(value: u8) -> NoteType {
        match value {
            0 => NoteType::Rest,
            1 => NoteType::Normal,
            2 => NoteType::Tie,
            3 => NoteType::Dead,
            _ => NoteType::Unknown(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct NoteEffect {
    pub accentuated_note: bool,
    pub bend: Option<BendEffect>,
    pub ghost_note: bool,
    pub grace: Option<GraceEffect>,
    pub hammer: bool,
    pub harmonic: Option<HarmonicEffect>,
    pub heavy_accentuated_note: bool,
    pub left_hand_finger: Option<Fingering>,
    pub right_hand_finger: Option<Fingering>,
    pub let_ring: bool,
    pub palm_mute: bool,
    pub slides: Vec<SlideType>,
    pub staccato: bool,
    pub tremolo_picking: Option<TremoloPickingEffect>,
    pub trill: Option<TrillEffect>,
    pub vibrato: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Note {
    pub value: i16,
    pub velocity: i16,
    pub string: u8,
    pub effect: NoteEffect,
    pub duration_percent: f64,
    pub swap_accidentals: bool,
    pub kind: NoteType,
}

impl Note {
    pub fn new(string: u8) -> Self {
        Note {
            value: 0,
            velocity: DEFAULT_VELOCITY,
            string,
            effect: NoteEffect::default(),
            duration_percent: 1.0,
            swap_accidentals: false,
            kind: NoteType::Rest,
        }
    }
}

/// Information about the piece of music.
/// <https://dguitar.sourceforge.net/GP4format.html#Information_About_the_Piece>
pub fn parse_info(i: &[u8]) -> GpResult<'_, SongInfo> {
    log::debug!("Parsing song info");
    map(
        (
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_comments,
        ),
        |(
            title,
            subtitle,
            artist,
            album,
            lyrics_writer,
            music_writer,
            copyright,
            tab_author,
            instructions,
            comments,
        )| SongInfo {
            title,
            subtitle,
            artist,
            album,
            lyrics_writer,
            music_writer,
            copyright,
            tab_author,
            instructions,
            comments,
        },
    )
    .parse(i)
}

fn parse_comments(i: &[u8]) -> GpResult<'_, Vec<String>> {
    flat_map(parse_u32, |comment_count| {
        log::debug!("Comment count: {comment_count}");
        count(parse_int_byte_sized_string, comment_count as usize)
    })
    .parse(i)
}

pub fn parse_lyrics(i: &[u8]) -> GpResult<'_, Lyrics> {
    log::debug!("Parsing lyrics");
    map(
        (
            parse_u32,
            count(
                map((parse_u32, parse_int_sized_string), |(starting_measure, lyrics)| {
                    LyricLine {
                        starting_measure,
                        lyrics,
                    }
                }),
                LYRICS_LINE_COUNT,
            ),
        ),
        |(track_number, lines)| Lyrics {
            track_number,
            lines,
        },
    )
    .parse(i)
}

pub fn parse_page_setup(i: &[u8]) -> GpResult<'_, PageSetup> {
    log::debug!("Parsing page setup");
    let (i, (width, height, margin_left, margin_right, margin_top, margin_bottom)) = (
        parse_u32, parse_u32, parse_u32, parse_u32, parse_u32, parse_u32,
    )
        .parse(i)?;
    let (i, (score_size_proportion, header_and_footer)) = (parse_u32, parse_u16).parse(i)?;
    map(
        (
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
            parse_int_byte_sized_string,
        ),
        move |(
            title,
            subtitle,
            artist,
            album,
            words,
            music,
            words_and_music,
            copyright_1,
            copyright_2,
            page_number,
        )| PageSetup {
            width,
            height,
            margin_left,
            margin_right,
            margin_top,
            margin_bottom,
            score_size_proportion: score_size_proportion as f32 / 100.0,
            header_and_footer: HeaderFooterElements(header_and_footer),
            title,
            subtitle,
            artist,
            album,
            words,
            music,
            words_and_music,
            copyright: format!("{copyright_1}\n{copyright_2}"),
            page_number,
        },
    )
    .parse(i)
}

pub fn parse_tempo(caps: Gp5Capabilities) -> impl Fn(&[u8]) -> GpResult<'_, Tempo> {
    move |i: &[u8]| {
        log::debug!("Parsing tempo");
        map(
            (
                parse_int_byte_sized_string,
                parse_u32,
                cond(caps.tempo_hidden_flag, parse_bool),
            ),
            |(name, value, hidden)| Tempo {
                name,
                value,
                hidden: hidden.unwrap_or(false),
            },
        )
        .parse(i)
    }
}

pub fn parse_key_signature(i: &[u8]) -> GpResult<'_, KeySignature> {
    let (i, root) = parse_i8(i)?;
    let key = KeySignature::from_root(root).ok_or_else(|| invalid_value("key signature", root))?;
    Ok((i, key))
}

pub fn parse_midi_channels(i: &[u8]) -> GpResult<'_, Vec<MidiChannel>> {
    log::debug!("Parsing midi channels");
    let mut channels = Vec::with_capacity(MIDI_CHANNEL_COUNT);
    let mut i = i;
    for channel_index in 0..MIDI_CHANNEL_COUNT as u8 {
        let (inner, channel) = parse_midi_channel(channel_index)(i)?;
        i = inner;
        channels.push(channel);
    }
    Ok((i, channels))
}

pub fn parse_midi_channel(channel: u8) -> impl Fn(&[u8]) -> GpResult<'_, MidiChannel> {
    move |i: &[u8]| {
        let (i, (instrument, volume, balance, chorus, reverb, phaser, tremolo)) = (
            parse_int, parse_i8, parse_i8, parse_i8, parse_i8, parse_i8, parse_i8,
        )
            .parse(i)?;
        // backward compatibility with GP3
        let i = skip(i, 2)?;
        let channel = MidiChannel {
            channel,
            effect_channel: channel,
            instrument: if instrument == -1 { 0 } else { instrument },
            volume: DecoderBase::byte_to_channel_short(volume),
            balance: DecoderBase::byte_to_channel_short(balance),
            chorus: DecoderBase::byte_to_channel_short(chorus),
            reverb: DecoderBase::byte_to_channel_short(reverb),
            phaser: DecoderBase::byte_to_channel_short(phaser),
            tremolo: DecoderBase::byte_to_channel_short(tremolo),
            bank: 0,
        };
        Ok((i, channel))
    }
}

/// Navigation table, one measure number per sign, -1 when the sign is absent.
pub fn parse_directions(i: &[u8]) -> GpResult<'_, Vec<(DirectionSign, i16)>> {
    log::debug!("Parsing directions");
    let mut i = i;
    let mut directions = Vec::with_capacity(DirectionSign::ALL.len());
    for sign in DirectionSign::ALL {
        let (inner, measure) = parse_short(i)?;
        i = inner;
        directions.push((sign, measure));
    }
    Ok((i, directions))
}

/// Attach navigation signs to the headers by 1-based measure number.
pub fn apply_directions(headers: &mut [MeasureHeader], directions: &[(DirectionSign, i16)]) {
    for &(sign, measure) in directions {
        if measure <= -1 {
            continue;
        }
        let Some(header) = headers.iter_mut().find(|h| h.number == measure as u32) else {
            log::debug!("No measure {measure} for direction {sign}");
            continue;
        };
        if sign.is_from() {
            header.from_direction = Some(sign);
        } else {
            header.direction = Some(sign);
        }
    }
}

pub fn parse_color(i: &[u8]) -> GpResult<'_, Color> {
    log::debug!("Parsing RGB color");
    map(
        (parse_u8, parse_u8, parse_u8, parse_u8),
        |(red, green, blue, _padding)| Color { red, green, blue },
    )
    .parse(i)
}

pub fn parse_marker(i: &[u8]) -> GpResult<'_, Marker> {
    log::debug!("Parsing marker");
    map((parse_int_byte_sized_string, parse_color), |(title, color)| {
        Marker { title, color }
    })
    .parse(i)
}

pub fn parse_triplet_feel(i: &[u8]) -> GpResult<'_, TripletFeel> {
    log::debug!("Parsing triplet feel");
    let (i, triplet_feel) = parse_u8(i)?;
    let triplet_feel = match triplet_feel {
        0 => TripletFeel::None,
        1 => TripletFeel::Eighth,
        2 => TripletFeel::Sixteenth,
        x => return Err(invalid_value("triplet feel", x)),
    };
    Ok((i, triplet_feel))
}

/// Parse measure header.
/// Fields absent from the record are carried forward from `previous`.
pub fn parse_measure_header<'a>(
    i: &'a [u8],
    number: u32,
    previous: Option<&MeasureHeader>,
    song_tempo: u32,
) -> GpResult<'a, MeasureHeader> {
    log::debug!("Parsing measure header {number}");
    let (mut i, flags) = parse_u8(i)?;
    log::debug!("Flags: {flags:08b}");
    let mut mh = MeasureHeader {
        number,
        tempo: song_tempo,
        repeat_open: (flags & 0x04) == 0x04,
        double_bar: (flags & 0x80) == 0x80,
        ..Default::default()
    };
    if let Some(previous) = previous {
        mh.time_signature = previous.time_signature.clone();
        mh.key_signature = previous.key_signature;
    }

    // Numerator of the time signature
    if (flags & 0x01) != 0 {
        let (inner, numerator) = parse_i8(i)?;
        i = inner;
        if numerator < 1 {
            return Err(invalid_value("time signature numerator", numerator));
        }
        mh.time_signature.numerator = numerator;
    }

    // Denominator of the time signature
    if (flags & 0x02) != 0 {
        let (inner, denominator) = parse_i8(i)?;
        i = inner;
        let value = DurationValue::from_value(i64::from(denominator))
            .ok_or_else(|| invalid_value("time signature denominator", denominator))?;
        mh.time_signature.denominator = Duration::new(value);
    }

    // End of repeat
    if (flags & 0x08) != 0 {
        let (inner, repeat_close) = parse_i8(i)?;
        i = inner;
        mh.repeat_close = repeat_close.saturating_sub(1);
    }

    // Presence of a marker
    if (flags & 0x20) != 0 {
        let (inner, marker) = parse_marker(i)?;
        i = inner;
        mh.marker = Some(marker);
    }

    // Number of alternate ending
    if (flags & 0x10) != 0 {
        let (inner, alternative) = parse_u8(i)?;
        i = inner;
        mh.repeat_alternative = alternative;
    }

    // Tonality of the measure, the key type is not kept
    if (flags & 0x40) != 0 {
        let (inner, (key_signature, _key_type)) = (parse_key_signature, parse_u8).parse(i)?;
        i = inner;
        mh.key_signature = key_signature;
    }

    // Beams follow the time signature as a whole
    if (flags & 0x03) != 0 {
        let (inner, (b1, b2, b3, b4)) = (parse_u8, parse_u8, parse_u8, parse_u8).parse(i)?;
        i = inner;
        mh.time_signature.beams = [b1, b2, b3, b4];
    }

    if (flags & 0x10) == 0 {
        i = skip(i, 1)?;
    }

    let (i, triplet_feel) = parse_triplet_feel(i)?;
    mh.triplet_feel = triplet_feel;
    log::debug!("{mh:?}");
    Ok((i, mh))
}

pub fn parse_measure_headers(
    i: &[u8],
    measure_count: u32,
    song_tempo: u32,
) -> GpResult<'_, Vec<MeasureHeader>> {
    log::debug!("Parsing {measure_count} measure headers");
    let mut i = i;
    let mut headers: Vec<MeasureHeader> = Vec::new();
    for number in 1..=measure_count {
        // separator byte between headers
        if number > 1 {
            i = skip(i, 1)?;
        }
        let (inner, header) = parse_measure_header(i, number, headers.last(), song_tempo)?;
        i = inner;
        headers.push(header);
    }
    Ok((i, headers))
}

/// Read beat duration.
/// Duration is composed of byte signifying duration and an integer that maps to `Tuplet`. The byte maps to following values:
///
/// * *-2*: whole note
/// * *-1*: half note
/// * *0*: quarter note
/// * *1*: eighth note
/// * *2*: sixteenth note
/// * *3*: thirty-second note
///
/// If flag at *0x20* is true, the tuplet is read
pub fn parse_duration(flags: u8) -> impl Fn(&[u8]) -> GpResult<'_, Duration> {
    move |i: &[u8]| {
        log::debug!("Parsing duration");
        let (mut i, exponent) = parse_i8(i)?;
        let value =
            DurationValue::from_exponent(exponent).ok_or_else(|| invalid_value("duration", exponent))?;
        let mut d = Duration {
            value,
            dotted: flags & 0x01 != 0,
            ..Default::default()
        };

        if (flags & 0x20) != 0 {
            let (inner, enters) = parse_int(i)?;
            i = inner;
            d.tuplet = match enters {
                1 => None,
                3 => Some(Tuplet::new(3, 2)),
                5..=7 => Some(Tuplet::new(enters as u8, 4)),
                9..=13 => Some(Tuplet::new(enters as u8, 8)),
                x => return Err(invalid_value("tuplet", x)),
            };
        }
        log::debug!("Duration: {d:?}");
        Ok((i, d))
    }
}

/// Chord diagram, frets are sized to the track strings.
pub fn parse_chord(string_count: usize) -> impl Fn(&[u8]) -> GpResult<'_, Chord> {
    move |i: &[u8]| {
        log::debug!("Parsing chord for {string_count} strings");
        let mut chord = Chord::new(string_count);
        let (mut i, new_format) = parse_bool(i)?;
        if new_format {
            let (inner, ()) = parse_new_chord(i, &mut chord)?;
            i = inner;
        } else {
            log::debug!("Parsing old format chord");
            let (inner, (name, first_fret)) = (parse_int_byte_sized_string, parse_int).parse(i)?;
            i = inner;
            chord.name = name;
            chord.first_fret = first_fret;
            if first_fret != 0 {
                let (inner, frets) = count(parse_int, 6).parse(i)?;
                i = inner;
                for (string, fret) in chord.strings.iter_mut().zip(frets) {
                    *string = fret;
                }
            }
        }
        Ok((i, chord))
    }
}

fn parse_new_chord<'a>(i: &'a [u8], chord: &mut Chord) -> GpResult<'a, ()> {
    log::debug!("Parsing new format chord");
    let (i, sharp) = parse_bool(i)?;
    let i = skip(i, 3)?;
    let (i, (root, chord_type, extension, bass, tonality, add)) =
        (parse_u8, parse_u8, parse_u8, parse_int, parse_int, parse_bool).parse(i)?;
    let (i, name) = parse_byte_size_string(22)(i)?;
    let (i, (fifth, ninth, eleventh, first_fret)) =
        (parse_u8, parse_u8, parse_u8, parse_int).parse(i)?;
    let (i, frets) = count(parse_int, 7).parse(i)?;
    let (i, (barre_count, barre_frets, barre_starts, barre_ends)) = (
        parse_u8,
        count(parse_u8, 5),
        count(parse_u8, 5),
        count(parse_u8, 5),
    )
        .parse(i)?;
    let (i, omissions) = count(parse_bool, 7).parse(i)?;
    let i = skip(i, 1)?;
    let (i, raw_fingerings) = count(parse_i8, 7).parse(i)?;
    let (i, show) = parse_bool(i)?;

    let mut fingerings = Vec::with_capacity(raw_fingerings.len());
    for f in raw_fingerings {
        fingerings.push(Fingering::from_value(f).ok_or_else(|| invalid_value("fingering", f))?);
    }
    let barres = barre_frets
        .into_iter()
        .zip(barre_starts)
        .zip(barre_ends)
        .take(usize::from(barre_count))
        .map(|((fret, start), end)| Barre { fret, start, end })
        .collect();

    chord.name = name;
    chord.first_fret = first_fret;
    for (string, fret) in chord.strings.iter_mut().zip(frets) {
        *string = fret;
    }
    chord.details = Some(ChordDetails {
        sharp,
        root,
        chord_type,
        extension,
        bass,
        tonality,
        add,
        fifth,
        ninth,
        eleventh,
        barres,
        omissions,
        fingerings,
        show,
    });
    Ok((i, ()))
}

pub fn parse_note_effects<'a>(i: &'a [u8], effect: &mut NoteEffect) -> GpResult<'a, ()> {
    log::debug!("Parsing note effects");
    let (mut i, (flags1, flags2)) = (parse_u8, parse_u8).parse(i)?;
    effect.hammer = (flags1 & 0x02) == 0x02;
    effect.let_ring = (flags1 & 0x08) == 0x08;

    effect.staccato = (flags2 & 0x01) == 0x01;
    effect.palm_mute = (flags2 & 0x02) == 0x02;
    effect.vibrato = (flags2 & 0x40) == 0x40;

    if (flags1 & 0x01) == 0x01 {
        let (inner, bend_effect) = parse_bend_effect(i)?;
        i = inner;
        effect.bend = Some(bend_effect);
    }

    if (flags1 & 0x10) == 0x10 {
        let (inner, grace_effect) = parse_grace_effect(i)?;
        i = inner;
        effect.grace = Some(grace_effect);
    }

    if (flags2 & 0x04) == 0x04 {
        let (inner, tremolo_picking) = parse_tremolo_picking(i)?;
        i = inner;
        effect.tremolo_picking = Some(tremolo_picking);
    }

    if (flags2 & 0x08) == 0x08 {
        let (inner, slides) = parse_slides(i)?;
        i = inner;
        effect.slides = slides;
    }

    if (flags2 & 0x10) == 0x10 {
        let (inner, harmonic_effect) = parse_harmonic_effect(i)?;
        i = inner;
        effect.harmonic = Some(harmonic_effect);
    }

    if (flags2 & 0x20) == 0x20 {
        let (inner, trill_effect) = parse_trill_effect(i)?;
        i = inner;
        effect.trill = Some(trill_effect);
    }

    Ok((i, ()))
}

pub fn parse_trill_effect(i: &[u8]) -> GpResult<'_, TrillEffect> {
    log::debug!("Parsing trill effect");
    let (i, (fret, period)) = (parse_i8, parse_i8).parse(i)?;
    let value = match period {
        1 => DurationValue::Sixteenth,
        2 => DurationValue::ThirtySecond,
        3 => DurationValue::SixtyFourth,
        x => return Err(invalid_value("trill period", x)),
    };
    let trill_effect = TrillEffect {
        fret,
        duration: Duration::new(value),
    };
    Ok((i, trill_effect))
}

pub fn parse_harmonic_effect(i: &[u8]) -> GpResult<'_, HarmonicEffect> {
    let (i, harmonic_type) = parse_i8(i)?;
    log::debug!("Parsing harmonic effect {harmonic_type}");
    match harmonic_type {
        1 => Ok((i, HarmonicEffect::Natural)),
        2 => {
            let (i, (semitone, accidental, octave)) = (parse_u8, parse_i8, parse_u8).parse(i)?;
            let octave = Octave::from_value(octave).ok_or_else(|| invalid_value("octave", octave))?;
            let he = HarmonicEffect::Artificial {
                semitone,
                accidental,
                octave,
            };
            Ok((i, he))
        }
        3 => map(parse_u8, |right_hand_fret| HarmonicEffect::Tapped { right_hand_fret }).parse(i),
        4 => Ok((i, HarmonicEffect::Pinch)),
        5 => Ok((i, HarmonicEffect::Semi)),
        x => Err(invalid_value("harmonic type", x)),
    }
}

pub fn parse_slides(i: &[u8]) -> GpResult<'_, Vec<SlideType>> {
    log::debug!("Parsing slides");
    map(parse_u8, |t| {
        [
            (0x01, SlideType::ShiftSlideTo),
            (0x02, SlideType::LegatoSlideTo),
            (0x04, SlideType::OutDownwards),
            (0x08, SlideType::OutUpWards),
            (0x10, SlideType::IntoFromBelow),
            (0x20, SlideType::IntoFromAbove),
        ]
        .into_iter()
        .filter(|(bit, _)| t & bit != 0)
        .map(|(_, slide)| slide)
        .collect()
    })
    .parse(i)
}

pub fn parse_tremolo_picking(i: &[u8]) -> GpResult<'_, TremoloPickingEffect> {
    log::debug!("Parsing tremolo picking");
    let (i, tp) = parse_i8(i)?;
    let value = match tp {
        1 => DurationValue::Eighth,
        3 => DurationValue::Sixteenth,
        2 => DurationValue::ThirtySecond,
        x => return Err(invalid_value("tremolo picking", x)),
    };
    let tremolo_picking_effect = TremoloPickingEffect {
        duration: Duration::new(value),
    };
    Ok((i, tremolo_picking_effect))
}

pub fn parse_grace_effect(i: &[u8]) -> GpResult<'_, GraceEffect> {
    log::debug!("Parsing grace effect");
    let (i, (fret, dynamic, transition, duration, flags)) =
        (parse_i8, parse_u8, parse_u8, parse_u8, parse_u8).parse(i)?;
    let transition = GraceEffectTransition::from_value(transition)
        .ok_or_else(|| invalid_value("grace transition", transition))?;
    if duration > 7 {
        return Err(invalid_value("grace duration", duration));
    }
    let grace_effect = GraceEffect {
        duration: 1 << (7 - duration),
        fret,
        is_dead: (flags & 0x01) == 0x01,
        is_on_beat: (flags & 0x02) == 0x02,
        transition,
        velocity: convert_velocity(i16::from(dynamic)),
    };
    Ok((i, grace_effect))
}

/// Bend and tremolo bar share the same layout.
pub fn parse_bend_effect(i: &[u8]) -> GpResult<'_, BendEffect> {
    log::debug!("Parsing bend effect");
    let (mut i, (kind, value, num_points)) = (parse_i8, parse_int, parse_int).parse(i)?;
    let kind = BendType::from_value(kind).ok_or_else(|| invalid_value("bend type", kind))?;
    let mut bend_effect = BendEffect {
        kind,
        value,
        points: vec![],
    };
    for _ in 0..num_points {
        let (inner, (bend_position, bend_value, vibrato)) =
            (parse_int, parse_int, parse_bool).parse(i)?;
        i = inner;

        let point_position =
            bend_position as f32 * BEND_EFFECT_MAX_POSITION_LENGTH / GP_BEND_POSITION;
        let point_value = bend_value as f32 * SEMITONE_LENGTH / GP_BEND_SEMITONE;
        bend_effect.points.push(BendPoint {
            position: point_position.round() as u8,
            value: point_value.round() as i8,
            vibrato,
        });
    }
    Ok((i, bend_effect))
}

pub fn parse_beat_effects<'a>(i: &'a [u8], effect: &mut BeatEffects) -> GpResult<'a, ()> {
    log::debug!("Parsing beat effects");
    let (mut i, (flags1, flags2)) = (parse_u8, parse_u8).parse(i)?;

    effect.vibrato = flags1 & 0x02 != 0;
    effect.fade_in = flags1 & 0x10 != 0;
    effect.rasgueado = flags2 & 0x01 != 0;

    if flags1 & 0x20 != 0 {
        let (inner, slap) = parse_i8(i)?;
        i = inner;
        effect.slap = match slap {
            1 => SlapEffect::Tapping,
            2 => SlapEffect::Slapping,
            3 => SlapEffect::Popping,
            _ => SlapEffect::None,
        };
    }

    if flags2 & 0x04 != 0 {
        let (inner, tremolo_bar) = parse_bend_effect(i)?;
        i = inner;
        effect.tremolo_bar = Some(tremolo_bar);
    }

    if flags1 & 0x40 != 0 {
        // GP5 stores the upward stroke first
        let (inner, (stroke_up, stroke_down)) = (parse_i8, parse_i8).parse(i)?;
        i = inner;
        if stroke_down > 0 {
            effect.stroke.direction = BeatStrokeDirection::Down;
            effect.stroke.value = BeatStroke::stroke_value(stroke_down);
        } else if stroke_up > 0 {
            effect.stroke.direction = BeatStrokeDirection::Up;
            effect.stroke.value = BeatStroke::stroke_value(stroke_up);
        }
    }

    if flags2 & 0x02 != 0 {
        let (inner, pick_stroke) = parse_i8(i)?;
        i = inner;
        effect.pick_stroke = match pick_stroke {
            1 => BeatStrokeDirection::Up,
            2 => BeatStrokeDirection::Down,
            _ => BeatStrokeDirection::None,
        };
    }

    Ok((i, ()))
}

/// Display flags closing every beat record.
pub fn parse_beat_display(i: &[u8]) -> GpResult<'_, (BeatDisplay, Octave)> {
    let (mut i, flags) = parse_u16(i)?;
    let mut display = BeatDisplay {
        break_beam: flags & 0x0001 != 0,
        force_beam: flags & 0x0004 != 0,
        break_secondary_tuplet: flags & 0x1000 != 0,
        force_bracket: flags & 0x2000 != 0,
        ..Default::default()
    };
    if flags & 0x0002 != 0 {
        display.beam_direction = VoiceDirection::Down;
    } else if flags & 0x0008 != 0 {
        display.beam_direction = VoiceDirection::Up;
    }
    if flags & 0x0200 != 0 {
        display.tuplet_bracket = TupletBracket::Start;
    } else if flags & 0x0400 != 0 {
        display.tuplet_bracket = TupletBracket::End;
    }
    if flags & 0x0800 != 0 {
        let (inner, break_secondary) = parse_u8(i)?;
        i = inner;
        display.break_secondary = break_secondary;
    }
    let octave = if flags & 0x0010 != 0 {
        Octave::Ottava
    } else if flags & 0x0020 != 0 {
        Octave::OttavaBassa
    } else if flags & 0x0040 != 0 {
        Octave::Quindicesima
    } else if flags & 0x0100 != 0 {
        Octave::QuindicesimaBassa
    } else {
        Octave::None
    };
    Ok((i, (display, octave)))
}

/// RSE instrument, the effect number width depends on the version.
pub fn parse_rse_instrument(caps: Gp5Capabilities) -> impl Fn(&[u8]) -> GpResult<'_, RseInstrument> {
    move |i: &[u8]| {
        log::debug!("Parsing RSE instrument");
        let (mut i, (instrument, unknown, sound_bank)) =
            (parse_int, parse_int, parse_int).parse(i)?;
        let effect_number = if caps.rse_effect_number_as_int {
            let (inner, effect_number) = parse_int(i)?;
            i = inner;
            effect_number
        } else {
            let (inner, effect_number) = parse_short(i)?;
            i = skip(inner, 1)?;
            i32::from(effect_number)
        };
        let rse = RseInstrument {
            instrument,
            unknown,
            sound_bank,
            effect_number,
            ..Default::default()
        };
        Ok((i, rse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_with(numerator: i8, denominator: DurationValue, beams: [u8; 4]) -> MeasureHeader {
        MeasureHeader {
            time_signature: TimeSignature {
                numerator,
                denominator: Duration::new(denominator),
                beams,
            },
            key_signature: KeySignature::DMajor,
            ..Default::default()
        }
    }

    #[test]
    fn duration_calc_time() {
        let quarter = Duration::default();
        assert_eq!(quarter.value, DurationValue::Quarter);
        assert_eq!(quarter.calc_time(), 960);

        let dotted = Duration {
            dotted: true,
            ..Default::default()
        };
        assert_eq!(dotted.calc_time(), 1440);

        let double_dotted = Duration {
            double_dotted: true,
            ..Default::default()
        };
        assert_eq!(double_dotted.calc_time(), 1680);

        let triplet = Duration {
            tuplet: Some(Tuplet::new(3, 2)),
            ..Default::default()
        };
        assert_eq!(triplet.calc_time(), 640);

        assert_eq!(Duration::new(DurationValue::Whole).calc_time(), 3840);
        assert_eq!(Duration::new(DurationValue::Sixteenth).calc_time(), 240);
        assert_eq!(Duration::new(DurationValue::HundredTwentyEighth).calc_time(), 30);
    }

    #[test]
    fn duration_from_exponent() {
        assert_eq!(DurationValue::from_exponent(-2), Some(DurationValue::Whole));
        assert_eq!(DurationValue::from_exponent(0), Some(DurationValue::Quarter));
        assert_eq!(DurationValue::from_exponent(5), Some(DurationValue::HundredTwentyEighth));
        assert_eq!(DurationValue::from_exponent(6), None);
        assert_eq!(DurationValue::from_exponent(-3), None);
    }

    #[test]
    fn parse_duration_with_tuplet() {
        let data = [0x01, 0x05, 0x00, 0x00, 0x00];
        let (rest, d) = parse_duration(0x21)(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(d.value, DurationValue::Eighth);
        assert!(d.dotted);
        assert_eq!(d.tuplet, Some(Tuplet::new(5, 4)));
        // 480 dotted = 720, 5 in the time of 4
        assert_eq!(d.calc_time(), 576);
    }

    #[test]
    fn parse_duration_rejects_unknown_tuplet() {
        let data = [0x00, 0x04, 0x00, 0x00, 0x00];
        let err = parse_duration(0x20)(&data).unwrap_err();
        assert_eq!(
            GpError::from(err),
            GpError::InvalidValueError {
                field: "tuplet",
                value: 4
            }
        );
    }

    #[test]
    fn measure_header_carry_forward() {
        let previous = header_with(7, DurationValue::Eighth, [3, 2, 2, 0]);
        // flags 0: only the padding byte and the triplet feel
        let data = [0x00, 0x00, 0x00];
        let (rest, header) = parse_measure_header(&data, 2, Some(&previous), 90).unwrap();
        assert!(rest.is_empty());
        assert_eq!(header.number, 2);
        assert_eq!(header.time_signature, previous.time_signature);
        assert_eq!(header.key_signature, KeySignature::DMajor);
        assert_eq!(header.tempo, 90);
        assert_eq!(header.repeat_close, -1);
        assert_eq!(header.marker, None);
    }

    #[test]
    fn measure_header_numerator_only_reads_beams() {
        let previous = header_with(4, DurationValue::Quarter, [2, 2, 2, 2]);
        let data = [0x01, 0x03, 0x01, 0x01, 0x01, 0x00, 0x00, 0x01];
        let (rest, header) = parse_measure_header(&data, 2, Some(&previous), 120).unwrap();
        assert!(rest.is_empty());
        assert_eq!(header.time_signature.numerator, 3);
        assert_eq!(header.time_signature.denominator, previous.time_signature.denominator);
        assert_eq!(header.time_signature.beams, [1, 1, 1, 0]);
        assert_eq!(header.triplet_feel, TripletFeel::Eighth);
        assert_eq!(header.length(), 2880);
    }

    #[test]
    fn measure_header_all_fields() {
        let mut data = vec![0xFF, 0x06, 0x08, 0x03];
        // marker "A" red
        data.extend_from_slice(&[0x02, 0x00, 0x00, 0x00, 0x01, b'A', 0xFF, 0x00, 0x00, 0x00]);
        // alternative, key root + type, beams, triplet feel
        data.extend_from_slice(&[0x02, 0xFE, 0x00, 0x03, 0x03, 0x00, 0x00, 0x02]);
        let (rest, header) = parse_measure_header(&data, 1, None, 120).unwrap();
        assert!(rest.is_empty());
        assert_eq!(header.time_signature.numerator, 6);
        assert_eq!(header.time_signature.denominator.value, DurationValue::Eighth);
        assert!(header.repeat_open);
        assert_eq!(header.repeat_close, 2);
        assert_eq!(
            header.marker,
            Some(Marker {
                title: "A".to_string(),
                color: Color {
                    red: 255,
                    green: 0,
                    blue: 0
                }
            })
        );
        assert_eq!(header.repeat_alternative, 2);
        assert_eq!(header.key_signature, KeySignature::BMajorFlat);
        assert!(header.double_bar);
        assert_eq!(header.time_signature.beams, [3, 3, 0, 0]);
        assert_eq!(header.triplet_feel, TripletFeel::Sixteenth);
    }

    #[test]
    fn measure_header_rejects_bad_denominator() {
        let data = [0x02, 0x03, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00];
        let err = parse_measure_header(&data, 1, None, 120).unwrap_err();
        assert!(matches!(
            GpError::from(err),
            GpError::InvalidValueError { value: 3, .. }
        ));
    }

    #[test]
    fn measure_headers_skip_separator() {
        let data = [
            0x03, 0x04, 0x04, 0x02, 0x02, 0x02, 0x02, 0x00, 0x00, // header 1
            0x00, 0x04, 0x00, 0x00, // separator, header 2 opens a repeat
        ];
        let (rest, headers) = parse_measure_headers(&data, 2, 100).unwrap();
        assert!(rest.is_empty());
        assert_eq!(headers.len(), 2);
        assert_eq!(headers[1].number, 2);
        assert!(headers[1].repeat_open);
        assert_eq!(headers[1].time_signature, headers[0].time_signature);
    }

    #[test]
    fn old_chord_without_first_fret_keeps_sentinels() {
        for string_count in [4, 6, 7] {
            let data = [0x00, 0x03, 0x00, 0x00, 0x00, 0x02, b'A', b'm', 0x00, 0x00, 0x00, 0x00];
            let (rest, chord) = parse_chord(string_count)(&data).unwrap();
            assert!(rest.is_empty());
            assert_eq!(chord.name, "Am");
            assert_eq!(chord.first_fret, 0);
            assert_eq!(chord.strings, vec![-1; string_count]);
            assert!(!chord.is_new_format());
        }
    }

    #[test]
    fn old_chord_with_frets_fills_first_six_strings() {
        let mut data = vec![0x00, 0x01, 0x00, 0x00, 0x00, 0x01, b'E', 0x01, 0x00, 0x00, 0x00];
        for fret in [0i32, 0, 1, 2, 2, 0] {
            data.extend_from_slice(&fret.to_le_bytes());
        }
        let (rest, chord) = parse_chord(4)(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(chord.strings, vec![0, 0, 1, 2]);

        let (_, chord) = parse_chord(7)(&data).unwrap();
        assert_eq!(chord.strings, vec![0, 0, 1, 2, 2, 0, -1]);
    }

    #[test]
    fn new_chord_full_layout() {
        let mut data = vec![0x01, 0x01, 0x00, 0x00, 0x00]; // new format, sharp, reserved
        data.extend_from_slice(&[0x09, 0x01, 0x00]); // root, type, extension
        data.extend_from_slice(&(-1i32).to_le_bytes()); // bass
        data.extend_from_slice(&0i32.to_le_bytes()); // tonality
        data.push(0x00); // add
        let mut name = vec![0x02, b'A', b'm'];
        name.resize(23, 0);
        data.extend_from_slice(&name);
        data.extend_from_slice(&[0x00, 0x00, 0x00]); // fifth, ninth, eleventh
        data.extend_from_slice(&1i32.to_le_bytes()); // first fret
        for fret in [0i32, 1, 2, 2, 0, -1, -1] {
            data.extend_from_slice(&fret.to_le_bytes());
        }
        data.push(0x01); // barre count
        data.extend_from_slice(&[2, 0, 0, 0, 0]);
        data.extend_from_slice(&[1, 0, 0, 0, 0]);
        data.extend_from_slice(&[5, 0, 0, 0, 0]);
        data.extend_from_slice(&[1, 1, 1, 1, 1, 1, 1]); // omissions
        data.push(0x00);
        data.extend_from_slice(&[-1i8 as u8, 0x01, 0x02, 0x03, 0xFF, 0xFE, 0xFE]);
        data.push(0x01); // show
        data.push(0xAA);

        let (rest, chord) = parse_chord(6)(&data).unwrap();
        assert_eq!(rest, &[0xAA]);
        assert_eq!(chord.name, "Am");
        assert_eq!(chord.first_fret, 1);
        assert_eq!(chord.strings, vec![0, 1, 2, 2, 0, -1]);
        let details = chord.details.unwrap();
        assert!(details.sharp);
        assert_eq!(details.root, 9);
        assert_eq!(details.bass, -1);
        assert_eq!(
            details.barres,
            vec![Barre {
                fret: 2,
                start: 1,
                end: 5
            }]
        );
        assert_eq!(details.omissions, vec![true; 7]);
        assert_eq!(details.fingerings[0], Fingering::Open);
        assert_eq!(details.fingerings[1], Fingering::Index);
        assert_eq!(details.fingerings[6], Fingering::Unknown);
        assert!(details.show);
    }

    #[test]
    fn midi_channel_normalization() {
        let data = [0xFF, 0xFF, 0xFF, 0xFF, 13, 8, 0, 0, 0, 0, 0, 0];
        let (rest, channel) = parse_midi_channel(9)(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(channel.instrument, 0);
        assert_eq!(channel.volume, 104);
        assert_eq!(channel.balance, 64);
        assert_eq!(channel.chorus, 0);
        assert!(channel.is_percussion_channel());
    }

    #[test]
    fn percussion_channel_modulo_sixteen() {
        let mut channel = MidiChannel {
            channel: 25,
            effect_channel: 25,
            instrument: 0,
            volume: 0,
            balance: 0,
            chorus: 0,
            reverb: 0,
            phaser: 0,
            tremolo: 0,
            bank: 0,
        };
        assert!(channel.is_percussion_channel());
        channel.channel = 10;
        assert!(!channel.is_percussion_channel());
    }

    #[test]
    fn directions_are_attached_by_measure_number() {
        let mut headers: Vec<MeasureHeader> = (1..=3)
            .map(|number| MeasureHeader {
                number,
                ..Default::default()
            })
            .collect();
        let directions = vec![
            (DirectionSign::Coda, 2),
            (DirectionSign::Fine, -1),
            (DirectionSign::DaCapoAlCoda, 3),
            (DirectionSign::DaSegno, 9),
        ];
        apply_directions(&mut headers, &directions);
        assert_eq!(headers[0].direction, None);
        assert_eq!(headers[1].direction, Some(DirectionSign::Coda));
        assert_eq!(headers[2].from_direction, Some(DirectionSign::DaCapoAlCoda));
        assert_eq!(headers[2].direction, None);
    }

    #[test]
    fn bend_effect_points_are_scaled() {
        let mut data = vec![0x01];
        data.extend_from_slice(&50i32.to_le_bytes());
        data.extend_from_slice(&2i32.to_le_bytes());
        for (position, value, vibrato) in [(0i32, 0i32, 0u8), (60, 50, 1)] {
            data.extend_from_slice(&position.to_le_bytes());
            data.extend_from_slice(&value.to_le_bytes());
            data.push(vibrato);
        }
        let (rest, bend) = parse_bend_effect(&data).unwrap();
        assert!(rest.is_empty());
        assert_eq!(bend.kind, BendType::Bend);
        assert_eq!(bend.value, 50);
        assert_eq!(
            bend.points[1],
            BendPoint {
                position: 12,
                value: 2,
                vibrato: true
            }
        );
    }

    #[test]
    fn note_effects_grace_and_harmonic() {
        // grace + let ring, tapped harmonic + palm mute
        let data = [0x18, 0x12, 0x05, 0x06, 0x01, 0x01, 0x02, 0x03, 0x0C];
        let mut effect = NoteEffect::default();
        let (rest, ()) = parse_note_effects(&data, &mut effect).unwrap();
        assert!(rest.is_empty());
        assert!(effect.let_ring);
        assert!(effect.palm_mute);
        let grace = effect.grace.unwrap();
        assert_eq!(grace.fret, 5);
        assert_eq!(grace.velocity, convert_velocity(6));
        assert_eq!(grace.transition, GraceEffectTransition::Slide);
        assert_eq!(grace.duration, 64);
        assert!(grace.is_on_beat);
        assert_eq!(
            effect.harmonic,
            Some(HarmonicEffect::Tapped {
                right_hand_fret: 12
            })
        );
    }

    #[test]
    fn beat_display_octave_and_break_secondary() {
        let data = [0x11, 0x08, 0x02];
        let (rest, (display, octave)) = parse_beat_display(&data).unwrap();
        assert!(rest.is_empty());
        assert!(display.break_beam);
        assert_eq!(display.break_secondary, 2);
        assert_eq!(octave, Octave::Ottava);
    }

    #[test]
    fn key_signature_display() {
        assert_eq!(KeySignature::GMajor.to_string(), "G major");
        assert_eq!(KeySignature::from_root(-2), Some(KeySignature::BMajorFlat));
        assert_eq!(KeySignature::from_root(9), None);
    }
}
