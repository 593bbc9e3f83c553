use crate::parser::gp5_parser::Gp5Capabilities;
use crate::parser::primitive_parser::{
    parse_bool, parse_byte_size_string, parse_f64, parse_i8, parse_int,
    parse_int_byte_sized_string, parse_u16, parse_u8, skip, GpResult,
};
use crate::parser::song_parser::{
    convert_velocity, invalid_value, parse_beat_display, parse_beat_effects, parse_chord,
    parse_color, parse_duration, parse_note_effects, parse_rse_instrument, Accentuation, Beat,
    BeatStatus, Fingering, GuitarString, LineBreak, Measure, MidiChannel, MixTableChange,
    MixTableItem, Note, NoteType, RseEqualizer, Song, Track, TrackRse, TrackSettings, Voice,
    WahEffect, MAX_VOICES, MIDI_CHANNEL_COUNT, QUARTER_TIME, TRACK_NAME_SIZE, TUNING_SLOT_COUNT,
};
use nom::multi::count;
use nom::Parser;

/// Decodes tracks and measure contents into a song whose headers are known.
pub struct MusicParser {
    song: Song,
    midi_channels: Vec<MidiChannel>,
    caps: Gp5Capabilities,
}

impl MusicParser {
    pub const fn new(song: Song, midi_channels: Vec<MidiChannel>, caps: Gp5Capabilities) -> Self {
        Self {
            song,
            midi_channels,
            caps,
        }
    }

    pub fn into_song(self) -> Song {
        self.song
    }

    pub fn parse_music_data<'a>(&mut self, i: &'a [u8], track_count: usize) -> GpResult<'a, ()> {
        log::debug!(
            "Parsing music data -> track_count: {track_count} measure_count {}",
            self.song.measure_headers.len()
        );
        let (i, tracks) = self.parse_tracks(track_count)(i)?;
        self.song.tracks = tracks;

        let (i, ()) = self.parse_measures()(i)?;
        Ok((i, ()))
    }

    pub fn parse_tracks(
        &mut self,
        tracks_count: usize,
    ) -> impl FnMut(&[u8]) -> GpResult<'_, Vec<Track>> + '_ {
        move |i: &[u8]| {
            log::debug!("Parsing {tracks_count} tracks");
            let mut i = i;
            let mut tracks = Vec::with_capacity(tracks_count.min(256));
            for number in 1..=tracks_count as u32 {
                let (inner, track) = self.parse_track(number)(i)?;
                i = inner;
                tracks.push(track);
            }
            // tracks done
            i = skip(i, self.caps.tracks_trailer_len)?;
            Ok((i, tracks))
        }
    }

    pub fn parse_track(&mut self, number: u32) -> impl FnMut(&[u8]) -> GpResult<'_, Track> + '_ {
        move |i: &[u8]| {
            log::debug!("--------");
            log::debug!("Parsing track {number}");
            let mut i = i;
            if number == 1 || self.caps.leading_byte_on_every_track {
                i = skip(i, 1)?;
            }

            let (inner, flags) = parse_u8(i)?;
            i = inner;
            let mut track = Track {
                number,
                percussion: (flags & 0x01) == 0x01,
                twelve_stringed_guitar: (flags & 0x02) == 0x02,
                banjo: (flags & 0x04) == 0x04,
                visible: (flags & 0x08) == 0x08,
                solo: (flags & 0x10) == 0x10,
                mute: (flags & 0x20) == 0x20,
                use_rse: (flags & 0x40) == 0x40,
                indicate_tuning: (flags & 0x80) == 0x80,
                ..Default::default()
            };

            // track name
            let (inner, name) = parse_byte_size_string(TRACK_NAME_SIZE)(i)?;
            i = inner;
            log::debug!("Track name:{name}");
            track.name = name;

            // string count
            let (inner, string_count) = parse_int(i)?;
            i = inner;
            log::debug!("String count: {string_count}");

            // tunings
            let (inner, tunings) = count(parse_int, TUNING_SLOT_COUNT).parse(i)?;
            i = inner;
            log::debug!("Tunings: {tunings:?}");
            track.strings = tunings
                .into_iter()
                .take(usize::try_from(string_count).unwrap_or(0))
                .zip(1..)
                .map(|(value, number)| GuitarString { number, value })
                .collect();

            // midi port
            let (inner, port) = parse_int(i)?;
            i = inner;
            log::debug!("Midi port: {port}");
            track.port = port;

            let (inner, channel) = self.parse_track_channel(i)?;
            i = inner;
            if let Some(channel) = &channel {
                track.percussion = channel.is_percussion_channel();
            }
            track.channel = channel;

            let (inner, (fret_count, offset, color)) = (parse_int, parse_int, parse_color).parse(i)?;
            i = inner;
            log::debug!("Fret count: {fret_count}, offset: {offset}, color: {color:?}");
            track.fret_count = fret_count;
            track.offset = offset;
            track.color = color;

            let (inner, (flags2, accentuation, bank)) = (parse_u16, parse_u8, parse_u8).parse(i)?;
            i = inner;
            track.settings = TrackSettings::from_flags(flags2);
            let auto_accentuation = Accentuation::from_value(accentuation)
                .ok_or_else(|| invalid_value("accentuation", accentuation))?;
            if let Some(channel) = track.channel.as_mut() {
                channel.bank = bank;
            }

            let (inner, rse) = self.parse_track_rse(i, auto_accentuation)?;
            i = inner;
            track.rse = rse;
            Ok((i, track))
        }
    }

    /// Read MIDI channel. MIDI channel in Guitar Pro is represented by two integers.
    /// First is one-based number of channel, second is one-based number of channel used for effects.
    fn parse_track_channel<'a>(&self, i: &'a [u8]) -> GpResult<'a, Option<MidiChannel>> {
        log::debug!("Parsing track channel");
        let (i, (index, effect_index)) = (parse_int, parse_int).parse(i)?;
        let index = index.saturating_sub(1);
        let effect_index = effect_index.saturating_sub(1);
        log::debug!("Track channel gm1: {index} gm2: {effect_index}");

        let channel = usize::try_from(index)
            .ok()
            .and_then(|index| self.midi_channels.get(index))
            .map(|channel| {
                let mut channel = channel.clone();
                if channel.instrument < 0 {
                    channel.instrument = 0;
                }
                // if not percussion - set effect channel
                if !channel.is_percussion_channel() {
                    if let Some(effect_channel) = u8::try_from(effect_index)
                        .ok()
                        .filter(|&e| usize::from(e) < MIDI_CHANNEL_COUNT)
                    {
                        channel.effect_channel = effect_channel;
                    }
                }
                channel
            });
        if channel.is_none() {
            log::debug!("channel {index} not found");
        }
        Ok((i, channel))
    }

    fn parse_track_rse<'a>(
        &self,
        i: &'a [u8],
        auto_accentuation: Accentuation,
    ) -> GpResult<'a, TrackRse> {
        log::debug!("Parsing track RSE");
        let (i, humanize) = parse_u8(i)?;
        let i = skip(i, 24)?;
        let (mut i, mut instrument) = parse_rse_instrument(self.caps)(i)?;
        let mut equalizer = None;
        if self.caps.rse_equalizer_and_effect {
            let (inner, (knobs, gain, effect, effect_category)) = (
                count(parse_i8, 3),
                parse_i8,
                parse_int_byte_sized_string,
                parse_int_byte_sized_string,
            )
                .parse(i)?;
            i = inner;
            equalizer = Some(RseEqualizer {
                knobs: knobs.into_iter().map(unpack_volume).collect(),
                gain: unpack_volume(gain),
            });
            instrument.effect = effect;
            instrument.effect_category = effect_category;
        }
        let rse = TrackRse {
            humanize,
            auto_accentuation,
            instrument,
            equalizer,
        };
        Ok((i, rse))
    }

    /// Read measures. Measures are written in the following order:
    /// - measure 1/track 1
    /// - measure 1/track 2
    /// - ...
    /// - measure 1/track m
    /// - measure 2/track 1
    /// - ...
    /// - measure n/track m
    pub fn parse_measures(&mut self) -> impl FnMut(&[u8]) -> GpResult<'_, ()> + '_ {
        move |i: &[u8]| {
            log::debug!("--------");
            log::debug!("Parsing measures");
            let mut start = QUARTER_TIME;
            let mut i = i;
            for header_index in 0..self.song.measure_headers.len() {
                // set header start
                self.song.measure_headers[header_index].start = start;
                for track_index in 0..self.song.tracks.len() {
                    let (inner, ()) = self.parse_measure(start, header_index, track_index)(i)?;
                    i = inner;
                }
                // update start with measure length
                let length = self.song.measure_headers[header_index].length();
                start = start
                    .checked_add(length)
                    .ok_or_else(|| invalid_value("measure start", start))?;
            }
            Ok((i, ()))
        }
    }

    pub fn parse_measure(
        &mut self,
        measure_start: u32,
        header_index: usize,
        track_index: usize,
    ) -> impl FnMut(&[u8]) -> GpResult<'_, ()> + '_ {
        move |i: &[u8]| {
            log::debug!("--------");
            log::debug!("Parsing measure {header_index} for track {track_index}");
            // pushed first so tied notes can see the beats decoded so far
            self.song.tracks[track_index].measures.push(Measure {
                header_index,
                track_index,
                voices: vec![Voice::default(); MAX_VOICES],
                ..Default::default()
            });
            let mut i = i;
            for voice_index in 0..MAX_VOICES {
                log::debug!("--------");
                log::debug!("Parsing voice {voice_index}");
                // voices have the same start value
                let (inner, ()) =
                    self.parse_voice(measure_start, track_index, header_index, voice_index)(i)?;
                i = inner;
            }
            let (i, line_break) = parse_u8(i)?;
            let line_break = match line_break {
                0 => LineBreak::None,
                1 => LineBreak::Break,
                2 => LineBreak::Protect,
                x => return Err(invalid_value("line break", x)),
            };
            self.song.tracks[track_index].measures[header_index].line_break = line_break;
            Ok((i, ()))
        }
    }

    fn voice_mut(&mut self, track_index: usize, header_index: usize, voice_index: usize) -> &mut Voice {
        &mut self.song.tracks[track_index].measures[header_index].voices[voice_index]
    }

    pub fn parse_voice(
        &mut self,
        measure_start: u32,
        track_index: usize,
        header_index: usize,
        voice_index: usize,
    ) -> impl FnMut(&[u8]) -> GpResult<'_, ()> + '_ {
        move |i: &[u8]| {
            let (mut i, beats) = parse_int(i)?;
            log::debug!("...with {beats} beats");
            let mut start = measure_start;
            for b in 1..=beats {
                log::debug!("--------");
                log::debug!("Parsing beat {b}");
                // the slot keeps its start while the beat is decoded aside
                let slot = self
                    .voice_mut(track_index, header_index, voice_index)
                    .beat_at(start);
                let mut beat = std::mem::replace(
                    slot,
                    Beat {
                        start,
                        ..Default::default()
                    },
                );
                let (inner, ()) = self.parse_beat(i, &mut beat, track_index, header_index)?;
                i = inner;
                let beat_length = if beat.status == BeatStatus::Empty {
                    0
                } else {
                    beat.duration.calc_time()
                };
                *self
                    .voice_mut(track_index, header_index, voice_index)
                    .beat_at(start) = beat;
                start = start
                    .checked_add(beat_length)
                    .ok_or_else(|| invalid_value("beat start", start))?;
            }
            Ok((i, ()))
        }
    }

    fn parse_beat<'a>(
        &mut self,
        i: &'a [u8],
        beat: &mut Beat,
        track_index: usize,
        header_index: usize,
    ) -> GpResult<'a, ()> {
        let (mut i, flags) = parse_u8(i)?;
        log::debug!("Beat flags: {flags:08b}");

        // beat type
        if (flags & 0x40) != 0 {
            let (inner, status) = parse_u8(i)?;
            i = inner;
            beat.status = match status {
                0 => BeatStatus::Empty,
                1 => BeatStatus::Normal,
                2 => BeatStatus::Rest,
                x => return Err(invalid_value("beat status", x)),
            };
        }

        let (inner, duration) = parse_duration(flags)(i)?;
        i = inner;
        beat.duration = duration;

        // beat chords
        if (flags & 0x02) != 0 {
            let string_count = self.song.tracks[track_index].strings.len();
            let (inner, chord) = parse_chord(string_count)(i)?;
            i = inner;
            beat.effect.chord = Some(chord);
        }

        // beat text
        if (flags & 0x04) != 0 {
            let (inner, text) = parse_int_byte_sized_string(i)?;
            i = inner;
            log::debug!("Beat text: {text}");
            beat.text = text;
        }

        // beat effect
        if (flags & 0x08) != 0 {
            let (inner, ()) = parse_beat_effects(i, &mut beat.effect)?;
            i = inner;
        }

        // parse mix change
        if (flags & 0x10) != 0 {
            let (inner, mix_table_change) = self.parse_mix_table_change(i, header_index)?;
            i = inner;
            beat.effect.mix_table_change = Some(mix_table_change);
        }

        // parse notes
        let (inner, string_flags) = parse_u8(i)?;
        i = inner;
        let beat_start = beat.start;
        let track = &self.song.tracks[track_index];
        log::debug!(
            "Parsing notes for beat strings:{}, flags:{string_flags:08b}",
            track.strings.len()
        );
        for guitar_string in &track.strings {
            if string_flags & (1 << (7 - guitar_string.number)) != 0 {
                let (inner, note) = self.parse_note(i, guitar_string, track_index, beat_start)?;
                i = inner;
                beat.notes.push(note);
            }
        }

        let (i, (display, octave)) = parse_beat_display(i)?;
        beat.display = display;
        beat.octave = octave;
        Ok((i, ()))
    }

    fn parse_note<'a>(
        &self,
        i: &'a [u8],
        guitar_string: &GuitarString,
        track_index: usize,
        beat_start: u32,
    ) -> GpResult<'a, Note> {
        log::debug!("Parsing note {guitar_string:?}");
        let (mut i, flags) = parse_u8(i)?;
        let mut note = Note::new(guitar_string.number);
        note.effect.heavy_accentuated_note = (flags & 0x02) == 0x02;
        note.effect.ghost_note = (flags & 0x04) == 0x04;
        note.effect.accentuated_note = (flags & 0x40) == 0x40;

        // note type
        if (flags & 0x20) != 0 {
            let (inner, note_type) = parse_u8(i)?;
            i = inner;
            note.kind = NoteType::get_note_type(note_type);
        }

        // note velocity
        if (flags & 0x10) != 0 {
            let (inner, velocity) = parse_i8(i)?;
            i = inner;
            note.velocity = convert_velocity(i16::from(velocity));
        }

        // fret number
        if (flags & 0x20) != 0 {
            let (inner, fret) = parse_i8(i)?;
            i = inner;
            let value = if note.kind == NoteType::Tie {
                self.get_tied_note_value(guitar_string.number, track_index, beat_start)
            } else {
                i16::from(fret)
            };
            note.value = if (0..100).contains(&value) { value } else { 0 };
        }

        // fingering
        if (flags & 0x80) != 0 {
            let (inner, (left, right)) = (parse_i8, parse_i8).parse(i)?;
            i = inner;
            note.effect.left_hand_finger =
                Some(Fingering::from_value(left).ok_or_else(|| invalid_value("fingering", left))?);
            note.effect.right_hand_finger =
                Some(Fingering::from_value(right).ok_or_else(|| invalid_value("fingering", right))?);
        }

        if (flags & 0x01) != 0 {
            let (inner, duration_percent) = parse_f64(i)?;
            i = inner;
            note.duration_percent = duration_percent;
        }

        let (inner, flags2) = parse_u8(i)?;
        i = inner;
        note.swap_accidentals = (flags2 & 0x02) == 0x02;

        if (flags & 0x08) != 0 {
            let (inner, ()) = parse_note_effects(i, &mut note.effect)?;
            i = inner;
        }
        Ok((i, note))
    }

    /// Get note value of tied note: the closest note on the same string starting
    /// before `beat_start`, looking back from the measure being decoded.
    fn get_tied_note_value(&self, string: u8, track_index: usize, beat_start: u32) -> i16 {
        let Some(track) = self.song.tracks.get(track_index) else {
            return -1;
        };
        track
            .measures
            .iter()
            .rev()
            .flat_map(|measure| measure.voices.iter().rev())
            .find_map(|voice| {
                voice
                    .beats
                    .iter()
                    .rev()
                    .filter(|beat| beat.status != BeatStatus::Empty && beat.start < beat_start)
                    .flat_map(|beat| beat.notes.iter())
                    .find(|note| note.string == string)
                    .map(|note| note.value)
            })
            .unwrap_or(-1)
    }

    fn parse_mix_table_change<'a>(
        &mut self,
        i: &'a [u8],
        header_index: usize,
    ) -> GpResult<'a, MixTableChange> {
        log::debug!("Parsing mix change");
        let (i, instrument) = parse_i8(i)?;
        let (mut i, rse) = parse_rse_instrument(self.caps)(i)?;
        if self.caps.mix_table_padding_byte {
            i = skip(i, 1)?;
        }

        let (i, (volume, balance, chorus, reverb, phaser, tremolo)) =
            (parse_i8, parse_i8, parse_i8, parse_i8, parse_i8, parse_i8).parse(i)?;
        let (mut i, (tempo_name, tempo)) = (parse_int_byte_sized_string, parse_int).parse(i)?;
        log::debug!("Tempo name: {tempo_name}, tempo: {tempo}");

        let mut items = [volume, balance, chorus, reverb, phaser, tremolo]
            .map(|value| (value >= 0).then_some(MixTableItem::new(value)));
        for item in items.iter_mut().flatten() {
            let (inner, duration) = parse_i8(i)?;
            i = inner;
            item.duration = duration;
        }

        let mut mtc = MixTableChange {
            instrument: (instrument >= 0).then_some(MixTableItem::new(instrument)),
            rse,
            tempo_name,
            ..Default::default()
        };

        if tempo >= 0 {
            let (inner, duration) = parse_i8(i)?;
            i = inner;
            mtc.tempo = Some(tempo);
            mtc.tempo_duration = duration;
            if self.caps.mix_table_hide_tempo {
                let (inner, hide_tempo) = parse_bool(i)?;
                i = inner;
                mtc.hide_tempo = hide_tempo;
            }
            // update tempo value for all next measure headers
            self.song.measure_headers[header_index..]
                .iter_mut()
                .for_each(|mh| mh.tempo = tempo as u32);
        }

        let (mut i, (flags, wah)) = (parse_u8, parse_i8).parse(i)?;
        for (bit, item) in items.iter_mut().enumerate() {
            if let Some(item) = item {
                item.all_tracks = flags & (1 << bit) != 0;
            }
        }
        mtc.use_rse = (flags & 0x40) == 0x40;
        mtc.wah = (wah != -1).then_some(WahEffect {
            value: wah,
            display: (flags & 0x80) == 0x80,
        });

        if self.caps.mix_table_rse_effect {
            let (inner, (effect, effect_category)) =
                (parse_int_byte_sized_string, parse_int_byte_sized_string).parse(i)?;
            i = inner;
            mtc.rse.effect = effect;
            mtc.rse.effect_category = effect_category;
        }

        let [volume, balance, chorus, reverb, phaser, tremolo] = items;
        mtc.volume = volume;
        mtc.balance = balance;
        mtc.chorus = chorus;
        mtc.reverb = reverb;
        mtc.phaser = phaser;
        mtc.tremolo = tremolo;
        log::debug!("{mtc:?}");
        Ok((i, mtc))
    }
}

/// Equalizer bytes are stored as negated tenths of dB.
fn unpack_volume(value: i8) -> f32 {
    -f32::from(value) / 10.0
}
