//! Minimal GP5 image writer shared by the integration tests.

pub struct Writer(Vec<u8>);

impl Writer {
    fn bytes(&mut self, b: &[u8]) -> &mut Self {
        self.0.extend_from_slice(b);
        self
    }

    fn int(&mut self, v: i32) -> &mut Self {
        self.bytes(&v.to_le_bytes())
    }

    fn int_byte_string(&mut self, s: &str) -> &mut Self {
        self.int(s.len() as i32 + 1).bytes(&[s.len() as u8]).bytes(s.as_bytes())
    }

    fn padded(&mut self, s: &str, size: usize) -> &mut Self {
        self.bytes(&[s.len() as u8]).bytes(s.as_bytes());
        self.bytes(&vec![0; size - s.len()])
    }
}

/// Single guitar track, single measure holding one quarter note on the first string.
pub fn reference_gp5(minor: u8) -> Vec<u8> {
    let mut w = Writer(Vec::new());
    let version = if minor == 0 {
        "FICHIER GUITAR PRO v5.00"
    } else {
        "FICHIER GUITAR PRO v5.10"
    };
    w.padded(version, 30);
    for s in ["title", "subtitle", "artist", "album", "lyrics", "music", "copyright", "tab"] {
        w.int_byte_string(s);
    }
    w.int_byte_string("instructions").int(0);
    // lyrics
    w.int(1).int(1).int(21).bytes(b"these are the lyrics ");
    for _ in 0..4 {
        w.int(1).int(0);
    }
    w.bytes(&[0; 19]);
    // page setup
    for v in [210, 297, 10, 10, 15, 10, 100] {
        w.int(v);
    }
    w.bytes(&0x01FFu16.to_le_bytes());
    for _ in 0..10 {
        w.int_byte_string("");
    }
    // tempo, key, octave
    w.int_byte_string("").int(120);
    if minor > 0 {
        w.bytes(&[0]);
    }
    w.bytes(&[0]).int(0);
    for _ in 0..64 {
        w.int(25).bytes(&[13, 8, 0, 0, 0, 0, 0, 0]);
    }
    for _ in 0..19 {
        w.bytes(&(-1i16).to_le_bytes());
    }
    w.int(0).int(1).int(1);
    // measure header
    w.bytes(&[0x43, 4, 4, 1, 0, 2, 2, 2, 2, 0, 0]);
    // track
    w.bytes(&[0, 0x08]).padded("Guitar", 40).int(6);
    for tuning in [64, 59, 55, 50, 45, 40, 0] {
        w.int(tuning);
    }
    w.int(1).int(1).int(2).int(24).int(0).bytes(&[0, 0, 255, 0]);
    w.bytes(&[0x03, 0x00, 0, 0]);
    w.bytes(&[0; 25]).int(-1).int(0).int(-1);
    if minor == 0 {
        w.bytes(&[0xFF, 0xFF, 0]).bytes(&[0, 0]);
    } else {
        w.int(-1).bytes(&[0, 0, 0, 0]).int_byte_string("").int_byte_string("");
        w.bytes(&[0]);
    }
    // voice 1 with one beat, empty voice 2, line break
    w.int(1).bytes(&[0x00, 0x00, 0x40, 0x20, 1, 3, 0, 0, 0]);
    w.int(0).bytes(&[0]);
    w.0
}
