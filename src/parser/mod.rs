pub mod decoder_base;
pub mod gp5_parser;
pub mod gp_version;
pub mod music_parser;
pub mod primitive_parser;
pub mod song_parser;
