use crate::parser::gp_version::GpVersion;
use crate::parser::primitive_parser::{parse_string_field, parse_u8, GpResult};
use crate::parser::song_parser::Song;
use crate::GpError;

/// Every Guitar Pro file starts with a 30 bytes version field.
pub const VERSION_FIELD_SIZE: usize = 30;

/// Contract shared by the decoders of each Guitar Pro version family.
pub trait SongReader {
    /// Decode a complete file image, all or nothing.
    fn read_song(&mut self, data: &[u8]) -> Result<Song, GpError>;
}

/// Version gate run before any record is decoded.
#[derive(Debug, Clone)]
pub struct DecoderBase {
    supported_versions: Vec<GpVersion>,
    version: Option<GpVersion>,
}

impl DecoderBase {
    pub const fn new(supported_versions: Vec<GpVersion>) -> Self {
        DecoderBase {
            supported_versions,
            version: None,
        }
    }

    /// Active version, known once `read_and_validate_version` succeeded.
    pub const fn version(&self) -> Option<&GpVersion> {
        self.version.as_ref()
    }

    pub fn supported_versions(&self) -> &[GpVersion] {
        &self.supported_versions
    }

    /// Read the version field and reject it unless it is a supported release.
    pub fn read_and_validate_version<'a>(&mut self, i: &'a [u8]) -> GpResult<'a, GpVersion> {
        let (i, version) = parse_version(i)?;
        if !self.supported_versions.iter().any(|v| v.same_release(&version)) {
            log::error!("Unsupported GP version: {version}");
            return Err(nom::Err::Failure(GpError::UnsupportedVersionError(
                version.full().to_string(),
            )));
        }
        log::debug!("GP version: {version}");
        self.version = Some(version.clone());
        Ok((i, version))
    }

    /// Map a signed byte controller value onto a centered 16 bits range.
    pub fn byte_to_channel_short(byte: i8) -> i16 {
        let shifted = (i32::from(byte) << 3) - 1;
        let value = shifted.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
        value.max(-1) + 1
    }
}

/// Parse the version string from the file header.
///
/// 30 character string (not counting the byte announcing the real length of the string)
///
/// <https://dguitar.sourceforge.net/GP4format.html#VERSIONS>
pub fn parse_version(i: &[u8]) -> GpResult<'_, GpVersion> {
    log::debug!("Parsing GP version");
    let (i, declared) = parse_u8(i)?;
    let length = usize::from(declared).min(VERSION_FIELD_SIZE);
    let (i, version_string) = parse_string_field(VERSION_FIELD_SIZE, length)(i)?;
    let version = GpVersion::parse(&version_string).map_err(|e| {
        log::error!("Unable to read version {version_string:?}");
        nom::Err::Failure(e)
    })?;
    Ok((i, version))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version_field(text: &str, declared: u8) -> Vec<u8> {
        let mut data = vec![declared];
        data.extend_from_slice(text.as_bytes());
        data.resize(1 + VERSION_FIELD_SIZE, 0);
        data
    }

    fn gp5_base() -> DecoderBase {
        DecoderBase::new(vec![
            GpVersion::parse("FICHIER GUITAR PRO v5.00").unwrap(),
            GpVersion::parse("FICHIER GUITAR PRO v5.10").unwrap(),
        ])
    }

    #[test]
    fn byte_to_channel_short_range_and_monotonic() {
        let mut previous = i16::MIN;
        for b in i8::MIN..=i8::MAX {
            let value = DecoderBase::byte_to_channel_short(b);
            assert!(value > i16::MIN, "byte {b}");
            assert!(value >= previous, "byte {b}");
            previous = value;
        }
    }

    #[test]
    fn byte_to_channel_short_values() {
        assert_eq!(DecoderBase::byte_to_channel_short(-128), 0);
        assert_eq!(DecoderBase::byte_to_channel_short(-1), 0);
        assert_eq!(DecoderBase::byte_to_channel_short(0), 0);
        assert_eq!(DecoderBase::byte_to_channel_short(1), 8);
        assert_eq!(DecoderBase::byte_to_channel_short(13), 104);
        assert_eq!(DecoderBase::byte_to_channel_short(127), 1016);
    }

    #[test]
    fn validates_supported_version() {
        let mut base = gp5_base();
        assert!(base.version().is_none());
        let mut data = version_field("FICHIER GUITAR PRO v5.10", 24);
        data.push(0xAB);
        let (rest, version) = base.read_and_validate_version(&data).unwrap();
        assert_eq!(rest, &[0xAB]);
        assert_eq!(version.minor(), 10);
        assert_eq!(base.version(), Some(&version));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut base = gp5_base();
        let data = version_field("FICHIER GUITAR PRO v4.06", 24);
        let err = base.read_and_validate_version(&data).unwrap_err();
        assert_eq!(
            GpError::from(err),
            GpError::UnsupportedVersionError("FICHIER GUITAR PRO v4.06".to_string())
        );
        assert!(base.version().is_none());
    }

    #[test]
    fn declared_length_is_clamped() {
        let data = version_field("FICHIER GUITAR PRO v5.00", 200);
        let (rest, version) = parse_version(&data).unwrap();
        assert!(rest.is_empty());
        // the trailing padding is kept, the numbers still parse
        assert_eq!(version.full().len(), VERSION_FIELD_SIZE);
        assert_eq!(version.major(), 5);
    }

    #[test]
    fn declared_length_truncates_field() {
        let data = version_field("FICHIER GUITAR PRO v5.00 and more", 24);
        let (_, version) = parse_version(&data).unwrap();
        assert_eq!(version.full(), "FICHIER GUITAR PRO v5.00");
    }

    #[test]
    fn malformed_version_is_a_format_error() {
        let data = version_field("FICHIER GUITAR PRO va.00", 24);
        let err = parse_version(&data).unwrap_err();
        assert_eq!(
            GpError::from(err),
            GpError::VersionFormatError("FICHIER GUITAR PRO va.00".to_string())
        );
    }

    #[test]
    fn truncated_version_is_a_stream_error() {
        let data = [24, b'F', b'I'];
        let err = parse_version(&data).unwrap_err();
        assert!(matches!(GpError::from(err), GpError::StreamError(_)));
    }
}
