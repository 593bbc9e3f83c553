use crate::GpError;
use encoding_rs::WINDOWS_1252;
use nom::combinator::{flat_map, map};
use nom::{bytes, number, IResult, Parser};

/// Parser result over the raw file bytes.
pub type GpResult<'a, T> = IResult<&'a [u8], T, GpError>;

/// Parse signed byte
pub fn parse_i8(i: &[u8]) -> GpResult<'_, i8> {
    number::complete::le_i8(i)
}

/// Parse unsigned byte
pub fn parse_u8(i: &[u8]) -> GpResult<'_, u8> {
    number::complete::le_u8(i)
}

/// Parse signed short
pub fn parse_short(i: &[u8]) -> GpResult<'_, i16> {
    number::complete::le_i16(i)
}

/// Parse unsigned short
pub fn parse_u16(i: &[u8]) -> GpResult<'_, u16> {
    number::complete::le_u16(i)
}

/// Parse signed 32
pub fn parse_int(i: &[u8]) -> GpResult<'_, i32> {
    number::complete::le_i32(i)
}

/// Parse unsigned 32
pub fn parse_u32(i: &[u8]) -> GpResult<'_, u32> {
    number::complete::le_u32(i)
}

/// Parse 64 bits float
pub fn parse_f64(i: &[u8]) -> GpResult<'_, f64> {
    number::complete::le_f64(i)
}

/// Parse bool, any non zero byte is true
pub fn parse_bool(i: &[u8]) -> GpResult<'_, bool> {
    map(parse_u8, |b| b != 0).parse(i)
}

/// Take exactly `n` raw bytes.
pub fn take_bytes(i: &[u8], n: usize) -> GpResult<'_, &[u8]> {
    bytes::complete::take(n)(i)
}

/// Skip `n` bytes.
pub fn skip(i: &[u8], n: usize) -> Result<&[u8], nom::Err<GpError>> {
    log::debug!("skip: {n}");
    let (rest, _) = take_bytes(i, n)?;
    Ok(rest)
}

/// Materialize properly encoded String
pub fn make_string(i: &[u8]) -> String {
    let (cow, encoding_used, had_errors) = WINDOWS_1252.decode(i);
    if had_errors {
        log::debug!("Error parsing string with {encoding_used:?}");
        match std::str::from_utf8(i) {
            Ok(s) => s.to_string(),
            Err(e) => {
                log::debug!("Error UTF-8 string parsing:{e}");
                String::new()
            }
        }
    } else {
        cow.to_string()
    }
}

/// Parse fixed text of `len` bytes, padding included.
pub fn parse_fixed_string(len: usize) -> impl Fn(&[u8]) -> GpResult<'_, String> {
    move |i: &[u8]| {
        let (rest, field) = take_bytes(i, len)?;
        Ok((rest, make_string(field)))
    }
}

/// Parse string field of length `string_len` with total size to consume `field_size`
pub fn parse_string_field(
    field_size: usize,
    string_len: usize,
) -> impl Fn(&[u8]) -> GpResult<'_, String> {
    move |i: &[u8]| {
        log::debug!("Parsing string field: field_size={field_size}, string_len={string_len}");

        // Read exactly the field size
        let (rest, field) = take_bytes(i, field_size)?;

        log::debug!("Raw field raw={field:02X?}");

        // Decode only the meaningful string bytes
        let string = make_string(&field[..std::cmp::min(string_len, field_size)]);

        Ok((rest, string))
    }
}

/// Size of string encoded as Byte.
/// [u8 string_len][string_len bytes]
pub fn parse_byte_sized_string(i: &[u8]) -> GpResult<'_, String> {
    flat_map(parse_u8, |len| parse_fixed_string(len as usize)).parse(i)
}

/// Size of string encoded as Int.
/// [u32 string_len][string_len bytes]
pub fn parse_int_sized_string(i: &[u8]) -> GpResult<'_, String> {
    flat_map(parse_u32, |len| parse_fixed_string(len as usize)).parse(i)
}

/// Byte sized string stored in a padded field.
/// `size`:   total size of the field after the length byte
/// `length`: provided length (in case of blank chars after the string)
pub fn parse_byte_size_string(size: usize) -> impl Fn(&[u8]) -> GpResult<'_, String> {
    move |i: &[u8]| {
        let (i, length) = parse_u8(i)?;
        log::debug!("Parsing byte sized string of length {length} for String size {size}");
        parse_string_field(size, length as usize)(i)
    }
}

/// Size of string encoded as Int, but the size is encoded as a byte.
/// The leading int mirrors the byte length and is not trusted.
pub fn parse_int_byte_sized_string(i: &[u8]) -> GpResult<'_, String> {
    let i = skip(i, 4)?;
    parse_byte_sized_string(i)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_byte_size_string() {
        let data: Vec<u8> = vec![
            0x18, 0x46, 0x49, 0x43, 0x48, 0x49, 0x45, 0x52, 0x20, 0x47, 0x55, 0x49, 0x54, 0x41,
            0x52, 0x20, 0x50, 0x52, 0x4f, 0x20, 0x76, 0x35, 0x2e, 0x31, 0x30, 0x00, 0x00, 0x00,
            0x00, 0x00, 0x00,
        ];
        let (rest, res) = parse_byte_size_string(30)(&data).unwrap();
        assert_eq!(res, "FICHIER GUITAR PRO v5.10");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_read_little_endian_numbers() {
        let data = [0xFE, 0xFF, 0x01, 0x00, 0x00, 0x00];
        let (rest, short) = parse_short(&data).unwrap();
        assert_eq!(short, -2);
        let (rest, int) = parse_int(rest).unwrap();
        assert_eq!(int, 1);
        assert!(rest.is_empty());

        let (_, unsigned) = parse_u16(&data).unwrap();
        assert_eq!(unsigned, 0xFFFE);
    }

    #[test]
    fn test_read_bool_non_zero_is_true() {
        let data = [0x00, 0x01, 0x02];
        let (i, a) = parse_bool(&data).unwrap();
        let (i, b) = parse_bool(i).unwrap();
        let (_, c) = parse_bool(i).unwrap();
        assert!(!a);
        assert!(b);
        assert!(c);
    }

    #[test]
    fn test_read_int_sized_string() {
        let data = [0x03, 0x00, 0x00, 0x00, b'a', b'b', b'c', 0xAA];
        let (rest, res) = parse_int_sized_string(&data).unwrap();
        assert_eq!(res, "abc");
        assert_eq!(rest, &[0xAA]);
    }

    #[test]
    fn test_read_int_byte_sized_string_ignores_mirrored_length() {
        // mirrored int length is wrong on purpose, only the byte length counts
        let data = [0x09, 0x00, 0x00, 0x00, 0x02, b'h', b'i', 0xBB];
        let (rest, res) = parse_int_byte_sized_string(&data).unwrap();
        assert_eq!(res, "hi");
        assert_eq!(rest, &[0xBB]);
    }

    #[test]
    fn test_read_windows_1252_string() {
        let data = [0x02, 0xE9, 0x74];
        let (_, res) = parse_byte_sized_string(&data).unwrap();
        assert_eq!(res, "ét");
    }

    #[test]
    fn test_short_read_fails_with_stream_error() {
        let data = [0x05, b'a', b'b'];
        let err = parse_byte_sized_string(&data).unwrap_err();
        assert!(matches!(err, nom::Err::Error(GpError::StreamError(_))));

        let err = skip(&data, 4).unwrap_err();
        assert!(matches!(err, nom::Err::Error(GpError::StreamError(_))));

        let err = parse_int(&data).unwrap_err();
        assert!(matches!(err, nom::Err::Error(GpError::StreamError(_))));
    }

    #[test]
    fn test_skip_advances_cursor() {
        let data = [1, 2, 3, 4];
        let rest = skip(&data, 3).unwrap();
        assert_eq!(rest, &[4]);
    }
}
