use crate::GpError;
use serde::Serialize;
use std::cmp::Ordering;
use std::fmt;

/// Version tag embedded at the start of every Guitar Pro file,
/// e.g. `FICHIER GUITAR PRO v5.10`.
///
/// Equality is defined on the full text while ordering only looks at
/// `(major, minor)`: two tags differing only in their decorative text
/// compare as neither less nor greater, yet are not equal.
#[derive(Debug, Clone, Eq, Serialize)]
pub struct GpVersion {
    full: String,
    major: u8,
    minor: u8,
}

impl GpVersion {
    /// Parse `...v<major>.<minor>`, the last `v` marks the start of the numbers.
    pub fn parse(version: &str) -> Result<Self, GpError> {
        let format_error = || GpError::VersionFormatError(version.to_string());
        let pos = version.rfind('v').ok_or_else(format_error)?;
        let numbers = &version[pos + 1..];
        let (major, minor) = numbers.split_once('.').unwrap_or((numbers, numbers));
        let major = parse_leading_number(major).ok_or_else(format_error)?;
        let minor = parse_leading_number(minor).ok_or_else(format_error)?;
        Ok(GpVersion {
            full: version.to_string(),
            major,
            minor,
        })
    }

    pub fn full(&self) -> &str {
        &self.full
    }

    pub const fn major(&self) -> u8 {
        self.major
    }

    pub const fn minor(&self) -> u8 {
        self.minor
    }

    /// Same `(major, minor)` pair, whatever the surrounding text.
    pub fn same_release(&self, other: &GpVersion) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

/// Leading digits only, the version field may carry padding after them.
fn parse_leading_number(s: &str) -> Option<u8> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s[..end].parse().ok()
}

impl PartialEq for GpVersion {
    fn eq(&self, other: &Self) -> bool {
        self.full == other.full
    }
}

impl PartialOrd for GpVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some((self.major, self.minor).cmp(&(other.major, other.minor)))
    }
}

impl fmt::Display for GpVersion {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.full)
    }
}
