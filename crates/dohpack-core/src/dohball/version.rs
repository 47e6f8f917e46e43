//! Dohball versions: `major.minor.patch` plus a letter suffix.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Each numeric component wraps when it reaches this value.
const COMPONENT_LIMIT: u32 = 100;

/// Errors from parsing or advancing a version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("invalid version string '{0}'")]
    Invalid(String),

    #[error("version {0} cannot be advanced: suffixes exhausted")]
    Exhausted(String),
}

/// A dohball version such as `0.0.1a`.
///
/// Ordering is `(major, minor, patch, suffix)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub suffix: char,
}

impl Default for Version {
    /// The version of a package that has never been baked.
    fn default() -> Self {
        Self::new(0, 0, 0, 'a')
    }
}

impl Version {
    #[must_use]
    pub const fn new(major: u32, minor: u32, patch: u32, suffix: char) -> Self {
        Self {
            major,
            minor,
            patch,
            suffix,
        }
    }

    /// Zero-based index of the suffix letter.
    #[must_use]
    pub fn suffix_index(&self) -> u32 {
        u32::from(self.suffix) - u32::from('a')
    }

    /// The next version.
    ///
    /// Patch wraps into minor, minor into major; a saturated major moves to
    /// the next suffix letter and restarts at `0.0.1`.
    ///
    /// # Errors
    /// Returns [`VersionError::Exhausted`] when the suffix would pass `z`.
    pub fn increment(&self) -> Result<Self, VersionError> {
        let mut next = *self;
        next.patch += 1;
        if next.patch >= COMPONENT_LIMIT {
            next.patch = 0;
            next.minor += 1;
        }
        if next.minor >= COMPONENT_LIMIT {
            next.minor = 0;
            next.major += 1;
        }
        if next.major >= COMPONENT_LIMIT {
            if self.suffix >= 'z' {
                return Err(VersionError::Exhausted(self.to_string()));
            }
            let idx = self.suffix_index() + 1;
            next = Self::new(0, 0, 1, suffix_from_index(idx).unwrap_or('z'));
        }
        Ok(next)
    }

    /// Numeric encoding: `major*1_000_000 + minor*10_000 + patch*100 + suffix`.
    #[must_use]
    pub fn encode(&self) -> u64 {
        u64::from(self.major) * 1_000_000
            + u64::from(self.minor) * 10_000
            + u64::from(self.patch) * 100
            + u64::from(self.suffix_index())
    }

    /// Inverse of [`Version::encode`].
    ///
    /// # Errors
    /// Returns [`VersionError::Invalid`] when a component is out of range.
    pub fn decode(n: u64) -> Result<Self, VersionError> {
        let invalid = || VersionError::Invalid(n.to_string());
        let suffix_idx = u32::try_from(n % 100).map_err(|_| invalid())?;
        let patch = u32::try_from((n / 100) % 100).map_err(|_| invalid())?;
        let minor = u32::try_from((n / 10_000) % 100).map_err(|_| invalid())?;
        let major = u32::try_from(n / 1_000_000).map_err(|_| invalid())?;

        let suffix = suffix_from_index(suffix_idx).ok_or_else(invalid)?;
        if major >= COMPONENT_LIMIT {
            return Err(invalid());
        }
        Ok(Self::new(major, minor, patch, suffix))
    }
}

fn suffix_from_index(idx: u32) -> Option<char> {
    if idx < 26 {
        char::from_u32(u32::from('a') + idx)
    } else {
        None
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}{}",
            self.major, self.minor, self.patch, self.suffix
        )
    }
}

impl FromStr for Version {
    type Err = VersionError;

    /// Parses `1.2.3b`; a missing suffix reads as `a`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || VersionError::Invalid(s.to_string());
        let mut parts = s.trim().splitn(3, '.');

        let component = |part: Option<&str>| -> Result<u32, VersionError> {
            let n: u32 = part.ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
            if n >= COMPONENT_LIMIT {
                return Err(invalid());
            }
            Ok(n)
        };

        let major = component(parts.next())?;
        let minor = component(parts.next())?;

        let last = parts.next().ok_or_else(invalid)?;
        let (digits, suffix) = match last.chars().last() {
            Some(c) if c.is_ascii_lowercase() => (&last[..last.len() - 1], c),
            Some(_) => (last, 'a'),
            None => return Err(invalid()),
        };
        let patch = component(Some(digits))?;

        Ok(Self::new(major, minor, patch, suffix))
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
