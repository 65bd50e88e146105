//! Host runtime (Unity editor/player) version
//!
//! Format: `YEAR.MINOR[.PATCH[<type><n>]]`, e.g. `2020.3`, `2021.3.8f1`.
//! Missing components are the lowest value, so `2020.1` <= `2020.1.0f1`.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::version::error::VersionParseError;

static HOST_VERSION_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\.(\d+)(?:\.(\d+)(?:([abcfpx])(\d+))?)?$").unwrap());

/// Release channel letter of a host version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReleaseType {
    Alpha,
    Beta,
    China,
    Final,
    Patch,
    Experimental,
}

impl ReleaseType {
    fn from_letter(letter: &str) -> Option<Self> {
        match letter {
            "a" => Some(Self::Alpha),
            "b" => Some(Self::Beta),
            "c" => Some(Self::China),
            "f" => Some(Self::Final),
            "p" => Some(Self::Patch),
            "x" => Some(Self::Experimental),
            _ => None,
        }
    }

    fn letter(self) -> char {
        match self {
            Self::Alpha => 'a',
            Self::Beta => 'b',
            Self::China => 'c',
            Self::Final => 'f',
            Self::Patch => 'p',
            Self::Experimental => 'x',
        }
    }
}

/// Field order matters: the derived `Ord` compares major, minor, build, release
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct HostVersion {
    major: u32,
    minor: u32,
    build: Option<u32>,
    release: Option<(ReleaseType, u32)>,
}

impl HostVersion {
    /// Lowest possible host version; every release is eligible against it
    pub const MIN: HostVersion = HostVersion {
        major: 0,
        minor: 0,
        build: None,
        release: None,
    };

    pub fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            build: None,
            release: None,
        }
    }

    pub fn parse(value: &str) -> Result<Self, VersionParseError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let invalid = || VersionParseError::InvalidHostVersion(value.to_string());
        let captures = HOST_VERSION_PATTERN.captures(value).ok_or_else(invalid)?;

        let number = |index: usize| -> Result<Option<u32>, VersionParseError> {
            captures
                .get(index)
                .map(|m| m.as_str().parse::<u32>().map_err(|_| invalid()))
                .transpose()
        };

        let major = number(1)?.ok_or_else(invalid)?;
        let minor = number(2)?.ok_or_else(invalid)?;
        let build = number(3)?;
        let release = match (captures.get(4), number(5)?) {
            (Some(letter), Some(n)) => {
                Some((ReleaseType::from_letter(letter.as_str()).ok_or_else(invalid)?, n))
            }
            _ => None,
        };

        Ok(Self {
            major,
            minor,
            build,
            release,
        })
    }

    /// Combines the registry's `unity` and `unityRelease` fields
    /// (`"2019.4"` + `"0f1"` -> `2019.4.0f1`).
    pub fn from_registry_fields(
        unity: &str,
        unity_release: Option<&str>,
    ) -> Result<Self, VersionParseError> {
        match unity_release.map(str::trim).filter(|r| !r.is_empty()) {
            Some(release) => Self::parse(&format!("{}.{}", unity.trim(), release)),
            None => Self::parse(unity),
        }
    }

    /// A release requiring `self` can run on `target`
    pub fn is_satisfied_by(&self, target: &HostVersion) -> bool {
        self <= target
    }
}

impl Default for HostVersion {
    fn default() -> Self {
        Self::MIN
    }
}

impl fmt::Display for HostVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(build) = self.build {
            write!(f, ".{}", build)?;
            if let Some((release_type, n)) = self.release {
                write!(f, "{}{}", release_type.letter(), n)?;
            }
        }
        Ok(())
    }
}

impl FromStr for HostVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for HostVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<HostVersion> for String {
    fn from(value: HostVersion) -> Self {
        value.to_string()
    }
}
