//! Release version of a Unity package
//!
//! Unity packages use a dotted numeric core with an optional pre-release
//! qualifier: `1.2.3`, `1.2.3-preview`, `1.2.3-pre.4`, `1.2.3-pre.4a`.
//!
//! Ordering:
//! - the numeric core is compared first (a shorter core sorts before a longer
//!   one with the same prefix, so `1.2` < `1.2.0`)
//! - at equal core, a token without qualifier is greater than one with a qualifier
//! - two qualified tokens compare by pre-release counter, then suffix letter

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::version::error::VersionParseError;

/// Maximum number of numeric components (major.minor.patch.build)
const MAX_CORE_COMPONENTS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VersionToken {
    core: Vec<u32>,
    separator: Option<String>,
    pre_release: Option<u32>,
    suffix: Option<char>,
}

impl VersionToken {
    /// Placeholder version used for fingerprints of shipped binaries
    pub fn zero() -> Self {
        Self {
            core: vec![0, 0, 0, 0],
            separator: None,
            pre_release: None,
            suffix: None,
        }
    }

    pub fn parse(value: &str) -> Result<Self, VersionParseError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(VersionParseError::Empty);
        }

        let (core_text, qualifier) = match value.split_once('-') {
            Some((core, qualifier)) => (core, Some(qualifier)),
            None => (value, None),
        };

        let core = core_text
            .split('.')
            .map(|part| part.parse::<u32>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VersionParseError::InvalidCore(value.to_string()))?;

        if core.len() < 2 || core.len() > MAX_CORE_COMPONENTS {
            return Err(VersionParseError::InvalidCore(value.to_string()));
        }

        let mut token = Self {
            core,
            separator: None,
            pre_release: None,
            suffix: None,
        };

        let Some(qualifier) = qualifier else {
            return Ok(token);
        };

        let mut parts = qualifier.split('.');
        let separator = parts.next().unwrap_or_default();
        if separator.is_empty() {
            return Err(VersionParseError::InvalidPreRelease(value.to_string()));
        }
        token.separator = Some(separator.to_string());

        if let Some(counter) = parts.next() {
            let digits: String = counter.chars().take_while(|c| c.is_ascii_digit()).collect();
            let rest = &counter[digits.len()..];
            let pre_release = digits
                .parse::<u32>()
                .map_err(|_| VersionParseError::InvalidPreRelease(value.to_string()))?;

            let mut rest_chars = rest.chars();
            token.suffix = match (rest_chars.next(), rest_chars.next()) {
                (None, _) => None,
                (Some(letter), None) if letter.is_ascii_alphabetic() => Some(letter),
                _ => return Err(VersionParseError::InvalidPreRelease(value.to_string())),
            };
            token.pre_release = Some(pre_release);
        }

        Ok(token)
    }

    pub fn core(&self) -> &[u32] {
        &self.core
    }

    pub fn separator(&self) -> Option<&str> {
        self.separator.as_deref()
    }

    pub fn pre_release(&self) -> Option<u32> {
        self.pre_release
    }

    pub fn suffix(&self) -> Option<char> {
        self.suffix
    }

    pub fn is_pre_release(&self) -> bool {
        self.separator.is_some()
    }
}

impl Ord for VersionToken {
    fn cmp(&self, other: &Self) -> Ordering {
        self.core
            .cmp(&other.core)
            .then_with(|| match (&self.separator, &other.separator) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(_), Some(_)) => self
                    .pre_release
                    .cmp(&other.pre_release)
                    .then_with(|| self.suffix.cmp(&other.suffix))
                    // Only reached for tokens differing in separator text alone
                    .then_with(|| self.separator.cmp(&other.separator)),
            })
    }
}

impl PartialOrd for VersionToken {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core: Vec<String> = self.core.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", core.join("."))?;

        if let Some(separator) = &self.separator {
            write!(f, "-{}", separator)?;
            if let Some(pre_release) = self.pre_release {
                write!(f, ".{}", pre_release)?;
                if let Some(suffix) = self.suffix {
                    write!(f, "{}", suffix)?;
                }
            }
        }

        Ok(())
    }
}

impl FromStr for VersionToken {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for VersionToken {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<VersionToken> for String {
    fn from(value: VersionToken) -> Self {
        value.to_string()
    }
}
