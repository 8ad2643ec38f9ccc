//! File names of archived spectra.
//!
//! Reference spectra are stored as `<role>_<channel>.STD` and normal spectra as
//! `<sequence:05>_<channel>.STD`, one file per detector channel.
use std::fmt::Display;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

use crate::acquisition::references::ReferenceRole;
use crate::io::compression::strip_gzip_suffix;

pub const STD_EXTENSION: &str = "STD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpectrumFileName {
    Reference { role: ReferenceRole, channel: usize },
    Normal { sequence: u32, channel: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0:?} is not a recognized spectrum file name")]
pub struct FileNameError(pub String);

fn normal_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<sequence>[0-9]{5})_(?P<channel>[0-9])\.STD$").expect("valid pattern")
    })
}

fn reference_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<role>offset|darkcur|dark|sky)_(?P<channel>[0-9])\.STD$")
            .expect("valid pattern")
    })
}

/// Whether `name` looks like a normal spectrum file, optionally gzip-compressed
pub fn is_normal_spectrum_name(name: &str) -> bool {
    normal_pattern().is_match(strip_gzip_suffix(name))
}

impl SpectrumFileName {
    pub fn reference(role: ReferenceRole, channel: usize) -> Self {
        Self::Reference { role, channel }
    }

    pub fn normal(sequence: u32, channel: usize) -> Self {
        Self::Normal { sequence, channel }
    }

    pub fn channel(&self) -> usize {
        match self {
            Self::Reference { channel, .. } | Self::Normal { channel, .. } => *channel,
        }
    }

    /// The same file name for a different channel
    pub fn with_channel(self, channel: usize) -> Self {
        match self {
            Self::Reference { role, .. } => Self::Reference { role, channel },
            Self::Normal { sequence, .. } => Self::Normal { sequence, channel },
        }
    }

    pub fn sequence(&self) -> Option<u32> {
        match self {
            Self::Normal { sequence, .. } => Some(*sequence),
            Self::Reference { .. } => None,
        }
    }
}

impl Display for SpectrumFileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reference { role, channel } => {
                write!(f, "{}_{channel}.{STD_EXTENSION}", role.file_stem())
            }
            Self::Normal { sequence, channel } => {
                write!(f, "{sequence:05}_{channel}.{STD_EXTENSION}")
            }
        }
    }
}

impl FromStr for SpectrumFileName {
    type Err = FileNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = strip_gzip_suffix(s);
        if let Some(caps) = normal_pattern().captures(name) {
            let sequence = caps["sequence"]
                .parse()
                .map_err(|_| FileNameError(s.to_string()))?;
            let channel = caps["channel"]
                .parse()
                .map_err(|_| FileNameError(s.to_string()))?;
            return Ok(Self::Normal { sequence, channel });
        }
        if let Some(caps) = reference_pattern().captures(name) {
            let role = ReferenceRole::from_file_stem(&caps["role"])
                .ok_or_else(|| FileNameError(s.to_string()))?;
            let channel = caps["channel"]
                .parse()
                .map_err(|_| FileNameError(s.to_string()))?;
            return Ok(Self::Reference { role, channel });
        }
        Err(FileNameError(s.to_string()))
    }
}
