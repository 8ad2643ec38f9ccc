use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::io::stdfile::StdFileError;
use crate::spectrum::SpectrumShapeError;

use super::references::ReferenceRole;

/// Problems with the measurement settings. These abort a run before or during
/// the reference phase.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("The exposure time must be positive")]
    NonPositiveExposure,
    #[error("The maximum number of scans per device capture must be at least 1")]
    InvalidMaxScans,
    #[error("The exposure limits are inverted: minimum {min} ms, maximum {max} ms")]
    InvalidExposureLimits { min: u32, max: u32 },
    #[error("The target intensity fraction {0} is outside (0, 1]")]
    InvalidTargetFraction(f64),
    #[error("The dark classification fraction {0} is outside (0, 1]")]
    InvalidDarkFraction(f64),
    #[error("The spectrometer must report at least one channel")]
    NoChannels,
    #[error("No {role} spectrum was found in {directory} and no fallback file is configured")]
    MissingReference {
        role: ReferenceRole,
        directory: PathBuf,
    },
    #[error("No directory to watch was configured")]
    MissingDirectory,
}

/// Failures reported by a spectrometer adapter
#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("The spectrometer failed to deliver a scan: {0}")]
    ScanFailed(String),
    #[error("The spectrometer is not connected")]
    Disconnected,
    #[error("The spectrometer rejected the setting: {0}")]
    InvalidSetting(String),
    #[error("An I/O error occurred while talking to the spectrometer: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}

/// Failures reported by an evaluation engine. These never end a run.
#[derive(Debug, Clone, Error)]
pub enum EvaluationError {
    #[error("The fit did not converge: {0}")]
    NotConverged(String),
    #[error("The evaluator is missing its references: {0}")]
    NotReady(String),
    #[error("The evaluator rejected the spectrum: {0}")]
    Rejected(String),
}

/// The reasons an acquisition run can end early
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Invalid configuration: {0}")]
    Configuration(
        #[from]
        #[source]
        ConfigError,
    ),
    #[error("A capture did not match the stored references: {0}")]
    Shape(
        #[from]
        #[source]
        SpectrumShapeError,
    ),
    #[error("The spectrometer failed: {0}")]
    Device(
        #[from]
        #[source]
        DeviceError,
    ),
    #[error("Failed to read the {role} reference {}: {source}", path.display())]
    ReferenceFile {
        role: ReferenceRole,
        path: PathBuf,
        #[source]
        source: StdFileError,
    },
    #[error("A {found} spectrum was recorded while {expected:?} was expected")]
    UnexpectedRole {
        expected: Option<ReferenceRole>,
        found: ReferenceRole,
    },
    #[error("The {0} reference has not been recorded yet")]
    MissingReference(ReferenceRole),
    #[error("An I/O error occurred: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}
