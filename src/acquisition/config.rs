//! Settings for live traverse runs and directory ingestion.
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::spectrum::IntensityWindow;

use super::error::ConfigError;
use super::exposure::{AdaptiveExposure, ExposureLimits, ExposureMode};
use super::references::{DarkCheck, ReferenceMode, ReferenceRole};

/// Wind conditions used to turn columns into a flux
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WindField {
    /// Meters per second
    pub speed: f64,
    /// The direction the wind blows from, in degrees clockwise from north
    pub direction: f64,
}

impl Default for WindField {
    fn default() -> Self {
        Self {
            speed: 1.0,
            direction: 0.0,
        }
    }
}

fn check_fraction(value: f64, err: fn(f64) -> ConfigError) -> Result<(), ConfigError> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(err(value))
    }
}

/// Settings for a live traverse run
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MeasurementConfig {
    pub exposure_mode: ExposureMode,
    pub exposure_limits: ExposureLimits,
    /// The time between successive reported spectra, in milliseconds
    pub time_resolution_ms: u32,
    /// The fraction of saturation adaptive exposure aims for
    pub target_fraction: f64,
    /// Spectra whose per-exposure center intensity lies below this fraction of
    /// saturation are classified as dark
    pub dark_fraction: f64,
    pub intensity_window: IntensityWindow,
    /// The exposure used to probe the sky before choosing an exposure
    pub probe_exposure_ms: u32,
    pub dark_current_exposure_ms: u32,
    /// Skip covering the spectrometer and zero-fill the dark reference instead
    pub no_dark: bool,
    /// How long to wait after an operator prompt before capturing
    pub prompt_wait_ms: u64,
    /// Stop after this many normal spectra
    pub max_spectra: Option<u32>,
    pub wind: WindField,
}

impl Default for MeasurementConfig {
    fn default() -> Self {
        Self {
            exposure_mode: ExposureMode::default(),
            exposure_limits: ExposureLimits::default(),
            time_resolution_ms: 1000,
            target_fraction: 0.7,
            dark_fraction: 0.1,
            intensity_window: IntensityWindow::default(),
            probe_exposure_ms: 10,
            dark_current_exposure_ms: 10_000,
            no_dark: false,
            prompt_wait_ms: 0,
            max_spectra: None,
            wind: WindField::default(),
        }
    }
}

impl MeasurementConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.exposure_limits.validate()?;
        if matches!(self.exposure_mode, ExposureMode::Fixed(0))
            || self.probe_exposure_ms == 0
            || self.dark_current_exposure_ms == 0
        {
            return Err(ConfigError::NonPositiveExposure);
        }
        check_fraction(self.target_fraction, ConfigError::InvalidTargetFraction)?;
        check_fraction(self.dark_fraction, ConfigError::InvalidDarkFraction)?;
        Ok(())
    }

    pub fn reference_mode(&self) -> ReferenceMode {
        if self.exposure_mode.is_adaptive() {
            ReferenceMode::AdaptiveExposure
        } else {
            ReferenceMode::FixedExposure
        }
    }

    pub fn prompt_wait(&self) -> Duration {
        Duration::from_millis(self.prompt_wait_ms)
    }

    pub fn dark_check(&self, saturation_intensity: f64) -> DarkCheck {
        DarkCheck::new(self.intensity_window, saturation_intensity, self.dark_fraction)
    }

    pub fn adaptive_exposure(
        &self,
        saturation_intensity: f64,
    ) -> Result<AdaptiveExposure, ConfigError> {
        AdaptiveExposure::new(self.target_fraction, saturation_intensity, self.exposure_limits)
    }

    #[cfg(feature = "serde")]
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        load_json(path.as_ref())
    }
}

/// Files to use for references missing from the watched directory
#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReferenceFallbacks {
    pub offset: Option<PathBuf>,
    pub dark_current: Option<PathBuf>,
    pub dark: Option<PathBuf>,
    pub sky: Option<PathBuf>,
}

impl ReferenceFallbacks {
    pub fn get(&self, role: ReferenceRole) -> Option<&Path> {
        match role {
            ReferenceRole::Offset => self.offset.as_deref(),
            ReferenceRole::DarkCurrent => self.dark_current.as_deref(),
            ReferenceRole::Dark => self.dark.as_deref(),
            ReferenceRole::Sky => self.sky.as_deref(),
        }
    }
}

/// Settings for replaying spectra written into a directory
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DirectoryConfig {
    pub directory: PathBuf,
    pub mode: ReferenceMode,
    pub fallbacks: ReferenceFallbacks,
    /// The wait between polls of the directory, in milliseconds
    pub poll_interval_ms: u64,
    /// The wait when the directory holds no spectra yet, in milliseconds
    pub idle_interval_ms: u64,
    /// Consecutive decode failures on one file before it is reported
    pub persistent_failure_threshold: u32,
    /// The intensity of one saturated exposure of the recording spectrometer
    pub saturation_intensity: f64,
    pub dark_fraction: f64,
    pub intensity_window: IntensityWindow,
    pub max_spectra: Option<u32>,
    pub wind: WindField,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::new(),
            mode: ReferenceMode::FixedExposure,
            fallbacks: ReferenceFallbacks::default(),
            poll_interval_ms: 1000,
            idle_interval_ms: 1000,
            persistent_failure_threshold: 5,
            saturation_intensity: 4095.0,
            dark_fraction: 0.1,
            intensity_window: IntensityWindow::default(),
            max_spectra: None,
            wind: WindField::default(),
        }
    }
}

impl DirectoryConfig {
    pub fn new<P: Into<PathBuf>>(directory: P, mode: ReferenceMode) -> Self {
        Self {
            directory: directory.into(),
            mode,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.directory.as_os_str().is_empty() {
            return Err(ConfigError::MissingDirectory);
        }
        check_fraction(self.dark_fraction, ConfigError::InvalidDarkFraction)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub fn dark_check(&self) -> DarkCheck {
        DarkCheck::new(
            self.intensity_window,
            self.saturation_intensity,
            self.dark_fraction,
        )
    }

    #[cfg(feature = "serde")]
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        load_json(path.as_ref())
    }
}

#[cfg(feature = "serde")]
fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> std::io::Result<T> {
    let handle = std::io::BufReader::new(std::fs::File::open(path)?);
    let value = serde_json::from_reader(handle)?;
    log::debug!("Loaded settings from {}", path.display());
    Ok(value)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_validate_measurement() {
        let config = MeasurementConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.reference_mode(), ReferenceMode::AdaptiveExposure);

        let config = MeasurementConfig {
            exposure_mode: ExposureMode::Fixed(0),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveExposure));

        let config = MeasurementConfig {
            exposure_mode: ExposureMode::Fixed(200),
            dark_fraction: 0.0,
            ..Default::default()
        };
        assert_eq!(config.reference_mode(), ReferenceMode::FixedExposure);
        assert_eq!(config.validate(), Err(ConfigError::InvalidDarkFraction(0.0)));
    }

    #[test]
    fn test_validate_directory() {
        assert_eq!(
            DirectoryConfig::default().validate(),
            Err(ConfigError::MissingDirectory)
        );
        let config = DirectoryConfig::new("spectra", ReferenceMode::AdaptiveExposure);
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.fallbacks.get(ReferenceRole::Sky), None);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_load_json() -> std::io::Result<()> {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(
            file,
            r#"{{"exposure_mode": {{"Fixed": 250}}, "time_resolution_ms": 2000, "no_dark": true}}"#
        )?;
        let config = MeasurementConfig::from_json_file(file.path())?;
        assert_eq!(config.exposure_mode, ExposureMode::Fixed(250));
        assert_eq!(config.time_resolution_ms, 2000);
        assert!(config.no_dark);
        assert_eq!(config.dark_current_exposure_ms, 10_000);
        Ok(())
    }
}
