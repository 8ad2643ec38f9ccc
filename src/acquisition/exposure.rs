use super::error::ConfigError;

/// The shortest and longest exposure a spectrometer accepts, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExposureLimits {
    pub min_exposure: u32,
    pub max_exposure: u32,
}

impl Default for ExposureLimits {
    fn default() -> Self {
        Self {
            min_exposure: 3,
            max_exposure: 5000,
        }
    }
}

impl ExposureLimits {
    pub fn new(min_exposure: u32, max_exposure: u32) -> Self {
        Self {
            min_exposure,
            max_exposure,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_exposure == 0 {
            return Err(ConfigError::NonPositiveExposure);
        }
        if self.min_exposure > self.max_exposure {
            return Err(ConfigError::InvalidExposureLimits {
                min: self.min_exposure,
                max: self.max_exposure,
            });
        }
        Ok(())
    }

    pub fn clamp(&self, exposure: u32) -> u32 {
        exposure.clamp(self.min_exposure, self.max_exposure)
    }
}

/// How the operator asked for the exposure time to be chosen
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ExposureMode {
    /// Use this exposure in milliseconds for the whole run
    Fixed(u32),
    /// Probe the sky once at the start of the run, then keep the result fixed
    Automatic,
    /// Re-target the exposure after every normal spectrum
    Adaptive,
}

impl Default for ExposureMode {
    fn default() -> Self {
        Self::Adaptive
    }
}

impl ExposureMode {
    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::Adaptive)
    }
}

/// Proposes the next exposure from the most recently measured intensity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveExposure {
    /// The fraction of the saturation level the center of the spectrum should reach
    pub target_fraction: f64,
    /// The intensity of a single saturated exposure
    pub saturation_intensity: f64,
    pub limits: ExposureLimits,
}

impl AdaptiveExposure {
    pub fn new(
        target_fraction: f64,
        saturation_intensity: f64,
        limits: ExposureLimits,
    ) -> Result<Self, ConfigError> {
        if !(target_fraction > 0.0 && target_fraction <= 1.0) {
            return Err(ConfigError::InvalidTargetFraction(target_fraction));
        }
        limits.validate()?;
        Ok(Self {
            target_fraction,
            saturation_intensity,
            limits,
        })
    }

    /// The intensity a well-exposed spectrum should have at its center
    pub fn target_intensity(&self) -> f64 {
        self.target_fraction * self.saturation_intensity
    }

    /// Scale `current_exposure` so that the intensity moves from
    /// `last_average_intensity` to the target, clamped to the device limits.
    ///
    /// A spectrum with no measurable light asks for the longest exposure.
    pub fn next_exposure(&self, last_average_intensity: f64, current_exposure: u32) -> u32 {
        if !(last_average_intensity > 0.0) {
            return self.limits.max_exposure;
        }
        let proposed =
            current_exposure as f64 * self.target_intensity() / last_average_intensity;
        if proposed >= self.limits.max_exposure as f64 {
            self.limits.max_exposure
        } else {
            self.limits.clamp(proposed.round() as u32)
        }
    }
}

/// The exposure policy in force during a run
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ExposurePolicy {
    Fixed(u32),
    Adaptive(AdaptiveExposure),
}

impl ExposurePolicy {
    /// The exposure to use after a spectrum with `last_average_intensity` was
    /// captured at `current_exposure`
    pub fn next_exposure(&self, last_average_intensity: f64, current_exposure: u32) -> u32 {
        match self {
            Self::Fixed(exposure) => *exposure,
            Self::Adaptive(adaptive) => {
                adaptive.next_exposure(last_average_intensity, current_exposure)
            }
        }
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::Adaptive(_))
    }
}
