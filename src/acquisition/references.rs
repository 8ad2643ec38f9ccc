//! Dark, offset and sky references and the order they are captured in.
use std::fmt::Display;

use indexmap::IndexMap;
use log::{debug, warn};
use thiserror::Error;

use crate::spectrum::{center_intensity, ChannelData, IntensityWindow, Spectrum};

use super::error::AcquisitionError;

/// The role a reference capture plays in the correction chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReferenceRole {
    /// Electronic zero level, minimal exposure, detector covered
    Offset,
    /// Thermal signal, long exposure, detector covered, stored offset-corrected
    DarkCurrent,
    /// Combined offset and dark current at the measurement exposure
    Dark,
    /// The unattenuated light source, stored dark-corrected
    Sky,
}

impl ReferenceRole {
    /// The stem used for the role's archive file name
    pub const fn file_stem(&self) -> &'static str {
        match self {
            Self::Offset => "offset",
            Self::DarkCurrent => "darkcur",
            Self::Dark => "dark",
            Self::Sky => "sky",
        }
    }

    pub fn from_file_stem(stem: &str) -> Option<Self> {
        match stem {
            "offset" => Some(Self::Offset),
            "darkcur" => Some(Self::DarkCurrent),
            "dark" => Some(Self::Dark),
            "sky" => Some(Self::Sky),
            _ => None,
        }
    }

    /// Whether the detector must be covered while this role is captured
    pub const fn requires_cover(&self) -> bool {
        !matches!(self, Self::Sky)
    }
}

impl Display for ReferenceRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Offset => "offset",
            Self::DarkCurrent => "dark current",
            Self::Dark => "dark",
            Self::Sky => "sky",
        };
        f.write_str(label)
    }
}

/// Which correction chain a run uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ReferenceMode {
    /// `Dark -> Sky`
    FixedExposure,
    /// `Offset -> DarkCurrent -> Sky`
    AdaptiveExposure,
}

impl ReferenceMode {
    pub const fn roles(&self) -> &'static [ReferenceRole] {
        match self {
            Self::FixedExposure => &[ReferenceRole::Dark, ReferenceRole::Sky],
            Self::AdaptiveExposure => &[
                ReferenceRole::Offset,
                ReferenceRole::DarkCurrent,
                ReferenceRole::Sky,
            ],
        }
    }

    /// The role that holds the dark reference handed to the evaluator
    pub const fn dark_role(&self) -> ReferenceRole {
        match self {
            Self::FixedExposure => ReferenceRole::Dark,
            Self::AdaptiveExposure => ReferenceRole::DarkCurrent,
        }
    }
}

/// An operator mistake noticed while recording a reference. Never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ReferenceWarning {
    #[error("It seems like the {role} spectrum is not completely dark (center intensity {intensity:.1}), consider restarting")]
    NotDark { role: ReferenceRole, intensity: f64 },
    #[error("It seems like the sky spectrum is dark (center intensity {intensity:.1}), consider restarting")]
    SkyIsDark { intensity: f64 },
}

/// Decides whether a capture looks like the detector was covered
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DarkCheck {
    pub window: IntensityWindow,
    /// Per-exposure center intensities below this are considered dark
    pub threshold: f64,
}

impl DarkCheck {
    pub fn new(window: IntensityWindow, saturation_intensity: f64, dark_fraction: f64) -> Self {
        Self {
            window,
            threshold: saturation_intensity * dark_fraction,
        }
    }

    pub fn intensity(&self, spectrum: &Spectrum) -> f64 {
        spectrum
            .channel(0)
            .map(|samples| center_intensity(samples, self.window, spectrum.info.effective_scans()))
            .unwrap_or_default()
    }

    pub fn is_dark(&self, intensity: f64) -> bool {
        intensity < self.threshold
    }
}

/// What happened when a reference was recorded
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordOutcome {
    pub role: ReferenceRole,
    /// The per-exposure center intensity of the raw capture
    pub intensity: f64,
    pub is_dark: bool,
    pub warning: Option<ReferenceWarning>,
}

/// The stored references, in the order they were recorded
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReferenceSet {
    buffers: IndexMap<ReferenceRole, ChannelData>,
}

impl ReferenceSet {
    pub fn get(&self, role: ReferenceRole) -> Option<&ChannelData> {
        self.buffers.get(&role)
    }

    pub fn offset(&self) -> Option<&ChannelData> {
        self.get(ReferenceRole::Offset)
    }

    pub fn dark_current(&self) -> Option<&ChannelData> {
        self.get(ReferenceRole::DarkCurrent)
    }

    pub fn dark(&self) -> Option<&ChannelData> {
        self.get(ReferenceRole::Dark)
    }

    pub fn sky(&self) -> Option<&ChannelData> {
        self.get(ReferenceRole::Sky)
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn roles(&self) -> impl Iterator<Item = ReferenceRole> + '_ {
        self.buffers.keys().copied()
    }

    fn insert(&mut self, role: ReferenceRole, data: ChannelData) {
        self.buffers.insert(role, data);
    }
}

/// Owns the reference buffers and enforces the order they are captured in.
///
/// In adaptive mode the dark current is stored with the offset removed, and in
/// both modes the sky is stored with [`ReferenceSpectrumManager::effective_dark`]
/// removed. Every recorded buffer must have the shape of the first one.
#[derive(Debug, Clone)]
pub struct ReferenceSpectrumManager {
    mode: ReferenceMode,
    references: ReferenceSet,
    check: DarkCheck,
    cursor: usize,
}

impl ReferenceSpectrumManager {
    pub fn new(mode: ReferenceMode, check: DarkCheck) -> Self {
        Self {
            mode,
            references: ReferenceSet::default(),
            check,
            cursor: 0,
        }
    }

    pub fn mode(&self) -> ReferenceMode {
        self.mode
    }

    pub fn references(&self) -> &ReferenceSet {
        &self.references
    }

    /// The role the next reference capture must fill, or `None` once every
    /// reference has been recorded
    pub fn next_role(&self) -> Option<ReferenceRole> {
        self.mode.roles().get(self.cursor).copied()
    }

    pub fn is_complete(&self) -> bool {
        self.next_role().is_none()
    }

    /// Drop every stored reference and start over from the first role
    pub fn reset(&mut self) {
        self.references = ReferenceSet::default();
        self.cursor = 0;
    }

    fn expect_role(&self, role: ReferenceRole) -> Result<(), AcquisitionError> {
        let expected = self.next_role();
        if expected != Some(role) {
            return Err(AcquisitionError::UnexpectedRole {
                expected,
                found: role,
            });
        }
        Ok(())
    }

    fn check_session_shape(&self, data: &ChannelData) -> Result<(), AcquisitionError> {
        if let Some(first) = self.references.buffers.values().next() {
            first.check_shape(data)?;
        }
        Ok(())
    }

    fn require(&self, role: ReferenceRole) -> Result<&ChannelData, AcquisitionError> {
        self.references
            .get(role)
            .ok_or(AcquisitionError::MissingReference(role))
    }

    fn classify(&self, role: ReferenceRole, spectrum: &Spectrum) -> RecordOutcome {
        let intensity = self.check.intensity(spectrum);
        let is_dark = self.check.is_dark(intensity);
        let warning = match (role, is_dark) {
            (ReferenceRole::Sky, true) => Some(ReferenceWarning::SkyIsDark { intensity }),
            (ReferenceRole::Sky, false) => None,
            (role, false) => Some(ReferenceWarning::NotDark { role, intensity }),
            (_, true) => None,
        };
        if let Some(w) = &warning {
            warn!("{w}");
        }
        RecordOutcome {
            role,
            intensity,
            is_dark,
            warning,
        }
    }

    fn store(&mut self, role: ReferenceRole, data: ChannelData) {
        debug!("Storing the {role} reference ({} channels)", data.channel_count());
        self.references.insert(role, data);
        self.cursor += 1;
    }

    /// Store the offset capture verbatim
    pub fn record_offset(&mut self, spectrum: &Spectrum) -> Result<RecordOutcome, AcquisitionError> {
        self.expect_role(ReferenceRole::Offset)?;
        self.check_session_shape(&spectrum.data)?;
        let outcome = self.classify(ReferenceRole::Offset, spectrum);
        self.store(ReferenceRole::Offset, spectrum.data.clone());
        Ok(outcome)
    }

    /// Store the dark current capture with the offset subtracted
    pub fn record_dark_current(
        &mut self,
        spectrum: &Spectrum,
    ) -> Result<RecordOutcome, AcquisitionError> {
        self.expect_role(ReferenceRole::DarkCurrent)?;
        let corrected = spectrum.data.try_sub(self.require(ReferenceRole::Offset)?)?;
        let outcome = self.classify(ReferenceRole::DarkCurrent, spectrum);
        self.store(ReferenceRole::DarkCurrent, corrected);
        Ok(outcome)
    }

    /// Store the dark capture verbatim. Only valid in fixed-exposure mode.
    pub fn record_dark(&mut self, spectrum: &Spectrum) -> Result<RecordOutcome, AcquisitionError> {
        self.expect_role(ReferenceRole::Dark)?;
        self.check_session_shape(&spectrum.data)?;
        let outcome = self.classify(ReferenceRole::Dark, spectrum);
        self.store(ReferenceRole::Dark, spectrum.data.clone());
        Ok(outcome)
    }

    /// Store the sky capture with the effective dark subtracted
    pub fn record_sky(&mut self, spectrum: &Spectrum) -> Result<RecordOutcome, AcquisitionError> {
        self.expect_role(ReferenceRole::Sky)?;
        let corrected = spectrum.data.try_sub(self.effective_dark()?)?;
        let outcome = self.classify(ReferenceRole::Sky, spectrum);
        self.store(ReferenceRole::Sky, corrected);
        Ok(outcome)
    }

    /// Record `spectrum` under whichever role is expected next
    pub fn record(&mut self, spectrum: &Spectrum) -> Result<RecordOutcome, AcquisitionError> {
        match self.next_role() {
            Some(ReferenceRole::Offset) => self.record_offset(spectrum),
            Some(ReferenceRole::DarkCurrent) => self.record_dark_current(spectrum),
            Some(ReferenceRole::Dark) => self.record_dark(spectrum),
            Some(ReferenceRole::Sky) => self.record_sky(spectrum),
            None => Err(AcquisitionError::UnexpectedRole {
                expected: None,
                found: ReferenceRole::Sky,
            }),
        }
    }

    /// Fill `role` with zeros shaped like `shape` instead of capturing it.
    ///
    /// Used when the operator chose to measure without covering the detector.
    /// A zero-filled reference is never subtracted from and never warns.
    pub fn record_zero(
        &mut self,
        role: ReferenceRole,
        shape: &ChannelData,
    ) -> Result<RecordOutcome, AcquisitionError> {
        self.expect_role(role)?;
        self.check_session_shape(shape)?;
        self.store(role, shape.zeros_like());
        Ok(RecordOutcome {
            role,
            intensity: 0.0,
            is_dark: true,
            warning: None,
        })
    }

    /// The dark reference in force: the dark current in adaptive mode or the
    /// dark in fixed-exposure mode
    pub fn effective_dark(&self) -> Result<&ChannelData, AcquisitionError> {
        self.require(self.mode.dark_role())
    }

    pub fn sky(&self) -> Result<&ChannelData, AcquisitionError> {
        self.require(ReferenceRole::Sky)
    }

    /// Normal spectra are handed on untouched; the evaluator applies the dark
    /// and sky references itself. The spectrum must still match the
    /// references' shape.
    pub fn correct_normal(&self, spectrum: Spectrum) -> Result<Spectrum, AcquisitionError> {
        self.check_session_shape(&spectrum.data)?;
        Ok(spectrum)
    }
}
