//! The hardware and analysis collaborators an acquisition run drives.
use crate::spectrum::{ChannelData, Spectrum};

use super::error::{DeviceError, EvaluationError};

/// The most exposures common spectrometers co-add on board in one capture
pub const DEFAULT_MAX_SCANS_PER_CAPTURE: u32 = 15;

/// An open connection to a spectrometer.
///
/// Implementations adapt a vendor SDK. The acquisition loop owns the
/// connection for the whole run and calls [`Spectrometer::close`] once when
/// it ends, however it ends.
pub trait Spectrometer {
    /// Capture `groups_on_host` device captures of `scans_on_device` co-added
    /// exposures each and return their sum, one sample array per channel.
    fn scan(&mut self, groups_on_host: u32, scans_on_device: u32)
        -> Result<ChannelData, DeviceError>;

    /// Set the exposure time of a single scan, in microseconds
    fn set_integration_time(&mut self, usec: u32) -> Result<(), DeviceError>;

    /// The intensity of one saturated exposure
    fn saturation_intensity(&self) -> f64;

    fn max_scans_per_capture(&self) -> u32 {
        DEFAULT_MAX_SCANS_PER_CAPTURE
    }

    /// The number of samples per channel
    fn detector_size(&self) -> usize;

    fn channel_count(&self) -> usize {
        1
    }

    fn serial(&self) -> String;

    fn model(&self) -> String;

    fn close(&mut self);
}

impl<T: Spectrometer + ?Sized> Spectrometer for Box<T> {
    fn scan(
        &mut self,
        groups_on_host: u32,
        scans_on_device: u32,
    ) -> Result<ChannelData, DeviceError> {
        (**self).scan(groups_on_host, scans_on_device)
    }

    fn set_integration_time(&mut self, usec: u32) -> Result<(), DeviceError> {
        (**self).set_integration_time(usec)
    }

    fn saturation_intensity(&self) -> f64 {
        (**self).saturation_intensity()
    }

    fn max_scans_per_capture(&self) -> u32 {
        (**self).max_scans_per_capture()
    }

    fn detector_size(&self) -> usize {
        (**self).detector_size()
    }

    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn serial(&self) -> String {
        (**self).serial()
    }

    fn model(&self) -> String {
        (**self).model()
    }

    fn close(&mut self) {
        (**self).close()
    }
}

/// The outcome of fitting one spectrum
#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FitResult {
    /// The retrieved column density
    pub column: f64,
    pub column_error: f64,
}

impl FitResult {
    pub fn new(column: f64, column_error: f64) -> Self {
        Self {
            column,
            column_error,
        }
    }
}

/// A spectral fitting engine.
///
/// `sky` is stored dark-corrected and `dark` is the dark reference in force,
/// so the evaluator subtracts `dark` from `measured` itself.
pub trait Evaluator {
    fn evaluate(
        &mut self,
        sky: &ChannelData,
        dark: &ChannelData,
        measured: &Spectrum,
    ) -> Result<FitResult, EvaluationError>;
}

impl<T: Evaluator + ?Sized> Evaluator for Box<T> {
    fn evaluate(
        &mut self,
        sky: &ChannelData,
        dark: &ChannelData,
        measured: &Spectrum,
    ) -> Result<FitResult, EvaluationError> {
        (**self).evaluate(sky, dark, measured)
    }
}

