use super::channels::{average, average_between, min_max, ChannelData, SpectrumShapeError};
use super::info::SpectrumInfo;

#[derive(Default, Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// A multi-channel spectrum together with the conditions it was acquired under.
///
/// The sample values are the co-added sum of [`SpectrumInfo::scans`] exposures.
pub struct Spectrum {
    /// The acquisition metadata
    pub info: SpectrumInfo,
    /// The per-channel intensity samples
    pub data: ChannelData,
}

impl Spectrum {
    pub fn new(info: SpectrumInfo, data: ChannelData) -> Self {
        Self { info, data }
    }

    pub fn channel_count(&self) -> usize {
        self.data.channel_count()
    }

    /// The detector length, the number of samples per channel
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn channel(&self, index: usize) -> Option<&[f64]> {
        self.data.channel(index)
    }

    /// The mean over every sample of `channel`
    pub fn average(&self, channel: usize) -> f64 {
        self.channel(channel).map(average).unwrap_or_default()
    }

    pub fn min_max(&self, channel: usize) -> Option<(f64, f64)> {
        self.channel(channel).and_then(min_max)
    }

    /// The mean intensity of a single exposure in the window
    /// `[center - half_width, center + half_width)` of `channel`.
    ///
    /// This is the quantity compared against the detector's saturation level.
    pub fn center_intensity(&self, channel: usize, window: IntensityWindow) -> f64 {
        self.data
            .channel(channel)
            .map(|samples| center_intensity(samples, window, self.info.effective_scans()))
            .unwrap_or_default()
    }

    pub fn check_shape(&self, other: &ChannelData) -> Result<(), SpectrumShapeError> {
        self.data.check_shape(other)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// The detector window used to judge how much light reached the spectrometer
pub struct IntensityWindow {
    pub center: usize,
    pub half_width: usize,
}

impl Default for IntensityWindow {
    fn default() -> Self {
        Self {
            center: 1044,
            half_width: 20,
        }
    }
}

impl IntensityWindow {
    pub fn new(center: usize, half_width: usize) -> Self {
        Self { center, half_width }
    }

    pub fn bounds(&self) -> (usize, usize) {
        (
            self.center.saturating_sub(self.half_width),
            self.center + self.half_width,
        )
    }
}

/// Per-exposure mean of `samples` inside `window`
pub fn center_intensity(samples: &[f64], window: IntensityWindow, scans: u32) -> f64 {
    let (low, high) = window.bounds();
    average_between(samples, low, high) / scans.max(1) as f64
}
