use chrono::NaiveDateTime;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// A position fix, in decimal degrees and meters above sea level
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GpsFix {
    pub fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
        }
    }

    /// A fix of exactly `(0, 0)` is what receivers and older files report when
    /// no position was available.
    pub fn is_null(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
/// Describes how a spectrum was acquired
pub struct SpectrumInfo {
    /// A descriptive name, usually the acquisition role
    pub name: String,
    /// The exposure time of a single scan in milliseconds
    pub exposure_time: u32,
    /// The total number of co-added exposures, on the device and on the host
    pub scans: u32,
    pub start_time: Option<NaiveDateTime>,
    pub stop_time: Option<NaiveDateTime>,
    pub gps: Option<GpsFix>,
    /// Whether the spectrum was classified as dark. This is derived, not measured.
    pub is_dark: bool,
    pub spectrometer_serial: String,
    pub spectrometer_model: String,
}

impl SpectrumInfo {
    pub fn new(name: impl Into<String>, exposure_time: u32, scans: u32) -> Self {
        Self {
            name: name.into(),
            exposure_time,
            scans,
            ..Default::default()
        }
    }

    /// The number of co-added exposures, never less than one
    pub fn effective_scans(&self) -> u32 {
        self.scans.max(1)
    }
}
