pub mod channels;
pub mod info;
pub mod spectrum_types;

pub use crate::spectrum::channels::{ChannelData, SpectrumShapeError};
pub use crate::spectrum::info::{GpsFix, SpectrumInfo};
pub use crate::spectrum::spectrum_types::{center_intensity, IntensityWindow, Spectrum};
