//! The traits needed to plug hardware and analysis into an acquisition run
pub use crate::acquisition::control::{Clock, StatusSink};
pub use crate::acquisition::device::{Evaluator, Spectrometer};
pub use crate::acquisition::gps::GpsSource;
pub use crate::io::archive::SpectrumArchive;
