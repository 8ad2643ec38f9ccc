pub mod acquisition;
pub mod io;
pub mod prelude;
pub mod spectrum;

pub use crate::spectrum::{ChannelData, GpsFix, Spectrum, SpectrumInfo};

pub use crate::io::{read_std_file, write_std_file, SpectrumFileName, StdArchive};

pub use crate::acquisition::{
    plan, AcquisitionError, DirectoryIngestion, MeasurementConfig, ReferenceRole, SummationPlan,
    TraverseAcquisition,
};
