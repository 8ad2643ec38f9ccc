pub mod archive;
pub mod naming;
pub mod stdfile;

pub(crate) mod compression;

pub use crate::io::archive::{NullArchive, SpectrumArchive, StdArchive};
pub use crate::io::naming::{is_normal_spectrum_name, FileNameError, SpectrumFileName};
pub use crate::io::stdfile::{read_std_file, write_std_file, StdFileError, StdReader, StdWriter};
