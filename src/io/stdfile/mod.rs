//! Read and write STD spectrum files, one detector channel per file.
//!
//! Files ending in `.gz` or starting with the gzip magic bytes are
//! decompressed transparently when read.
use std::fs;
use std::io::{self, prelude::*, BufReader};
use std::path::Path;

use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::io::compression::{is_gzipped, is_gzipped_extension};
use crate::spectrum::Spectrum;

mod reader;
mod writer;

pub use reader::{StdFileError, StdParserState, StdReader, MAX_SAMPLE_COUNT};
pub use writer::StdWriter;

pub(crate) const STD_MAGIC: &str = "GDBGMNUP";
pub(crate) const DATE_FORMAT: &str = "%Y.%m.%d";
pub(crate) const TIME_FORMAT: &str = "%H:%M:%S";

pub fn is_std(buf: &[u8]) -> bool {
    buf.starts_with(STD_MAGIC.as_bytes())
}

/// Read the spectrum stored at `path`, decompressing it if needed.
pub fn read_std_file<P: AsRef<Path>>(path: P) -> Result<Spectrum, StdFileError> {
    let path = path.as_ref();
    let mut handle = BufReader::new(fs::File::open(path)?);
    let header = handle.fill_buf()?;
    if is_gzipped(header) {
        StdReader::new(GzDecoder::new(handle)).read_spectrum()
    } else {
        StdReader::new(handle).read_spectrum()
    }
}

/// Write `channel` of `spectrum` to `path`, gzip-compressing it when the path
/// ends in `.gz`.
pub fn write_std_file<P: AsRef<Path>>(
    path: P,
    spectrum: &Spectrum,
    channel: usize,
) -> io::Result<()> {
    let path = path.as_ref();
    let (compress, _) = is_gzipped_extension(path.to_path_buf());
    let file = fs::File::create(path)?;
    if compress {
        let mut writer = StdWriter::new(GzEncoder::new(file, Compression::default()));
        writer.write_channel(spectrum, channel)?;
        writer.into_inner()?.finish()?;
    } else {
        let mut writer = StdWriter::new(file);
        writer.write_channel(spectrum, channel)?;
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::spectrum::{ChannelData, SpectrumInfo};

    #[test_log::test]
    fn test_gzip_transparent() -> io::Result<()> {
        let dir = tempfile::tempdir()?;
        let spectrum = Spectrum::new(
            SpectrumInfo::new("sky", 400, 5),
            ChannelData::single(vec![100.0, 101.0, 99.5]),
        );
        let plain = dir.path().join("sky_0.STD");
        let packed = dir.path().join("sky_0.STD.gz");
        write_std_file(&plain, &spectrum, 0)?;
        write_std_file(&packed, &spectrum, 0)?;

        let mut raw = Vec::new();
        fs::File::open(&packed)?.read_to_end(&mut raw)?;
        assert!(is_gzipped(&raw));
        let mut raw = Vec::new();
        fs::File::open(&plain)?.read_to_end(&mut raw)?;
        assert!(is_std(&raw));

        let a = read_std_file(&plain)?;
        let b = read_std_file(&packed)?;
        assert_eq!(a, b);
        assert_eq!(a.channel(0).unwrap(), &[100.0, 101.0, 99.5]);
        Ok(())
    }
}
