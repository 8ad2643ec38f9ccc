use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::io::naming::SpectrumFileName;
use crate::io::stdfile::write_std_file;
use crate::spectrum::Spectrum;

/// A destination that keeps every captured spectrum, references included.
pub trait SpectrumArchive {
    /// Store every channel of `spectrum`. `name` identifies channel zero; the
    /// other channels are stored under [`SpectrumFileName::with_channel`].
    fn archive(&mut self, name: SpectrumFileName, spectrum: &Spectrum) -> io::Result<()>;
}

/// Writes spectra as STD files into a directory
#[derive(Debug, Clone)]
pub struct StdArchive {
    directory: PathBuf,
    compress: bool,
}

impl StdArchive {
    /// Create the archive, creating `directory` if it does not exist yet
    pub fn create<P: Into<PathBuf>>(directory: P) -> io::Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            compress: false,
        })
    }

    /// Gzip-compress the files written from now on
    pub fn compressed(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn path_for(&self, name: SpectrumFileName) -> PathBuf {
        let mut file_name = name.to_string();
        if self.compress {
            file_name.push_str(".gz");
        }
        self.directory.join(file_name)
    }
}

impl SpectrumArchive for StdArchive {
    fn archive(&mut self, name: SpectrumFileName, spectrum: &Spectrum) -> io::Result<()> {
        for channel in 0..spectrum.channel_count() {
            let path = self.path_for(name.with_channel(channel));
            write_std_file(&path, spectrum, channel)?;
        }
        Ok(())
    }
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullArchive;

impl SpectrumArchive for NullArchive {
    fn archive(&mut self, _name: SpectrumFileName, _spectrum: &Spectrum) -> io::Result<()> {
        Ok(())
    }
}

impl<T: SpectrumArchive + ?Sized> SpectrumArchive for Box<T> {
    fn archive(&mut self, name: SpectrumFileName, spectrum: &Spectrum) -> io::Result<()> {
        (**self).archive(name, spectrum)
    }
}
