use std::io::{self, prelude::*, BufWriter};

use crate::spectrum::Spectrum;

use super::{DATE_FORMAT, STD_MAGIC, TIME_FORMAT};

/// Writes one channel of a [`Spectrum`] in the STD layout read by
/// [`StdReader`](super::StdReader).
pub struct StdWriter<W: io::Write> {
    handle: BufWriter<W>,
}

impl<W: io::Write> StdWriter<W> {
    pub fn new(file: W) -> StdWriter<W> {
        StdWriter {
            handle: BufWriter::new(file),
        }
    }

    fn write_kv(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.handle.write_all(key.as_bytes())?;
        self.handle.write_all(b" = ")?;
        self.handle.write_all(value.as_bytes())?;
        self.handle.write_all(b"\n")?;
        Ok(())
    }

    /// Write `channel` of `spectrum`. Fails with [`io::ErrorKind::InvalidInput`]
    /// if the spectrum has no such channel.
    pub fn write_channel(&mut self, spectrum: &Spectrum, channel: usize) -> io::Result<()> {
        let samples = spectrum.channel(channel).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "Spectrum has {} channels, cannot write channel {channel}",
                    spectrum.channel_count()
                ),
            )
        })?;
        writeln!(self.handle, "{STD_MAGIC}")?;
        writeln!(self.handle, "1")?;
        writeln!(self.handle, "{}", samples.len())?;
        for v in samples {
            writeln!(self.handle, "{v}")?;
        }

        let info = &spectrum.info;
        self.write_kv("Name", &info.name)?;
        self.write_kv("Model", &info.spectrometer_model)?;
        self.write_kv("Serial", &info.spectrometer_serial)?;
        if let Some(start) = info.start_time {
            self.write_kv("Date", &start.format(DATE_FORMAT).to_string())?;
            self.write_kv("StartTime", &start.format(TIME_FORMAT).to_string())?;
        }
        if let Some(stop) = info.stop_time {
            self.write_kv("StopTime", &stop.format(TIME_FORMAT).to_string())?;
        }
        self.write_kv("ExposureTime", &info.exposure_time.to_string())?;
        self.write_kv("Scans", &info.scans.to_string())?;
        let gps = info.gps.unwrap_or_default();
        self.write_kv("Latitude", &gps.latitude.to_string())?;
        self.write_kv("Longitude", &gps.longitude.to_string())?;
        self.write_kv("Altitude", &gps.altitude.to_string())?;
        self.write_kv("IsDark", if info.is_dark { "1" } else { "0" })?;
        self.handle.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> io::Result<W> {
        self.handle.into_inner().map_err(|e| e.into_error())
    }
}
