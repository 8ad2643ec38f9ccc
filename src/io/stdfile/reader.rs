use std::io::{self, prelude::*, BufReader};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use log::{debug, warn};
use thiserror::Error;

use crate::spectrum::{ChannelData, GpsFix, Spectrum, SpectrumInfo};

use super::{DATE_FORMAT, STD_MAGIC, TIME_FORMAT};

/// The largest sample count a file may declare. Detectors have a few
/// thousand pixels.
pub const MAX_SAMPLE_COUNT: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdParserState {
    #[default]
    Start,
    Version,
    Length,
    Samples,
    Metadata,
    Done,
    Error,
}

#[derive(Debug, Error)]
pub enum StdFileError {
    #[error("The file does not start with the STD marker line, found {0:?}")]
    MissingMarker(String),
    #[error("Encountered a malformed header line: {0}")]
    MalformedHeaderLine(String),
    #[error("Encountered a malformed sample on line {line}: {text}")]
    MalformedSample { line: usize, text: String },
    #[error("Expected {expected} samples but the file ended after {found}")]
    Truncated { expected: usize, found: usize },
    #[error("Encountered a malformed metadata line: {0}")]
    MalformedMetadataLine(String),
    #[error("Encountered an IO error: {0}")]
    IOError(
        #[from]
        #[source]
        io::Error,
    ),
}

impl From<StdFileError> for io::Error {
    fn from(value: StdFileError) -> Self {
        match value {
            StdFileError::IOError(e) => e,
            e => io::Error::new(io::ErrorKind::InvalidData, e),
        }
    }
}

#[derive(Debug, Default)]
struct SpectrumBuilder {
    info: SpectrumInfo,
    expected_length: usize,
    samples: Vec<f64>,
    date: Option<NaiveDate>,
    start_time: Option<NaiveTime>,
    stop_time: Option<NaiveTime>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    altitude: Option<f64>,
}

impl SpectrumBuilder {
    fn into_spectrum(self) -> Spectrum {
        let mut info = self.info;
        if let Some(date) = self.date {
            info.start_time = self.start_time.map(|t| NaiveDateTime::new(date, t));
            info.stop_time = self.stop_time.map(|t| NaiveDateTime::new(date, t));
        }
        if let (Some(latitude), Some(longitude)) = (self.latitude, self.longitude) {
            let fix = GpsFix::new(latitude, longitude, self.altitude.unwrap_or_default());
            if !fix.is_null() {
                info.gps = Some(fix);
            }
        }
        Spectrum::new(info, ChannelData::single(self.samples))
    }
}

/// A reader for single-channel STD spectrum files.
///
/// An STD file holds exactly one channel of one spectrum: a marker line, a
/// version line, the sample count, one sample per line and then a block of
/// `Key = Value` metadata lines. Unrecognized metadata keys are skipped.
pub struct StdReader<R: Read> {
    handle: BufReader<R>,
    pub state: StdParserState,
    line_number: usize,
}

impl<R: Read> StdReader<R> {
    pub fn new(file: R) -> StdReader<R> {
        StdReader {
            handle: BufReader::new(file),
            state: StdParserState::Start,
            line_number: 0,
        }
    }

    fn fail(&mut self, err: StdFileError) -> StdFileError {
        self.state = StdParserState::Error;
        err
    }

    fn handle_start(&mut self, line: &str) -> Result<(), StdFileError> {
        if line == STD_MAGIC {
            self.state = StdParserState::Version;
            Ok(())
        } else {
            Err(self.fail(StdFileError::MissingMarker(line.to_string())))
        }
    }

    fn handle_length(&mut self, line: &str, builder: &mut SpectrumBuilder) -> Result<(), StdFileError> {
        match line.parse::<usize>() {
            Ok(n) if n > MAX_SAMPLE_COUNT => Err(self.fail(StdFileError::MalformedHeaderLine(
                format!("The sample count {n} exceeds the maximum of {MAX_SAMPLE_COUNT}"),
            ))),
            Ok(n) => {
                builder.expected_length = n;
                builder.samples.reserve(n);
                self.state = if n == 0 {
                    StdParserState::Metadata
                } else {
                    StdParserState::Samples
                };
                Ok(())
            }
            Err(e) => Err(self.fail(StdFileError::MalformedHeaderLine(format!(
                "Could not parse the sample count {line}: {e}"
            )))),
        }
    }

    fn handle_sample(&mut self, line: &str, builder: &mut SpectrumBuilder) -> Result<(), StdFileError> {
        // Some writers emit "pixel value" pairs, the intensity is always last
        let token = line.split_ascii_whitespace().last().unwrap_or(line);
        match token.parse::<f64>() {
            Ok(v) => {
                builder.samples.push(v);
                if builder.samples.len() == builder.expected_length {
                    self.state = StdParserState::Metadata;
                }
                Ok(())
            }
            Err(_) => {
                let line_number = self.line_number;
                Err(self.fail(StdFileError::MalformedSample {
                    line: line_number,
                    text: line.to_string(),
                }))
            }
        }
    }

    fn parse_number<T: std::str::FromStr>(&mut self, key: &str, value: &str) -> Result<T, StdFileError>
    where
        T::Err: std::fmt::Display,
    {
        value.parse::<T>().map_err(|e| {
            self.fail(StdFileError::MalformedMetadataLine(format!(
                "Could not parse {key} value {value}: {e}"
            )))
        })
    }

    fn handle_metadata(&mut self, line: &str, builder: &mut SpectrumBuilder) -> Result<(), StdFileError> {
        let Some((key, value)) = line.split_once('=') else {
            debug!("Skipping metadata line without a key: {line}");
            return Ok(());
        };
        let key = key.trim();
        let value = value.trim();
        match key.to_ascii_lowercase().as_str() {
            "name" => builder.info.name = value.to_string(),
            "model" => builder.info.spectrometer_model = value.to_string(),
            "serial" => builder.info.spectrometer_serial = value.to_string(),
            "exposuretime" => builder.info.exposure_time = self.parse_number(key, value)?,
            "scans" => builder.info.scans = self.parse_number(key, value)?,
            "latitude" => builder.latitude = Some(self.parse_number(key, value)?),
            "longitude" => builder.longitude = Some(self.parse_number(key, value)?),
            "altitude" => builder.altitude = Some(self.parse_number(key, value)?),
            "isdark" => builder.info.is_dark = matches!(value, "1" | "true" | "TRUE"),
            "date" => {
                builder.date = Some(NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|e| {
                    self.fail(StdFileError::MalformedMetadataLine(format!(
                        "Could not parse date {value}: {e}"
                    )))
                })?)
            }
            "starttime" | "stoptime" => {
                let t = NaiveTime::parse_from_str(value, TIME_FORMAT).map_err(|e| {
                    self.fail(StdFileError::MalformedMetadataLine(format!(
                        "Could not parse time {value}: {e}"
                    )))
                })?;
                if key.eq_ignore_ascii_case("starttime") {
                    builder.start_time = Some(t);
                } else {
                    builder.stop_time = Some(t);
                }
            }
            _ => {
                debug!("Ignoring unknown metadata key {key}");
            }
        }
        Ok(())
    }

    /// Read the spectrum stored in the file
    pub fn read_spectrum(&mut self) -> Result<Spectrum, StdFileError> {
        let mut builder = SpectrumBuilder::default();
        let mut line = String::new();
        loop {
            line.clear();
            let z = self.handle.read_line(&mut line)?;
            if z == 0 {
                break;
            }
            self.line_number += 1;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match self.state {
                StdParserState::Start => self.handle_start(trimmed)?,
                StdParserState::Version => {
                    if trimmed != "1" {
                        warn!("Unexpected STD version line {trimmed}, reading anyway");
                    }
                    self.state = StdParserState::Length;
                }
                StdParserState::Length => self.handle_length(trimmed, &mut builder)?,
                StdParserState::Samples => self.handle_sample(trimmed, &mut builder)?,
                StdParserState::Metadata => self.handle_metadata(trimmed, &mut builder)?,
                StdParserState::Done | StdParserState::Error => break,
            }
        }
        match self.state {
            StdParserState::Metadata => {
                self.state = StdParserState::Done;
                Ok(builder.into_spectrum())
            }
            StdParserState::Samples => {
                let found = builder.samples.len();
                Err(self.fail(StdFileError::Truncated {
                    expected: builder.expected_length,
                    found,
                }))
            }
            StdParserState::Start => Err(self.fail(StdFileError::MissingMarker(String::new()))),
            StdParserState::Version | StdParserState::Length => Err(self.fail(
                StdFileError::MalformedHeaderLine("The file ended inside the header".into()),
            )),
            StdParserState::Done | StdParserState::Error => Err(self.fail(
                StdFileError::MalformedHeaderLine("The reader has already been consumed".into()),
            )),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SKY: &str = "GDBGMNUP
1
4
10
12.5
9
11
Name = sky
Model = USB2000
Serial = I2J5678
Date = 2024.05.17
StartTime = 13:02:11
StopTime = 13:02:14
ExposureTime = 250
Scans = 15
Latitude = 59.3293
Longitude = 18.0686
Altitude = 31.5
Site = Stockholm
";

    #[test]
    fn test_read_std() -> Result<(), StdFileError> {
        let mut reader = StdReader::new(SKY.as_bytes());
        let spec = reader.read_spectrum()?;
        assert_eq!(spec.channel(0).unwrap(), &[10.0, 12.5, 9.0, 11.0]);
        assert_eq!(spec.info.name, "sky");
        assert_eq!(spec.info.spectrometer_serial, "I2J5678");
        assert_eq!(spec.info.exposure_time, 250);
        assert_eq!(spec.info.scans, 15);
        let start = spec.info.start_time.unwrap();
        assert_eq!(start.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-05-17 13:02:11");
        let gps = spec.info.gps.unwrap();
        assert_eq!(gps.latitude, 59.3293);
        assert_eq!(gps.altitude, 31.5);
        assert_eq!(reader.state, StdParserState::Done);
        Ok(())
    }

    #[test]
    fn test_truncated() {
        let data = "GDBGMNUP\n1\n4\n1\n2\n";
        let mut reader = StdReader::new(data.as_bytes());
        match reader.read_spectrum() {
            Err(StdFileError::Truncated { expected, found }) => {
                assert_eq!(expected, 4);
                assert_eq!(found, 2);
            }
            other => panic!("Expected a truncation error, got {other:?}"),
        }
        assert_eq!(reader.state, StdParserState::Error);
    }

    #[test]
    fn test_bad_marker_and_sample() {
        let mut reader = StdReader::new("GARBAGE\n".as_bytes());
        assert!(matches!(
            reader.read_spectrum(),
            Err(StdFileError::MissingMarker(_))
        ));

        let mut reader = StdReader::new("GDBGMNUP\n1\n2\n1.0\nabc\n".as_bytes());
        assert!(matches!(
            reader.read_spectrum(),
            Err(StdFileError::MalformedSample { line: 5, .. })
        ));
    }

    #[test]
    fn test_oversized_sample_count() {
        let data = "GDBGMNUP\n1\n2305843009213693952\n1\n";
        let mut reader = StdReader::new(data.as_bytes());
        assert!(matches!(
            reader.read_spectrum(),
            Err(StdFileError::MalformedHeaderLine(_))
        ));
        assert_eq!(reader.state, StdParserState::Error);

        let data = format!("GDBGMNUP\n1\n{}\n1\n", MAX_SAMPLE_COUNT + 1);
        assert!(StdReader::new(data.as_bytes()).read_spectrum().is_err());
    }

    #[test]
    fn test_missing_position_is_none() -> Result<(), StdFileError> {
        let data = "GDBGMNUP\n1\n1\n5\nLatitude = 0\nLongitude = 0\n";
        let spec = StdReader::new(data.as_bytes()).read_spectrum()?;
        assert!(spec.info.gps.is_none());
        Ok(())
    }
}
