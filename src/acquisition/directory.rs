//! Replaying spectra another program writes into a directory.
//!
//! The references are read once from the directory, or from configured
//! fallback files, and then the most recently modified normal spectrum file is
//! processed on every poll, once per distinct file name.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use log::{debug, info, warn};

use crate::io::naming::{is_normal_spectrum_name, SpectrumFileName};
use crate::io::stdfile::read_std_file;

use super::config::DirectoryConfig;
use super::control::{
    sleep_while_running, Clock, LogSink, RunControl, StatusEvent, StatusSink, SystemClock,
};
use super::device::Evaluator;
use super::error::{AcquisitionError, ConfigError};
use super::processing::{NormalSpectrumProcessor, ProcessedSpectrum};
use super::references::{ReferenceRole, ReferenceSpectrumManager};
use super::traverse::RunOutcome;

/// A normal spectrum file seen in the watched directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub modified: SystemTime,
}

impl Candidate {
    pub fn new(name: impl Into<String>, modified: SystemTime) -> Self {
        Self {
            name: name.into(),
            modified,
        }
    }
}

/// Build a candidate from a directory entry's metadata. An entry that was
/// removed or renamed after the listing yields `None`.
fn candidate_from(
    name: String,
    metadata: io::Result<fs::Metadata>,
) -> io::Result<Option<Candidate>> {
    let metadata = match metadata {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("{name} disappeared while listing");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };
    if !metadata.is_file() {
        return Ok(None);
    }
    match metadata.modified() {
        Ok(modified) => Ok(Some(Candidate::new(name, modified))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// List the files in `directory` named like normal spectra
pub fn list_candidates(directory: &Path) -> io::Result<Vec<Candidate>> {
    let mut candidates = Vec::new();
    for entry in fs::read_dir(directory)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if !is_normal_spectrum_name(&name) {
            continue;
        }
        if let Some(candidate) = candidate_from(name, entry.metadata())? {
            candidates.push(candidate);
        }
    }
    Ok(candidates)
}

/// The most recently modified candidate. Files modified at the same time are
/// ordered by name and the larger name wins.
pub fn select_latest(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates
        .iter()
        .max_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)))
}

/// Find the file holding `role`: channel zero in `directory`, then the
/// configured fallback
pub fn resolve_reference(
    directory: &Path,
    role: ReferenceRole,
    fallback: Option<&Path>,
) -> Result<PathBuf, ConfigError> {
    let name = SpectrumFileName::reference(role, 0).to_string();
    let plain = directory.join(&name);
    if plain.is_file() {
        return Ok(plain);
    }
    let packed = directory.join(format!("{name}.gz"));
    if packed.is_file() {
        return Ok(packed);
    }
    match fallback {
        Some(path) => {
            debug!("Using the fallback {} for the {role} spectrum", path.display());
            Ok(path.to_path_buf())
        }
        None => Err(ConfigError::MissingReference {
            role,
            directory: directory.to_path_buf(),
        }),
    }
}

/// The result of one look at the watched directory
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    /// No normal spectrum files exist yet
    Waiting,
    /// The directory could not be listed and will be listed again
    ListingFailed(String),
    /// The latest file was already processed
    Unchanged,
    /// The latest file could not be decoded and will be retried
    DecodeFailed { name: String, attempts: u32 },
    Processed {
        name: String,
        channel: usize,
        result: ProcessedSpectrum,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestionSummary {
    pub outcome: RunOutcome,
    pub processed: u32,
    pub last_file: Option<String>,
    pub intensity_history: Vec<f64>,
    pub flux: Option<f64>,
}

/// Feeds spectra from a directory through the same reference and evaluation
/// steps as a live traverse
pub struct DirectoryIngestion<E: Evaluator> {
    evaluator: E,
    config: DirectoryConfig,
    control: RunControl,
    sink: Box<dyn StatusSink>,
    clock: Box<dyn Clock>,
    references: ReferenceSpectrumManager,
    processor: NormalSpectrumProcessor,
    last_processed: Option<String>,
    failures: Option<(String, u32)>,
}

impl<E: Evaluator> DirectoryIngestion<E> {
    pub fn new(evaluator: E, config: DirectoryConfig, control: RunControl) -> Self {
        let check = config.dark_check();
        Self {
            evaluator,
            references: ReferenceSpectrumManager::new(config.mode, check),
            processor: NormalSpectrumProcessor::new(check, config.wind),
            config,
            control,
            sink: Box::new(LogSink),
            clock: Box::new(SystemClock),
            last_processed: None,
            failures: None,
        }
    }

    pub fn with_sink<S: StatusSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn references(&self) -> &ReferenceSpectrumManager {
        &self.references
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn last_processed(&self) -> Option<&str> {
        self.last_processed.as_deref()
    }

    /// Read every reference the mode needs. All files are located before any
    /// is read, so a missing reference fails fast.
    pub fn load_references(&mut self) -> Result<(), AcquisitionError> {
        self.config.validate()?;
        self.sink
            .publish(StatusEvent::Message("Reading References".to_string()));
        let mode = self.references.mode();
        let mut lookup = vec![ReferenceRole::Sky, mode.dark_role()];
        if mode.roles().contains(&ReferenceRole::Offset) {
            lookup.push(ReferenceRole::Offset);
        }
        let mut paths = Vec::with_capacity(lookup.len());
        for role in lookup {
            let fallback = self.config.fallbacks.get(role);
            let path = resolve_reference(&self.config.directory, role, fallback)?;
            paths.push((role, path));
        }

        self.references.reset();
        while let Some(role) = self.references.next_role() {
            let Some((_, path)) = paths.iter().find(|(r, _)| *r == role) else {
                return Err(AcquisitionError::MissingReference(role));
            };
            let spectrum =
                read_std_file(path).map_err(|source| AcquisitionError::ReferenceFile {
                    role,
                    path: path.clone(),
                    source,
                })?;
            info!("Read the {role} spectrum from {}", path.display());
            let outcome = self.references.record(&spectrum)?;
            if let Some(warning) = outcome.warning {
                self.sink.publish(StatusEvent::Warning(warning.to_string()));
            }
        }
        Ok(())
    }

    fn record_failure(&mut self, name: &str) -> u32 {
        let attempts = match self.failures.as_mut() {
            Some((failed, attempts)) if failed.as_str() == name => {
                *attempts += 1;
                *attempts
            }
            _ => 1,
        };
        if attempts == 1 {
            self.failures = Some((name.to_string(), 1));
        }
        if attempts == self.config.persistent_failure_threshold {
            warn!("{name} could not be read {attempts} times in a row");
            self.sink.publish(StatusEvent::Warning(format!(
                "Error reading {name}, {attempts} attempts failed"
            )));
        }
        attempts
    }

    /// Look at the directory once and process the latest file if it is new
    pub fn poll_once(&mut self) -> Result<PollOutcome, AcquisitionError> {
        let candidates = match list_candidates(&self.config.directory) {
            Ok(candidates) => candidates,
            Err(e) => {
                warn!("Failed to list {}: {e}", self.config.directory.display());
                return Ok(PollOutcome::ListingFailed(e.to_string()));
            }
        };
        let Some(latest) = select_latest(&candidates) else {
            return Ok(PollOutcome::Waiting);
        };
        if self.last_processed.as_deref() == Some(latest.name.as_str()) {
            return Ok(PollOutcome::Unchanged);
        }
        let name = latest.name.clone();
        let path = self.config.directory.join(&name);

        let spectrum = match read_std_file(&path) {
            Ok(spectrum) => spectrum,
            Err(e) => {
                debug!("Failed to read {}: {e}", path.display());
                let attempts = self.record_failure(&name);
                return Ok(PollOutcome::DecodeFailed { name, attempts });
            }
        };
        self.failures = None;

        let file_name = name
            .parse::<SpectrumFileName>()
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let sequence = file_name.sequence().unwrap_or_default();
        let channel = file_name.channel();
        let scan_number = sequence + self.references.references().len() as u32;
        self.sink.publish(StatusEvent::Message(format!(
            "Showing spectra file {} (channel {channel})",
            path.display()
        )));
        self.sink.publish(StatusEvent::DrawSpectrum {
            scan_number,
            spectrum: Box::new(spectrum.clone()),
        });
        let result = self.processor.process(
            scan_number,
            spectrum,
            &self.references,
            &mut self.evaluator,
            &*self.sink,
        )?;
        self.last_processed = Some(name.clone());
        Ok(PollOutcome::Processed {
            name,
            channel,
            result,
        })
    }

    /// Load the references and poll until cancelled or until
    /// [`DirectoryConfig::max_spectra`] files were processed
    pub fn run(&mut self) -> Result<IngestionSummary, AcquisitionError> {
        self.load_references()?;
        let outcome = loop {
            if let Some(max) = self.config.max_spectra {
                if self.processor.processed() >= max {
                    break RunOutcome::Completed;
                }
            }
            if self.control.is_cancelled() {
                break RunOutcome::Cancelled;
            }
            let wait = match self.poll_once()? {
                PollOutcome::Waiting => {
                    self.sink
                        .publish(StatusEvent::Message("Waiting for spectra file...".into()));
                    self.config.idle_interval()
                }
                PollOutcome::Processed { .. }
                | PollOutcome::ListingFailed(_)
                | PollOutcome::Unchanged
                | PollOutcome::DecodeFailed { .. } => self.config.poll_interval(),
            };
            if let Some(max) = self.config.max_spectra {
                if self.processor.processed() >= max {
                    continue;
                }
            }
            if !sleep_while_running(&*self.clock, &self.control, wait) {
                break RunOutcome::Cancelled;
            }
        };
        info!(
            "Directory ingestion {:?} after {} spectra",
            outcome,
            self.processor.processed()
        );
        Ok(IngestionSummary {
            outcome,
            processed: self.processor.processed(),
            last_file: self.last_processed.clone(),
            intensity_history: self.processor.intensity_history().to_vec(),
            flux: self.processor.flux(),
        })
    }
}
