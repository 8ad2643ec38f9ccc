//! The steps every normal spectrum goes through, whether it came from a
//! spectrometer or from a file.
use log::{debug, warn};

use crate::spectrum::Spectrum;

use super::config::WindField;
use super::control::{StatusEvent, StatusSink};
use super::device::{Evaluator, FitResult};
use super::error::AcquisitionError;
use super::flux::FluxAccumulator;
use super::references::{DarkCheck, ReferenceSpectrumManager};

/// What became of one normal spectrum
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessedSpectrum {
    pub scan_number: u32,
    /// The per-exposure center intensity
    pub intensity: f64,
    pub is_dark: bool,
    /// `None` when the evaluator rejected the spectrum
    pub fit: Option<FitResult>,
    pub flux: Option<f64>,
}

/// Keeps the intensity history and the flux of a run
#[derive(Debug, Clone)]
pub struct NormalSpectrumProcessor {
    check: DarkCheck,
    intensity_history: Vec<f64>,
    flux: FluxAccumulator,
    processed: u32,
}

impl NormalSpectrumProcessor {
    pub fn new(check: DarkCheck, wind: WindField) -> Self {
        Self {
            check,
            intensity_history: Vec::new(),
            flux: FluxAccumulator::new(wind),
            processed: 0,
        }
    }

    /// Measure the center intensity of `spectrum` and mark it dark if it is
    pub fn classify(&self, spectrum: &mut Spectrum) -> f64 {
        let intensity = self.check.intensity(spectrum);
        spectrum.info.is_dark = self.check.is_dark(intensity);
        intensity
    }

    /// Classify `spectrum`, then hand it to
    /// [`NormalSpectrumProcessor::process_classified`]
    pub fn process<E, S>(
        &mut self,
        scan_number: u32,
        mut spectrum: Spectrum,
        references: &ReferenceSpectrumManager,
        evaluator: &mut E,
        sink: &S,
    ) -> Result<ProcessedSpectrum, AcquisitionError>
    where
        E: Evaluator + ?Sized,
        S: StatusSink + ?Sized,
    {
        let intensity = self.classify(&mut spectrum);
        self.process_classified(scan_number, spectrum, intensity, references, evaluator, sink)
    }

    /// Record the intensity [`NormalSpectrumProcessor::classify`] measured,
    /// evaluate against the stored references and update the flux. A failed
    /// evaluation is reported and skipped.
    pub fn process_classified<E, S>(
        &mut self,
        scan_number: u32,
        spectrum: Spectrum,
        intensity: f64,
        references: &ReferenceSpectrumManager,
        evaluator: &mut E,
        sink: &S,
    ) -> Result<ProcessedSpectrum, AcquisitionError>
    where
        E: Evaluator + ?Sized,
        S: StatusSink + ?Sized,
    {
        let is_dark = spectrum.info.is_dark;
        let center = self.check.window.center;
        sink.publish(StatusEvent::Message(if is_dark {
            format!("Average value around center channel {center}: {intensity:.0} (Dark)")
        } else {
            format!("Average value around center channel {center}: {intensity:.0}")
        }));
        self.intensity_history.push(intensity);

        let spectrum = references.correct_normal(spectrum)?;
        let position = spectrum.info.gps;
        let fit = match evaluator.evaluate(references.sky()?, references.effective_dark()?, &spectrum)
        {
            Ok(fit) => {
                debug!(
                    "Spectrum {scan_number} column {:.4e} +/- {:.4e}",
                    fit.column, fit.column_error
                );
                Some(fit)
            }
            Err(e) => {
                warn!("Failed to evaluate spectrum {scan_number}: {e}");
                sink.publish(StatusEvent::Warning(format!(
                    "Failed to evaluate spectrum {scan_number}: {e}"
                )));
                None
            }
        };

        let flux = fit.and_then(|fit| self.flux.push(fit.column, position));
        if let Some(flux) = flux {
            sink.publish(StatusEvent::FluxUpdated { scan_number, flux });
        }
        self.processed += 1;
        Ok(ProcessedSpectrum {
            scan_number,
            intensity,
            is_dark,
            fit,
            flux,
        })
    }

    pub fn intensity_history(&self) -> &[f64] {
        &self.intensity_history
    }

    /// The number of spectra handed to [`NormalSpectrumProcessor::process`]
    pub fn processed(&self) -> u32 {
        self.processed
    }

    pub fn flux(&self) -> Option<f64> {
        self.flux.current()
    }
}
