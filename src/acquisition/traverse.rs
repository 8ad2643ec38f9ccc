//! Driving a spectrometer through the reference captures and the repeating
//! normal captures of a traverse.
use std::fmt::Display;

use log::{debug, error, info, warn};

use crate::io::archive::{NullArchive, SpectrumArchive};
use crate::io::naming::SpectrumFileName;
use crate::spectrum::{center_intensity, ChannelData, Spectrum, SpectrumInfo};

use super::config::MeasurementConfig;
use super::control::{
    sleep_while_running, Clock, LogSink, RunControl, StatusEvent, StatusSink, SystemClock,
};
use super::device::{Evaluator, Spectrometer};
use super::error::{AcquisitionError, ConfigError, DeviceError};
use super::exposure::{AdaptiveExposure, ExposureMode, ExposurePolicy};
use super::gps::GpsSlot;
use super::processing::NormalSpectrumProcessor;
use super::references::{ReferenceRole, ReferenceSpectrumManager};
use super::summation::{plan, SummationPlan};

/// The exposure of the offset capture in milliseconds
pub const OFFSET_EXPOSURE_MS: u32 = 3;
/// Exposures co-added on the device for the offset capture, before capping
pub const OFFSET_SCANS_ON_DEVICE: u32 = 15;
pub const OFFSET_GROUPS_ON_HOST: u32 = 100;

/// Where a traverse run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AcquisitionState {
    Initializing,
    CapturingReferences(ReferenceRole),
    CapturingNormal,
    Completed,
    Cancelled,
    Faulted,
}

impl AcquisitionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Faulted)
    }
}

impl Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => f.write_str("initializing"),
            Self::CapturingReferences(role) => write!(f, "capturing the {role} spectrum"),
            Self::CapturingNormal => f.write_str("capturing spectra"),
            Self::Completed => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Faulted => f.write_str("faulted"),
        }
    }
}

/// How a run that did not fail ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunOutcome {
    /// The configured number of normal spectra was reached
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub outcome: RunOutcome,
    /// The number of the last capture, references included
    pub scan_number: u32,
    pub normal_spectra: u32,
    pub intensity_history: Vec<f64>,
    pub flux: Option<f64>,
    pub exposure_ms: u32,
    pub plan: SummationPlan,
}

/// The exposure and co-adding currently used for sky-facing captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timing {
    exposure_ms: u32,
    plan: SummationPlan,
}

/// Acquires a traverse from a live spectrometer.
///
/// A run captures the references in the order the exposure mode requires,
/// then normal spectra until it is cancelled or reaches
/// [`MeasurementConfig::max_spectra`]. Every capture is archived. The
/// spectrometer is closed exactly once when [`TraverseAcquisition::run`]
/// returns, whatever the outcome.
pub struct TraverseAcquisition<D: Spectrometer, E: Evaluator> {
    device: D,
    evaluator: E,
    config: MeasurementConfig,
    control: RunControl,
    archive: Box<dyn SpectrumArchive>,
    sink: Box<dyn StatusSink>,
    clock: Box<dyn Clock>,
    gps: GpsSlot,
    state: AcquisitionState,
    references: ReferenceSpectrumManager,
    processor: NormalSpectrumProcessor,
    scan_number: u32,
    timing: Timing,
    applied_exposure: Option<u32>,
    closed: bool,
}

impl<D: Spectrometer, E: Evaluator> TraverseAcquisition<D, E> {
    pub fn new(device: D, evaluator: E, config: MeasurementConfig, control: RunControl) -> Self {
        let check = config.dark_check(device.saturation_intensity());
        let references = ReferenceSpectrumManager::new(config.reference_mode(), check);
        let processor = NormalSpectrumProcessor::new(check, config.wind);
        Self {
            device,
            evaluator,
            config,
            control,
            archive: Box::new(NullArchive),
            sink: Box::new(LogSink),
            clock: Box::new(SystemClock),
            gps: GpsSlot::default(),
            state: AcquisitionState::Initializing,
            references,
            processor,
            scan_number: 0,
            timing: Timing {
                exposure_ms: 0,
                plan: SummationPlan::single(),
            },
            applied_exposure: None,
            closed: false,
        }
    }

    pub fn with_archive<A: SpectrumArchive + 'static>(mut self, archive: A) -> Self {
        self.archive = Box::new(archive);
        self
    }

    pub fn with_sink<S: StatusSink + 'static>(mut self, sink: S) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_gps(mut self, gps: GpsSlot) -> Self {
        self.gps = gps;
        self
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    pub fn references(&self) -> &ReferenceSpectrumManager {
        &self.references
    }

    pub fn scan_number(&self) -> u32 {
        self.scan_number
    }

    pub fn intensity_history(&self) -> &[f64] {
        self.processor.intensity_history()
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    /// Run the acquisition to its end and close the spectrometer.
    pub fn run(&mut self) -> Result<RunSummary, AcquisitionError> {
        if self.closed {
            return Err(DeviceError::Disconnected.into());
        }
        let result = self.run_to_end();
        self.close();
        match result {
            Ok(outcome) => {
                self.state = match outcome {
                    RunOutcome::Completed => AcquisitionState::Completed,
                    RunOutcome::Cancelled => AcquisitionState::Cancelled,
                };
                info!(
                    "Acquisition {} after {} captures",
                    self.state, self.scan_number
                );
                Ok(RunSummary {
                    outcome,
                    scan_number: self.scan_number,
                    normal_spectra: self.processor.processed(),
                    intensity_history: self.processor.intensity_history().to_vec(),
                    flux: self.processor.flux(),
                    exposure_ms: self.timing.exposure_ms,
                    plan: self.timing.plan,
                })
            }
            Err(e) => {
                error!("Acquisition failed while {}: {e}", self.state);
                self.state = AcquisitionState::Faulted;
                self.sink
                    .publish(StatusEvent::Warning(format!("The measurement stopped: {e}")));
                Err(e)
            }
        }
    }

    fn close(&mut self) {
        if !self.closed {
            debug!("Closing the spectrometer connection");
            self.device.close();
            self.closed = true;
        }
    }

    fn run_to_end(&mut self) -> Result<RunOutcome, AcquisitionError> {
        self.state = AcquisitionState::Initializing;
        self.config.validate()?;
        if self.device.channel_count() == 0 {
            return Err(ConfigError::NoChannels.into());
        }
        let adaptive = self
            .config
            .adaptive_exposure(self.device.saturation_intensity())?;

        let policy = match self.config.exposure_mode {
            ExposureMode::Fixed(exposure_ms) => {
                self.set_timing(exposure_ms)?;
                ExposurePolicy::Fixed(exposure_ms)
            }
            ExposureMode::Automatic => match self.probe_exposure(&adaptive)? {
                Some(exposure_ms) => {
                    self.set_timing(exposure_ms)?;
                    ExposurePolicy::Fixed(exposure_ms)
                }
                None => return Ok(RunOutcome::Cancelled),
            },
            ExposureMode::Adaptive => match self.probe_exposure(&adaptive)? {
                Some(exposure_ms) => {
                    self.set_timing(exposure_ms)?;
                    ExposurePolicy::Adaptive(adaptive)
                }
                None => return Ok(RunOutcome::Cancelled),
            },
        };

        if !self.capture_references()? {
            return Ok(RunOutcome::Cancelled);
        }
        self.capture_normal(policy, &adaptive)
    }

    /// Recompute the summation plan for `exposure_ms` and announce it
    fn set_timing(&mut self, exposure_ms: u32) -> Result<(), AcquisitionError> {
        let plan = plan(
            exposure_ms,
            self.config.time_resolution_ms,
            self.device.max_scans_per_capture(),
        )?;
        let timing = Timing { exposure_ms, plan };
        if timing != self.timing {
            debug!(
                "Exposure {exposure_ms} ms, {} x {} scans",
                plan.scans_on_device, plan.groups_on_host
            );
            self.timing = timing;
            self.sink
                .publish(StatusEvent::ExposureChanged { exposure_ms, plan });
        }
        Ok(())
    }

    /// Take one short sky exposure and derive the exposure that reaches the
    /// target intensity. `None` if the run was cancelled meanwhile.
    fn probe_exposure(
        &mut self,
        adaptive: &AdaptiveExposure,
    ) -> Result<Option<u32>, AcquisitionError> {
        if !self.prompt(ReferenceRole::Sky, "Point the spectrometer to sky") {
            return Ok(None);
        }
        let probe_ms = self.config.probe_exposure_ms;
        let Some(spectrum) = self.capture("probe", probe_ms, SummationPlan::single())? else {
            return Ok(None);
        };
        let samples = spectrum.channel(0).unwrap_or_default();
        let intensity = center_intensity(
            samples,
            self.config.intensity_window,
            spectrum.info.effective_scans(),
        );
        let exposure_ms = adaptive.next_exposure(intensity, probe_ms);
        info!("Probe intensity {intensity:.1} at {probe_ms} ms, using {exposure_ms} ms");
        Ok(Some(exposure_ms))
    }

    /// Publish an operator prompt and give the operator time to react.
    /// Returns `false` if the run was cancelled while waiting.
    fn prompt(&mut self, role: ReferenceRole, message: &str) -> bool {
        self.sink.publish(StatusEvent::OperatorPrompt {
            role,
            message: message.to_string(),
        });
        sleep_while_running(&*self.clock, &self.control, self.config.prompt_wait())
    }

    fn apply_integration_time(&mut self, exposure_ms: u32) -> Result<(), DeviceError> {
        if self.applied_exposure != Some(exposure_ms) {
            self.device
                .set_integration_time(exposure_ms.saturating_mul(1000))?;
            self.applied_exposure = Some(exposure_ms);
        }
        Ok(())
    }

    /// Scan the spectrometer once and stamp the result. A capture that ends
    /// after the run was cancelled is discarded and `None` returned.
    fn capture(
        &mut self,
        name: &str,
        exposure_ms: u32,
        plan: SummationPlan,
    ) -> Result<Option<Spectrum>, AcquisitionError> {
        if self.control.is_cancelled() {
            return Ok(None);
        }
        self.apply_integration_time(exposure_ms)?;
        let start_time = self.clock.now();
        let data = self.device.scan(plan.groups_on_host, plan.scans_on_device)?;
        if self.control.is_cancelled() {
            debug!("Discarding the {name} capture of a cancelled run");
            return Ok(None);
        }
        if data.channel_count() == 0 {
            return Err(ConfigError::NoChannels.into());
        }
        let info = self.stamp(name, exposure_ms, plan.total_scans(), start_time);
        Ok(Some(Spectrum::new(info, data)))
    }

    fn stamp(
        &self,
        name: &str,
        exposure_ms: u32,
        scans: u32,
        start_time: chrono::NaiveDateTime,
    ) -> SpectrumInfo {
        let mut info = SpectrumInfo::new(name, exposure_ms, scans);
        info.start_time = Some(start_time);
        info.stop_time = Some(self.clock.now());
        info.gps = self.gps.latest();
        info.spectrometer_serial = self.device.serial();
        info.spectrometer_model = self.device.model();
        info
    }

    fn archive(&mut self, name: SpectrumFileName, spectrum: &Spectrum) {
        if let Err(e) = self.archive.archive(name, spectrum) {
            warn!("Failed to archive {name}: {e}");
            self.sink
                .publish(StatusEvent::Warning(format!("Failed to save {name}: {e}")));
        }
    }

    fn reference_timing(&self, role: ReferenceRole) -> Timing {
        match role {
            ReferenceRole::Offset => Timing {
                exposure_ms: OFFSET_EXPOSURE_MS,
                plan: SummationPlan::new(OFFSET_SCANS_ON_DEVICE, OFFSET_GROUPS_ON_HOST)
                    .capped(self.device.max_scans_per_capture()),
            },
            ReferenceRole::DarkCurrent => Timing {
                exposure_ms: self.config.dark_current_exposure_ms,
                plan: SummationPlan::single(),
            },
            ReferenceRole::Dark | ReferenceRole::Sky => self.timing,
        }
    }

    /// Capture every reference the mode needs. Returns `false` if the run was
    /// cancelled before they were all recorded.
    fn capture_references(&mut self) -> Result<bool, AcquisitionError> {
        let mode = self.references.mode();
        let first_covered = mode.roles().iter().find(|r| r.requires_cover()).copied();
        while let Some(role) = self.references.next_role() {
            self.state = AcquisitionState::CapturingReferences(role);
            let zero_fill = self.config.no_dark && role == mode.dark_role();

            let proceed = if role == ReferenceRole::Sky {
                self.prompt(role, "Point the spectrometer to sky")
            } else if Some(role) == first_covered && !self.config.no_dark {
                self.prompt(role, "Cover the spectrometer")
            } else {
                self.control.is_running()
            };
            if !proceed {
                return Ok(false);
            }
            self.sink
                .publish(StatusEvent::Message(format!("Measuring the {role} spectrum")));

            let timing = self.reference_timing(role);
            let mut spectrum = if zero_fill {
                let start_time = self.clock.now();
                let data =
                    ChannelData::zeros(self.device.channel_count(), self.device.detector_size());
                let info = self.stamp(role.file_stem(), timing.exposure_ms, 0, start_time);
                Spectrum::new(info, data)
            } else {
                match self.capture(role.file_stem(), timing.exposure_ms, timing.plan)? {
                    Some(spectrum) => spectrum,
                    None => return Ok(false),
                }
            };
            self.scan_number += 1;

            let outcome = if zero_fill {
                self.references.record_zero(role, &spectrum.data)?
            } else {
                self.references.record(&spectrum)?
            };
            spectrum.info.is_dark = outcome.is_dark;
            self.archive(SpectrumFileName::reference(role, 0), &spectrum);

            self.sink.publish(StatusEvent::Message(format!(
                "Average value around center channel({role}) {}: {:.0}",
                self.config.intensity_window.center, outcome.intensity
            )));
            if let Some(warning) = outcome.warning {
                self.sink.publish(StatusEvent::Warning(warning.to_string()));
            }
            self.sink.publish(StatusEvent::DrawSpectrum {
                scan_number: self.scan_number,
                spectrum: Box::new(spectrum),
            });
        }
        Ok(true)
    }

    fn capture_normal(
        &mut self,
        mut policy: ExposurePolicy,
        adaptive: &AdaptiveExposure,
    ) -> Result<RunOutcome, AcquisitionError> {
        self.state = AcquisitionState::CapturingNormal;
        let reference_count = self.references.references().len() as u32;
        loop {
            if let Some(max) = self.config.max_spectra {
                if self.processor.processed() >= max {
                    return Ok(RunOutcome::Completed);
                }
            }
            if self.control.is_cancelled() {
                return Ok(RunOutcome::Cancelled);
            }
            if self.control.take_exposure_adjustment() && !policy.is_adaptive() {
                match self.probe_exposure(adaptive)? {
                    Some(exposure_ms) => {
                        policy = ExposurePolicy::Fixed(exposure_ms);
                        self.set_timing(exposure_ms)?;
                    }
                    None => return Ok(RunOutcome::Cancelled),
                }
            }

            let Timing { exposure_ms, plan } = self.timing;
            let Some(mut spectrum) = self.capture("normal", exposure_ms, plan)? else {
                return Ok(RunOutcome::Cancelled);
            };
            self.scan_number += 1;
            let intensity = self.processor.classify(&mut spectrum);
            let sequence = self.scan_number - reference_count;
            self.archive(SpectrumFileName::normal(sequence, 0), &spectrum);
            self.sink.publish(StatusEvent::DrawSpectrum {
                scan_number: self.scan_number,
                spectrum: Box::new(spectrum.clone()),
            });

            self.processor.process_classified(
                self.scan_number,
                spectrum,
                intensity,
                &self.references,
                &mut self.evaluator,
                &*self.sink,
            )?;

            if policy.is_adaptive() {
                let next = policy.next_exposure(intensity, exposure_ms);
                self.set_timing(next)?;
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::io;
    use std::rc::Rc;
    use std::sync::mpsc;
    use std::time::Duration;

    use chrono::NaiveDateTime;

    use super::*;
    use crate::acquisition::control::ChannelSink;
    use crate::acquisition::device::FitResult;
    use crate::acquisition::error::EvaluationError;
    use crate::io::archive::StdArchive;
    use crate::spectrum::IntensityWindow;

    const LENGTH: usize = 8;

    #[derive(Debug, Default)]
    struct DeviceLog {
        scans: Vec<(u32, u32)>,
        integration_times: Vec<u32>,
        closes: usize,
    }

    /// Returns flat spectra. Each scan uses the next scripted per-exposure
    /// level, or `brightness * exposure` once the script runs out.
    struct FakeSpectrometer {
        log: Rc<RefCell<DeviceLog>>,
        levels: VecDeque<f64>,
        brightness: f64,
        exposure_ms: u32,
        cancel_on_scan: Option<(usize, RunControl)>,
        fail_on_scan: Option<usize>,
    }

    impl FakeSpectrometer {
        fn new(levels: &[f64]) -> (Self, Rc<RefCell<DeviceLog>>) {
            let log = Rc::new(RefCell::new(DeviceLog::default()));
            let device = Self {
                log: log.clone(),
                levels: levels.iter().copied().collect(),
                brightness: 1.0,
                exposure_ms: 0,
                cancel_on_scan: None,
                fail_on_scan: None,
            };
            (device, log)
        }
    }

    impl Spectrometer for FakeSpectrometer {
        fn scan(
            &mut self,
            groups_on_host: u32,
            scans_on_device: u32,
        ) -> Result<ChannelData, DeviceError> {
            let index = self.log.borrow().scans.len();
            self.log
                .borrow_mut()
                .scans
                .push((groups_on_host, scans_on_device));
            if self.fail_on_scan == Some(index) {
                return Err(DeviceError::ScanFailed("USB transfer failed".into()));
            }
            if let Some((at, control)) = &self.cancel_on_scan {
                if *at == index {
                    control.cancel();
                }
            }
            let level = self
                .levels
                .pop_front()
                .unwrap_or(self.brightness * self.exposure_ms as f64);
            let total = (groups_on_host * scans_on_device) as f64;
            Ok(ChannelData::single(vec![level * total; LENGTH]))
        }

        fn set_integration_time(&mut self, usec: u32) -> Result<(), DeviceError> {
            self.exposure_ms = usec / 1000;
            self.log.borrow_mut().integration_times.push(usec);
            Ok(())
        }

        fn saturation_intensity(&self) -> f64 {
            1000.0
        }

        fn detector_size(&self) -> usize {
            LENGTH
        }

        fn serial(&self) -> String {
            "I2J1234".into()
        }

        fn model(&self) -> String {
            "USB2000".into()
        }

        fn close(&mut self) {
            self.log.borrow_mut().closes += 1;
        }
    }

    #[derive(Default)]
    struct FakeEvaluator {
        calls: Vec<(Vec<f64>, Vec<f64>, Vec<f64>)>,
        fail: bool,
    }

    impl Evaluator for FakeEvaluator {
        fn evaluate(
            &mut self,
            sky: &ChannelData,
            dark: &ChannelData,
            measured: &Spectrum,
        ) -> Result<FitResult, EvaluationError> {
            self.calls.push((
                sky[0].to_vec(),
                dark[0].to_vec(),
                measured.channel(0).unwrap().to_vec(),
            ));
            if self.fail {
                return Err(EvaluationError::NotConverged("too many iterations".into()));
            }
            Ok(FitResult::new(1e17, 1e15))
        }
    }

    struct FakeClock;

    impl Clock for FakeClock {
        fn now(&self) -> NaiveDateTime {
            NaiveDateTime::default()
        }

        fn sleep(&self, _duration: Duration) {}
    }

    #[derive(Clone, Default)]
    struct RecordingArchive {
        names: Rc<RefCell<Vec<String>>>,
    }

    impl SpectrumArchive for RecordingArchive {
        fn archive(&mut self, name: SpectrumFileName, _spectrum: &Spectrum) -> io::Result<()> {
            self.names.borrow_mut().push(name.to_string());
            Ok(())
        }
    }

    fn config(mode: ExposureMode) -> MeasurementConfig {
        MeasurementConfig {
            exposure_mode: mode,
            intensity_window: IntensityWindow::new(4, 2),
            target_fraction: 0.5,
            prompt_wait_ms: 1000,
            ..Default::default()
        }
    }

    fn events(receiver: &mpsc::Receiver<StatusEvent>) -> Vec<StatusEvent> {
        receiver.try_iter().collect()
    }

    #[test_log::test]
    fn test_fixed_run_completes() -> Result<(), AcquisitionError> {
        let dir = tempfile::tempdir()?;
        let (device, log) = FakeSpectrometer::new(&[1.0, 200.0, 200.0, 210.0, 190.0]);
        let mut config = config(ExposureMode::Fixed(100));
        config.max_spectra = Some(3);
        let mut acquisition =
            TraverseAcquisition::new(device, FakeEvaluator::default(), config, RunControl::new())
                .with_clock(FakeClock)
                .with_archive(StdArchive::create(dir.path())?);
        let summary = acquisition.run()?;

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(acquisition.state(), AcquisitionState::Completed);
        assert_eq!(summary.scan_number, 5);
        assert_eq!(summary.normal_spectra, 3);
        assert_eq!(summary.intensity_history, vec![200.0, 210.0, 190.0]);
        assert_eq!(summary.plan, SummationPlan::new(10, 1));
        assert_eq!(summary.flux, Some(0.0));

        let log = log.borrow();
        assert_eq!(log.closes, 1);
        assert_eq!(log.integration_times, vec![100_000]);
        assert!(log.scans.iter().all(|s| *s == (1, 10)));

        // Sky is stored dark-corrected, normal spectra are evaluated raw
        let evaluator = acquisition.evaluator();
        assert_eq!(evaluator.calls.len(), 3);
        assert_eq!(evaluator.calls[0].0, vec![1990.0; LENGTH]);
        assert_eq!(evaluator.calls[0].1, vec![10.0; LENGTH]);
        assert_eq!(evaluator.calls[1].2, vec![2100.0; LENGTH]);

        for name in ["dark_0.STD", "sky_0.STD", "00001_0.STD", "00003_0.STD"] {
            assert!(dir.path().join(name).exists(), "{name} was not archived");
        }
        let sky = crate::io::stdfile::read_std_file(dir.path().join("sky_0.STD"))
            .map_err(io::Error::from)?;
        assert_eq!(sky.info.spectrometer_serial, "I2J1234");
        assert!(!sky.info.is_dark);
        Ok(())
    }

    #[test]
    fn test_adaptive_retargets_exposure() -> Result<(), AcquisitionError> {
        // Probe at 10 ms sees 1000 per exposure, target is 500: 5 ms.
        // Offset and dark current are dark, the sky and first normal see 250
        // per exposure at 5 ms: 10 ms. The second normal sees 500: stays.
        let (device, log) =
            FakeSpectrometer::new(&[1000.0, 1.0, 2.0, 250.0, 250.0, 500.0]);
        let mut config = config(ExposureMode::Adaptive);
        config.max_spectra = Some(2);
        let (sink, receiver) = ChannelSink::channel();
        let mut acquisition =
            TraverseAcquisition::new(device, FakeEvaluator::default(), config, RunControl::new())
                .with_clock(FakeClock)
                .with_sink(sink);
        let summary = acquisition.run()?;

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.exposure_ms, 10);
        assert_eq!(summary.plan, SummationPlan::new(10, 10));
        assert_eq!(summary.scan_number, 5);

        let log = log.borrow();
        assert_eq!(log.closes, 1);
        // probe, offset, dark current, sky, normal, normal
        assert_eq!(
            log.scans,
            vec![(1, 1), (100, 15), (1, 1), (20, 10), (20, 10), (10, 10)]
        );
        assert_eq!(
            log.integration_times,
            vec![10_000, 3_000, 10_000_000, 5_000, 10_000]
        );

        let changes: Vec<_> = events(&receiver)
            .into_iter()
            .filter_map(|e| match e {
                StatusEvent::ExposureChanged { exposure_ms, plan } => Some((exposure_ms, plan)),
                _ => None,
            })
            .collect();
        assert_eq!(
            changes,
            vec![
                (5, SummationPlan::new(10, 20)),
                (10, SummationPlan::new(10, 10))
            ]
        );

        let refs = acquisition.references().references();
        assert_eq!(refs.offset().unwrap()[0], vec![1500.0; LENGTH]);
        assert_eq!(refs.dark_current().unwrap()[0], vec![2.0 - 1500.0; LENGTH]);
        Ok(())
    }

    #[test]
    fn test_cancel_during_sky_capture() {
        let control = RunControl::new();
        let (mut device, log) = FakeSpectrometer::new(&[1.0, 300.0]);
        // dark is scan 0, sky is scan 1
        device.cancel_on_scan = Some((1, control.clone()));
        let archive = RecordingArchive::default();
        let mut acquisition = TraverseAcquisition::new(
            device,
            FakeEvaluator::default(),
            config(ExposureMode::Fixed(100)),
            control,
        )
        .with_clock(FakeClock)
        .with_archive(archive.clone());
        let summary = acquisition.run().unwrap();

        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(acquisition.state(), AcquisitionState::Cancelled);
        assert_eq!(acquisition.references().next_role(), Some(ReferenceRole::Sky));
        assert!(acquisition.references().references().sky().is_none());
        assert!(acquisition.evaluator().calls.is_empty());
        assert_eq!(*archive.names.borrow(), vec!["dark_0.STD".to_string()]);
        assert_eq!(log.borrow().closes, 1);
    }

    #[test]
    fn test_cancel_during_normal_capture() {
        let control = RunControl::new();
        let (mut device, log) = FakeSpectrometer::new(&[1.0, 300.0, 300.0, 300.0]);
        device.cancel_on_scan = Some((3, control.clone()));
        let mut acquisition = TraverseAcquisition::new(
            device,
            FakeEvaluator::default(),
            config(ExposureMode::Fixed(100)),
            control,
        )
        .with_clock(FakeClock);
        let summary = acquisition.run().unwrap();

        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(summary.normal_spectra, 1);
        assert_eq!(acquisition.evaluator().calls.len(), 1);
        assert_eq!(log.borrow().closes, 1);
    }

    #[test]
    fn test_scan_failure_faults_and_closes_once() {
        // Probe, offset, dark current, sky, then two normal captures
        for fail_at in 0..6 {
            let (mut device, log) = FakeSpectrometer::new(&[]);
            device.fail_on_scan = Some(fail_at);
            let mut acquisition = TraverseAcquisition::new(
                device,
                FakeEvaluator::default(),
                config(ExposureMode::Adaptive),
                RunControl::new(),
            )
            .with_clock(FakeClock);
            let err = acquisition.run().unwrap_err();
            assert!(matches!(err, AcquisitionError::Device(DeviceError::ScanFailed(_))));
            assert_eq!(acquisition.state(), AcquisitionState::Faulted);
            assert_eq!(log.borrow().closes, 1);
            assert_eq!(log.borrow().scans.len(), fail_at + 1);
            let evaluated = fail_at.saturating_sub(4);
            assert_eq!(acquisition.evaluator().calls.len(), evaluated);

            assert!(acquisition.run().is_err());
            assert_eq!(log.borrow().closes, 1);
        }
    }

    #[test]
    fn test_invalid_config_still_closes() {
        let (device, log) = FakeSpectrometer::new(&[]);
        let mut acquisition = TraverseAcquisition::new(
            device,
            FakeEvaluator::default(),
            config(ExposureMode::Fixed(0)),
            RunControl::new(),
        );
        let err = acquisition.run().unwrap_err();
        assert!(matches!(
            err,
            AcquisitionError::Configuration(ConfigError::NonPositiveExposure)
        ));
        assert_eq!(log.borrow().closes, 1);
        assert!(log.borrow().scans.is_empty());
    }

    #[test]
    fn test_no_dark_zero_fills() -> Result<(), AcquisitionError> {
        let (device, log) = FakeSpectrometer::new(&[300.0, 300.0]);
        let mut config = config(ExposureMode::Fixed(100));
        config.no_dark = true;
        config.max_spectra = Some(1);
        let (sink, receiver) = ChannelSink::channel();
        let archive = RecordingArchive::default();
        let mut acquisition =
            TraverseAcquisition::new(device, FakeEvaluator::default(), config, RunControl::new())
                .with_clock(FakeClock)
                .with_sink(sink)
                .with_archive(archive.clone());
        acquisition.run()?;

        // Only the sky and one normal spectrum were scanned
        assert_eq!(log.borrow().scans.len(), 2);
        let refs = acquisition.references().references();
        assert_eq!(refs.dark().unwrap()[0], vec![0.0; LENGTH]);
        assert_eq!(refs.sky().unwrap()[0], vec![3000.0; LENGTH]);
        assert_eq!(
            *archive.names.borrow(),
            vec!["dark_0.STD", "sky_0.STD", "00001_0.STD"]
        );
        let events = events(&receiver);
        assert!(!events.iter().any(|e| matches!(e, StatusEvent::Warning(_))));
        assert!(!events.iter().any(|e| matches!(
            e,
            StatusEvent::OperatorPrompt { role: ReferenceRole::Dark, .. }
        )));
        Ok(())
    }

    #[test]
    fn test_evaluation_failure_is_soft() -> Result<(), AcquisitionError> {
        let (device, _log) = FakeSpectrometer::new(&[1.0, 300.0, 300.0, 300.0]);
        let mut config = config(ExposureMode::Fixed(100));
        config.max_spectra = Some(2);
        let evaluator = FakeEvaluator {
            fail: true,
            ..Default::default()
        };
        let mut acquisition = TraverseAcquisition::new(device, evaluator, config, RunControl::new())
            .with_clock(FakeClock);
        let summary = acquisition.run()?;
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.normal_spectra, 2);
        assert_eq!(summary.flux, None);
        Ok(())
    }

    #[test]
    fn test_operator_requests_new_exposure() -> Result<(), AcquisitionError> {
        // Automatic: the probe sees 1000 at 10 ms, the target is 500: 5 ms.
        // After the re-probe request the probe sees 250: 20 ms.
        let control = RunControl::new();
        control.request_exposure_adjustment();
        let (device, log) = FakeSpectrometer::new(&[1000.0, 1.0, 300.0, 250.0, 300.0]);
        let mut config = config(ExposureMode::Automatic);
        config.max_spectra = Some(1);
        let mut acquisition =
            TraverseAcquisition::new(device, FakeEvaluator::default(), config, control)
                .with_clock(FakeClock);
        let summary = acquisition.run()?;
        assert_eq!(summary.exposure_ms, 20);
        assert_eq!(summary.plan, SummationPlan::new(10, 5));
        assert_eq!(
            log.borrow().integration_times,
            vec![10_000, 5_000, 10_000, 20_000]
        );
        Ok(())
    }
}
