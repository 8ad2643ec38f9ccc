//! Cancellation, operator requests, time and status reporting for a run.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, NaiveDateTime};
use log::{info, warn};

use crate::spectrum::{GpsFix, Spectrum};

use super::references::ReferenceRole;
use super::summation::SummationPlan;

/// A shared handle the operator uses to stop a run or ask for a new exposure.
///
/// Clones share the same flags.
#[derive(Debug, Clone)]
pub struct RunControl {
    running: Arc<AtomicBool>,
    adjust_exposure: Arc<AtomicBool>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            adjust_exposure: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_cancelled(&self) -> bool {
        !self.is_running()
    }

    pub fn cancel(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Ask the acquisition loop to probe the exposure again before the next
    /// normal capture
    pub fn request_exposure_adjustment(&self) {
        self.adjust_exposure.store(true, Ordering::Release);
    }

    /// Consume a pending exposure adjustment request
    pub fn take_exposure_adjustment(&self) -> bool {
        self.adjust_exposure.swap(false, Ordering::AcqRel)
    }
}

/// Where the acquisition loop gets the time from and how it waits.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
    fn sleep(&self, duration: Duration);
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }

    fn sleep(&self, duration: Duration) {
        (**self).sleep(duration)
    }
}

/// Local wall-clock time and real sleeps
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration)
    }
}

/// The longest uninterrupted sleep, so cancellation is noticed promptly
pub const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Sleep for `duration` in slices, returning early with `false` if the run is
/// cancelled in the meantime.
pub fn sleep_while_running<C: Clock + ?Sized>(
    clock: &C,
    control: &RunControl,
    duration: Duration,
) -> bool {
    let mut remaining = duration;
    while !remaining.is_zero() {
        if control.is_cancelled() {
            return false;
        }
        let slice = remaining.min(SLEEP_SLICE);
        clock.sleep(slice);
        remaining -= slice;
    }
    control.is_running()
}

/// Progress reported to whoever is watching the run
#[derive(Debug, Clone, PartialEq)]
pub enum StatusEvent {
    Message(String),
    /// The operator must do something before the run continues
    OperatorPrompt {
        role: ReferenceRole,
        message: String,
    },
    ExposureChanged {
        exposure_ms: u32,
        plan: SummationPlan,
    },
    DrawSpectrum {
        scan_number: u32,
        spectrum: Box<Spectrum>,
    },
    GpsUpdated(GpsFix),
    Warning(String),
    FluxUpdated {
        scan_number: u32,
        flux: f64,
    },
}

/// Receives [`StatusEvent`]s. Publishing never fails and never blocks the run.
pub trait StatusSink {
    fn publish(&self, event: StatusEvent);

    fn message(&self, text: impl Into<String>)
    where
        Self: Sized,
    {
        self.publish(StatusEvent::Message(text.into()))
    }

    fn warning(&self, text: impl Into<String>)
    where
        Self: Sized,
    {
        self.publish(StatusEvent::Warning(text.into()))
    }
}

impl<T: StatusSink + ?Sized> StatusSink for &T {
    fn publish(&self, event: StatusEvent) {
        (**self).publish(event)
    }
}

impl<T: StatusSink + ?Sized> StatusSink for Box<T> {
    fn publish(&self, event: StatusEvent) {
        (**self).publish(event)
    }
}

/// Forwards events over a channel. Events sent after the receiver hung up are
/// dropped.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<StatusEvent>,
}

impl ChannelSink {
    pub fn new(sender: mpsc::Sender<StatusEvent>) -> Self {
        Self { sender }
    }

    pub fn channel() -> (Self, mpsc::Receiver<StatusEvent>) {
        let (sender, receiver) = mpsc::channel();
        (Self::new(sender), receiver)
    }
}

impl StatusSink for ChannelSink {
    fn publish(&self, event: StatusEvent) {
        let _ = self.sender.send(event);
    }
}

/// Writes events to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn publish(&self, event: StatusEvent) {
        match event {
            StatusEvent::Message(text) => info!("{text}"),
            StatusEvent::OperatorPrompt { role, message } => {
                info!("Before the {role} spectrum: {message}")
            }
            StatusEvent::ExposureChanged { exposure_ms, plan } => info!(
                "Exposure set to {exposure_ms} ms, {} scans on the device x {} on the host",
                plan.scans_on_device, plan.groups_on_host
            ),
            StatusEvent::DrawSpectrum {
                scan_number,
                spectrum,
            } => info!(
                "Spectrum {scan_number} ({}) captured, {} ms x {} scans",
                spectrum.info.name, spectrum.info.exposure_time, spectrum.info.scans
            ),
            StatusEvent::GpsUpdated(fix) => info!(
                "Position {:.6}, {:.6} at {:.1} m",
                fix.latitude, fix.longitude, fix.altitude
            ),
            StatusEvent::Warning(text) => warn!("{text}"),
            StatusEvent::FluxUpdated { scan_number, flux } => {
                info!("Flux after spectrum {scan_number}: {flux:.3}")
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl StatusSink for NullSink {
    fn publish(&self, _event: StatusEvent) {}
}

#[cfg(test)]
mod test {
    use std::cell::Cell;

    use super::*;

    struct CountingClock {
        slept: Cell<Duration>,
        cancel_after: Option<(Duration, RunControl)>,
    }

    impl Clock for CountingClock {
        fn now(&self) -> NaiveDateTime {
            NaiveDateTime::default()
        }

        fn sleep(&self, duration: Duration) {
            self.slept.set(self.slept.get() + duration);
            if let Some((limit, control)) = &self.cancel_after {
                if self.slept.get() >= *limit {
                    control.cancel();
                }
            }
        }
    }

    #[test]
    fn test_sleep_runs_to_completion() {
        let control = RunControl::new();
        let clock = CountingClock {
            slept: Cell::new(Duration::ZERO),
            cancel_after: None,
        };
        assert!(sleep_while_running(&clock, &control, Duration::from_millis(450)));
        assert_eq!(clock.slept.get(), Duration::from_millis(450));
    }

    #[test]
    fn test_sleep_interrupted() {
        let control = RunControl::new();
        let clock = CountingClock {
            slept: Cell::new(Duration::ZERO),
            cancel_after: Some((Duration::from_millis(200), control.clone())),
        };
        assert!(!sleep_while_running(&clock, &control, Duration::from_secs(10)));
        assert_eq!(clock.slept.get(), Duration::from_millis(200));
    }

    #[test]
    fn test_exposure_request_is_consumed() {
        let control = RunControl::new();
        let shared = control.clone();
        assert!(!control.take_exposure_adjustment());
        shared.request_exposure_adjustment();
        assert!(control.take_exposure_adjustment());
        assert!(!control.take_exposure_adjustment());
        shared.cancel();
        assert!(control.is_cancelled());
    }

    #[test]
    fn test_channel_sink_ignores_hangup() {
        let (sink, receiver) = ChannelSink::channel();
        sink.message("first");
        assert_eq!(receiver.recv().unwrap(), StatusEvent::Message("first".into()));
        drop(receiver);
        sink.warning("nobody listens");
    }
}
