//! The most recent position fix, shared between a background reader and the
//! acquisition loop.
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::spectrum::GpsFix;

use super::control::{RunControl, StatusEvent, StatusSink};

/// Holds the latest fix, or `None` before the receiver delivered one
#[derive(Debug, Clone, Default)]
pub struct GpsSlot {
    inner: Arc<Mutex<Option<GpsFix>>>,
}

impl GpsSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, fix: GpsFix) {
        *self.inner.lock() = Some(fix);
    }

    pub fn latest(&self) -> Option<GpsFix> {
        *self.inner.lock()
    }

    pub fn clear(&self) {
        *self.inner.lock() = None;
    }
}

/// Decodes positions from a GPS receiver
pub trait GpsSource: Send {
    /// Wait for the next fix. `None` means the receiver had nothing to report
    /// this time.
    fn next_fix(&mut self) -> Option<GpsFix>;
}

/// Poll `source` on a background thread every `interval`, storing each fix in
/// `slot` and announcing it on `sink`, until `control` is cancelled.
pub fn spawn_gps_reader<G, S>(
    mut source: G,
    slot: GpsSlot,
    control: RunControl,
    sink: S,
    interval: Duration,
) -> io::Result<JoinHandle<()>>
where
    G: GpsSource + 'static,
    S: StatusSink + Send + 'static,
{
    thread::Builder::new()
        .name("gps-reader".into())
        .spawn(move || {
            debug!("GPS reader started");
            while control.is_running() {
                match source.next_fix() {
                    Some(fix) if !fix.is_null() => {
                        slot.update(fix);
                        sink.publish(StatusEvent::GpsUpdated(fix));
                    }
                    Some(_) | None => trace!("No GPS fix available"),
                }
                if !interval.is_zero() {
                    thread::sleep(interval);
                }
            }
            debug!("GPS reader stopped");
        })
}
