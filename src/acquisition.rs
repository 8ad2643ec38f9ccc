//! Sequencing captures into references and evaluated spectra, from a live
//! spectrometer or from a directory of files.
pub mod config;
pub mod control;
pub mod device;
pub mod directory;
pub mod error;
pub mod exposure;
pub mod flux;
pub mod gps;
pub mod processing;
pub mod references;
pub mod summation;
pub mod traverse;

pub use crate::acquisition::config::{
    DirectoryConfig, MeasurementConfig, ReferenceFallbacks, WindField,
};
pub use crate::acquisition::control::{
    sleep_while_running, ChannelSink, Clock, LogSink, NullSink, RunControl, StatusEvent,
    StatusSink, SystemClock,
};
pub use crate::acquisition::device::{
    Evaluator, FitResult, Spectrometer, DEFAULT_MAX_SCANS_PER_CAPTURE,
};
pub use crate::acquisition::directory::{
    list_candidates, resolve_reference, select_latest, Candidate, DirectoryIngestion,
    IngestionSummary, PollOutcome,
};
pub use crate::acquisition::error::{
    AcquisitionError, ConfigError, DeviceError, EvaluationError,
};
pub use crate::acquisition::exposure::{
    AdaptiveExposure, ExposureLimits, ExposureMode, ExposurePolicy,
};
pub use crate::acquisition::flux::FluxAccumulator;
pub use crate::acquisition::gps::{spawn_gps_reader, GpsSlot, GpsSource};
pub use crate::acquisition::processing::{NormalSpectrumProcessor, ProcessedSpectrum};
pub use crate::acquisition::references::{
    DarkCheck, RecordOutcome, ReferenceMode, ReferenceRole, ReferenceSet,
    ReferenceSpectrumManager, ReferenceWarning,
};
pub use crate::acquisition::summation::{plan, SummationPlan};
pub use crate::acquisition::traverse::{
    AcquisitionState, RunOutcome, RunSummary, TraverseAcquisition,
};
