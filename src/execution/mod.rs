// Candle ingestion, strategy dispatch and conditional orders
pub mod controller;
pub mod diagnostics;
pub mod scheduler;
pub mod worker;

pub use controller::{CandleOutcome, Controller, PartialOutcome};
pub use diagnostics::{DiagnosticEvent, DiagnosticsSink, RecordingDiagnostics, Stage, TracingDiagnostics};
pub use scheduler::{Evaluation, OrderCondition, Scheduler};
pub use worker::{FeedEvent, InstrumentWorker, WorkerReport};
