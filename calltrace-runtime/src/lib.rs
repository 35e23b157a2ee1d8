//! Runtime support for calltrace.
//!
//! Instrumented code registers each routine once with a [`Registry`], then
//! calls [`Tracer::on_enter`] and [`Tracer::on_exit`] around every call. The
//! tracer keeps one [`CallStack`] per thread and updates shared per-routine
//! counters; a [`Report`] ranks routines by calls, inclusive time and
//! constructed instances.
#![forbid(unsafe_code)]
#![allow(clippy::missing_const_for_thread_local)]

mod clock;
mod error;
mod method;
mod periodic;
mod registry;
pub mod report;
mod stack;
mod tracer;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use error::Error;
pub use method::{MethodId, MethodInfo};
pub use periodic::PeriodicReporter;
pub use registry::Registry;
pub use report::{Report, ReportRow};
pub use stack::{CallMarker, CallStack};
pub use tracer::{stdout_sink, Sink, Tracer, TracerConfig, DEFAULT_REPORT_LIMIT};
