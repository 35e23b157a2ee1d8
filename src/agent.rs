//! Process-level wiring around the tracing core.
//!
//! `Agent::start` validates the options before anything is instrumented,
//! builds the shared registry and tracer, and starts the periodic reporter
//! when a flush interval is set. `load_type` is the load-time hook: it applies
//! the selection policy to a type and registers every selected routine.
//! `shutdown` stops the periodic reporter before printing the final report so
//! the two never overlap.

use std::sync::Arc;

use calltrace_runtime::{MethodId, PeriodicReporter, Registry, Report, Sink, Tracer};

use crate::error::Error;
use crate::options::AgentOptions;
use crate::selection::{Selector, TypeDecl};

/// A routine that received enter/exit hooks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instrumented {
    pub id: MethodId,
    pub descriptor: String,
    pub is_constructor: bool,
    pub is_traced: bool,
}

pub struct Agent {
    options: AgentOptions,
    selector: Selector,
    tracer: Arc<Tracer>,
    periodic: Option<PeriodicReporter>,
}

impl Agent {
    pub fn start(options: AgentOptions, sink: Sink) -> Result<Self, Error> {
        let selector = Selector::from_options(&options)?;
        tracing::info!(
            package = ?options.package_pattern,
            trace = ?options.trace_pattern,
            debug_level = options.debug_level,
            flush_interval_secs = options.flush_interval_secs,
            report_limit = options.report_limit,
            "starting agent"
        );

        let config = options.tracer_config();
        let registry = Arc::new(Registry::new());
        let tracer = Arc::new(Tracer::new(registry, config.clone()).with_sink(sink));
        let periodic = config
            .flush_interval
            .map(|interval| PeriodicReporter::start(Arc::clone(&tracer), interval))
            .transpose()
            .map_err(Error::ReporterSpawn)?;

        Ok(Self {
            options,
            selector,
            tracer,
            periodic,
        })
    }

    pub fn options(&self) -> &AgentOptions {
        &self.options
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    pub fn tracer(&self) -> &Arc<Tracer> {
        &self.tracer
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.tracer.registry()
    }

    /// Register every routine of `decl` the selection policy picks.
    pub fn load_type(&self, decl: &TypeDecl) -> Vec<Instrumented> {
        let verbose = self.options.debug_level >= 1;
        if verbose && self.selector.allows_type(&decl.name) {
            tracing::info!(type_name = %decl.name, "instrumenting type");
        }
        self.selector
            .select_type(decl)
            .map(|(routine, selection)| {
                if verbose {
                    let kind = if selection.is_constructor {
                        "constructor"
                    } else {
                        "method"
                    };
                    tracing::info!(routine = %routine.descriptor, kind, "instrumenting routine");
                }
                let id = self.registry().register(
                    decl.name.as_str(),
                    routine.descriptor.as_str(),
                    selection.is_constructor,
                    selection.is_traced,
                );
                Instrumented {
                    id,
                    descriptor: routine.descriptor.clone(),
                    is_constructor: selection.is_constructor,
                    is_traced: selection.is_traced,
                }
            })
            .collect()
    }

    /// Stop periodic reporting, then print and return the final report.
    pub fn shutdown(mut self) -> Report {
        self.stop_periodic();
        self.tracer.print_stats()
    }

    /// Like [`shutdown`](Self::shutdown) but leaves printing to the caller.
    pub fn stop(mut self) -> Report {
        self.stop_periodic();
        Report::generate(self.registry(), self.options.report_limit)
    }

    fn stop_periodic(&mut self) {
        if let Some(mut periodic) = self.periodic.take() {
            periodic.disable();
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("options", &self.options)
            .field("tracer", &self.tracer)
            .field("periodic", &self.periodic)
            .finish()
    }
}
