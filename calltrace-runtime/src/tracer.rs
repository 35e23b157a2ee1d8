//! Enter/exit hooks driven by instrumented code.
//!
//! `on_enter(id)` looks the routine up, optionally prints a live trace of the
//! calling thread's active calls, bumps the call counter and pushes a marker
//! onto the thread's `CallStack`. `on_exit()` pops that marker and adds the
//! elapsed time to the routine's total. Exit carries no id: the injected hooks
//! guarantee LIFO nesting per thread, so the top of the stack is always the
//! call being left.
//!
//! Stacks live in thread-local storage, one per (thread, tracer) pair, and are
//! dropped with the thread. A tracer indexes its stacks by a slot number that
//! returns to a free list when the tracer is dropped; each stack remembers the
//! serial of the tracer that filled it and is cleared when a new owner first
//! touches it. Counters are shared atomics; nothing on the hot path takes a
//! lock.

use std::cell::RefCell;
use std::io::Write;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::clock::{Clock, MonotonicClock};
use crate::method::{MethodId, MethodInfo};
use crate::registry::Registry;
use crate::report::Report;
use crate::stack::{CallMarker, CallStack};

/// Destination for live traces and reports.
pub type Sink = Arc<Mutex<dyn Write + Send>>;

/// Sink writing to the process's standard output.
pub fn stdout_sink() -> Sink {
    Arc::new(Mutex::new(std::io::stdout()))
}

pub(crate) fn lock_sink(sink: &Sink) -> MutexGuard<'_, dyn Write + Send + 'static> {
    sink.lock().unwrap_or_else(|e| e.into_inner())
}

/// Rows per report table unless configured otherwise.
pub const DEFAULT_REPORT_LIMIT: usize = 10;

/// Tracer settings fixed at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracerConfig {
    /// 0 is silent; 2 and above logs every enter and exit.
    pub debug_level: u8,
    /// Period of the background report, `None` for a final report only.
    pub flush_interval: Option<Duration>,
    /// Maximum rows per report table.
    pub report_limit: usize,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            debug_level: 0,
            flush_interval: None,
            report_limit: DEFAULT_REPORT_LIMIT,
        }
    }
}

static NEXT_TRACER_SLOT: AtomicUsize = AtomicUsize::new(0);
static FREE_TRACER_SLOTS: Mutex<Vec<usize>> = Mutex::new(Vec::new());
static NEXT_TRACER_SERIAL: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// This thread's call stacks, indexed by tracer slot.
    static STACKS: RefCell<Vec<OwnedStack>> = RefCell::new(Vec::new());
}

/// A thread's stack for one slot, tagged with the tracer that last used it.
#[derive(Default)]
struct OwnedStack {
    owner: u64,
    stack: CallStack,
}

fn acquire_slot() -> usize {
    let reused = FREE_TRACER_SLOTS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .pop();
    reused.unwrap_or_else(|| NEXT_TRACER_SLOT.fetch_add(1, Ordering::Relaxed))
}

fn release_slot(slot: usize) {
    FREE_TRACER_SLOTS
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .push(slot);
}

/// Entry point for the enter/exit hooks.
pub struct Tracer<C: Clock = MonotonicClock> {
    registry: Arc<Registry>,
    clock: C,
    sink: Sink,
    config: TracerConfig,
    slot: usize,
    serial: u64,
}

impl Tracer<MonotonicClock> {
    /// Tracer timing with the process monotonic clock and printing to stdout.
    pub fn new(registry: Arc<Registry>, config: TracerConfig) -> Self {
        Self::with_clock(registry, config, MonotonicClock::new())
    }
}

impl<C: Clock> Tracer<C> {
    pub fn with_clock(registry: Arc<Registry>, config: TracerConfig, clock: C) -> Self {
        Self {
            registry,
            clock,
            sink: stdout_sink(),
            config,
            slot: acquire_slot(),
            serial: NEXT_TRACER_SERIAL.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Redirect live traces and reports.
    pub fn with_sink(mut self, sink: Sink) -> Self {
        self.sink = sink;
        self
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    pub fn sink(&self) -> &Sink {
        &self.sink
    }

    /// Hook run at the start of every call of an instrumented routine.
    ///
    /// Returns `true` when the call was recorded and a matching `on_exit`
    /// is owed. An unknown id is logged and ignored: nothing is counted and
    /// nothing is pushed.
    pub fn on_enter(&self, id: MethodId) -> bool {
        let info = match self.registry.lookup(id) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(%id, "ignoring enter: {e}");
                return false;
            }
        };

        if self.config.debug_level >= 2 {
            tracing::debug!(
                thread = %thread_label(),
                routine = info.descriptor(),
                "entering method"
            );
        }

        let entered = STACKS.try_with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            let stack = stack_for(&mut stacks, self.slot, self.serial);
            if info.is_traced() {
                self.print_live_trace(info, stack.snapshot());
            }
            info.record_call();
            stack.push(Arc::clone(info), self.clock.now());
        });
        if entered.is_err() {
            tracing::warn!(%id, "ignoring enter during thread teardown");
            return false;
        }
        true
    }

    /// Hook run at the end of every call of an instrumented routine.
    ///
    /// # Panics
    ///
    /// Panics when the calling thread has no active call for this tracer:
    /// the instrumentation emitted an exit without its enter.
    pub fn on_exit(&self) {
        let exited = STACKS.try_with(|stacks| {
            let mut stacks = stacks.borrow_mut();
            let stack = stack_for(&mut stacks, self.slot, self.serial);
            let marker = match stack.pop() {
                Some(marker) => marker,
                None => panic!(
                    "calltrace-runtime: exit without matching enter on thread {} (mismatched instrumentation)",
                    thread_label()
                ),
            };
            let elapsed = self.clock.now().saturating_sub(marker.started_nanos());
            marker.method().add_time(elapsed);

            if self.config.debug_level >= 2 {
                tracing::debug!(
                    thread = %thread_label(),
                    routine = marker.method().descriptor(),
                    elapsed_ns = elapsed,
                    "exiting method"
                );
            }
        });
        if exited.is_err() {
            tracing::warn!("ignoring exit during thread teardown; its time is lost");
        }
    }

    /// Active call depth of the calling thread.
    pub fn depth(&self) -> usize {
        STACKS
            .try_with(|stacks| {
                stacks
                    .borrow()
                    .get(self.slot)
                    .filter(|owned| owned.owner == self.serial)
                    .map_or(0, |owned| owned.stack.depth())
            })
            .unwrap_or(0)
    }

    /// Write the three ranked tables to the sink and return them.
    pub fn print_stats(&self) -> Report {
        let report = Report::generate(&self.registry, self.config.report_limit);
        let mut out = lock_sink(&self.sink);
        if let Err(e) = report.render(&mut *out).and_then(|()| out.flush()) {
            tracing::warn!("failed to write statistics report: {e}");
        }
        report
    }

    fn print_live_trace(&self, info: &MethodInfo, active: &[CallMarker]) {
        let mut out = lock_sink(&self.sink);
        if let Err(e) = write_live_trace(&mut *out, &thread_label(), info, active) {
            tracing::warn!("failed to write live trace: {e}");
        }
    }
}

impl<C: Clock> std::fmt::Debug for Tracer<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .field("slot", &self.slot)
            .finish()
    }
}

impl<C: Clock> Drop for Tracer<C> {
    fn drop(&mut self) {
        // Stacks on other threads are cleared by the slot's next owner or
        // when those threads exit.
        let _ = STACKS.try_with(|stacks| {
            if let Ok(mut stacks) = stacks.try_borrow_mut() {
                if let Some(owned) = stacks.get_mut(self.slot) {
                    if owned.owner == self.serial {
                        owned.stack.clear();
                    }
                }
            }
        });
        release_slot(self.slot);
    }
}

fn stack_for(stacks: &mut Vec<OwnedStack>, slot: usize, owner: u64) -> &mut CallStack {
    if stacks.len() <= slot {
        stacks.resize_with(slot + 1, OwnedStack::default);
    }
    let owned = &mut stacks[slot];
    if owned.owner != owner {
        owned.stack.clear();
        owned.owner = owner;
    }
    &mut owned.stack
}

#[cfg(test)]
fn thread_stack_slots() -> usize {
    STACKS.with(|stacks| stacks.borrow().len())
}

/// Thread name if it has one, otherwise its id.
fn thread_label() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_owned(),
        None => format!("{:?}", current.id()),
    }
}

/// Header line, then the active calls innermost first, then a blank line.
fn write_live_trace(
    out: &mut dyn Write,
    thread: &str,
    info: &MethodInfo,
    active: &[CallMarker],
) -> std::io::Result<()> {
    writeln!(out, "[T][{thread:>6}] {}", info.descriptor())?;
    for (index, marker) in active.iter().enumerate().rev() {
        writeln!(out, "      {index:5} {}", marker.method().descriptor())?;
    }
    writeln!(out)?;
    out.flush()
}
