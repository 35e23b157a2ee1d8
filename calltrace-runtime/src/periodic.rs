//! Background thread printing a statistics report on a fixed interval.
//!
//! The thread sleeps on a channel rather than `thread::sleep` so `disable()`
//! can wake it immediately. Disabling flips the flag first and then joins, so
//! once `disable()` returns no periodic report is running or will start, and
//! a final report printed afterwards cannot interleave with one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::clock::Clock;
use crate::tracer::Tracer;

pub struct PeriodicReporter {
    enabled: Arc<AtomicBool>,
    wake: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicReporter {
    /// Spawn the reporter thread. The first report comes one `interval` in.
    pub fn start<C: Clock + 'static>(
        tracer: Arc<Tracer<C>>,
        interval: Duration,
    ) -> std::io::Result<Self> {
        let enabled = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&enabled);
        let (wake, sleeper) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("calltrace-stats".into())
            .spawn(move || {
                loop {
                    match sleeper.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    if !flag.load(Ordering::Acquire) {
                        break;
                    }
                    tracer.print_stats();
                }
                tracing::debug!("periodic statistics reporter stopped");
            })?;

        tracing::info!(interval_secs = interval.as_secs_f64(), "periodic statistics reporter started");
        Ok(Self {
            enabled,
            wake: Some(wake),
            handle: Some(handle),
        })
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Stop scheduling reports and wait for one in flight to finish.
    pub fn disable(&mut self) {
        self.enabled.store(false, Ordering::Release);
        self.wake.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("periodic statistics reporter panicked");
            }
        }
    }
}

impl Drop for PeriodicReporter {
    fn drop(&mut self) {
        // Stop without joining; the thread exits at its next wake-up.
        self.enabled.store(false, Ordering::Release);
        self.wake.take();
    }
}

impl std::fmt::Debug for PeriodicReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeriodicReporter")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::registry::Registry;
    use crate::tracer::{Sink, TracerConfig};
    use std::sync::Mutex;

    fn tracer_with_buffer() -> (Arc<Tracer<ManualClock>>, Arc<Mutex<Vec<u8>>>) {
        let registry = Arc::new(Registry::new());
        let id = registry.register("T", "T.tick()", false, false);
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink: Sink = buf.clone();
        let tracer = Tracer::with_clock(registry, TracerConfig::default(), ManualClock::new())
            .with_sink(sink);
        tracer.on_enter(id);
        tracer.on_exit();
        (Arc::new(tracer), buf)
    }

    fn report_count(buf: &Arc<Mutex<Vec<u8>>>) -> usize {
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        text.matches("Top 10 called methods:").count()
    }

    #[test]
    fn reports_repeatedly_until_disabled() {
        let (tracer, buf) = tracer_with_buffer();
        let mut reporter =
            PeriodicReporter::start(Arc::clone(&tracer), Duration::from_millis(10)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while report_count(&buf) < 2 && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(report_count(&buf) >= 2, "expected at least two periodic reports");

        reporter.disable();
        assert!(!reporter.is_enabled());
        let after_disable = report_count(&buf);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(report_count(&buf), after_disable, "no report after disable");
    }

    #[test]
    fn disable_before_first_tick_prints_nothing() {
        let (tracer, buf) = tracer_with_buffer();
        let mut reporter = PeriodicReporter::start(tracer, Duration::from_secs(3600)).unwrap();
        reporter.disable();
        assert_eq!(report_count(&buf), 0);
    }
}
