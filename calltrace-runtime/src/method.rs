use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Dense identifier handed out by the registry, starting at 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MethodId(u64);

impl MethodId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for MethodId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One registered routine: fixed identity plus live statistics.
///
/// Identity fields never change after registration. The two counters are
/// updated from any number of threads with relaxed atomics and only ever
/// grow; readers get a per-field point-in-time value, so `call_count` and
/// `total_time_nanos` may reflect slightly different moments.
#[derive(Debug)]
pub struct MethodInfo {
    id: MethodId,
    declaring_type: String,
    descriptor: String,
    is_constructor: bool,
    is_traced: bool,
    call_count: AtomicU64,
    total_time_nanos: AtomicU64,
}

impl MethodInfo {
    pub(crate) fn new(
        id: MethodId,
        declaring_type: String,
        descriptor: String,
        is_constructor: bool,
        is_traced: bool,
    ) -> Self {
        Self {
            id,
            declaring_type,
            descriptor,
            is_constructor,
            is_traced,
            call_count: AtomicU64::new(0),
            total_time_nanos: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    /// Fully qualified routine name, used as the display name in traces
    /// and reports.
    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn is_constructor(&self) -> bool {
        self.is_constructor
    }

    /// Whether entering this routine prints a live trace.
    pub fn is_traced(&self) -> bool {
        self.is_traced
    }

    pub fn call_count(&self) -> u64 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Accumulated inclusive time: nested calls are counted in the caller too.
    pub fn total_time_nanos(&self) -> u64 {
        self.total_time_nanos.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn record_call(&self) {
        self.call_count.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn add_time(&self, nanos: u64) {
        self.total_time_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}
