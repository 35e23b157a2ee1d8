//! Process-wide routine table.
//!
//! Ids are handed out by a single atomic counter and index into a segmented,
//! append-only table of write-once slots. Segment `k` holds `BASE << k`
//! slots, so the table grows without ever moving a published entry and a
//! lookup is two array indexings plus an acquire load. Nothing is ever
//! removed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use crate::error::Error;
use crate::method::{MethodId, MethodInfo};

const BASE_SHIFT: u32 = 6;
const BASE: usize = 1 << BASE_SHIFT;
const SEGMENTS: usize = (usize::BITS - BASE_SHIFT) as usize;

type Slot = OnceLock<Arc<MethodInfo>>;

/// Append-only id → [`MethodInfo`] mapping shared by every tracing thread.
pub struct Registry {
    next_id: AtomicU64,
    segments: [OnceLock<Box<[Slot]>>; SEGMENTS],
}

impl Registry {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(0),
            segments: std::array::from_fn(|_| OnceLock::new()),
        }
    }

    /// Register a routine and return its freshly allocated id.
    ///
    /// Safe to call from several threads at once. The entry is published
    /// before this returns, so any event carrying the id afterwards finds it.
    pub fn register(
        &self,
        declaring_type: impl Into<String>,
        descriptor: impl Into<String>,
        is_constructor: bool,
        is_traced: bool,
    ) -> MethodId {
        let id = MethodId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let info = Arc::new(MethodInfo::new(
            id,
            declaring_type.into(),
            descriptor.into(),
            is_constructor,
            is_traced,
        ));
        // The id is fresh, so the slot is necessarily empty.
        let _ = self.slot_or_create(id).set(info);
        id
    }

    /// Look up a registered routine. Never blocks.
    pub fn lookup(&self, id: MethodId) -> Result<&Arc<MethodInfo>, Error> {
        usize::try_from(id.as_u64())
            .ok()
            .and_then(locate)
            .and_then(|(segment, offset)| self.segments[segment].get()?[offset].get())
            .ok_or(Error::NotFound(id))
    }

    /// Number of ids handed out so far.
    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Acquire) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Published entries in ascending id order.
    ///
    /// An id whose registration is still in flight on another thread is
    /// skipped rather than waited for.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<MethodInfo>> + '_ {
        (0..self.len() as u64).filter_map(move |raw| self.lookup(MethodId::new(raw)).ok())
    }

    fn slot_or_create(&self, id: MethodId) -> &Slot {
        let (segment, offset) = usize::try_from(id.as_u64())
            .ok()
            .and_then(locate)
            .unwrap_or_else(|| panic!("calltrace-runtime: method id space exhausted at {id}"));
        let slots = self.segments[segment].get_or_init(|| {
            let len = BASE << segment;
            (0..len).map(|_| OnceLock::new()).collect()
        });
        &slots[offset]
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("len", &self.len()).finish()
    }
}

/// Map an index to `(segment, offset)`. Segment `k` starts at `BASE * (2^k - 1)`.
fn locate(index: usize) -> Option<(usize, usize)> {
    let shifted = index.checked_add(BASE)?;
    let log2 = (usize::BITS - 1 - shifted.leading_zeros()) as usize;
    let segment = log2 - BASE_SHIFT as usize;
    let offset = shifted - (BASE << segment);
    Some((segment, offset))
}
