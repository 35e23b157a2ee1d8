//! Per-thread stack of in-progress calls.
//!
//! The backing `Vec` only ever grows: a pop just lowers the logical depth and
//! leaves the marker in place, and the next push to that depth overwrites it.
//! Once a thread has reached its deepest nesting, push and pop no longer
//! allocate.

use std::sync::Arc;

use crate::method::MethodInfo;

/// One active call: which routine, and the clock reading at entry.
#[derive(Debug, Clone)]
pub struct CallMarker {
    method: Arc<MethodInfo>,
    started_nanos: u64,
}

impl CallMarker {
    pub fn method(&self) -> &Arc<MethodInfo> {
        &self.method
    }

    pub fn started_nanos(&self) -> u64 {
        self.started_nanos
    }
}

/// Growable marker stack owned by exactly one thread.
#[derive(Debug, Default)]
pub struct CallStack {
    slots: Vec<CallMarker>,
    depth: usize,
}

impl CallStack {
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            depth: 0,
        }
    }

    /// Record entry into `method` at `started_nanos`.
    #[inline]
    pub fn push(&mut self, method: Arc<MethodInfo>, started_nanos: u64) {
        if let Some(slot) = self.slots.get_mut(self.depth) {
            slot.method = method;
            slot.started_nanos = started_nanos;
        } else {
            self.slots.push(CallMarker {
                method,
                started_nanos,
            });
        }
        self.depth += 1;
    }

    /// Remove the innermost active call, or `None` if nothing is active.
    ///
    /// The returned marker stays in its slot until the next push to this
    /// depth overwrites it.
    #[inline]
    pub fn pop(&mut self) -> Option<&CallMarker> {
        self.depth = self.depth.checked_sub(1)?;
        self.slots.get(self.depth)
    }

    /// Active markers from the outermost call to the innermost.
    pub fn snapshot(&self) -> &[CallMarker] {
        &self.slots[..self.depth]
    }

    /// Number of calls currently active.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.depth == 0
    }

    /// Deepest nesting ever reached, i.e. the number of retained slots.
    pub fn high_water_mark(&self) -> usize {
        self.slots.len()
    }

    /// Drop every marker, including retained ones, and reset the depth.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.depth = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::MethodId;

    fn method(id: u64, name: &str) -> Arc<MethodInfo> {
        Arc::new(MethodInfo::new(
            MethodId::new(id),
            "T".into(),
            name.into(),
            false,
            false,
        ))
    }

    #[test]
    fn push_pop_is_lifo() {
        let mut stack = CallStack::new();
        stack.push(method(0, "outer"), 10);
        stack.push(method(1, "inner"), 20);
        assert_eq!(stack.depth(), 2);

        let top = stack.pop().unwrap();
        assert_eq!(top.method().descriptor(), "inner");
        assert_eq!(top.started_nanos(), 20);

        let next = stack.pop().unwrap();
        assert_eq!(next.method().descriptor(), "outer");
        assert_eq!(next.started_nanos(), 10);
        assert!(stack.is_empty());
    }

    #[test]
    fn pop_on_empty_stack_is_none_and_depth_stays_zero() {
        let mut stack = CallStack::new();
        assert!(stack.pop().is_none());
        assert_eq!(stack.depth(), 0);

        stack.push(method(0, "a"), 1);
        assert!(stack.pop().is_some());
        assert!(stack.pop().is_none());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn slots_are_reused_after_pop() {
        let mut stack = CallStack::new();
        for i in 0..8 {
            stack.push(method(i, "deep"), i);
        }
        while stack.pop().is_some() {}
        assert_eq!(stack.high_water_mark(), 8);

        let capacity = stack.slots.capacity();
        for round in 0..100 {
            stack.push(method(0, "a"), round);
            stack.push(method(1, "b"), round + 1);
            stack.pop();
            stack.pop();
        }
        assert_eq!(stack.high_water_mark(), 8, "no new slots below the mark");
        assert_eq!(stack.slots.capacity(), capacity, "no reallocation");
    }

    #[test]
    fn reused_slot_is_overwritten() {
        let mut stack = CallStack::new();
        stack.push(method(0, "first"), 100);
        stack.pop();
        stack.push(method(1, "second"), 200);
        let marker = stack.pop().unwrap();
        assert_eq!(marker.method().descriptor(), "second");
        assert_eq!(marker.started_nanos(), 200);
    }

    #[test]
    fn snapshot_is_bottom_to_top_and_excludes_popped_slots() {
        let mut stack = CallStack::new();
        stack.push(method(0, "main"), 1);
        stack.push(method(1, "run"), 2);
        stack.push(method(2, "step"), 3);
        stack.pop();

        let names: Vec<&str> = stack
            .snapshot()
            .iter()
            .map(|m| m.method().descriptor())
            .collect();
        assert_eq!(names, ["main", "run"]);
        assert_eq!(stack.depth(), 2, "snapshot must not mutate");
    }

    #[test]
    fn clear_releases_retained_markers() {
        let m = method(0, "m");
        let mut stack = CallStack::new();
        stack.push(Arc::clone(&m), 1);
        stack.pop();
        assert_eq!(Arc::strong_count(&m), 2, "popped marker stays in its slot");

        stack.clear();
        assert_eq!(Arc::strong_count(&m), 1);
        assert_eq!(stack.high_water_mark(), 0);
        assert!(stack.is_empty());
    }
}
