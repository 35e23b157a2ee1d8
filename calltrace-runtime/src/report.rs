//! Ranked top-N views over the registry.
//!
//! All rankings use a stable sort on a direct descending comparison, so ties
//! keep registry (ascending id) order. Routines that were never called are
//! left out of every table.

use std::cmp::Reverse;
use std::collections::hash_map::{Entry, HashMap};
use std::io::{self, Write};
use std::sync::Arc;

use crate::method::MethodInfo;
use crate::registry::Registry;

/// One table row: a ranked value and what it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ReportRow {
    pub value: u64,
    pub label: String,
}

impl ReportRow {
    fn new(value: u64, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }
}

/// Most called routines, `(call_count, descriptor)`.
pub fn top_by_call_count<'a, I>(methods: I, limit: usize) -> Vec<ReportRow>
where
    I: IntoIterator<Item = &'a Arc<MethodInfo>>,
{
    // Counters keep moving while we sort, so rank on one reading of each.
    let mut called: Vec<(u64, &MethodInfo)> = methods
        .into_iter()
        .map(|m| (m.call_count(), &**m))
        .filter(|&(calls, _)| calls > 0)
        .collect();
    called.sort_by_key(|&(calls, _)| Reverse(calls));
    called
        .into_iter()
        .take(limit)
        .map(|(calls, m)| ReportRow::new(calls, m.descriptor()))
        .collect()
}

/// Routines with the largest inclusive time, `(microseconds, descriptor)`.
pub fn top_by_total_time<'a, I>(methods: I, limit: usize) -> Vec<ReportRow>
where
    I: IntoIterator<Item = &'a Arc<MethodInfo>>,
{
    let mut called: Vec<(u64, &MethodInfo)> = methods
        .into_iter()
        .filter(|m| m.call_count() > 0)
        .map(|m| (m.total_time_nanos(), &**m))
        .collect();
    called.sort_by_key(|&(nanos, _)| Reverse(nanos));
    called
        .into_iter()
        .take(limit)
        .map(|(nanos, m)| ReportRow::new(nanos / 1_000, m.descriptor()))
        .collect()
}

/// Declaring types by constructor calls summed over all their constructors,
/// `(instances, declaring_type)`.
pub fn top_constructed_types<'a, I>(methods: I, limit: usize) -> Vec<ReportRow>
where
    I: IntoIterator<Item = &'a Arc<MethodInfo>>,
{
    // Rows stay in first-seen order; the index only finds them.
    let mut types: Vec<ReportRow> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for m in methods {
        let calls = m.call_count();
        if !m.is_constructor() || calls == 0 {
            continue;
        }
        match index.entry(m.declaring_type()) {
            Entry::Occupied(at) => types[*at.get()].value += calls,
            Entry::Vacant(slot) => {
                slot.insert(types.len());
                types.push(ReportRow::new(calls, m.declaring_type()));
            }
        }
    }
    types.sort_by_key(|row| Reverse(row.value));
    types.truncate(limit);
    types
}

/// The three tables printed at shutdown and on every periodic flush.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Report {
    limit: usize,
    by_total_time: Vec<ReportRow>,
    by_call_count: Vec<ReportRow>,
    constructed_types: Vec<ReportRow>,
}

impl Report {
    pub fn generate(registry: &Registry, limit: usize) -> Self {
        Self {
            limit,
            by_total_time: top_by_total_time(registry.iter(), limit),
            by_call_count: top_by_call_count(registry.iter(), limit),
            constructed_types: top_constructed_types(registry.iter(), limit),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn by_total_time(&self) -> &[ReportRow] {
        &self.by_total_time
    }

    pub fn by_call_count(&self) -> &[ReportRow] {
        &self.by_call_count
    }

    pub fn constructed_types(&self) -> &[ReportRow] {
        &self.constructed_types
    }

    /// Print the tables, each behind a header line preceded by a blank line.
    pub fn render(&self, out: &mut dyn Write) -> io::Result<()> {
        let n = self.limit;
        writeln!(out, "\nTop {n} time consuming methods (microseconds):")?;
        for row in &self.by_total_time {
            writeln!(out, "{:16}  {}", row.value, row.label)?;
        }
        writeln!(out, "\nTop {n} called methods:")?;
        for row in &self.by_call_count {
            writeln!(out, "{:16} {}", row.value, row.label)?;
        }
        writeln!(out, "\nTop {n} objects constructed:")?;
        for row in &self.constructed_types {
            writeln!(out, "{:16} {}", row.value, row.label)?;
        }
        Ok(())
    }
}
