//! Drive a [`Script`] through an [`Agent`] on real threads.
//!
//! Types are loaded first, exactly once, the way a class loader would before
//! any of their code runs. Every thread section copy then runs concurrently on
//! its own named thread. A routine the selection policy skipped never got
//! hooks, so entering it fires nothing and neither does its exit.

use std::collections::HashMap;
use std::thread;

use calltrace_runtime::{MethodId, Tracer};

use crate::agent::Agent;
use crate::error::Error;
use crate::script::{Event, Script};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Routines that received hooks.
    pub instrumented: usize,
    /// Threads spawned, counting copies.
    pub threads: usize,
}

pub fn run(agent: &Agent, script: &Script) -> Result<ReplaySummary, Error> {
    let mut ids: HashMap<String, MethodId> = HashMap::new();
    let mut instrumented = 0;
    for decl in &script.types {
        for routine in agent.load_type(decl) {
            instrumented += 1;
            // A descriptor declared twice keeps its first id.
            ids.entry(routine.descriptor).or_insert(routine.id);
        }
    }

    let tracer: &Tracer = agent.tracer();
    let ids = &ids;
    let threads = thread::scope(|s| -> Result<usize, Error> {
        let mut handles = Vec::new();
        for section in &script.threads {
            for copy in 0..section.copies {
                let name = if section.copies > 1 {
                    format!("{}-{copy}", section.name)
                } else {
                    section.name.clone()
                };
                let handle = thread::Builder::new()
                    .name(name.clone())
                    .spawn_scoped(s, move || play(tracer, ids, &section.events))?;
                handles.push((name, handle));
            }
        }
        let spawned = handles.len();
        for (name, handle) in handles {
            handle
                .join()
                .map_err(|_| Error::ReplayThreadPanicked(name))?;
        }
        Ok(spawned)
    })?;

    tracing::info!(instrumented, threads, "replay finished");
    Ok(ReplaySummary {
        instrumented,
        threads,
    })
}

fn play(tracer: &Tracer, ids: &HashMap<String, MethodId>, events: &[Event]) {
    // One entry per open enter: whether the hook fired and an exit is owed.
    let mut owed: Vec<bool> = Vec::new();
    for event in events {
        match event {
            Event::Enter(descriptor) => {
                let hooked = ids
                    .get(descriptor.as_str())
                    .is_some_and(|&id| tracer.on_enter(id));
                owed.push(hooked);
            }
            Event::EnterId(id) => owed.push(tracer.on_enter(*id)),
            Event::Work(duration) => thread::sleep(*duration),
            Event::Exit => {
                if owed.pop() == Some(true) {
                    tracer.on_exit();
                }
            }
        }
    }
}
