//! Property test: any well-formed enter/exit sequence leaves the stack empty
//! and counts every recorded enter exactly once.

use std::sync::Arc;
use std::time::Duration;

use calltrace_runtime::{ManualClock, MethodId, Registry, Tracer, TracerConfig};
use proptest::prelude::*;

fn setup(routines: usize) -> (Arc<Registry>, Vec<MethodId>, Tracer<ManualClock>, ManualClock) {
    let registry = Arc::new(Registry::new());
    let ids = (0..routines)
        .map(|i| registry.register("Fixture", format!("Fixture.m{i}()"), false, false))
        .collect();
    let clock = ManualClock::new();
    let tracer = Tracer::with_clock(Arc::clone(&registry), TracerConfig::default(), clock.clone());
    (registry, ids, tracer, clock)
}

proptest! {
    #[test]
    fn depth_tracks_model_and_returns_to_zero(
        ops in prop::collection::vec((any::<bool>(), 0usize..4, 0u64..1_000), 0..200)
    ) {
        let (registry, ids, tracer, clock) = setup(4);
        let mut model_depth = 0usize;
        let mut expected_calls = [0u64; 4];

        for (is_enter, routine, nanos) in ops {
            clock.advance(Duration::from_nanos(nanos));
            if is_enter || model_depth == 0 {
                prop_assert!(tracer.on_enter(ids[routine]));
                expected_calls[routine] += 1;
                model_depth += 1;
            } else {
                tracer.on_exit();
                model_depth -= 1;
            }
            prop_assert_eq!(tracer.depth(), model_depth);
        }
        while model_depth > 0 {
            tracer.on_exit();
            model_depth -= 1;
        }

        prop_assert_eq!(tracer.depth(), 0);
        for (i, id) in ids.iter().enumerate() {
            prop_assert_eq!(registry.lookup(*id).unwrap().call_count(), expected_calls[i]);
        }
    }

    #[test]
    fn outer_time_covers_inner_time(outer_before in 0u64..10_000, inner in 0u64..10_000, outer_after in 0u64..10_000) {
        let (registry, ids, tracer, clock) = setup(2);
        tracer.on_enter(ids[0]);
        clock.advance(Duration::from_nanos(outer_before));
        tracer.on_enter(ids[1]);
        clock.advance(Duration::from_nanos(inner));
        tracer.on_exit();
        clock.advance(Duration::from_nanos(outer_after));
        tracer.on_exit();

        let a = registry.lookup(ids[0]).unwrap().total_time_nanos();
        let b = registry.lookup(ids[1]).unwrap().total_time_nanos();
        prop_assert_eq!(b, inner);
        prop_assert_eq!(a, outer_before + inner + outer_after);
        prop_assert!(a >= b);
    }
}
