//! Many threads hammering shared routines through one tracer.

use std::sync::Arc;
use std::thread;

use calltrace_runtime::{MethodId, Registry, Report, Tracer, TracerConfig};

#[test]
fn n_threads_times_k_enters_are_all_counted() {
    let registry = Arc::new(Registry::new());
    let outer = registry.register("Pool", "Pool.run()", false, false);
    let inner = registry.register("Pool", "Pool.step()", false, false);
    let tracer = Arc::new(Tracer::new(Arc::clone(&registry), TracerConfig::default()));

    let threads = 16u64;
    let iterations = 5_000u64;
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let tracer = Arc::clone(&tracer);
            thread::spawn(move || {
                for _ in 0..iterations {
                    tracer.on_enter(outer);
                    tracer.on_enter(inner);
                    tracer.on_exit();
                    tracer.on_exit();
                }
                tracer.depth()
            })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), 0, "every thread ends balanced");
    }

    let outer_info = registry.lookup(outer).unwrap();
    let inner_info = registry.lookup(inner).unwrap();
    assert_eq!(outer_info.call_count(), threads * iterations);
    assert_eq!(inner_info.call_count(), threads * iterations);
    assert!(outer_info.total_time_nanos() >= inner_info.total_time_nanos());
}

#[test]
fn registration_while_tracing_is_safe() {
    let registry = Arc::new(Registry::new());
    let hot = registry.register("Svc", "Svc.handle()", false, false);
    let tracer = Arc::new(Tracer::new(Arc::clone(&registry), TracerConfig::default()));

    thread::scope(|s| {
        let loader = Arc::clone(&registry);
        s.spawn(move || {
            for i in 0..2_000 {
                loader.register("Lazy", format!("Lazy.m{i}()"), false, false);
            }
        });
        for _ in 0..4 {
            let tracer = Arc::clone(&tracer);
            s.spawn(move || {
                for _ in 0..2_000 {
                    tracer.on_enter(hot);
                    tracer.on_exit();
                }
            });
        }
    });

    assert_eq!(registry.len(), 2_001);
    assert_eq!(registry.lookup(hot).unwrap().call_count(), 8_000);
}

#[test]
fn report_mid_run_sees_only_called_routines() {
    let registry = Arc::new(Registry::new());
    let ids: Vec<MethodId> = [5u64, 0, 9, 2]
        .iter()
        .enumerate()
        .map(|(i, _)| registry.register("R", format!("R.m{i}()"), false, false))
        .collect();
    let tracer = Tracer::new(Arc::clone(&registry), TracerConfig::default());
    for (id, calls) in ids.iter().zip([5u64, 0, 9, 2]) {
        for _ in 0..calls {
            tracer.on_enter(*id);
            tracer.on_exit();
        }
    }

    let report = Report::generate(&registry, 2);
    let labels: Vec<&str> = report
        .by_call_count()
        .iter()
        .map(|r| r.label.as_str())
        .collect();
    assert_eq!(labels, ["R.m2()", "R.m0()"]);
    assert!(report
        .by_total_time()
        .iter()
        .all(|r| r.label != "R.m1()"));
}
