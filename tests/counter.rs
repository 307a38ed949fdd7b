// tests/counter.rs

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use proptest::prelude::*;

use podflow::workload::{CounterRelease, ExecutionCounter};

#[test]
fn inc_and_dec_track_active_runs() {
    let counter = ExecutionCounter::new();
    counter.inc();
    counter.inc();
    assert_eq!(counter.get(), 2);
    counter.dec();
    assert_eq!(counter.get(), 1);
}

#[test]
fn dec_saturates_at_zero() {
    let counter = ExecutionCounter::new();
    counter.dec();
    assert_eq!(counter.get(), 0);
    counter.inc();
    counter.dec();
    counter.dec();
    assert_eq!(counter.get(), 0);
}

#[test]
fn try_acquire_stops_at_max() {
    let counter = ExecutionCounter::new();
    assert!(counter.try_acquire(2));
    assert!(counter.try_acquire(2));
    assert!(!counter.try_acquire(2));
    assert_eq!(counter.get(), 2);
}

#[test]
fn release_guard_decrements_once() {
    let counter = Arc::new(ExecutionCounter::new());
    assert!(counter.try_acquire(1));
    {
        let _release = CounterRelease::new(Arc::clone(&counter));
        assert_eq!(counter.get(), 1);
    }
    assert_eq!(counter.get(), 0);
    assert!(counter.try_acquire(1));
}

#[test]
fn release_guard_runs_during_panic() {
    let counter = Arc::new(ExecutionCounter::new());
    counter.inc();
    let c = Arc::clone(&counter);
    let result = thread::spawn(move || {
        let _release = CounterRelease::new(c);
        panic!("boom");
    })
    .join();
    assert!(result.is_err());
    assert_eq!(counter.get(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// However acquisitions and releases interleave, the count never goes
    /// above `max` and the number of successful acquisitions in flight
    /// matches it.
    #[test]
    fn concurrent_acquire_never_exceeds_max(max in 1usize..6, threads in 2usize..10, rounds in 1usize..50) {
        let counter = Arc::new(ExecutionCounter::new());
        let high_water = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let counter = Arc::clone(&counter);
                let high_water = Arc::clone(&high_water);
                thread::spawn(move || {
                    for _ in 0..rounds {
                        if counter.try_acquire(max) {
                            high_water.fetch_max(counter.get(), Ordering::SeqCst);
                            counter.dec();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        prop_assert!(high_water.load(Ordering::SeqCst) <= max);
        prop_assert_eq!(counter.get(), 0);
    }
}
