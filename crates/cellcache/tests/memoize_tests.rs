//! Memoized functions bound through the registry.

use cellcache::{BindingRegistry, CacheOptions, CachedFn, get_cachemanager_for};
use cellcache_core::{ArgValue, CallArgs};
use std::sync::atomic::{AtomicU64, Ordering};

fn pseudo_random(state: &AtomicU64, n: usize) -> Vec<f64> {
    (0..n)
        .map(|_| {
            let next = state
                .fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::SeqCst)
                .wrapping_mul(0xBF58_476D_1CE4_E5B9);
            (next >> 11) as f64 / (1u64 << 53) as f64
        })
        .collect()
}

fn arg_len(args: &CallArgs) -> usize {
    match args.positional.first() {
        Some(ArgValue::Int(n)) => *n as usize,
        _ => 5,
    }
}

#[test]
fn test_basic_cache_success() {
    let dir = tempfile::tempdir().unwrap();
    let compute = CachedFn::new(
        CacheOptions::new("compute-test_basic_cache_success").with_base(dir.path()),
        |_: &CallArgs| 517u32,
    )
    .unwrap();

    assert_eq!(compute.call_without_args::<u32>().unwrap(), 517);
}

#[test]
fn test_random_results_are_pinned() {
    let dir = tempfile::tempdir().unwrap();
    let registry = BindingRegistry::new();
    let state = AtomicU64::new(7);

    let my_calc1 = CachedFn::with_registry(
        CacheOptions::new("compute-a").with_base(dir.path()),
        &registry,
        |_: &CallArgs| pseudo_random(&state, 5),
    )
    .unwrap();
    let my_calc2 = CachedFn::with_registry(
        CacheOptions::new("compute-b").with_base(dir.path()),
        &registry,
        |args: &CallArgs| pseudo_random(&state, arg_len(args)),
    )
    .unwrap();

    let first: Vec<f64> = my_calc1.call_without_args().unwrap();
    let second: Vec<f64> = my_calc1.call_without_args().unwrap();
    assert_eq!(first, second);

    let three: Vec<f64> = my_calc2.call(&CallArgs::new().arg(3)).unwrap();
    let six: Vec<f64> = my_calc2.call(&CallArgs::new().arg(6)).unwrap();
    let three_again: Vec<f64> = my_calc2.call(&CallArgs::new().arg(3)).unwrap();
    assert_eq!(three.len(), 3);
    assert_eq!(six.len(), 6);
    assert_eq!(three, three_again);

    let cm = registry.lookup(my_calc1.id()).unwrap();
    assert_eq!(cm.local().list().unwrap().len(), 3);
    cm.clear_local().unwrap();

    let fresh: Vec<f64> = my_calc1.call_without_args().unwrap();
    assert_ne!(fresh, first);
}

#[test]
fn test_get_cm() {
    let dir = tempfile::tempdir().unwrap();
    let my_calc1 = CachedFn::new(
        CacheOptions::new("compute-test_get_cm").with_base(dir.path()),
        |_: &CallArgs| vec![0.0f64; 5],
    )
    .unwrap();

    let cm = get_cachemanager_for(&my_calc1);
    assert!(cm.is_some());
}

#[test]
fn test_missing_base_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let result = CachedFn::with_registry(
        CacheOptions::new("k").with_base(dir.path().join("absent")),
        &BindingRegistry::new(),
        |_: &CallArgs| 1,
    );
    assert!(result.is_err());
}
