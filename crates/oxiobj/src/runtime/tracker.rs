//! Per-thread ledger of live instance blocks, keyed by class.
//!
//! Every block handed out by `object_construct` (and the meta-class's own
//! allocation) is counted here until it is freed. Tests compare counts
//! before and after a scenario to check that nothing leaked.

use crate::runtime::class::ObjectClass;
use fxhash::FxHashMap;
use std::cell::RefCell;
use std::ptr::NonNull;

thread_local! {
    static LIVE: RefCell<FxHashMap<usize, usize>> = RefCell::new(FxHashMap::default());
}

fn key(class: NonNull<ObjectClass>) -> usize {
    class.as_ptr().addr()
}

pub(crate) fn track(class: NonNull<ObjectClass>) {
    // Thread teardown may already have destroyed the ledger.
    let _ = LIVE.try_with(|live| {
        *live.borrow_mut().entry(key(class)).or_insert(0) += 1;
    });
}

pub(crate) fn untrack(class: NonNull<ObjectClass>) {
    let _ = LIVE.try_with(|live| {
        let mut live = live.borrow_mut();
        let key = key(class);
        if let Some(count) = live.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                live.remove(&key);
            }
        }
    });
}

/// Number of live instances of exactly `class` on this thread.
#[must_use]
pub fn live_instances(class: &ObjectClass) -> usize {
    let key = key(NonNull::from(class));
    LIVE.try_with(|live| live.borrow().get(&key).copied().unwrap_or(0))
        .unwrap_or(0)
}

/// Number of live instances of any class on this thread, classes included.
#[must_use]
pub fn live_objects() -> usize {
    LIVE.try_with(|live| live.borrow().values().sum())
        .unwrap_or(0)
}
