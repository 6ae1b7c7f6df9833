//! # Load-Order Flag
//!
//! The script loader that guarantees imported modules run before literal page code is
//! not part of this crate. All that survives here is the flag it sets, which dependent
//! initialization code reads.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

static LOADED_BEFORE: AtomicBool = AtomicBool::new(false);

/// Process-wide "loaded-before" flag.
pub struct LoadedBefore;

impl LoadedBefore {
    /// Called by the loader once every import has run.
    pub fn mark() {
        LOADED_BEFORE.store(true, Ordering::Release);
    }

    pub fn is_set() -> bool {
        LOADED_BEFORE.load(Ordering::Acquire)
    }
}
