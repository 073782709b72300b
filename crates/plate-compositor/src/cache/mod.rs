//! Run-scoped state: well buffers and chunk completion.

mod completion;
mod well_cache;

pub use completion::{Claim, CompletionTracker};
pub use well_cache::{WellBuffer, WellCache};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
///
/// Guarded values are only changed by single inserts, removals or replacements.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
