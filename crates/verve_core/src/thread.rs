//! UI-thread affinity
//!
//! The animation runtime keeps all of its state in thread-local storage and is
//! meant to be driven from a single UI thread. Platform glue can claim that
//! thread once at startup; afterwards every runtime entry point asserts it is
//! running there, turning accidental cross-thread use into a loud failure
//! instead of a silently separate runtime.
//!
//! Until a thread is claimed, every thread counts as the UI thread. That keeps
//! headless tools and test harnesses (one runtime per test thread) working
//! without any setup.

use std::sync::OnceLock;
use std::thread::{self, ThreadId};

static UI_THREAD: OnceLock<ThreadId> = OnceLock::new();

/// Claim the calling thread as the UI thread
///
/// Claiming again from the same thread is a no-op.
///
/// # Panics
///
/// Panics if a different thread already claimed the role.
pub fn claim_ui_thread() {
    let current = thread::current().id();
    let owner = *UI_THREAD.get_or_init(|| {
        tracing::debug!("claimed {:?} as the UI thread", current);
        current
    });
    assert_eq!(
        owner, current,
        "UI thread already claimed by {owner:?}, cannot claim {current:?}"
    );
}

/// The claimed UI thread, if any
pub fn ui_thread() -> Option<ThreadId> {
    UI_THREAD.get().copied()
}

/// Whether the caller may use UI-thread-only APIs
pub fn is_ui_thread() -> bool {
    UI_THREAD
        .get()
        .map_or(true, |owner| *owner == thread::current().id())
}

/// Panic unless called on the UI thread
#[track_caller]
pub fn assert_ui_thread(operation: &str) {
    if !is_ui_thread() {
        panic!(
            "{operation} must run on the UI thread {:?}, called from {:?}",
            ui_thread(),
            thread::current().id()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claimed_thread_is_exclusive() {
        claim_ui_thread();
        claim_ui_thread();
        assert!(is_ui_thread());
        assert_eq!(ui_thread(), Some(thread::current().id()));

        let other = thread::spawn(|| {
            let allowed = is_ui_thread();
            let asserted = std::panic::catch_unwind(|| assert_ui_thread("test")).is_err();
            let reclaimed = std::panic::catch_unwind(claim_ui_thread).is_err();
            (allowed, asserted, reclaimed)
        })
        .join()
        .unwrap();

        assert_eq!(other, (false, true, true));
    }
}
