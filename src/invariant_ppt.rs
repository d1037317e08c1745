//! Runtime invariant checking with contract-test support
//!
//! Core invariants of the capture layer are asserted with [`assert_invariant!`].
//! Each check is recorded per thread so contract tests can prove that a
//! scenario actually exercised the invariants it claims to cover.
//!
//! ```rust,ignore
//! use cinecraft::invariant_ppt::*;
//!
//! assert_invariant!(
//!     !recording_active,
//!     "No track is stopped while a recording is active",
//!     "stream::teardown"
//! );
//!
//! #[test]
//! fn contract_stream_teardown() {
//!     // ... drive a device switch ...
//!     contract_test("stream teardown", &["No track is stopped while a recording is active"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::HashSet;
use std::thread_local;

/// Fragments are flushed only from the stopping transition
pub const FRAGMENTS_FLUSH_FROM_STOPPING: &str =
    "Fragments are flushed only from the stopping transition";
/// A recording's fragments are flushed at most once
pub const FRAGMENTS_FLUSHED_ONCE: &str = "Fragments are flushed at most once per recording";
/// Tearing down a stream never happens under an active recording
pub const NO_TEARDOWN_WHILE_RECORDING: &str = "No track is stopped while a recording is active";
/// At most one stream session is active
pub const SINGLE_ACTIVE_STREAM: &str = "At most one stream session is active";
/// Applied zoom levels stay within [1, max]
pub const ZOOM_LEVEL_IN_RANGE: &str = "Zoom level stays within [1, max_level]";

thread_local! {
    static INVARIANT_LOG: RefCell<HashSet<String>> = RefCell::new(HashSet::new());
}

/// Assert an invariant and log it for contract testing.
///
/// # Panics
/// Panics if the condition is false.
#[macro_export]
macro_rules! assert_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, None)
    };
    ($condition:expr, $message:expr, $context:expr) => {
        $crate::invariant_ppt::__assert_invariant_impl($condition, $message, Some($context))
    };
}

#[doc(hidden)]
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&str>) {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().insert(message.to_string());
    });

    if !condition {
        let ctx = context.unwrap_or("unknown");
        log::error!("invariant violated [{}]: {}", ctx, message);
        panic!("INVARIANT VIOLATION [{}]: {}", ctx, message);
    }
}

/// Whether `message` has been checked on this thread since the last clear
pub fn invariant_checked(message: &str) -> bool {
    INVARIANT_LOG.with(|log| log.borrow().contains(message))
}

/// Check that specific invariants were verified during test execution.
///
/// # Panics
/// Panics if any required invariant was not checked.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = required_invariants
        .iter()
        .copied()
        .filter(|invariant| !invariant_checked(invariant))
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: The following invariants were not checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// Clear the invariant log
pub fn clear_invariant_log() {
    INVARIANT_LOG.with(|log| {
        log.borrow_mut().clear();
    });
}
