//! Runtime invariant registry
//!
//! Structural invariants of the session controller are checked at the point where
//! they could break. Each check is recorded so contract tests can assert that a
//! scenario actually exercised the invariants it claims to cover.
//!
//! ```rust,ignore
//! check_invariant!(
//!     !self.session.is_held(),
//!     invariants::SESSION_BEFORE_DEVICE
//! );
//! ```

use lazy_static::lazy_static;
use std::collections::HashSet;
use std::sync::Mutex;

pub const SINGLE_ACTIVE_SESSION: &str = "a device has at most one active capture session";
pub const SESSION_BEFORE_DEVICE: &str = "the capture session is closed before its device";
pub const COMMANDS_REQUIRE_RUNNING: &str = "capture commands are only issued while running";
pub const SINGLE_RESOLUTION: &str = "a pending request is resolved at most once";
pub const LEGAL_TRANSITION: &str = "the controller only performs legal state transitions";

lazy_static! {
    static ref CHECKED: Mutex<HashSet<&'static str>> = Mutex::new(HashSet::new());
}

/// Check an invariant and record that it was checked.
///
/// A violation is logged as an error; debug builds also panic.
#[macro_export]
macro_rules! check_invariant {
    ($condition:expr, $message:expr) => {
        $crate::invariants::__check_invariant($condition, $message, module_path!())
    };
}

#[doc(hidden)]
pub fn __check_invariant(condition: bool, message: &'static str, context: &str) -> bool {
    CHECKED
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(message);

    if !condition {
        log::error!("INVARIANT VIOLATION [{}]: {}", context, message);
        debug_assert!(condition, "INVARIANT VIOLATION [{}]: {}", context, message);
    }
    condition
}

/// Whether `message` has been checked at least once in this process
pub fn was_checked(message: &str) -> bool {
    CHECKED
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .contains(message)
}

/// Panic unless every invariant in `required` has been checked
pub fn contract_test(test_name: &str, required: &[&str]) {
    let missing: Vec<&str> = required
        .iter()
        .copied()
        .filter(|invariant| !was_checked(invariant))
        .collect();

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: invariants never checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}
