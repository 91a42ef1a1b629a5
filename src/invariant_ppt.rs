//! Runtime invariants with contract-test support
//!
//! Production code states invariants with [`assert_invariant!`]; every check,
//! passing or not, is recorded per thread. Tests then call [`contract_test`] to
//! prove the invariants they rely on were actually exercised.
//!
//! ```rust,ignore
//! use cardscan::invariant_ppt::*;
//!
//! assert_invariant!(
//!     !state.is_terminal(),
//!     "Terminal session state never transitions",
//!     "session"
//! );
//!
//! #[test]
//! fn contract_session_states() {
//!     contract_test("session states", &["Terminal session state never transitions"]);
//! }
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;

thread_local! {
    // invariant message -> context it was last checked in
    static CHECKED: RefCell<BTreeMap<String, &'static str>> = RefCell::new(BTreeMap::new());
}

/// Assert an invariant and record that it was checked.
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
pub fn __assert_invariant_impl(condition: bool, message: &str, context: Option<&'static str>) {
    let context = context.unwrap_or("unknown");
    CHECKED.with(|checked| {
        checked.borrow_mut().insert(message.to_string(), context);
    });

    if !condition {
        panic!("INVARIANT VIOLATION [{}]: {}", context, message);
    }
}

/// Invariants checked on this thread, as `(message, context)` pairs.
pub fn checked_invariants() -> Vec<(String, &'static str)> {
    CHECKED.with(|checked| {
        checked
            .borrow()
            .iter()
            .map(|(message, context)| (message.clone(), *context))
            .collect()
    })
}

/// Require that every listed invariant was checked on this thread.
///
/// # Panics
/// Panics naming the invariants that were never checked.
pub fn contract_test(test_name: &str, required_invariants: &[&str]) {
    let missing: Vec<&str> = CHECKED.with(|checked| {
        let checked = checked.borrow();
        required_invariants
            .iter()
            .copied()
            .filter(|invariant| !checked.contains_key(*invariant))
            .collect()
    });

    if !missing.is_empty() {
        panic!(
            "CONTRACT FAILURE [{}]: never checked:\n  - {}",
            test_name,
            missing.join("\n  - ")
        );
    }
}

/// Forget every recorded check on this thread.
pub fn clear_invariant_log() {
    CHECKED.with(|checked| checked.borrow_mut().clear());
}
