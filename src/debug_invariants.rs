//! Self-checks of the DOF tables.
//!
//! Tables validate themselves right after they are built. The check runs in
//! debug builds, or in release builds with `check-invariants`; a violation
//! panics with the name of the table that broke.

use crate::dof_error::DofSieveError;

/// A DOF structure that can check its own consistency.
pub trait DebugInvariants {
    /// Panic on a broken invariant when checking is enabled.
    fn debug_assert_invariants(&self);
    /// First broken invariant, as [`DofSieveError::InvariantViolation`].
    fn validate_invariants(&self) -> Result<(), DofSieveError>;
}

/// Run `$check` and panic with `$what` on error when checking is enabled.
#[macro_export]
macro_rules! debug_invariants {
    ($check:expr, $($what:tt)*) => {
        #[cfg(any(debug_assertions, feature = "strict-invariants", feature = "check-invariants"))]
        if let Err(err) = $check {
            panic!(concat!("[dof-sieve] broken ", $($what)*, ": {}"), err);
        }
    };
}
