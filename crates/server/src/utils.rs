//! Utility macros shared by the server modules.

/// Returns early with `$error` unless `$predicate` holds.
///
/// Works like `assert!`, but hands the error back to the caller instead of
/// panicking.
///
/// ```ignore
/// ensure!(!self.closed(), ServerError::Closed);
/// ```
macro_rules! ensure {
    ($predicate:expr, $error:expr) => {
        if !$predicate {
            return Err($error);
        }
    };
}

pub(crate) use ensure;
