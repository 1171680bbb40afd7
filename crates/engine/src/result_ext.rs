//! Result extension trait for logging errors with context.

use std::fmt::Display;
use tracing::error;

/// Extension trait for logging errors with context.
///
/// Logs the error together with the caller's source location and hands the
/// `Result` back unchanged, so it can sit in a `?` chain.
pub trait ResultExt<T, E> {
    /// Log the error with context if this is an `Err` variant.
    ///
    /// ```ignore
    /// use docflow_engine::result_ext::ResultExt;
    ///
    /// let definition = parse_workflow(&yaml).log("loading workflow")?;
    /// ```
    fn log<S: ToString>(self, context: S) -> Result<T, E>;
}

impl<T, E: Display> ResultExt<T, E> for Result<T, E> {
    #[track_caller]
    fn log<S: ToString>(self, context: S) -> Result<T, E> {
        if let Err(ref e) = self {
            let caller_location = std::panic::Location::caller();
            error!(
                target: "docflow_engine",
                error = %e,
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Operation failed"
            );
        }
        self
    }
}

/// Extension trait for logging missing values.
pub trait OptionResultExt<T> {
    /// Log if this is a `None` variant.
    fn log_none<S: ToString>(self, context: S) -> Option<T>;
}

impl<T> OptionResultExt<T> for Option<T> {
    #[track_caller]
    fn log_none<S: ToString>(self, context: S) -> Option<T> {
        if self.is_none() {
            let caller_location = std::panic::Location::caller();
            tracing::warn!(
                target: "docflow_engine",
                file = %format!("{}:{}", caller_location.file(), caller_location.line()),
                context = %context.to_string(),
                "Expected value was None"
            );
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_ext_ok() {
        let result: Result<i32, &str> = Ok(42);
        assert_eq!(result.log("reading definition").unwrap(), 42);
    }

    #[test]
    fn test_result_ext_err() {
        let result: Result<i32, &str> = Err("bad yaml");
        assert!(result.log("reading definition").is_err());
    }

    #[test]
    fn test_option_ext() {
        assert_eq!(Some(7).log_none("job client lookup"), Some(7));
        assert!(None::<i32>.log_none("job client lookup").is_none());
    }
}
