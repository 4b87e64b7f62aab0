// Error handling utilities for consistent error messages and exit codes

use std::process;
use thiserror::Error;

/// Exit code for user errors: bad input, unreachable gateway, trace-level errors
pub const EXIT_USER_ERROR: i32 = 1;
/// Exit code for unexpected failures of tracewatch itself
pub const EXIT_INTERNAL_ERROR: i32 = 2;

/// Marks an error as internal (exit code 2) rather than a user error
#[derive(Debug, Error)]
#[error("{message}")]
pub struct InternalError {
    message: String,
    #[source]
    source: Option<std::io::Error>,
}

impl InternalError {
    pub fn io(message: &str, source: std::io::Error) -> Self {
        Self {
            message: message.to_string(),
            source: Some(source),
        }
    }
}

/// The source reported a timeout or error for the watched trace. Stage data
/// was still printed; this only decides the exit code.
#[derive(Debug, Error)]
#[error("Trace {trace_id}: {message}")]
pub struct TraceFailure {
    pub trace_id: String,
    pub message: String,
}

/// Whether an error returned from `run` is internal
pub fn is_internal(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<InternalError>())
}

/// Exit with a user error (exit code 1)
pub fn user_error(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(EXIT_USER_ERROR);
}

/// Exit with an internal error (exit code 2), printing the cause chain
pub fn internal_error(err: &anyhow::Error) -> ! {
    eprintln!("Internal error: {}", err);
    let mut causes = err.chain().skip(1).peekable();
    if causes.peek().is_some() {
        eprintln!("\nCaused by:");
        for (indent, cause) in causes.enumerate() {
            eprintln!("{:indent$}  {}", "", cause, indent = indent + 1);
        }
    }
    process::exit(EXIT_INTERNAL_ERROR);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_internal() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = anyhow::Error::new(InternalError::io("Failed to write output", io));
        assert!(is_internal(&err));

        let wrapped = err.context("while rendering");
        assert!(is_internal(&wrapped));

        let user = anyhow::anyhow!("Trace ID cannot be empty");
        assert!(!is_internal(&user));
    }

    #[test]
    fn test_trace_failure_message() {
        let err = TraceFailure {
            trace_id: "abc".to_string(),
            message: "connection timed out".to_string(),
        };
        assert_eq!(err.to_string(), "Trace abc: connection timed out");
    }
}
