use std::path::PathBuf;

use crate::tasks::ExecutionResult;


/// Exit code reported when the run is interrupted by SIGINT or SIGTERM.
pub const CANCELLED_EXIT_CODE: i32 = 130;


#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Task not found: \"{0}\"")]
    TaskNotFound(String),

    #[error("Invalid manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    #[error("Invalid Option: {0}")]
    InvalidOption(String),

    #[error("\"{name}\" exited with {code}.")]
    TaskFailed {
        name: String,
        code: i32,
        results: Vec<ExecutionResult>,
    },

    #[error("Cancelled")]
    Cancelled { results: Vec<ExecutionResult> },

    #[error("Failed to launch \"{name}\": {source}")]
    Launch {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// The process exit code this error maps to.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::TaskFailed { code, .. } if *code != 0 => *code,
            Error::Cancelled { .. } => CANCELLED_EXIT_CODE,
            _ => 1,
        }
    }

    /// Results of every task recorded before the run stopped, when the
    /// failure happened during execution.
    pub fn results(&self) -> Option<&[ExecutionResult]> {
        match self {
            Error::TaskFailed { results, .. } | Error::Cancelled { results } => {
                Some(results)
            }
            _ => None,
        }
    }

    pub(crate) fn manifest(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Manifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_propagates_task_code() {
        let err = Error::TaskFailed {
            name: "build".into(),
            code: 3,
            results: vec![],
        };
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.to_string(), "\"build\" exited with 3.");
    }

    #[test]
    fn planning_errors_exit_with_one_and_carry_no_results() {
        let err = Error::TaskNotFound("nope".into());
        assert_eq!(err.exit_code(), 1);
        assert!(err.results().is_none());
        assert_eq!(err.to_string(), "Task not found: \"nope\"");
    }

    #[test]
    fn cancelled_uses_interrupt_code() {
        let err = Error::Cancelled { results: vec![] };
        assert_eq!(err.exit_code(), CANCELLED_EXIT_CODE);
        assert_eq!(err.results().map(|r| r.len()), Some(0));
    }
}
