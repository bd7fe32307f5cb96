//! Exit code logic for the mediafetch process.

use std::process::ExitCode;

use mediafetch_core::RunSummary;

/// Process outcome of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    /// Some items finished, some failed.
    Partial,
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Partial => ExitCode::from(2),
            ProcessExit::Failure => ExitCode::FAILURE,
        }
    }
}

/// Maps a run's counts to the exit outcome. Cancellations are not failures.
pub(crate) fn determine_exit_outcome(summary: &RunSummary) -> ProcessExit {
    if summary.failed == 0 {
        ProcessExit::Success
    } else if summary.completed > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}
