//! Pipeline error types.

use thiserror::Error;

/// Fatal pipeline conditions.
///
/// Everything here signals a programming or wiring defect: the current pull
/// chain aborts and the error surfaces to the eager consumer. There are no
/// retries and no partial recovery. Record rejection is not an error and
/// never appears here; end-of-stream is not an error either.
///
/// The type is `Clone` because a stage latches its first fatal error and
/// repeats it on every later pull.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A suspension unit was resumed after it already reported completion.
    /// Only the resume that observes the procedure's return is free.
    #[error("stage '{stage}' was resumed after completion")]
    ResumedAfterCompletion { stage: String },

    /// The worker behind a suspension unit died without reporting a result.
    #[error("production procedure of stage '{stage}' panicked")]
    ProcedurePanicked { stage: String },

    /// The OS refused to spawn the worker backing a suspension unit.
    #[error("could not start worker for stage '{stage}'")]
    SpawnFailed { stage: String },

    /// The consumer dropped a suspended unit. Used to unwind a parked
    /// production procedure; not normally observable from outside.
    #[error("pipeline consumer went away")]
    Canceled,

    /// A consuming stage was pulled without an upstream attached.
    #[error("stage '{stage}' has no upstream to pull from")]
    MissingUpstream { stage: String },

    /// An input record lacks a field the stage declared in its requires set.
    #[error("stage '{stage}' requires a value for '{field}'")]
    MissingRequired { stage: String, field: String },

    /// A handler finished without populating a declared provided field.
    #[error("stage '{stage}' forgot to provide a value for '{field}'")]
    MissingProvided { stage: String, field: String },

    /// A strict proxy read of a field outside the declared contract.
    #[error("stage '{stage}' can't read '{field}'; add it to the requires list")]
    UndeclaredRead { stage: String, field: String },

    /// A strict proxy write of a field outside the provides set.
    #[error("stage '{stage}' can't write '{field}'; add it to the provides list")]
    UndeclaredWrite { stage: String, field: String },

    /// Reading a record input failed.
    #[error("failed to read records: {0}")]
    Read(String),

    /// A record line was not a JSON object.
    #[error("invalid record on line {line}: {message}")]
    Parse { line: usize, message: String },
}
