//! Error types for the remote sniffing engine.

use std::time::Duration;

/// Result type alias for sniffing operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while preparing, running, or tearing down a capture.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Runtime Bridge Errors
    // =========================================================================
    /// Container runtime has no bridge implementation.
    #[error("unsupported container runtime '{runtime}' (supported: docker, cri-o, containerd)")]
    UnsupportedRuntime { runtime: String },

    /// Target PID could not be read from the runtime's inspection output.
    #[error("failed to extract container PID: {0}")]
    PidExtraction(#[from] PidError),

    // =========================================================================
    // Helper Pod Errors
    // =========================================================================
    /// Helper pod did not reach the Running phase before the deadline.
    #[error("helper pod '{pod}' on node '{node}' not running within timeout ({timeout:?})")]
    HelperCreationTimeout {
        pod: String,
        node: String,
        timeout: Duration,
    },

    /// Helper pod terminated before it ever ran.
    #[error("helper pod '{pod}' on node '{node}' terminated in phase {phase} before running")]
    HelperTerminated {
        pod: String,
        node: String,
        phase: String,
    },

    // =========================================================================
    // Remote Execution Errors
    // =========================================================================
    /// Remote command ran and exited with a non-zero code.
    #[error("remote command '{command}' failed with exit code {exit_code}: {stderr}")]
    RemoteCommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// Remote command could not be executed at all (transport failure).
    #[error("exec of '{command}' failed: {reason}")]
    Exec { command: String, reason: String },

    /// Extraction reported success but the file is still missing.
    #[error("upload unverifiable: '{path}' not found on container after extraction")]
    UploadUnverifiable { path: String },

    // =========================================================================
    // Cluster API Errors
    // =========================================================================
    /// Pod API call failed.
    #[error("cluster API {operation} failed: {reason}")]
    Cluster { operation: String, reason: String },

    /// Target pod or container cannot be sniffed.
    #[error("invalid capture target: {0}")]
    InvalidTarget(String),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// Operation called in the wrong session state.
    #[error("cannot {operation} while session is {state}")]
    InvalidState { operation: String, state: String },

    /// Teardown of a remote resource failed; manual cleanup required.
    #[error("failed to clean up {resource}: {reason} (manual cleanup required)")]
    CleanupFailed { resource: String, reason: String },

    /// Operation aborted by an external interrupt.
    #[error("interrupted during {stage}")]
    Interrupted { stage: String },

    // =========================================================================
    // Local Errors
    // =========================================================================
    /// Archive could not be built.
    #[error("failed to build archive: {0}")]
    Archive(String),

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true for errors that only require manual teardown.
    pub fn is_cleanup(&self) -> bool {
        matches!(self, Self::CleanupFailed { .. })
    }
}

/// Reasons a runtime inspection document did not yield a PID.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PidError {
    /// Inspection output was empty.
    #[error("inspection output is empty")]
    Empty,

    /// Inspection output is not a JSON object.
    #[error("malformed inspection output: {0}")]
    Malformed(String),

    /// Neither known schema (top-level `pid`, nested `info`) matched.
    #[error("unable to identify runtime version from inspection output")]
    UnrecognizedSchema,

    /// Schema was recognised but the PID field is absent.
    #[error("field '{field}' missing from inspection output")]
    MissingPid { field: &'static str },

    /// PID field present but not a positive integer.
    #[error("field '{field}' holds invalid PID {value}")]
    InvalidPid { field: &'static str, value: String },
}
