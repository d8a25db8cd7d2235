//! Error types for the console debugger
//!
//! Error messages are meant to be read directly by the person typing
//! commands at the console, so they carry enough context to act on.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the console debugger
#[derive(Error, Debug)]
pub enum Error {
    // === Session Errors ===
    #[error("No debug session active. Launch a program or attach to a process first")]
    NoActiveSession,

    #[error("Session already active. Stop the current session first")]
    SessionAlreadyActive,

    #[error("Program has exited with code {0}")]
    ProgramExited(i32),

    // === Adapter Errors ===
    #[error("Debug adapter '{name}' not found. Searched: {searched}")]
    AdapterNotFound { name: String, searched: String },

    #[error("Debug adapter failed to start: {0}")]
    AdapterSpawnFailed(String),

    #[error("Debug adapter crashed unexpectedly")]
    AdapterCrashed,

    #[error("Debug adapter returned error: {0}")]
    AdapterError(String),

    // === DAP Protocol Errors ===
    #[error("DAP protocol error: {0}")]
    DapProtocol(String),

    #[error("DAP request '{command}' failed: {message}")]
    DapRequestFailed { command: String, message: String },

    #[error("DAP initialization failed: {0}")]
    DapInitFailed(String),

    // === Breakpoint Errors ===
    #[error("Invalid breakpoint location: {0}")]
    InvalidLocation(String),

    #[error("No breakpoint at index {0}")]
    NoSuchBreakpoint(usize),

    // === State/Navigation Errors ===
    #[error("Cannot {action} while session is {state}")]
    StateViolation { action: String, state: String },

    #[error("No such thread: {0}")]
    NoSuchThread(i64),

    #[error("No such stack frame: {0}")]
    NoSuchFrame(usize),

    #[error("No such scope: {0}")]
    NoSuchScope(String),

    #[error("Adapter does not support {0}")]
    CapabilityNotSupported(&'static str),

    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    // === Timeout Errors ===
    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an adapter not found error with search paths
    pub fn adapter_not_found<S: AsRef<str>>(name: &str, paths: &[S]) -> Self {
        Self::AdapterNotFound {
            name: name.to_string(),
            searched: paths.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(", "),
        }
    }

    /// Create a DAP request failed error
    pub fn dap_request_failed(command: &str, message: &str) -> Self {
        Self::DapRequestFailed {
            command: command.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a state violation error
    pub fn state_violation(action: &str, state: &str) -> Self {
        Self::StateViolation {
            action: action.to_string(),
            state: state.to_string(),
        }
    }
}

/// Wraps an error that should terminate the process with a non-zero
/// exit code, as opposed to one that is reported to the console while
/// the command loop keeps running.
#[derive(Debug)]
pub struct FatalSessionError {
    pub source: Error,
    pub exit_code: i32,
}

impl FatalSessionError {
    pub fn new(source: Error) -> Self {
        Self {
            source,
            exit_code: 1,
        }
    }
}

impl std::fmt::Display for FatalSessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::error::Error for FatalSessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
