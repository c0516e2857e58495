//! Typed errors for the watchdog's own concerns (configuration, invocation,
//! auth) — distinct from [`crate::errors::ErrorKind`], which only covers
//! malformed-HTTP-request handling in the engine layer.

use thiserror::Error;

/// Fatal at startup: the process should log this and exit non-zero.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("fprocess must not be empty")]
    EmptyProcess,

    #[error("OPENFAAS_NAME must be set when jwt_auth is enabled")]
    MissingFunctionName,

    #[error("failed to determine a writable temp directory: {0}")]
    NoTempDir(#[from] std::io::Error),
}

/// Raised while driving a single child-process invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("failed to spawn {command:?}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("execution exceeded the hard timeout")]
    HardTimeout,

    #[error("writing the request body to the child's stdin failed: {0}")]
    StdinWrite(#[source] std::io::Error),

    #[error("reading the child's output failed: {0}")]
    Output(#[source] std::io::Error),

    #[error("the child exited with status {0}")]
    NonZeroExit(i32),
}

/// Raised by the JWT auth adapter.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing Authorization bearer token")]
    MissingToken,

    #[error("token validation failed: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("no verification key is configured")]
    NoKey,
}
