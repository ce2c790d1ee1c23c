//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use ccpipes_config::ConfigError;
use ccpipes_core::{CoreError, PatchError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const REJECTED: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const PATCH: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach relay at {url}")]
    #[diagnostic(
        code(ccpipes::connection_failed),
        help(
            "Check that the relay is running and accessible.\n\
             URL: {url}"
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Timed out after {seconds}s waiting for {waiting_for}")]
    #[diagnostic(
        code(ccpipes::timeout),
        help("Increase the wait with --timeout or check the relay and controller.")
    )]
    Timeout { seconds: u64, waiting_for: String },

    // ── Factory ──────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(ccpipes::not_found),
        help("Run: ccpipes groups <factory.json> to see what the snapshot contains")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("Patch #{index} does not apply to the snapshot")]
    #[diagnostic(
        code(ccpipes::patch_failed),
        help("Patches must be applied in order to the snapshot they were produced against.")
    )]
    PatchFailed {
        index: usize,
        #[source]
        source: PatchError,
    },

    #[error("{responding_to} rejected by the controller ({error}): {message}")]
    #[diagnostic(code(ccpipes::rejected))]
    Rejected {
        responding_to: String,
        error: String,
        message: String,
    },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(ccpipes::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(ccpipes::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: ccpipes config set <name> --relay <url>"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(ccpipes::config))]
    Config(Box<ConfigError>),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error("Could not read {}", path.display())]
    #[diagnostic(code(ccpipes::read))]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON in {}: {source}", path.display())]
    #[diagnostic(code(ccpipes::json), help("Check the file contents and try again."))]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to render output: {0}")]
    Render(String),

    #[error("{0}")]
    Internal(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::PatchFailed { .. } => exit_code::PATCH,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Validation { .. } | Self::ProfileNotFound { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::Render(err.to_string())
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Render(err.to_string())
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::PatchApplication { index, source } => {
                CliError::PatchFailed { index, source }
            }

            CoreError::RequestRejected {
                responding_to,
                error,
                message,
                ..
            } => CliError::Rejected {
                responding_to: responding_to.to_string(),
                error,
                message,
            },

            CoreError::MachineNotFound { identifier } => CliError::NotFound {
                resource_type: "machine".into(),
                identifier,
            },

            CoreError::GroupNotFound { identifier } => CliError::NotFound {
                resource_type: "group".into(),
                identifier,
            },

            CoreError::PipeNotFound { identifier } => CliError::NotFound {
                resource_type: "pipe".into(),
                identifier,
            },

            CoreError::Disconnected => CliError::ConnectionFailed {
                url: "(disconnected)".into(),
                source: "relay connection was lost".into(),
            },

            CoreError::Relay { message } => CliError::ConnectionFailed {
                url: "(relay)".into(),
                source: message.into(),
            },

            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },

            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}
