// ── Core error types ──
//
// `PatchError` describes why a single delta could not be applied to a
// snapshot. `CoreError` is what editor consumers see; transport failures from
// `ccpipes-api` are folded into it by the `From` impl below.

use ccpipes_api::MessageType;
use thiserror::Error;

/// A delta that cannot be structurally applied to the snapshot.
///
/// `path` is a JSON pointer (`/machines/m1/groups/0`) to the offending
/// location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    #[error("Patch target {path} does not exist")]
    MissingTarget { path: String },

    #[error("Patch target {path} is not {expected}")]
    TypeMismatch { path: String, expected: &'static str },

    #[error("Array index {index} at {path} is out of range (length {len})")]
    IndexOutOfRange {
        path: String,
        index: usize,
        len: usize,
    },

    #[error("Malformed delta at {path}: {reason}")]
    Malformed { path: String, reason: String },

    #[error("Unsupported delta at {path}: {what}")]
    Unsupported { path: String, what: &'static str },

    /// The patched document no longer decodes as a factory.
    #[error("Patched factory is invalid: {0}")]
    Schema(String),
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Synchronization errors ──────────────────────────────────────
    /// Fatal to the local snapshot; recover by fetching a full factory.
    #[error("Failed to apply patch #{index}: {source}")]
    PatchApplication {
        index: usize,
        #[source]
        source: PatchError,
    },

    #[error("{responding_to} request rejected ({error}): {message}")]
    RequestRejected {
        responding_to: MessageType,
        req_id: Option<String>,
        error: String,
        message: String,
    },

    // ── Data errors ─────────────────────────────────────────────────
    #[error("Machine not found: {identifier}")]
    MachineNotFound { identifier: String },

    #[error("Group not found: {identifier}")]
    GroupNotFound { identifier: String },

    #[error("Pipe not found: {identifier}")]
    PipeNotFound { identifier: String },

    // ── Connection errors ───────────────────────────────────────────
    #[error("Relay disconnected")]
    Disconnected,

    #[error("Relay error: {message}")]
    Relay { message: String },

    // ── Configuration errors ────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ─────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Whether the local snapshot can no longer be trusted.
    pub fn requires_resync(&self) -> bool {
        matches!(self, Self::PatchApplication { .. })
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<ccpipes_api::Error> for CoreError {
    fn from(err: ccpipes_api::Error) -> Self {
        match err {
            ccpipes_api::Error::RelayShutdown => CoreError::Disconnected,
            ccpipes_api::Error::Serialization(e) => CoreError::Internal(e.to_string()),
            other => CoreError::Relay {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_message_names_request_type() {
        let err = CoreError::RequestRejected {
            responding_to: MessageType::MachineEdit,
            req_id: Some("r1".into()),
            error: "MachineNotFound".into(),
            message: "no such machine".into(),
        };
        assert_eq!(
            err.to_string(),
            "MachineEdit request rejected (MachineNotFound): no such machine"
        );
    }

    #[test]
    fn patch_failure_requires_resync() {
        let err = CoreError::PatchApplication {
            index: 2,
            source: PatchError::MissingTarget {
                path: "/groups/g9".into(),
            },
        };
        assert!(err.requires_resync());
        assert_eq!(
            err.to_string(),
            "Failed to apply patch #2: Patch target /groups/g9 does not exist"
        );
        assert!(!CoreError::Disconnected.requires_resync());
    }

    #[test]
    fn relay_shutdown_maps_to_disconnected() {
        let err: CoreError = ccpipes_api::Error::RelayShutdown.into();
        assert!(matches!(err, CoreError::Disconnected));
    }
}
