// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for rulegrid-core.
//!
//! Every failure inside the dispatch core is rule-body-local. Errors carry a
//! stable machine-readable code and a negative rule status so the calling rule
//! interpreter can record them without knowing the variant.

use std::fmt;

use crate::queue::QueueId;

/// Result type using DispatchError
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Rule status codes reported for local failures.
///
/// Remote failures carry the status produced by the peer or transport instead.
pub mod status {
    /// Malformed execution-frequency directive.
    pub const POLICY_PARSE_ERR: i32 = -1201;
    /// Malformed submission condition tag.
    pub const CONDITION_ERR: i32 = -1202;
    /// Rule body that cannot be stored as a queued action.
    pub const ACTION_ERR: i32 = -1203;
    /// Context could not be packed or unpacked.
    pub const MARSHAL_ERR: i32 = -1301;
    /// Context binding of an unsupported kind.
    pub const UNSUPPORTED_SHAPE_ERR: i32 = -1302;
    /// Queue store failure without a more specific status.
    pub const QUEUE_STORE_ERR: i32 = -1401;
    /// Queue entry does not exist.
    pub const QUEUE_ENTRY_NOT_FOUND: i32 = -1402;
    /// Nothing left on the compensation stack.
    pub const EMPTY_STACK_ERR: i32 = -1501;
    /// Host address did not resolve to a usable target.
    pub const ADDRESS_RESOLUTION_ERR: i32 = -1601;
    /// Remote transport failed before the peer answered.
    pub const TRANSPORT_ERR: i32 = -1602;
}

/// Errors produced by the dispatch core.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DispatchError {
    /// Execution-frequency directive outside the grammar.
    #[error("invalid execution frequency '{directive}': {reason}")]
    PolicyParse {
        /// The directive text as given.
        directive: String,
        /// What was wrong with it.
        reason: String,
    },

    /// A tagged submission condition carried an unusable value.
    #[error("invalid <{tag}> condition: {reason}")]
    Condition {
        /// The condition tag (`ET`, `PLUSET`, `PRIORITY`, ...).
        tag: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Rule bodies cannot be joined into a queued action.
    #[error("invalid rule action: {reason}")]
    Action {
        /// What was wrong with it.
        reason: String,
    },

    /// Context could not be packed or unpacked.
    #[error("context marshaling failed: {reason}")]
    Marshal {
        /// Failure details.
        reason: String,
    },

    /// A binding is not a string, buffer or record.
    #[error("binding '{name}' has unsupported value tag {tag}")]
    UnsupportedShape {
        /// Binding name.
        name: String,
        /// The tag found on the wire.
        tag: u8,
    },

    /// The queue store rejected a submit or cancel.
    #[error("queue {operation} failed with status {status}: {details}")]
    Queue {
        /// The store operation that failed.
        operation: String,
        /// The store's status code.
        status: i32,
        /// Error details.
        details: String,
    },

    /// Cancelling an id that is not (or no longer) queued.
    #[error("queue entry {queue_id} not found")]
    NotFound {
        /// The id that was not found.
        queue_id: QueueId,
    },

    /// Popping an empty compensation stack.
    #[error("compensation stack is empty")]
    EmptyStack,

    /// Remote dispatch failure.
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl DispatchError {
    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::PolicyParse { .. } => "POLICY_PARSE_ERROR",
            Self::Condition { .. } => "CONDITION_ERROR",
            Self::Action { .. } => "ACTION_ERROR",
            Self::Marshal { .. } => "MARSHAL_ERROR",
            Self::UnsupportedShape { .. } => "UNSUPPORTED_SHAPE",
            Self::Queue { .. } => "QUEUE_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::EmptyStack => "EMPTY_STACK",
            Self::Exec(e) => match e.kind {
                ExecErrorKind::AddressResolution => "ADDRESS_RESOLUTION_ERROR",
                ExecErrorKind::Marshal => "MARSHAL_ERROR",
                ExecErrorKind::Transport | ExecErrorKind::RemoteStatus => "EXEC_ERROR",
            },
        }
    }

    /// Negative rule status reported to the rule interpreter.
    pub fn status(&self) -> i32 {
        match self {
            Self::PolicyParse { .. } => status::POLICY_PARSE_ERR,
            Self::Condition { .. } => status::CONDITION_ERR,
            Self::Action { .. } => status::ACTION_ERR,
            Self::Marshal { .. } => status::MARSHAL_ERR,
            Self::UnsupportedShape { .. } => status::UNSUPPORTED_SHAPE_ERR,
            Self::Queue { status: code, .. } if *code < 0 => *code,
            Self::Queue { .. } => status::QUEUE_STORE_ERR,
            Self::NotFound { .. } => status::QUEUE_ENTRY_NOT_FOUND,
            Self::EmptyStack => status::EMPTY_STACK_ERR,
            Self::Exec(e) => e.code,
        }
    }

    pub(crate) fn marshal(reason: impl Into<String>) -> Self {
        Self::Marshal {
            reason: reason.into(),
        }
    }

    pub(crate) fn queue(operation: &str, details: impl Into<String>) -> Self {
        Self::Queue {
            operation: operation.to_string(),
            status: status::QUEUE_STORE_ERR,
            details: details.into(),
        }
    }
}

impl From<sqlx::Error> for DispatchError {
    fn from(err: sqlx::Error) -> Self {
        DispatchError::queue("query", err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for DispatchError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DispatchError::queue("migrate", err.to_string())
    }
}

/// Which stage of a remote dispatch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecErrorKind {
    /// The host address expression was empty, malformed or failed to evaluate.
    AddressResolution,
    /// The outgoing or returned context could not be (un)packed.
    Marshal,
    /// The transport failed before the peer answered.
    Transport,
    /// The peer answered with a negative status.
    RemoteStatus,
}

impl fmt::Display for ExecErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AddressResolution => "address resolution",
            Self::Marshal => "marshal",
            Self::Transport => "transport",
            Self::RemoteStatus => "remote status",
        };
        f.write_str(s)
    }
}

/// Uniform remote dispatch failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("remote execution failed ({kind}) with status {code}: {message}")]
pub struct ExecError {
    /// Negative status from the peer, the transport, or the resolver.
    pub code: i32,
    /// Failing stage.
    pub kind: ExecErrorKind,
    /// Failure details.
    pub message: String,
}

impl ExecError {
    /// Host address could not be resolved.
    pub fn address_resolution(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: ExecErrorKind::AddressResolution,
            message: message.into(),
        }
    }

    /// Context could not cross the transfer boundary.
    pub fn marshal(err: &DispatchError) -> Self {
        Self {
            code: err.status(),
            kind: ExecErrorKind::Marshal,
            message: err.to_string(),
        }
    }

    /// Transport failed without a peer answer.
    pub fn transport(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            kind: ExecErrorKind::Transport,
            message: message.into(),
        }
    }

    /// Peer returned a negative status.
    pub fn remote_status(code: i32) -> Self {
        Self {
            code,
            kind: ExecErrorKind::RemoteStatus,
            message: "remote rule returned a failure status".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let test_cases = vec![
            (
                DispatchError::PolicyParse {
                    directive: "1x".to_string(),
                    reason: "bad unit".to_string(),
                },
                "POLICY_PARSE_ERROR",
                status::POLICY_PARSE_ERR,
            ),
            (
                DispatchError::Action {
                    reason: "recovery contains '|'".to_string(),
                },
                "ACTION_ERROR",
                status::ACTION_ERR,
            ),
            (
                DispatchError::marshal("truncated"),
                "MARSHAL_ERROR",
                status::MARSHAL_ERR,
            ),
            (
                DispatchError::UnsupportedShape {
                    name: "*x".to_string(),
                    tag: 9,
                },
                "UNSUPPORTED_SHAPE",
                status::UNSUPPORTED_SHAPE_ERR,
            ),
            (
                DispatchError::NotFound {
                    queue_id: QueueId::new(7),
                },
                "NOT_FOUND",
                status::QUEUE_ENTRY_NOT_FOUND,
            ),
            (
                DispatchError::EmptyStack,
                "EMPTY_STACK",
                status::EMPTY_STACK_ERR,
            ),
            (
                ExecError::address_resolution(status::ADDRESS_RESOLUTION_ERR, "empty").into(),
                "ADDRESS_RESOLUTION_ERROR",
                status::ADDRESS_RESOLUTION_ERR,
            ),
            (
                ExecError::remote_status(-808000).into(),
                "EXEC_ERROR",
                -808000,
            ),
        ];

        for (error, expected_code, expected_status) in test_cases {
            assert_eq!(error.error_code(), expected_code, "{:?}", error);
            assert_eq!(error.status(), expected_status, "{:?}", error);
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_queue_error_keeps_store_status() {
        let err = DispatchError::Queue {
            operation: "submit".to_string(),
            status: -806000,
            details: "catalog unavailable".to_string(),
        };
        assert_eq!(err.status(), -806000);

        let err = DispatchError::queue("submit", "disk full");
        assert_eq!(err.status(), status::QUEUE_STORE_ERR);
        assert_eq!(
            err.to_string(),
            "queue submit failed with status -1401: disk full"
        );
    }

    #[test]
    fn test_exec_error_display() {
        let err = ExecError::transport(status::TRANSPORT_ERR, "connection refused");
        assert_eq!(
            err.to_string(),
            "remote execution failed (transport) with status -1602: connection refused"
        );
    }
}
