//! Error types and retry classification.
//!
//! Failures fall into four groups:
//!
//! 1. **Connectivity** ([`SessionError`]): the scanning host could not be reached
//!    or refused the session. These never cross the transport boundary; the
//!    executor logs them and reports exit code `-1`.
//! 2. **Protocol** ([`ParseError`]): the remote command answered, but not in the
//!    expected `key=value` form.
//! 3. **Preconditions** ([`OrchestratorError`], [`ConfigError`]): missing
//!    configuration, unknown releases, ambiguous source attachments, bad teams.
//! 4. **Timeouts** ([`ExecError`]): a command outlived its execution budget.
//!
//! Callers that want to retry a failed connection can ask
//! [`SessionError::is_retryable`]. Authentication failures are never retryable
//! and take precedence over connection keywords in the same message.

use std::time::Duration;

use thiserror::Error;

/// Authentication error patterns that indicate permanent failures.
const AUTH_ERRORS: &[&str] = &[
    "authentication failed",
    "key authentication failed",
    "permission denied",
    "publickey",
    "auth fail",
    "no authentication",
    "all authentication methods failed",
];

/// Connection error patterns that indicate transient failures.
const RETRYABLE_ERRORS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection timed out",
    "timeout",
    "network is unreachable",
    "no route to host",
    "host is down",
    "temporary failure",
    "resource temporarily unavailable",
    "handshake failed",
    "failed to connect",
    "broken pipe",
    "would block",
];

/// Determines if an error message describes a transient failure.
///
/// Unknown messages are retryable unless they look like an SSH protocol error
/// without a timeout or connect keyword.
pub(crate) fn is_retryable_error(error: &str) -> bool {
    let error_lower = error.to_lowercase();

    for auth_err in AUTH_ERRORS {
        if error_lower.contains(auth_err) {
            return false;
        }
    }

    for retryable_err in RETRYABLE_ERRORS {
        if error_lower.contains(retryable_err) {
            return true;
        }
    }

    !error_lower.contains("ssh")
        || error_lower.contains("timeout")
        || error_lower.contains("connect")
}

/// Failure to obtain or use a remote session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to load private key from {path}: {reason}")]
    Credentials { path: String, reason: String },

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Failed to connect: {0}")]
    Connect(String),

    #[error("Key authentication failed for user {0}")]
    Authentication(String),

    #[error("Host key of {host} was rejected ({fingerprint})")]
    HostKeyRejected { host: String, fingerprint: String },

    #[error("Channel error: {0}")]
    Channel(String),
}

impl SessionError {
    /// Whether opening a new session could succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            SessionError::Credentials { .. }
            | SessionError::Authentication(_)
            | SessionError::HostKeyRejected { .. } => false,
            other => is_retryable_error(&other.to_string()),
        }
    }
}

/// A command exceeded its execution timeout.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecError {
    #[error("Command timed out after {0:?}")]
    Timeout(Duration),
}

/// Remote output did not contain the expected `key=value` token.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("No '{key}=' token in output: {output:?}")]
    MissingToken { key: &'static str, output: String },

    #[error("Invalid value '{value}' for '{key}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store backend failure: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors returned to callers of the upload orchestrator.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Release {0} not found")]
    ReleaseNotFound(String),

    #[error("Release {release} has {count} source attachments, expected exactly one")]
    SourceAttachmentCount { release: String, count: usize },

    #[error("Invalid clearing team: '{0}'")]
    InvalidTeam(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Exec(#[from] ExecError),
}

#[cfg(test)]
mod tests {
    use super::*;

    mod retry_classification {
        use super::*;

        #[test]
        fn test_auth_errors_not_retryable() {
            assert!(!is_retryable_error("Authentication failed"));
            assert!(!is_retryable_error("permission denied (publickey)"));
            assert!(!is_retryable_error("All authentication methods failed"));
        }

        #[test]
        fn test_connection_errors_retryable() {
            assert!(is_retryable_error("Connection refused"));
            assert!(is_retryable_error("connection reset by peer"));
            assert!(is_retryable_error("Network is unreachable"));
            assert!(is_retryable_error("Temporary failure in name resolution"));
        }

        #[test]
        fn test_ssh_protocol_error_not_retryable() {
            assert!(!is_retryable_error("SSH protocol error"));
            assert!(is_retryable_error("SSH connection timeout"));
        }

        #[test]
        fn test_auth_error_takes_precedence_over_connection() {
            assert!(!is_retryable_error(
                "Connection timeout during authentication failed"
            ));
        }

        #[test]
        fn test_unknown_error_without_ssh_is_retryable() {
            assert!(is_retryable_error("Something went wrong"));
            assert!(is_retryable_error(""));
        }
    }

    mod session_error {
        use super::*;

        #[test]
        fn test_connect_timeout_is_retryable() {
            let err = SessionError::ConnectTimeout(Duration::from_secs(10));
            assert!(err.is_retryable());
        }

        #[test]
        fn test_refused_connection_is_retryable() {
            let err = SessionError::Connect("Connection refused (os error 111)".to_string());
            assert!(err.is_retryable());
        }

        #[test]
        fn test_credential_failures_are_permanent() {
            let err = SessionError::Credentials {
                path: "/keys/id_rsa".to_string(),
                reason: "No such file".to_string(),
            };
            assert!(!err.is_retryable());
            assert!(!SessionError::Authentication("sw360".to_string()).is_retryable());
        }

        #[test]
        fn test_host_key_rejection_is_permanent() {
            let err = SessionError::HostKeyRejected {
                host: "scanner".to_string(),
                fingerprint: "SHA256:abc".to_string(),
            };
            assert!(!err.is_retryable());
            assert!(err.to_string().contains("scanner"));
        }
    }

    mod messages {
        use super::*;

        #[test]
        fn test_attachment_count_message() {
            let err = OrchestratorError::SourceAttachmentCount {
                release: "r1".to_string(),
                count: 2,
            };
            assert_eq!(
                err.to_string(),
                "Release r1 has 2 source attachments, expected exactly one"
            );
        }

        #[test]
        fn test_timeout_converts_into_orchestrator_error() {
            let err: OrchestratorError = ExecError::Timeout(Duration::from_secs(5)).into();
            assert!(matches!(err, OrchestratorError::Exec(ExecError::Timeout(_))));
        }
    }
}
