//! error
//!
//! Error taxonomy for the credential backend.
//!
//! # Design
//!
//! Errors fall into two layers:
//!
//! - [`ApiError`](crate::planetscale::ApiError) describes failures talking
//!   to the PlanetScale API.
//! - [`DbPluginError`] describes failures of the inbound operations the host
//!   invokes. Outbound failures are wrapped in [`DbPluginError::Client`]
//!   together with the step that failed.
//!
//! Every error that leaves the backend passes through the
//! [`ErrorSanitizer`](crate::redact::ErrorSanitizer), which turns it into
//! [`DbPluginError::Sanitized`] with secrets replaced by placeholders. The
//! original [`ErrorKind`] and retry hint survive so hosts can still branch
//! on them.
//!
//! # Example
//!
//! ```
//! use planetscale_dbplugin::{DbPluginError, ErrorKind};
//!
//! let err = DbPluginError::ConfigValidation { field: "database" };
//! assert_eq!(err.kind(), ErrorKind::ConfigValidation);
//! assert_eq!(err.to_string(), "database cannot be empty");
//! ```

use thiserror::Error;

use crate::planetscale::ApiError;
use crate::template::TemplateError;

/// Classification of a [`DbPluginError`].
///
/// Stable across the redaction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A required configuration field is empty.
    ConfigValidation,
    /// An operation ran before a successful initialize.
    NotInitialized,
    /// Constructing or calling the PlanetScale client failed.
    Client,
    /// The username template failed to compile or render.
    Template,
    /// `new_user` was called without creation statements.
    EmptyStatement,
    /// The first creation statement could not be parsed.
    InvalidStatement,
    /// Malformed `update_user` / `delete_user` arguments.
    Validation,
    /// The credential to revoke is not present on the platform.
    CredentialNotFound,
    /// Several independent sub-operations failed.
    Aggregated,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::ConfigValidation => "config_validation",
            ErrorKind::NotInitialized => "not_initialized",
            ErrorKind::Client => "client",
            ErrorKind::Template => "template",
            ErrorKind::EmptyStatement => "empty_statement",
            ErrorKind::InvalidStatement => "invalid_statement",
            ErrorKind::Validation => "validation",
            ErrorKind::CredentialNotFound => "credential_not_found",
            ErrorKind::Aggregated => "aggregated",
        };
        f.write_str(name)
    }
}

/// Errors returned by the inbound operations.
#[derive(Debug, Error)]
pub enum DbPluginError {
    /// A required configuration field is empty.
    #[error("{field} cannot be empty")]
    ConfigValidation {
        /// Name of the offending configuration key
        field: &'static str,
    },

    /// The backend has not been initialized.
    #[error("backend is not initialized")]
    NotInitialized,

    /// Failure constructing or invoking the PlanetScale client.
    #[error("{step}: {source}")]
    Client {
        /// What the backend was doing when the call failed
        step: &'static str,
        /// Underlying API failure
        source: ApiError,
    },

    /// Username template failure.
    #[error("{context}: {source}")]
    Template {
        /// Which stage rejected the template
        context: &'static str,
        /// Underlying template error
        source: TemplateError,
    },

    /// `new_user` was called with no creation statements.
    #[error("empty creation statements")]
    EmptyStatement,

    /// The first creation statement is not valid JSON.
    #[error("failed to parse creation statement: {0}")]
    InvalidStatement(String),

    /// Malformed request arguments.
    #[error("{0}")]
    Validation(String),

    /// No credential with the requested display name exists.
    #[error("failed to find password. name: {name}, database: {database}, organization: {organization}")]
    CredentialNotFound {
        /// Display name that was searched for
        name: String,
        /// Configured database
        database: String,
        /// Configured organization
        organization: String,
    },

    /// Independent sub-operation failures reported together.
    #[error("{}", format_aggregate(.0))]
    Aggregated(Vec<DbPluginError>),

    /// An error whose message has passed through secret redaction.
    #[error("{message}")]
    Sanitized {
        /// Kind of the original error
        kind: ErrorKind,
        /// Redacted message
        message: String,
        /// Retry hint of the original error
        transient: bool,
    },
}

impl DbPluginError {
    /// Wrap an API failure with the step that produced it.
    pub fn client(step: &'static str, source: ApiError) -> Self {
        DbPluginError::Client { step, source }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbPluginError::ConfigValidation { .. } => ErrorKind::ConfigValidation,
            DbPluginError::NotInitialized => ErrorKind::NotInitialized,
            DbPluginError::Client { .. } => ErrorKind::Client,
            DbPluginError::Template { .. } => ErrorKind::Template,
            DbPluginError::EmptyStatement => ErrorKind::EmptyStatement,
            DbPluginError::InvalidStatement(_) => ErrorKind::InvalidStatement,
            DbPluginError::Validation(_) => ErrorKind::Validation,
            DbPluginError::CredentialNotFound { .. } => ErrorKind::CredentialNotFound,
            DbPluginError::Aggregated(_) => ErrorKind::Aggregated,
            DbPluginError::Sanitized { kind, .. } => *kind,
        }
    }

    /// Check if retrying the same request might succeed.
    ///
    /// The backend never retries on its own; this is a hint for the host.
    pub fn is_transient(&self) -> bool {
        match self {
            DbPluginError::Client { source, .. } => source.is_transient(),
            DbPluginError::Aggregated(errors) => errors.iter().all(|e| e.is_transient()),
            DbPluginError::Sanitized { transient, .. } => *transient,
            _ => false,
        }
    }
}

fn format_aggregate(errors: &[DbPluginError]) -> String {
    let mut out = format!("{} error(s) occurred:", errors.len());
    for err in errors {
        out.push_str("\n\t* ");
        out.push_str(&err.to_string());
    }
    out
}
