//! planetscale::traits
//!
//! Password API trait and its request/response types.
//!
//! # Design
//!
//! The `PasswordApi` trait is async because every operation is network I/O.
//! It covers exactly the three calls the credential lifecycle needs: create,
//! list and delete branch passwords. Implementations never retry; the first
//! failure is surfaced to the caller.
//!
//! # Example
//!
//! ```ignore
//! use planetscale_dbplugin::planetscale::{CreatePasswordRequest, PasswordApi};
//!
//! async fn issue(api: &dyn PasswordApi) -> Result<(), ApiError> {
//!     let record = api.create_password(CreatePasswordRequest {
//!         organization: "acme".to_string(),
//!         database: "db1".to_string(),
//!         branch: "main".to_string(),
//!         display_name: "v-alice".to_string(),
//!         role: "reader".to_string(),
//!     }).await?;
//!     println!("created {} on {}", record.id, record.branch);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use thiserror::Error;

/// Errors from PlanetScale API operations.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// The service token was rejected or lacks permission.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// The organization, database, branch or password does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Rate limit exceeded.
    #[error("rate limited")]
    RateLimited,

    /// API returned an error.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Error message from the API
        message: String,
    },

    /// Network or connection error.
    #[error("network error: {0}")]
    Network(String),

    /// The caller's deadline passed before the call completed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// A request value cannot be expressed as a path segment.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The client could not be constructed from the configuration.
    #[error("failed to create planetscale client: {0}")]
    Construction(String),
}

impl ApiError {
    /// Check if this error indicates a transient failure that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::RateLimited | ApiError::Network(_) | ApiError::DeadlineExceeded => true,
            ApiError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Request to create a branch password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatePasswordRequest {
    pub organization: String,
    pub database: String,
    pub branch: String,
    /// Display name of the password (the generated username)
    pub display_name: String,
    /// Database role granted to the password
    pub role: String,
}

/// Request to list every password of a database, across branches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListPasswordsRequest {
    pub organization: String,
    pub database: String,
}

/// Request to delete a branch password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletePasswordRequest {
    pub organization: String,
    pub database: String,
    pub branch: String,
    pub display_name: String,
    /// Platform-assigned password identifier
    pub id: String,
}

/// A branch password as known to the platform.
///
/// The plain-text secret is never part of this record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRecord {
    /// Platform-assigned identifier
    pub id: String,
    /// Display name
    pub display_name: String,
    /// Branch the password is scoped to
    pub branch: String,
    /// Role granted to the password
    pub role: String,
}

/// Branch password operations on the PlanetScale API.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one cached client serves every
/// concurrent request of the backend.
#[async_trait]
pub trait PasswordApi: Send + Sync {
    /// Get the client name (e.g., "planetscale", "mock").
    fn name(&self) -> &'static str;

    /// Create a password on a branch.
    ///
    /// # Errors
    ///
    /// - `AuthFailed` if the service token is invalid
    /// - `NotFound` if the organization, database or branch does not exist
    /// - `Api` with status 422 if the role is not accepted
    async fn create_password(
        &self,
        request: CreatePasswordRequest,
    ) -> Result<PasswordRecord, ApiError>;

    /// List every password of a database, in the order returned by the API.
    async fn list_passwords(
        &self,
        request: ListPasswordsRequest,
    ) -> Result<Vec<PasswordRecord>, ApiError>;

    /// Delete a password.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the password was already deleted
    async fn delete_password(&self, request: DeletePasswordRequest) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display() {
        assert_eq!(
            format!("{}", ApiError::AuthFailed("bad token".into())),
            "authentication failed: bad token"
        );
        assert_eq!(
            format!("{}", ApiError::NotFound("branch dev".into())),
            "not found: branch dev"
        );
        assert_eq!(format!("{}", ApiError::RateLimited), "rate limited");
        assert_eq!(
            format!(
                "{}",
                ApiError::Api {
                    status: 422,
                    message: "invalid role".into()
                }
            ),
            "API error: 422 - invalid role"
        );
        assert_eq!(
            format!("{}", ApiError::Network("connection refused".into())),
            "network error: connection refused"
        );
        assert_eq!(format!("{}", ApiError::DeadlineExceeded), "deadline exceeded");
    }

    #[test]
    fn transient_classification() {
        assert!(ApiError::RateLimited.is_transient());
        assert!(ApiError::Network("reset".into()).is_transient());
        assert!(ApiError::DeadlineExceeded.is_transient());
        assert!(ApiError::Api {
            status: 503,
            message: "unavailable".into()
        }
        .is_transient());

        assert!(!ApiError::AuthFailed("nope".into()).is_transient());
        assert!(!ApiError::NotFound("x".into()).is_transient());
        assert!(!ApiError::Api {
            status: 422,
            message: "invalid".into()
        }
        .is_transient());
    }
}
