//! database
//!
//! The contract between the secret-management host and a credential backend.
//!
//! # Design
//!
//! The host drives a backend through the [`Database`] trait: one
//! `initialize`, then any number of concurrent `new_user`, `update_user` and
//! `delete_user` calls. Backends are interchangeable behind this trait; the
//! error-sanitizing middleware implements it too and wraps any other
//! implementation.
//!
//! Every operation takes a [`RequestContext`] so the host's deadline reaches
//! outbound calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::config::ConnectionConfig;
use crate::context::RequestContext;
use crate::error::DbPluginError;

/// Request to initialize a backend.
#[derive(Debug, Clone)]
pub struct InitializeRequest {
    /// Typed connection configuration
    pub config: ConnectionConfig,
    /// Issue one read call against the platform before accepting the config
    pub verify_connection: bool,
}

/// Response from a successful initialize.
#[derive(Debug, Clone, Default)]
pub struct InitializeResponse {
    /// Configuration the host should persist
    pub config: Map<String, Value>,
}

/// Backend-specific creation statements.
#[derive(Debug, Clone, Default)]
pub struct Statements {
    pub commands: Vec<String>,
}

/// Metadata the host supplies for username generation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsernameMetadata {
    /// Display name of the requesting identity
    pub display_name: String,
    /// Name of the host-side role being issued
    pub role_name: String,
}

/// Request to issue a new credential.
#[derive(Debug, Clone, Default)]
pub struct NewUserRequest {
    pub username_config: UsernameMetadata,
    pub statements: Statements,
}

/// Response carrying the issued credential's username.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewUserResponse {
    pub username: String,
}

/// Requested password change.
#[derive(Clone)]
pub struct ChangePassword {
    pub new_password: String,
    pub statements: Statements,
}

// Custom Debug to avoid exposing the new password
impl std::fmt::Debug for ChangePassword {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangePassword")
            .field("new_password", &"[REDACTED]")
            .field("statements", &self.statements)
            .finish()
    }
}

/// Requested expiration change.
#[derive(Debug, Clone)]
pub struct ChangeExpiration {
    pub new_expiration: DateTime<Utc>,
    pub statements: Statements,
}

/// Request to change an existing credential.
#[derive(Debug, Clone, Default)]
pub struct UpdateUserRequest {
    pub username: String,
    pub password: Option<ChangePassword>,
    pub expiration: Option<ChangeExpiration>,
}

/// Acknowledgement of an update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateUserResponse {}

/// Request to revoke a credential.
#[derive(Debug, Clone, Default)]
pub struct DeleteUserRequest {
    pub username: String,
    pub statements: Statements,
}

/// Acknowledgement of a revocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteUserResponse {}

/// A credential backend as seen by the host.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the host invokes operations
/// concurrently on one shared instance.
#[async_trait]
pub trait Database: Send + Sync {
    /// Validate and store configuration and prepare the backend for use.
    ///
    /// # Errors
    ///
    /// - `ConfigValidation` if a required field is empty
    /// - `Template` if the username template is invalid
    /// - `Client` if the platform client cannot be built or verified
    async fn initialize(
        &self,
        ctx: &RequestContext,
        req: InitializeRequest,
    ) -> Result<InitializeResponse, DbPluginError>;

    /// Issue a new credential.
    ///
    /// # Errors
    ///
    /// - `EmptyStatement` if no creation statement was supplied
    /// - `NotInitialized` before a successful initialize
    /// - `Client` if the platform call fails
    async fn new_user(
        &self,
        ctx: &RequestContext,
        req: NewUserRequest,
    ) -> Result<NewUserResponse, DbPluginError>;

    /// Change an existing credential's password and/or expiration.
    ///
    /// # Errors
    ///
    /// - `Validation` if the username is empty or nothing was requested
    /// - `Aggregated` if any requested change fails
    async fn update_user(
        &self,
        ctx: &RequestContext,
        req: UpdateUserRequest,
    ) -> Result<UpdateUserResponse, DbPluginError>;

    /// Revoke a credential.
    ///
    /// # Errors
    ///
    /// - `CredentialNotFound` if no credential has the given username
    /// - `Client` if listing or deletion fails
    async fn delete_user(
        &self,
        ctx: &RequestContext,
        req: DeleteUserRequest,
    ) -> Result<DeleteUserResponse, DbPluginError>;

    /// Backend type identifier.
    fn type_name(&self) -> &'static str;

    /// Release the cached platform client. Idempotent.
    async fn close(&self) -> Result<(), DbPluginError>;
}
