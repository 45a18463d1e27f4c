//! planetscale-dbplugin - Dynamic database credentials for PlanetScale
//!
//! A credential backend for a secret-management host. The host delegates
//! four operations to it: initialize, issue a credential, update a
//! credential and revoke a credential. Credentials are PlanetScale branch
//! passwords, named by a configurable username template.
//!
//! # Architecture
//!
//! - [`database`] - The host-facing contract ([`Database`] trait and request types)
//! - [`backend`] - The PlanetScale credential lifecycle
//! - [`connection`] - Configuration state and the cached API client
//! - [`planetscale`] - Outbound password API (HTTP client, mock, client factory)
//! - [`username`] / [`template`] - Username generation
//! - [`redact`] - Secret redaction and the error-sanitizing boundary
//! - [`config`], [`context`], [`statement`], [`error`] - Supporting types
//!
//! # Example
//!
//! ```
//! use planetscale_dbplugin::config::ConnectionConfig;
//! use planetscale_dbplugin::planetscale::mock::{MockClientFactory, MockPasswordApi};
//! use planetscale_dbplugin::{
//!     Database, ErrorSanitizer, InitializeRequest, PlanetScale, RequestContext,
//! };
//!
//! let factory = MockClientFactory::new(MockPasswordApi::new());
//! let db = ErrorSanitizer::new(PlanetScale::with_factory(Box::new(factory)));
//!
//! tokio_test::block_on(async {
//!     let req = InitializeRequest {
//!         config: ConnectionConfig::new("acme", "db1", "pscale_tkn_abc", "vault"),
//!         verify_connection: false,
//!     };
//!     db.initialize(&RequestContext::background(), req).await.unwrap();
//! });
//! assert_eq!(db.type_name(), "planetscale");
//! ```

pub mod backend;
pub mod config;
pub mod connection;
pub mod context;
pub mod database;
pub mod error;
pub mod planetscale;
pub mod redact;
pub mod statement;
pub mod template;
pub mod username;

pub use backend::PlanetScale;
pub use context::RequestContext;
pub use database::{
    ChangeExpiration, ChangePassword, Database, DeleteUserRequest, DeleteUserResponse,
    InitializeRequest, InitializeResponse, NewUserRequest, NewUserResponse, Statements,
    UpdateUserRequest, UpdateUserResponse, UsernameMetadata,
};
pub use error::{DbPluginError, ErrorKind};
pub use redact::ErrorSanitizer;

/// Production backend wrapped in the error-sanitizing boundary.
pub fn new() -> ErrorSanitizer<PlanetScale> {
    ErrorSanitizer::new(PlanetScale::new())
}
