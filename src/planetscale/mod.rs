//! planetscale
//!
//! Access to the PlanetScale branch password API.
//!
//! # Modules
//!
//! - `traits`: `PasswordApi` trait and request/response types
//! - [`http`]: REST implementation
//! - [`mock`]: In-memory implementation for deterministic testing
//! - `factory`: Client construction seam used by the connection producer
//!
//! # Example
//!
//! ```ignore
//! use planetscale_dbplugin::planetscale::{ClientFactory, HttpClientFactory, ListPasswordsRequest};
//!
//! let client = HttpClientFactory.create_client(&config)?;
//! let passwords = client.list_passwords(ListPasswordsRequest {
//!     organization: "acme".to_string(),
//!     database: "db1".to_string(),
//! }).await?;
//! ```

mod factory;
pub mod http;
pub mod mock;
mod traits;

pub use factory::{ClientFactory, HttpClientFactory};
pub use traits::*;
