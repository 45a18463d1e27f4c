//! planetscale::factory
//!
//! Client construction.
//!
//! The connection producer never names a concrete client type. It asks a
//! [`ClientFactory`] for one, which keeps the HTTP client swappable for the
//! mock in tests.

use std::sync::Arc;

use super::http::PlanetScaleClient;
use super::traits::{ApiError, PasswordApi};
use crate::config::ConnectionConfig;

/// Builds password API clients from a validated configuration.
pub trait ClientFactory: Send + Sync {
    /// Construct a new client.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Construction` if the configuration cannot produce
    /// a working client.
    fn create_client(&self, config: &ConnectionConfig) -> Result<Arc<dyn PasswordApi>, ApiError>;
}

/// Factory producing [`PlanetScaleClient`]s authenticated with the
/// configured service token.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpClientFactory;

impl ClientFactory for HttpClientFactory {
    fn create_client(&self, config: &ConnectionConfig) -> Result<Arc<dyn PasswordApi>, ApiError> {
        let api_base = config
            .api_base()
            .map_err(|e| ApiError::Construction(e.to_string()))?;
        let client = PlanetScaleClient::new(&config.token_name, &config.service_token, api_base)?;
        Ok(Arc::new(client))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_factory_builds_client() {
        let config = ConnectionConfig::new("acme", "db1", "tok", "name");
        let client = HttpClientFactory.create_client(&config).unwrap();
        assert_eq!(client.name(), "planetscale");
    }

    #[test]
    fn http_factory_reports_bad_url() {
        let config = ConnectionConfig::new("acme", "db1", "tok", "name").with_connection_url("::");
        let err = HttpClientFactory.create_client(&config).err().expect("expected error");
        assert!(matches!(err, ApiError::Construction(_)));
    }
}
