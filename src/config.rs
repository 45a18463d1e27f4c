//! config
//!
//! Typed connection configuration.
//!
//! # Overview
//!
//! The host hands the backend a configuration map. Decoding that map is the
//! host's business; the backend works on [`ConnectionConfig`], a typed view
//! that still carries the raw map so it can be returned unchanged from
//! initialize.
//!
//! Required keys: `organization`, `database`, `service_token`, `token_name`.
//! Optional keys: `username_template`, `connection_url`, `username`,
//! `password`.
//!
//! # Example
//!
//! ```
//! use planetscale_dbplugin::config::ConnectionConfig;
//!
//! let config = ConnectionConfig::new("acme", "db1", "pscale_tkn_abc", "vault");
//! assert!(config.validate().is_ok());
//! assert_eq!(config.api_base().unwrap(), "https://api.planetscale.com/v1");
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::DbPluginError;

/// Default PlanetScale API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.planetscale.com/v1";

/// Username template used when the configuration does not provide one.
///
/// Renders as `v-<display8>-<role8>-<random20>-<unix>` capped at 63 characters.
pub const DEFAULT_USERNAME_TEMPLATE: &str = r#"{{ printf "v-%s-%s-%s-%s" (.DisplayName | truncate 8) (.RoleName | truncate 8) (random 20 | lowercase) (unix_time) | truncate 63 }}"#;

/// Connection configuration for the PlanetScale API.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Organization that owns the database
    pub organization: String,
    /// Database whose branches receive credentials
    pub database: String,
    /// Service token value
    pub service_token: String,
    /// Service token name (identifier)
    pub token_name: String,
    /// Username template override
    pub username_template: Option<String>,
    /// API base URL override; may contain `{{username}}` / `{{password}}`
    pub connection_url: Option<String>,
    /// Value substituted for `{{username}}` in `connection_url`
    pub username: Option<String>,
    /// Value substituted for `{{password}}` in `connection_url`
    pub password: Option<String>,
    /// Configuration map as received from the host
    #[serde(skip)]
    pub raw: Map<String, Value>,
}

// Custom Debug to avoid exposing the service token and password
impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("organization", &self.organization)
            .field("database", &self.database)
            .field("service_token", &"[REDACTED]")
            .field("token_name", &self.token_name)
            .field("username_template", &self.username_template)
            .field("connection_url", &self.connection_url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl ConnectionConfig {
    /// Build a configuration from the four required fields.
    ///
    /// The raw map is populated with the same values.
    pub fn new(
        organization: impl Into<String>,
        database: impl Into<String>,
        service_token: impl Into<String>,
        token_name: impl Into<String>,
    ) -> Self {
        let organization = organization.into();
        let database = database.into();
        let service_token = service_token.into();
        let token_name = token_name.into();

        let mut raw = Map::new();
        raw.insert("organization".into(), Value::String(organization.clone()));
        raw.insert("database".into(), Value::String(database.clone()));
        raw.insert("service_token".into(), Value::String(service_token.clone()));
        raw.insert("token_name".into(), Value::String(token_name.clone()));

        Self {
            organization,
            database,
            service_token,
            token_name,
            raw,
            ..Self::default()
        }
    }

    /// Set a username template, recording it in the raw map too.
    pub fn with_username_template(mut self, template: impl Into<String>) -> Self {
        let template = template.into();
        self.raw
            .insert("username_template".into(), Value::String(template.clone()));
        self.username_template = Some(template);
        self
    }

    /// Set an API base URL override, recording it in the raw map too.
    pub fn with_connection_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.raw
            .insert("connection_url".into(), Value::String(url.clone()));
        self.connection_url = Some(url);
        self
    }

    /// Decode a raw configuration map.
    ///
    /// Unknown keys are ignored and missing keys default to empty. No
    /// validation happens here; see [`validate`](Self::validate).
    pub fn from_map(raw: Map<String, Value>) -> Result<Self, serde_json::Error> {
        let mut config: ConnectionConfig = serde_json::from_value(Value::Object(raw.clone()))?;
        config.raw = raw;
        Ok(config)
    }

    /// Check that every required field is present.
    ///
    /// Reports the first empty field in declaration order. A configured
    /// `connection_url` must also resolve to a parseable URL.
    pub fn validate(&self) -> Result<(), DbPluginError> {
        let required = [
            ("organization", &self.organization),
            ("database", &self.database),
            ("service_token", &self.service_token),
            ("token_name", &self.token_name),
        ];
        for (field, value) in required {
            if value.is_empty() {
                return Err(DbPluginError::ConfigValidation { field });
            }
        }
        if self.connection_url.is_some() {
            self.api_base()?;
        }
        Ok(())
    }

    /// The configured username template, or [`DEFAULT_USERNAME_TEMPLATE`].
    ///
    /// An empty string counts as absent.
    pub fn username_template_or_default(&self) -> &str {
        match self.username_template.as_deref() {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_USERNAME_TEMPLATE,
        }
    }

    /// Resolve the API base URL.
    ///
    /// Substitutes `{{username}}` (percent-escaped) and `{{password}}`
    /// (verbatim) when `connection_url` is set, and strips a trailing slash.
    pub fn api_base(&self) -> Result<String, DbPluginError> {
        let base = match &self.connection_url {
            None => return Ok(DEFAULT_API_BASE.to_string()),
            Some(url) => url
                .replace(
                    "{{username}}",
                    &urlencoding::encode(self.username.as_deref().unwrap_or_default()),
                )
                .replace("{{password}}", self.password.as_deref().unwrap_or_default()),
        };

        reqwest::Url::parse(&base).map_err(|_| DbPluginError::ConfigValidation {
            field: "connection_url",
        })?;

        Ok(base.trim_end_matches('/').to_string())
    }
}
