//! redact
//!
//! Secret redaction and the error-sanitizing boundary.
//!
//! # Design
//!
//! A backend reports its live sensitive values as a map from raw value to
//! placeholder ([`SecretSource`]). [`ErrorSanitizer`] wraps a whole backend:
//! every error an operation returns is rendered to text, scrubbed with that
//! map, and handed back as [`DbPluginError::Sanitized`]. The original
//! [`ErrorKind`](crate::ErrorKind) and retry hint are preserved.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use planetscale_dbplugin::redact::{redact, SERVICE_TOKEN_PLACEHOLDER};
//!
//! let secrets = HashMap::from([("pscale_tkn_abc".to_string(), SERVICE_TOKEN_PLACEHOLDER.to_string())]);
//! let text = redact("401 for token pscale_tkn_abc", &secrets);
//! assert_eq!(text, "401 for token [ServiceToken]");
//! ```

use std::collections::HashMap;

use async_trait::async_trait;

use crate::config::ConnectionConfig;
use crate::context::RequestContext;
use crate::database::{
    Database, DeleteUserRequest, DeleteUserResponse, InitializeRequest, InitializeResponse,
    NewUserRequest, NewUserResponse, UpdateUserRequest, UpdateUserResponse,
};
use crate::error::DbPluginError;

/// Placeholder substituted for the service token in outbound error text.
pub const SERVICE_TOKEN_PLACEHOLDER: &str = "[ServiceToken]";

/// Placeholder substituted for the configured password in outbound error text.
pub const PASSWORD_PLACEHOLDER: &str = "[password]";

/// Sensitive values of a configuration mapped to their placeholders.
///
/// Empty values are never included.
pub fn secret_values(config: &ConnectionConfig) -> HashMap<String, String> {
    let mut secrets = HashMap::new();
    if !config.service_token.is_empty() {
        secrets.insert(
            config.service_token.clone(),
            SERVICE_TOKEN_PLACEHOLDER.to_string(),
        );
    }
    if let Some(password) = config.password.as_ref().filter(|p| !p.is_empty()) {
        secrets.insert(password.clone(), PASSWORD_PLACEHOLDER.to_string());
    }
    secrets
}

/// Replace every occurrence of each secret in `text` with its placeholder.
///
/// Longer secrets are replaced first so a secret that contains another is
/// not split apart.
pub fn redact(text: &str, secrets: &HashMap<String, String>) -> String {
    let mut ordered: Vec<(&String, &String)> =
        secrets.iter().filter(|(raw, _)| !raw.is_empty()).collect();
    ordered.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = text.to_string();
    for (raw, placeholder) in ordered {
        out = out.replace(raw.as_str(), placeholder);
    }
    out
}

/// Something that knows which values must never leave the process.
pub trait SecretSource {
    /// Map of live secret values to their placeholders.
    fn secret_values(&self) -> HashMap<String, String>;
}

/// Middleware that scrubs secrets from every error of the wrapped backend.
#[derive(Debug)]
pub struct ErrorSanitizer<D> {
    inner: D,
}

impl<D> ErrorSanitizer<D>
where
    D: Database + SecretSource,
{
    pub fn new(inner: D) -> Self {
        Self { inner }
    }

    /// The wrapped backend.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    fn sanitize(&self, err: DbPluginError, extra: Option<&HashMap<String, String>>) -> DbPluginError {
        let mut secrets = self.inner.secret_values();
        if let Some(extra) = extra {
            secrets.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        DbPluginError::Sanitized {
            kind: err.kind(),
            message: redact(&err.to_string(), &secrets),
            transient: err.is_transient(),
        }
    }
}

#[async_trait]
impl<D> Database for ErrorSanitizer<D>
where
    D: Database + SecretSource,
{
    async fn initialize(
        &self,
        ctx: &RequestContext,
        req: InitializeRequest,
    ) -> Result<InitializeResponse, DbPluginError> {
        // A rejected config is never stored, so its secrets are captured up front.
        let incoming = secret_values(&req.config);
        self.inner
            .initialize(ctx, req)
            .await
            .map_err(|e| self.sanitize(e, Some(&incoming)))
    }

    async fn new_user(
        &self,
        ctx: &RequestContext,
        req: NewUserRequest,
    ) -> Result<NewUserResponse, DbPluginError> {
        self.inner
            .new_user(ctx, req)
            .await
            .map_err(|e| self.sanitize(e, None))
    }

    async fn update_user(
        &self,
        ctx: &RequestContext,
        req: UpdateUserRequest,
    ) -> Result<UpdateUserResponse, DbPluginError> {
        let new_password = req
            .password
            .as_ref()
            .map(|p| p.new_password.clone())
            .filter(|p| !p.is_empty());
        self.inner.update_user(ctx, req).await.map_err(|e| {
            let extra = new_password
                .map(|p| HashMap::from([(p, PASSWORD_PLACEHOLDER.to_string())]));
            self.sanitize(e, extra.as_ref())
        })
    }

    async fn delete_user(
        &self,
        ctx: &RequestContext,
        req: DeleteUserRequest,
    ) -> Result<DeleteUserResponse, DbPluginError> {
        self.inner
            .delete_user(ctx, req)
            .await
            .map_err(|e| self.sanitize(e, None))
    }

    fn type_name(&self) -> &'static str {
        self.inner.type_name()
    }

    async fn close(&self) -> Result<(), DbPluginError> {
        self.inner.close().await.map_err(|e| self.sanitize(e, None))
    }
}
