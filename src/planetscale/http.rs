//! planetscale::http
//!
//! PasswordApi implementation over the PlanetScale REST API.
//!
//! # Design
//!
//! All three operations live under the database's password collection:
//!
//! - `POST   /organizations/{org}/databases/{db}/branches/{branch}/passwords`
//! - `GET    /organizations/{org}/databases/{db}/passwords`
//! - `DELETE /organizations/{org}/databases/{db}/branches/{branch}/passwords/{id}`
//!
//! # Authentication
//!
//! PlanetScale service tokens are sent as `Authorization: <name>:<token>`.
//! The header is built once at construction and marked sensitive so it
//! never shows up in reqwest's debug output.
//!
//! # Rate Limiting
//!
//! A 429 maps to `ApiError::RateLimited`. Nothing is retried here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};

use super::traits::{
    ApiError, CreatePasswordRequest, DeletePasswordRequest, ListPasswordsRequest, PasswordApi,
    PasswordRecord,
};

/// User-Agent header value for API requests.
const USER_AGENT_VALUE: &str = "planetscale-dbplugin";

/// Per-request timeout applied by the HTTP client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// PlanetScale API client.
pub struct PlanetScaleClient {
    /// HTTP client with the auth header preinstalled
    client: Client,
    /// API base URL; may carry credentials substituted from `connection_url`
    api_base: Url,
}

impl std::fmt::Debug for PlanetScaleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanetScaleClient")
            .field("host", &self.api_base.host_str().unwrap_or_default())
            .finish_non_exhaustive()
    }
}

impl PlanetScaleClient {
    /// Create a client authenticated with a service token.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Construction` if the token cannot be used as a
    /// header value or the HTTP client cannot be built.
    pub fn new(
        token_name: &str,
        service_token: &str,
        api_base: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let mut auth = HeaderValue::from_str(&format!("{}:{}", token_name, service_token))
            .map_err(|_| {
                ApiError::Construction("service token contains invalid characters".into())
            })?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Construction(e.to_string()))?;

        let api_base = Url::parse(&api_base.into())
            .map_err(|e| ApiError::Construction(format!("invalid api base: {}", e)))?;
        if api_base.cannot_be_a_base() {
            return Err(ApiError::Construction("api base cannot carry a path".into()));
        }

        Ok(Self { client, api_base })
    }

    /// Get the API base URL, without trailing slash.
    pub fn api_base(&self) -> &str {
        self.api_base.as_str().trim_end_matches('/')
    }

    /// Build URL for a database endpoint.
    ///
    /// Every value becomes exactly one path segment, percent-escaped, so a
    /// branch or id containing `/` cannot leave the configured database.
    fn database_url(
        &self,
        organization: &str,
        database: &str,
        rest: &[&str],
    ) -> Result<Url, ApiError> {
        let head = ["organizations", organization, "databases", database];
        let segments: Vec<&str> = head.iter().chain(rest).copied().collect();
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(ApiError::InvalidRequest(format!(
                "invalid path segment {:?}",
                bad
            )));
        }

        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Construction("api base cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Handle API response, mapping errors appropriately.
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: Response,
    ) -> Result<T, ApiError> {
        let status = response.status();

        if status.is_success() {
            response.json().await.map_err(|e| ApiError::Api {
                status: status.as_u16(),
                message: format!("Failed to parse response: {}", e),
            })
        } else {
            Err(Self::error_from_response(response, status).await)
        }
    }

    /// Map a non-success response to an `ApiError`.
    async fn error_from_response(response: Response, status: StatusCode) -> ApiError {
        let message = match response.json::<PlanetScaleErrorResponse>().await {
            Ok(err) => err.message,
            Err(_) => "Unknown error".to_string(),
        };

        match status {
            StatusCode::UNAUTHORIZED => ApiError::AuthFailed("Invalid service token".into()),
            StatusCode::FORBIDDEN => ApiError::AuthFailed(format!("Permission denied: {}", message)),
            StatusCode::NOT_FOUND => ApiError::NotFound(message),
            StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
            _ if status.is_server_error() => ApiError::Api {
                status: status.as_u16(),
                message: format!("PlanetScale server error: {}", message),
            },
            _ => ApiError::Api {
                status: status.as_u16(),
                message,
            },
        }
    }
}

fn network_error(e: reqwest::Error) -> ApiError {
    // Strip the URL; it can carry substituted connection_url credentials.
    ApiError::Network(e.without_url().to_string())
}

#[async_trait]
impl PasswordApi for PlanetScaleClient {
    fn name(&self) -> &'static str {
        "planetscale"
    }

    async fn create_password(
        &self,
        request: CreatePasswordRequest,
    ) -> Result<PasswordRecord, ApiError> {
        let url = self.database_url(
            &request.organization,
            &request.database,
            &["branches", &request.branch, "passwords"],
        )?;

        let body = CreatePasswordBody {
            name: &request.display_name,
            role: &request.role,
        };

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(network_error)?;

        let password: ApiPassword = self.handle_response(response).await?;
        Ok(password.into())
    }

    async fn list_passwords(
        &self,
        request: ListPasswordsRequest,
    ) -> Result<Vec<PasswordRecord>, ApiError> {
        let url = self.database_url(&request.organization, &request.database, &["passwords"])?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(network_error)?;

        let page: PasswordList = self.handle_response(response).await?;
        Ok(page.data.into_iter().map(Into::into).collect())
    }

    async fn delete_password(&self, request: DeletePasswordRequest) -> Result<(), ApiError> {
        let url = self.database_url(
            &request.organization,
            &request.database,
            &["branches", &request.branch, "passwords", &request.id],
        )?;

        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(network_error)?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Self::error_from_response(response, status).await)
        }
    }
}

// =============================================================================
// API Request/Response Types
// =============================================================================

#[derive(Serialize)]
struct CreatePasswordBody<'a> {
    name: &'a str,
    role: &'a str,
}

#[derive(Deserialize)]
struct PasswordList {
    #[serde(default)]
    data: Vec<ApiPassword>,
}

// The create response also carries `plain_text`, which is never read.
#[derive(Deserialize)]
struct ApiPassword {
    id: String,
    name: String,
    #[serde(default)]
    role: String,
    database_branch: ApiBranch,
}

#[derive(Deserialize)]
struct ApiBranch {
    name: String,
}

#[derive(Deserialize)]
struct PlanetScaleErrorResponse {
    message: String,
}

impl From<ApiPassword> for PasswordRecord {
    fn from(p: ApiPassword) -> Self {
        PasswordRecord {
            id: p.id,
            display_name: p.name,
            branch: p.database_branch.name,
            role: p.role,
        }
    }
}
