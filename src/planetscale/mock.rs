//! planetscale::mock
//!
//! In-memory password API and client factory for deterministic testing.
//!
//! # Design
//!
//! [`MockPasswordApi`] stores password records in memory, records every
//! operation it receives and can be told to fail a specific operation.
//! [`MockClientFactory`] hands out clones of one mock and counts how many
//! clients were constructed.
//!
//! # Example
//!
//! ```
//! use planetscale_dbplugin::planetscale::mock::MockPasswordApi;
//! use planetscale_dbplugin::planetscale::{CreatePasswordRequest, PasswordApi};
//!
//! # tokio_test::block_on(async {
//! let api = MockPasswordApi::new();
//!
//! let record = api.create_password(CreatePasswordRequest {
//!     organization: "acme".to_string(),
//!     database: "db1".to_string(),
//!     branch: "main".to_string(),
//!     display_name: "v-alice".to_string(),
//!     role: "admin".to_string(),
//! }).await.unwrap();
//!
//! assert_eq!(record.id, "pw_1");
//! assert_eq!(api.password_count(), 1);
//! # });
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::factory::ClientFactory;
use super::traits::{
    ApiError, CreatePasswordRequest, DeletePasswordRequest, ListPasswordsRequest, PasswordApi,
    PasswordRecord,
};
use crate::config::ConnectionConfig;

/// Mock password API for testing.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping; clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockPasswordApi {
    inner: Arc<Mutex<MockApiInner>>,
}

#[derive(Debug, Default)]
struct MockApiInner {
    /// Stored passwords in creation order.
    passwords: Vec<PasswordRecord>,
    /// Next identifier suffix to assign.
    next_id: u64,
    /// Operation to fail on (for testing error paths).
    fail_on: Option<FailOn>,
    /// Recorded operations for verification.
    operations: Vec<MockOperation>,
}

/// Configuration for which operation should fail.
#[derive(Debug, Clone)]
pub enum FailOn {
    CreatePassword(ApiError),
    ListPasswords(ApiError),
    DeletePassword(ApiError),
}

/// Recorded operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockOperation {
    CreatePassword(CreatePasswordRequest),
    ListPasswords(ListPasswordsRequest),
    DeletePassword(DeletePasswordRequest),
}

impl MockPasswordApi {
    /// Create a new empty mock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock with pre-existing passwords, listed in the given order.
    pub fn with_passwords(passwords: Vec<PasswordRecord>) -> Self {
        let mock = Self::new();
        mock.lock().passwords = passwords;
        mock
    }

    /// Configure the mock to fail on a specific operation.
    ///
    /// # Example
    ///
    /// ```
    /// use planetscale_dbplugin::planetscale::mock::{FailOn, MockPasswordApi};
    /// use planetscale_dbplugin::planetscale::ApiError;
    ///
    /// let api = MockPasswordApi::new()
    ///     .fail_on(FailOn::CreatePassword(ApiError::RateLimited));
    /// ```
    pub fn fail_on(self, fail_on: FailOn) -> Self {
        self.lock().fail_on = Some(fail_on);
        self
    }

    /// Clear the failure configuration.
    pub fn clear_fail_on(&self) {
        self.lock().fail_on = None;
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockOperation> {
        self.lock().operations.clone()
    }

    /// Recorded create calls only.
    pub fn created(&self) -> Vec<CreatePasswordRequest> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::CreatePassword(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    /// Recorded delete calls only.
    pub fn deleted(&self) -> Vec<DeletePasswordRequest> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                MockOperation::DeletePassword(req) => Some(req),
                _ => None,
            })
            .collect()
    }

    /// Get all stored passwords.
    pub fn passwords(&self) -> Vec<PasswordRecord> {
        self.lock().passwords.clone()
    }

    /// Get the count of stored passwords.
    pub fn password_count(&self) -> usize {
        self.lock().passwords.len()
    }

    fn lock(&self) -> MutexGuard<'_, MockApiInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, op: MockOperation) {
        self.lock().operations.push(op);
    }

    fn check_fail(&self, expected: &str) -> Option<ApiError> {
        match &self.lock().fail_on {
            Some(FailOn::CreatePassword(e)) if expected == "create_password" => Some(e.clone()),
            Some(FailOn::ListPasswords(e)) if expected == "list_passwords" => Some(e.clone()),
            Some(FailOn::DeletePassword(e)) if expected == "delete_password" => Some(e.clone()),
            _ => None,
        }
    }
}

#[async_trait]
impl PasswordApi for MockPasswordApi {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_password(
        &self,
        request: CreatePasswordRequest,
    ) -> Result<PasswordRecord, ApiError> {
        self.record(MockOperation::CreatePassword(request.clone()));

        if let Some(err) = self.check_fail("create_password") {
            return Err(err);
        }

        let mut inner = self.lock();
        inner.next_id += 1;
        let record = PasswordRecord {
            id: format!("pw_{}", inner.next_id),
            display_name: request.display_name,
            branch: request.branch,
            role: request.role,
        };
        inner.passwords.push(record.clone());
        Ok(record)
    }

    async fn list_passwords(
        &self,
        request: ListPasswordsRequest,
    ) -> Result<Vec<PasswordRecord>, ApiError> {
        self.record(MockOperation::ListPasswords(request));

        if let Some(err) = self.check_fail("list_passwords") {
            return Err(err);
        }

        Ok(self.passwords())
    }

    async fn delete_password(&self, request: DeletePasswordRequest) -> Result<(), ApiError> {
        self.record(MockOperation::DeletePassword(request.clone()));

        if let Some(err) = self.check_fail("delete_password") {
            return Err(err);
        }

        let mut inner = self.lock();
        let before = inner.passwords.len();
        inner.passwords.retain(|p| p.id != request.id);
        if inner.passwords.len() == before {
            return Err(ApiError::NotFound(format!("password {}", request.id)));
        }
        Ok(())
    }
}

/// Client factory that hands out clones of one [`MockPasswordApi`].
#[derive(Debug, Clone, Default)]
pub struct MockClientFactory {
    api: MockPasswordApi,
    constructed: Arc<AtomicUsize>,
    fail_with: Option<ApiError>,
}

impl MockClientFactory {
    /// Create a factory serving the given mock.
    pub fn new(api: MockPasswordApi) -> Self {
        Self {
            api,
            constructed: Arc::new(AtomicUsize::new(0)),
            fail_with: None,
        }
    }

    /// Make every construction attempt fail.
    pub fn failing(error: ApiError) -> Self {
        Self {
            fail_with: Some(error),
            ..Self::default()
        }
    }

    /// The shared mock every constructed client points at.
    pub fn api(&self) -> &MockPasswordApi {
        &self.api
    }

    /// Number of clients successfully constructed so far.
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }
}

impl ClientFactory for MockClientFactory {
    fn create_client(&self, _config: &ConnectionConfig) -> Result<Arc<dyn PasswordApi>, ApiError> {
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }
        self.constructed.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.api.clone()))
    }
}
