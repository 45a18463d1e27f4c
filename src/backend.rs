//! backend
//!
//! The PlanetScale credential lifecycle.
//!
//! # Lifecycle
//!
//! A [`PlanetScale`] backend starts uninitialized. `initialize` validates the
//! configuration, compiles the username template, builds a client and
//! optionally verifies it with one list call. Only when all of that succeeds
//! are the new client, configuration and template installed together; a
//! failed `initialize` leaves the previous state in place. Every other
//! operation fails with `NotInitialized` until one has succeeded.
//!
//! Issued credentials are branch passwords. The backend stores none of them:
//! revocation lists the database's passwords and matches on display name.
//!
//! # Locking
//!
//! The producer lock covers client get-or-create and nothing else. Outbound
//! calls run on a cloned client handle, so issuance and revocation proceed
//! concurrently.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::connection::{Connection, ConnectionProducer};
use crate::context::RequestContext;
use crate::database::{
    ChangeExpiration, ChangePassword, Database, DeleteUserRequest, DeleteUserResponse,
    InitializeRequest, InitializeResponse, NewUserRequest, NewUserResponse, UpdateUserRequest,
    UpdateUserResponse,
};
use crate::error::DbPluginError;
use crate::planetscale::{
    ClientFactory, CreatePasswordRequest, DeletePasswordRequest, ListPasswordsRequest,
};
use crate::redact::SecretSource;
use crate::statement::CreationStatement;
use crate::username::UsernameGenerator;

/// Backend type identifier reported to the host.
pub const TYPE_NAME: &str = "planetscale";

/// Credential backend issuing PlanetScale branch passwords.
pub struct PlanetScale {
    producer: ConnectionProducer,
    usernames: RwLock<Option<Arc<UsernameGenerator>>>,
}

impl Default for PlanetScale {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PlanetScale {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanetScale")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl PlanetScale {
    /// Backend talking to the PlanetScale REST API.
    pub fn new() -> Self {
        Self::with_producer(ConnectionProducer::default())
    }

    /// Backend building its clients with `factory`.
    pub fn with_factory(factory: Box<dyn ClientFactory>) -> Self {
        Self::with_producer(ConnectionProducer::new(factory))
    }

    fn with_producer(producer: ConnectionProducer) -> Self {
        Self {
            producer,
            usernames: RwLock::new(None),
        }
    }

    /// The connection producer owning the cached client.
    pub fn producer(&self) -> &ConnectionProducer {
        &self.producer
    }

    /// Whether a previous `initialize` fully succeeded.
    pub fn is_initialized(&self) -> bool {
        self.generator().is_some() && self.producer.is_initialized()
    }

    fn generator(&self) -> Option<Arc<UsernameGenerator>> {
        self.usernames
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn require_initialized(&self) -> Result<Arc<UsernameGenerator>, DbPluginError> {
        match self.generator() {
            Some(generator) if self.producer.is_initialized() => Ok(generator),
            _ => Err(DbPluginError::NotInitialized),
        }
    }

    /// Generator and connection from the same initialize.
    fn session(&self) -> Result<(Arc<UsernameGenerator>, Connection), DbPluginError> {
        let usernames = self.usernames.read().unwrap_or_else(|e| e.into_inner());
        let generator = usernames.clone().ok_or(DbPluginError::NotInitialized)?;
        let conn = self.producer.connection()?;
        Ok((generator, conn))
    }

    async fn change_user_password(
        &self,
        username: &str,
        _change: &ChangePassword,
    ) -> Result<(), DbPluginError> {
        // Branch passwords cannot be changed in place.
        debug!(username, "password change requested; nothing to do");
        Ok(())
    }

    async fn change_user_expiration(
        &self,
        username: &str,
        change: &ChangeExpiration,
    ) -> Result<(), DbPluginError> {
        debug!(
            username,
            expiration = %change.new_expiration,
            "expiration change requested; nothing to do"
        );
        Ok(())
    }
}

impl SecretSource for PlanetScale {
    fn secret_values(&self) -> HashMap<String, String> {
        self.producer.secret_values()
    }
}

#[async_trait]
impl Database for PlanetScale {
    async fn initialize(
        &self,
        ctx: &RequestContext,
        req: InitializeRequest,
    ) -> Result<InitializeResponse, DbPluginError> {
        let InitializeRequest {
            config,
            verify_connection,
        } = req;

        config.validate()?;
        let generator = UsernameGenerator::new(config.username_template_or_default())?;

        let organization = config.organization.clone();
        let database = config.database.clone();
        let prepared = self.producer.prepare(config)?;

        if verify_connection {
            ctx.run(prepared.client().list_passwords(ListPasswordsRequest {
                organization: organization.clone(),
                database: database.clone(),
            }))
            .await
            .map_err(|e| DbPluginError::client("failed to verify connection", e))?;
        }

        // Readers hold the generator lock while reading the producer, so
        // committing under its write lock publishes both together.
        let raw = {
            let mut usernames = self.usernames.write().unwrap_or_else(|e| e.into_inner());
            let raw = self.producer.commit(prepared);
            *usernames = Some(Arc::new(generator));
            raw
        };

        info!(
            %organization,
            %database,
            verified = verify_connection,
            "initialized planetscale backend"
        );
        Ok(InitializeResponse { config: raw })
    }

    async fn new_user(
        &self,
        ctx: &RequestContext,
        req: NewUserRequest,
    ) -> Result<NewUserResponse, DbPluginError> {
        if req.statements.commands.is_empty() {
            return Err(DbPluginError::EmptyStatement);
        }
        let (generator, conn) = self.session()?;

        let statement = CreationStatement::from_commands(&req.statements.commands)?;
        let username = generator.generate(&req.username_config)?;

        let record = ctx
            .run(conn.client.create_password(CreatePasswordRequest {
                organization: conn.organization.clone(),
                database: conn.database.clone(),
                branch: statement.branch.clone(),
                display_name: username.clone(),
                role: statement.role.clone(),
            }))
            .await
            .map_err(|e| DbPluginError::client("unable to create password", e))?;

        info!(
            organization = %conn.organization,
            database = %conn.database,
            branch = %statement.branch,
            role = %statement.role,
            %username,
            id = %record.id,
            "issued branch password"
        );
        Ok(NewUserResponse { username })
    }

    async fn update_user(
        &self,
        _ctx: &RequestContext,
        req: UpdateUserRequest,
    ) -> Result<UpdateUserResponse, DbPluginError> {
        if req.username.is_empty() {
            return Err(DbPluginError::Validation("missing username".to_string()));
        }
        if req.password.is_none() && req.expiration.is_none() {
            return Err(DbPluginError::Validation("no changes requested".to_string()));
        }
        self.require_initialized()?;

        let mut errors = Vec::new();
        if let Some(change) = &req.password {
            if let Err(e) = self.change_user_password(&req.username, change).await {
                errors.push(e);
            }
        }
        if let Some(change) = &req.expiration {
            if let Err(e) = self.change_user_expiration(&req.username, change).await {
                errors.push(e);
            }
        }

        if errors.is_empty() {
            Ok(UpdateUserResponse {})
        } else {
            Err(DbPluginError::Aggregated(errors))
        }
    }

    async fn delete_user(
        &self,
        ctx: &RequestContext,
        req: DeleteUserRequest,
    ) -> Result<DeleteUserResponse, DbPluginError> {
        if req.username.is_empty() {
            return Err(DbPluginError::Validation("missing username".to_string()));
        }
        let (_, conn) = self.session()?;

        let passwords = ctx
            .run(conn.client.list_passwords(ListPasswordsRequest {
                organization: conn.organization.clone(),
                database: conn.database.clone(),
            }))
            .await
            .map_err(|e| DbPluginError::client("failed to list existing passwords", e))?;

        let Some(found) = passwords
            .into_iter()
            .find(|p| p.display_name == req.username)
        else {
            warn!(
                organization = %conn.organization,
                database = %conn.database,
                username = %req.username,
                "no password with this display name"
            );
            return Err(DbPluginError::CredentialNotFound {
                name: req.username,
                database: conn.database,
                organization: conn.organization,
            });
        };

        ctx.run(conn.client.delete_password(DeletePasswordRequest {
            organization: conn.organization.clone(),
            database: conn.database.clone(),
            branch: found.branch.clone(),
            display_name: req.username.clone(),
            id: found.id.clone(),
        }))
        .await
        .map_err(|e| DbPluginError::client("failed to delete password", e))?;

        info!(
            organization = %conn.organization,
            database = %conn.database,
            branch = %found.branch,
            username = %req.username,
            id = %found.id,
            "revoked branch password"
        );
        Ok(DeleteUserResponse {})
    }

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    async fn close(&self) -> Result<(), DbPluginError> {
        self.producer.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConnectionConfig;
    use crate::database::Statements;
    use crate::error::ErrorKind;
    use crate::planetscale::mock::{FailOn, MockClientFactory, MockOperation, MockPasswordApi};
    use crate::planetscale::{ApiError, PasswordRecord};
    use chrono::Utc;

    fn backend_with(api: MockPasswordApi) -> (PlanetScale, MockClientFactory) {
        let factory = MockClientFactory::new(api);
        (PlanetScale::with_factory(Box::new(factory.clone())), factory)
    }

    fn init_req() -> InitializeRequest {
        InitializeRequest {
            config: ConnectionConfig::new("acme", "db1", "tok", "name"),
            verify_connection: false,
        }
    }

    fn statements(cmds: &[&str]) -> Statements {
        Statements {
            commands: cmds.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn record(id: &str, name: &str, branch: &str) -> PasswordRecord {
        PasswordRecord {
            id: id.into(),
            display_name: name.into(),
            branch: branch.into(),
            role: "reader".into(),
        }
    }

    #[tokio::test]
    async fn operations_require_initialize() {
        let (db, factory) = backend_with(MockPasswordApi::new());
        let ctx = RequestContext::background();

        let err = db
            .new_user(
                &ctx,
                NewUserRequest {
                    statements: statements(&["{}"]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);

        let err = db
            .delete_user(
                &ctx,
                DeleteUserRequest {
                    username: "x".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
        assert!(factory.api().operations().is_empty());
    }

    #[tokio::test]
    async fn initialize_returns_raw_config() {
        let (db, _) = backend_with(MockPasswordApi::new());
        let resp = db
            .initialize(&RequestContext::background(), init_req())
            .await
            .unwrap();
        assert_eq!(
            resp.config.get("database").and_then(|v| v.as_str()),
            Some("db1")
        );
        assert!(db.is_initialized());
    }

    #[tokio::test]
    async fn bad_template_leaves_backend_uninitialized() {
        let (db, factory) = backend_with(MockPasswordApi::new());
        let mut req = init_req();
        req.config = req.config.with_username_template("{{ .Nope }}");

        let err = db
            .initialize(&RequestContext::background(), req)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Template);
        assert!(!db.is_initialized());
        assert_eq!(factory.constructed(), 0);
    }

    #[tokio::test]
    async fn verify_connection_lists_once() {
        let (db, factory) = backend_with(MockPasswordApi::new());
        let mut req = init_req();
        req.verify_connection = true;
        db.initialize(&RequestContext::background(), req)
            .await
            .unwrap();
        assert_eq!(factory.api().operations().len(), 1);
        assert!(matches!(
            factory.api().operations()[0],
            MockOperation::ListPasswords(_)
        ));
    }

    #[tokio::test]
    async fn failed_verification_fails_initialize() {
        let api = MockPasswordApi::new().fail_on(FailOn::ListPasswords(ApiError::AuthFailed(
            "bad token".into(),
        )));
        let (db, _) = backend_with(api);
        let mut req = init_req();
        req.verify_connection = true;

        let err = db
            .initialize(&RequestContext::background(), req)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Client);
        assert!(err.to_string().starts_with("failed to verify connection"));
        assert!(!db.is_initialized());
    }

    #[tokio::test]
    async fn failed_reinitialize_keeps_previous_state() {
        let (db, factory) = backend_with(MockPasswordApi::new());
        let ctx = RequestContext::background();
        let mut first = init_req();
        first.config = first.config.with_username_template("old-{{ random 5 }}");
        db.initialize(&ctx, first).await.unwrap();

        factory
            .api()
            .clone()
            .fail_on(FailOn::ListPasswords(ApiError::AuthFailed("x".into())));
        let second = InitializeRequest {
            config: ConnectionConfig::new("other", "db2", "tok2", "name2")
                .with_username_template("new-{{ random 5 }}"),
            verify_connection: true,
        };
        let err = db.initialize(&ctx, second).await.unwrap_err();
        assert!(err.to_string().starts_with("failed to verify connection"));
        factory.api().clear_fail_on();

        assert!(db.is_initialized());
        assert!(db.producer().secret_values().contains_key("tok"));
        assert!(!db.producer().secret_values().contains_key("tok2"));

        let resp = db
            .new_user(
                &ctx,
                NewUserRequest {
                    statements: statements(&["{}"]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(resp.username.starts_with("old-"));
        let created = factory.api().created();
        assert_eq!(created[0].organization, "acme");
        assert_eq!(created[0].database, "db1");
    }

    #[tokio::test]
    async fn successful_reinitialize_replaces_everything() {
        let (db, factory) = backend_with(MockPasswordApi::new());
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();

        let second = InitializeRequest {
            config: ConnectionConfig::new("other", "db2", "tok2", "name2")
                .with_username_template("new-{{ random 5 }}"),
            verify_connection: true,
        };
        db.initialize(&ctx, second).await.unwrap();

        let resp = db
            .new_user(
                &ctx,
                NewUserRequest {
                    statements: statements(&["{}"]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(resp.username.starts_with("new-"));
        let created = factory.api().created();
        assert_eq!(created[0].organization, "other");
        assert_eq!(created[0].database, "db2");
    }

    #[tokio::test]
    async fn new_user_creates_password_on_requested_branch() {
        let (db, factory) = backend_with(MockPasswordApi::new());
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();

        let resp = db
            .new_user(
                &ctx,
                NewUserRequest {
                    username_config: crate::database::UsernameMetadata {
                        display_name: "alice".into(),
                        role_name: String::new(),
                    },
                    statements: statements(&[r#"{"branch":"dev","role":"reader"}"#]),
                },
            )
            .await
            .unwrap();

        assert!(resp.username.starts_with("v-alice--"));
        let created = factory.api().created();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].organization, "acme");
        assert_eq!(created[0].database, "db1");
        assert_eq!(created[0].branch, "dev");
        assert_eq!(created[0].role, "reader");
        assert_eq!(created[0].display_name, resp.username);
    }

    #[tokio::test]
    async fn new_user_without_statements_never_calls_api() {
        let (db, factory) = backend_with(MockPasswordApi::new());
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();

        let err = db
            .new_user(&ctx, NewUserRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyStatement);
        assert!(factory.api().created().is_empty());
    }

    #[tokio::test]
    async fn new_user_rejects_malformed_statement() {
        let (db, factory) = backend_with(MockPasswordApi::new());
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();

        let err = db
            .new_user(
                &ctx,
                NewUserRequest {
                    statements: statements(&["not json"]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidStatement);
        assert!(factory.api().created().is_empty());
    }

    #[tokio::test]
    async fn new_user_wraps_api_failure() {
        let api = MockPasswordApi::new().fail_on(FailOn::CreatePassword(ApiError::RateLimited));
        let (db, _) = backend_with(api);
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();

        let err = db
            .new_user(
                &ctx,
                NewUserRequest {
                    statements: statements(&["{}"]),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Client);
        assert!(err.is_transient());
        assert_eq!(err.to_string(), "unable to create password: rate limited");
    }

    #[tokio::test]
    async fn update_user_validates_arguments_first() {
        let (db, _) = backend_with(MockPasswordApi::new());
        let ctx = RequestContext::background();

        let err = db
            .update_user(&ctx, UpdateUserRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "missing username");

        let err = db
            .update_user(
                &ctx,
                UpdateUserRequest {
                    username: "v-alice".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "no changes requested");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn update_user_is_a_noop_success() {
        let (db, factory) = backend_with(MockPasswordApi::new());
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();

        let req = UpdateUserRequest {
            username: "v-alice".into(),
            password: Some(ChangePassword {
                new_password: "pw".into(),
                statements: Statements::default(),
            }),
            expiration: Some(ChangeExpiration {
                new_expiration: Utc::now(),
                statements: Statements::default(),
            }),
        };
        assert_eq!(db.update_user(&ctx, req).await.unwrap(), UpdateUserResponse {});
        assert!(factory.api().operations().is_empty());
    }

    #[tokio::test]
    async fn update_user_before_initialize() {
        let (db, _) = backend_with(MockPasswordApi::new());
        let req = UpdateUserRequest {
            username: "v-alice".into(),
            expiration: Some(ChangeExpiration {
                new_expiration: Utc::now(),
                statements: Statements::default(),
            }),
            ..Default::default()
        };
        let err = db
            .update_user(&RequestContext::background(), req)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotInitialized);
    }

    #[tokio::test]
    async fn delete_user_uses_matching_branch_and_id() {
        let api = MockPasswordApi::with_passwords(vec![
            record("pw_a", "v-bob", "main"),
            record("pw_b", "v-alice", "dev"),
        ]);
        let (db, factory) = backend_with(api);
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();

        db.delete_user(
            &ctx,
            DeleteUserRequest {
                username: "v-alice".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let deleted = factory.api().deleted();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].id, "pw_b");
        assert_eq!(deleted[0].branch, "dev");
        assert_eq!(deleted[0].display_name, "v-alice");
        assert_eq!(factory.api().password_count(), 1);
    }

    #[tokio::test]
    async fn delete_user_first_match_wins() {
        let api = MockPasswordApi::with_passwords(vec![
            record("pw_1", "dup", "main"),
            record("pw_2", "dup", "dev"),
        ]);
        let (db, factory) = backend_with(api);
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();

        db.delete_user(
            &ctx,
            DeleteUserRequest {
                username: "dup".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(factory.api().deleted()[0].id, "pw_1");
    }

    #[tokio::test]
    async fn delete_missing_user_issues_no_delete() {
        let api = MockPasswordApi::with_passwords(vec![record("pw_a", "v-bob", "main")]);
        let (db, factory) = backend_with(api);
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();

        let err = db
            .delete_user(
                &ctx,
                DeleteUserRequest {
                    username: "v-alice".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CredentialNotFound);
        assert!(err.to_string().contains("v-alice"));
        assert!(factory.api().deleted().is_empty());
    }

    #[tokio::test]
    async fn delete_user_list_failure_is_client_error() {
        let api = MockPasswordApi::new().fail_on(FailOn::ListPasswords(ApiError::Network(
            "connection reset".into(),
        )));
        let (db, _) = backend_with(api);
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();

        let err = db
            .delete_user(
                &ctx,
                DeleteUserRequest {
                    username: "v-alice".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("failed to list existing passwords"));
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn lifecycle_logs_never_carry_the_token() {
        let (db, _) = backend_with(MockPasswordApi::new());
        let ctx = RequestContext::background();
        let mut req = init_req();
        req.config.service_token = "pscale_tkn_logcheck".into();
        db.initialize(&ctx, req).await.unwrap();

        let resp = db
            .new_user(
                &ctx,
                NewUserRequest {
                    statements: statements(&["{}"]),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let del = DeleteUserRequest {
            username: resp.username.clone(),
            ..Default::default()
        };
        db.delete_user(&ctx, del.clone()).await.unwrap();
        db.delete_user(&ctx, del).await.unwrap_err();

        assert!(logs_contain("initialized planetscale backend"));
        assert!(logs_contain("issued branch password"));
        assert!(logs_contain("revoked branch password"));
        assert!(logs_contain("no password with this display name"));
        assert!(!logs_contain("pscale_tkn_logcheck"));
    }

    #[tokio::test]
    async fn close_then_new_user_recreates_client() {
        let (db, factory) = backend_with(MockPasswordApi::new());
        let ctx = RequestContext::background();
        db.initialize(&ctx, init_req()).await.unwrap();
        db.close().await.unwrap();
        db.close().await.unwrap();

        db.new_user(
            &ctx,
            NewUserRequest {
                statements: statements(&["{}"]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(factory.constructed(), 2);
        assert_eq!(db.type_name(), "planetscale");
    }
}
