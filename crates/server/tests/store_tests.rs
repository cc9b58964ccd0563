//! Credential store, token lifecycle and grant engine tests.
//!
//! Exercise the library directly, without the HTTP layer.

use async_trait::async_trait;
use axum::http::Method;
use migration::{Migrator, MigratorTrait};
use oauth2_provider::{
    config::{KdfConfig, OAuth2Config},
    entity::{oauth2_authorization, oauth2_client, oauth2_token},
    error::{ErrorKind, OAuth2Error, StoreError},
    oauth2::{
        AuthCheck, CredentialStore, GrantEngine, GrantRequest, ProvisionedClient,
        credentials::basic_header, revocable,
    },
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, Database, DatabaseConnection, DbErr, EntityTrait,
    IntoActiveModel, SqlErr,
};
use std::collections::HashMap;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// Resolves every username/password pair to the same user, or to none.
struct FixedUser(Option<i64>);

#[async_trait]
impl AuthCheck for FixedUser {
    async fn check_credentials(&self, _username: &str, _password: &str) -> Option<i64> {
        self.0
    }
}

fn test_oauth2_config() -> OAuth2Config {
    OAuth2Config {
        kdf: KdfConfig {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
            output_len: 32,
        },
        ..OAuth2Config::default()
    }
}

async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    Migrator::up(&db, None).await.expect("run migrations");
    db
}

fn store() -> CredentialStore {
    CredentialStore::new(&test_oauth2_config()).expect("store")
}

fn engine(user: Option<i64>) -> GrantEngine {
    GrantEngine::new(&test_oauth2_config(), Arc::new(FixedUser(user))).expect("engine")
}

fn request(client: &ProvisionedClient, fields: &[(&str, &str)]) -> GrantRequest {
    GrantRequest {
        method: Method::POST,
        secure: true,
        authorization: Some(basic_header(&client.client_id, &client.client_secret)),
        fields: fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<HashMap<_, _>>(),
    }
}

async fn client_model(db: &DatabaseConnection, client_id: &str) -> oauth2_client::Model {
    oauth2_client::Entity::find_by_id(client_id)
        .one(db)
        .await
        .unwrap()
        .expect("client exists")
}

async fn backdate_token(db: &DatabaseConnection, token: oauth2_token::Model, by: Duration) {
    let creation_date = token.creation_date - by;
    let mut active = token.into_active_model();
    active.creation_date = Set(creation_date);
    active.update(db).await.unwrap();
}

// =============================================================================
// Clients
// =============================================================================

#[tokio::test]
async fn test_client_secret_verification() {
    let db = create_test_db().await;
    let store = store();

    let provisioned = store.create_client(&db).await.unwrap();
    assert_eq!(provisioned.client_id.len(), 64);
    assert_eq!(provisioned.client_secret.len(), 64);

    let client = client_model(&db, &provisioned.client_id).await;
    assert!(!client.revoked);
    assert_ne!(client.secret_hash, provisioned.client_secret);
    assert!(client.secret_hash.starts_with("$argon2id$"));

    assert!(
        store
            .verify_client_secret(&client, &provisioned.client_secret)
            .await
    );
    assert!(!store.verify_client_secret(&client, "wrong").await);
    // The stored form must not double as a credential.
    assert!(
        !store
            .verify_client_secret(&client, &client.secret_hash)
            .await
    );
}

#[tokio::test]
async fn test_rotate_client_secret() {
    let db = create_test_db().await;
    let store = store();
    let provisioned = store.create_client(&db).await.unwrap();

    let client = client_model(&db, &provisioned.client_id).await;
    let new_secret = store.rotate_client_secret(&db, client).await.unwrap();
    assert_ne!(new_secret, provisioned.client_secret);

    let client = client_model(&db, &provisioned.client_id).await;
    assert!(store.verify_client_secret(&client, &new_secret).await);
    assert!(
        !store
            .verify_client_secret(&client, &provisioned.client_secret)
            .await
    );
}

#[tokio::test]
async fn test_revoke_client_is_idempotent() {
    let db = create_test_db().await;
    let store = store();
    let provisioned = store.create_client(&db).await.unwrap();
    let client = client_model(&db, &provisioned.client_id).await;

    assert!(store.revoke_client(&db, &client).await.unwrap());
    let revoked = client_model(&db, &provisioned.client_id).await;
    assert!(revoked.revoked);
    let first_date = revoked.revocation_date.expect("revocation date set");

    assert!(!store.revoke_client(&db, &revoked).await.unwrap());
    let again = client_model(&db, &provisioned.client_id).await;
    assert_eq!(again.revocation_date, Some(first_date));
}

#[tokio::test]
async fn test_redirect_uris_in_registration_order() {
    let db = create_test_db().await;
    let store = store();
    let provisioned = store.create_client(&db).await.unwrap();

    store
        .add_redirect_uri(&db, &provisioned.client_id, "https://b.example/cb")
        .await
        .unwrap();
    store
        .add_redirect_uri(&db, &provisioned.client_id, "https://a.example/cb")
        .await
        .unwrap();

    let uris = store
        .redirect_uris(&db, &provisioned.client_id)
        .await
        .unwrap();
    assert_eq!(uris, vec!["https://b.example/cb", "https://a.example/cb"]);

    let err = store
        .add_redirect_uri(&db, &provisioned.client_id, "not a uri")
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidRedirectUri(_)));
}

#[tokio::test]
async fn test_duplicate_redirect_uri_is_not_a_collision() {
    let db = create_test_db().await;
    let store = store();
    let provisioned = store.create_client(&db).await.unwrap();

    store
        .add_redirect_uri(&db, &provisioned.client_id, "https://a.example/cb")
        .await
        .unwrap();
    let err = store
        .add_redirect_uri(&db, &provisioned.client_id, "https://a.example/cb")
        .await
        .unwrap_err();

    assert!(
        matches!(&err, StoreError::DuplicateRedirectUri(uri) if uri == "https://a.example/cb"),
        "{err:?}"
    );
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_missing_client_secret_never_verifies() {
    let store = store();

    assert!(!store.verify_missing_client_secret("").await);
    assert!(!store.verify_missing_client_secret(&"a".repeat(64)).await);
}

// =============================================================================
// Tokens and codes
// =============================================================================

#[tokio::test]
async fn test_issue_and_refresh_token() {
    let db = create_test_db().await;
    let store = store();
    let client = store.create_client(&db).await.unwrap();

    let token = store.issue_token(&db, &client.client_id, 7).await.unwrap();
    assert_eq!(token.expires_in, 3600);
    assert_ne!(token.access_token, token.refresh_token);
    assert!(!token.revoked);

    let replacement = store.refresh(&db, &token).await.unwrap();
    assert_eq!(replacement.user_id, 7);
    assert_eq!(replacement.client_id, client.client_id);
    assert_ne!(replacement.access_token, token.access_token);

    // The losing side of a concurrent refresh gets nothing.
    let err = store.refresh(&db, &token).await.unwrap_err();
    assert!(matches!(err, StoreError::AlreadyRevoked));

    let old = store
        .find_token_by_refresh(&db, &token.refresh_token)
        .await
        .unwrap()
        .unwrap();
    assert!(old.revoked);
}

#[tokio::test]
async fn test_conditional_revoke() {
    let db = create_test_db().await;
    let store = store();
    let client = store.create_client(&db).await.unwrap();
    let token = store.issue_token(&db, &client.client_id, 1).await.unwrap();

    assert!(revocable::revoke(&db, &token).await.unwrap());
    assert!(!revocable::revoke(&db, &token).await.unwrap());
}

#[tokio::test]
async fn test_expired_token_revoked_on_read() {
    let db = create_test_db().await;
    let store = store();
    let client = store.create_client(&db).await.unwrap();
    let token = store.issue_token(&db, &client.client_id, 1).await.unwrap();
    let access_token = token.access_token.clone();

    backdate_token(&db, token, Duration::hours(2)).await;
    let expired = store
        .find_token_by_access(&db, &access_token)
        .await
        .unwrap()
        .unwrap();
    assert!(!expired.revoked);

    assert!(
        revocable::is_expired_or_revoked(&db, &expired)
            .await
            .unwrap()
    );

    let reloaded = store
        .find_token_by_access(&db, &access_token)
        .await
        .unwrap()
        .unwrap();
    assert!(reloaded.revoked);
    assert!(reloaded.revocation_date.is_some());
}

#[tokio::test]
async fn test_authorization_code_consumed_once() {
    let db = create_test_db().await;
    let store = store();
    let client = store.create_client(&db).await.unwrap();

    let code = store
        .issue_authorization_code(&db, &client.client_id, 3, "https://client.example/cb")
        .await
        .unwrap();
    assert_eq!(code.expires_in, 600);
    assert_eq!(code.authcode.len(), 64);

    store.consume_authorization_code(&db, &code).await.unwrap();
    let err = store
        .consume_authorization_code(&db, &code)
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyRevoked));

    let stored = store
        .find_authorization(&db, &code.authcode)
        .await
        .unwrap()
        .unwrap();
    assert!(stored.revoked);
}

#[tokio::test]
async fn test_duplicate_access_token_is_unique_violation() {
    let db = create_test_db().await;
    let store = store();
    let client = store.create_client(&db).await.unwrap();
    let token = store.issue_token(&db, &client.client_id, 1).await.unwrap();

    let err: DbErr = oauth2_token::ActiveModel {
        id: Set("duplicate".to_string()),
        access_token: Set(token.access_token.clone()),
        refresh_token: Set("another".to_string()),
        client_id: Set(client.client_id.clone()),
        user_id: Set(1),
        expires_in: Set(3600),
        creation_date: Set(OffsetDateTime::now_utc()),
        revoked: Set(false),
        revocation_date: Set(None),
    }
    .insert(&db)
    .await
    .unwrap_err();

    assert!(matches!(
        err.sql_err(),
        Some(SqlErr::UniqueConstraintViolation(_))
    ));
}

#[tokio::test]
async fn test_authorization_references_client() {
    let db = create_test_db().await;
    let store = store();
    let client = store.create_client(&db).await.unwrap();
    let code = store
        .issue_authorization_code(&db, &client.client_id, 3, "https://client.example/cb")
        .await
        .unwrap();

    let found = oauth2_authorization::Entity::find_by_id(code.authcode.clone())
        .find_also_related(oauth2_client::Entity)
        .one(&db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.1.unwrap().id, client.client_id);
}

// =============================================================================
// Grant engine
// =============================================================================

#[tokio::test]
async fn test_engine_password_grant() {
    let db = create_test_db().await;
    let engine = engine(Some(42));
    let client = engine.store().create_client(&db).await.unwrap();

    let token = engine
        .process(
            &db,
            request(
                &client,
                &[
                    ("grant_type", "password"),
                    ("username", "alice"),
                    ("password", "secret"),
                ],
            ),
        )
        .await
        .unwrap();

    assert_eq!(token.user_id, 42);
    assert_eq!(token.token_type, "bearer");
    assert_eq!(token.expires_in, 3600);
}

#[tokio::test]
async fn test_engine_check_order() {
    let db = create_test_db().await;
    let engine = engine(None);
    let client = engine.store().create_client(&db).await.unwrap();

    // Method beats transport and credentials.
    let mut req = request(&client, &[]);
    req.method = Method::GET;
    req.secure = false;
    req.authorization = None;
    let err = engine.process(&db, req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Method);

    // Transport beats credentials.
    let mut req = request(&client, &[]);
    req.secure = false;
    req.authorization = None;
    let err = engine.process(&db, req).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);

    // Credentials beat the grant type.
    let mut req = request(&client, &[("grant_type", "implicit")]);
    req.authorization = None;
    let err = engine.process(&db, req).await.unwrap_err();
    assert!(matches!(err, OAuth2Error::MissingClientCredentials));

    let err = engine
        .process(&db, request(&client, &[("grant_type", "implicit")]))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::GrantType);

    let err = engine
        .process(
            &db,
            request(
                &client,
                &[
                    ("grant_type", "password"),
                    ("username", "alice"),
                    ("password", "secret"),
                ],
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OAuth2Error::InvalidUserCredentials));
}

#[tokio::test]
async fn test_engine_rejects_revoked_client() {
    let db = create_test_db().await;
    let engine = engine(Some(1));
    let client = engine.store().create_client(&db).await.unwrap();
    let model = client_model(&db, &client.client_id).await;
    engine.store().revoke_client(&db, &model).await.unwrap();

    let err = engine
        .process(
            &db,
            request(
                &client,
                &[
                    ("grant_type", "password"),
                    ("username", "alice"),
                    ("password", "secret"),
                ],
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OAuth2Error::InvalidClientCredentials));
}

#[tokio::test]
async fn test_engine_refresh_after_lifetime_rejected() {
    let db = create_test_db().await;
    let engine = engine(Some(9));
    let client = engine.store().create_client(&db).await.unwrap();
    let token = engine
        .store()
        .issue_token(&db, &client.client_id, 9)
        .await
        .unwrap();
    let refresh_token = token.refresh_token.clone();

    // Access half expired, refresh half still usable.
    backdate_token(&db, token, Duration::hours(2)).await;
    let refreshed = engine
        .process(
            &db,
            request(
                &client,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refresh_token.as_str()),
                    ("user_id", "9"),
                ],
            ),
        )
        .await
        .unwrap();

    // Both halves expired.
    let stale = engine
        .store()
        .find_token_by_refresh(&db, &refreshed.refresh_token)
        .await
        .unwrap()
        .unwrap();
    backdate_token(&db, stale, Duration::days(8)).await;
    let err = engine
        .process(
            &db,
            request(
                &client,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", refreshed.refresh_token.as_str()),
                    ("user_id", "9"),
                ],
            ),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Token);
}

#[tokio::test]
async fn test_engine_rejects_unknown_client() {
    let db = create_test_db().await;
    let engine = engine(Some(1));
    let unknown = ProvisionedClient {
        client_id: "f".repeat(64),
        client_secret: "0".repeat(64),
    };

    let err = engine
        .process(
            &db,
            request(
                &unknown,
                &[
                    ("grant_type", "password"),
                    ("username", "alice"),
                    ("password", "secret"),
                ],
            ),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, OAuth2Error::InvalidClientCredentials));
}

#[tokio::test]
async fn test_engine_survives_huge_lifetimes() {
    let db = create_test_db().await;
    let config = OAuth2Config {
        access_token_lifetime: i64::MAX,
        refresh_token_lifetime: i64::MAX,
        ..test_oauth2_config()
    };
    let engine = GrantEngine::new(&config, Arc::new(FixedUser(Some(5)))).expect("engine");
    let client = engine.store().create_client(&db).await.unwrap();

    let first = engine
        .process(
            &db,
            request(
                &client,
                &[
                    ("grant_type", "password"),
                    ("username", "alice"),
                    ("password", "secret"),
                ],
            ),
        )
        .await
        .unwrap();
    assert_eq!(first.expires_in, i64::MAX);

    let token = engine
        .store()
        .find_token_by_access(&db, &first.access_token)
        .await
        .unwrap()
        .unwrap();
    assert!(!revocable::is_expired_or_revoked(&db, &token).await.unwrap());

    let refreshed = engine
        .process(
            &db,
            request(
                &client,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", first.refresh_token.as_str()),
                    ("user_id", "5"),
                ],
            ),
        )
        .await
        .unwrap();
    assert_eq!(refreshed.user_id, 5);
}
