//! Credential store: clients, their secrets and redirect URIs, plus lookups
//! for tokens and authorization codes.

use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, SqlErr,
};
use time::OffsetDateTime;

use crate::config::OAuth2Config;
use crate::entity::{oauth2_authorization, oauth2_client, oauth2_redirect_uri, oauth2_token};
use crate::error::StoreError;
use crate::oauth2::generators::generate_identifier;
use crate::oauth2::password::SecretHasher;
use crate::oauth2::revocable;

/// Identifier and one-time plaintext secret of a freshly provisioned client.
#[derive(Clone, Debug)]
pub struct ProvisionedClient {
    pub client_id: String,
    pub client_secret: String,
}

/// Store handle configured once at startup; connections are passed per call.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    hasher: SecretHasher,
    /// Hash of a throwaway secret, verified against when no client matches
    decoy_hash: String,
    pub(crate) access_token_lifetime: i64,
    pub(crate) authorization_code_lifetime: i64,
}

impl CredentialStore {
    pub fn new(config: &OAuth2Config) -> Result<Self, StoreError> {
        let hasher = SecretHasher::new(&config.kdf)?;
        let decoy_hash = hasher.derive(&generate_identifier(None)?)?;
        Ok(Self {
            hasher,
            decoy_hash,
            access_token_lifetime: config.access_token_lifetime,
            authorization_code_lifetime: config.authorization_code_lifetime,
        })
    }

    pub fn hasher(&self) -> &SecretHasher {
        &self.hasher
    }

    /// Provision a client. The plaintext secret is returned once and never
    /// stored.
    pub async fn create_client<C: ConnectionTrait>(
        &self,
        db: &C,
    ) -> Result<ProvisionedClient, StoreError> {
        let client_id = generate_identifier(None)?;
        let client_secret = generate_identifier(None)?;
        let secret_hash = self.hasher.derive_blocking(client_secret.clone()).await?;

        oauth2_client::ActiveModel {
            id: Set(client_id.clone()),
            secret_hash: Set(secret_hash),
            revoked: Set(false),
            revocation_date: Set(None),
            created_at: Set(OffsetDateTime::now_utc()),
        }
        .insert(db)
        .await
        .map_err(|e| StoreError::from_insert(e, "client_id"))?;

        tracing::info!(client_id = %client_id, "Provisioned OAuth2 client");
        Ok(ProvisionedClient {
            client_id,
            client_secret,
        })
    }

    /// Re-derive `candidate` with the client's stored salt and parameters and
    /// compare in constant time.
    pub async fn verify_client_secret(
        &self,
        client: &oauth2_client::Model,
        candidate: &str,
    ) -> bool {
        SecretHasher::verify_blocking(candidate.to_string(), client.secret_hash.clone()).await
    }

    /// Spend the same KDF effort as [`Self::verify_client_secret`] for a
    /// client that does not exist or is revoked. Always `false`.
    pub async fn verify_missing_client_secret(&self, candidate: &str) -> bool {
        SecretHasher::verify_blocking(candidate.to_string(), self.decoy_hash.clone()).await;
        false
    }

    /// Replace the client's secret; the previous one stops verifying.
    pub async fn rotate_client_secret<C: ConnectionTrait>(
        &self,
        db: &C,
        client: oauth2_client::Model,
    ) -> Result<String, StoreError> {
        let client_secret = generate_identifier(None)?;
        let secret_hash = self.hasher.derive_blocking(client_secret.clone()).await?;

        let client_id = client.id.clone();
        let mut active: oauth2_client::ActiveModel = client.into();
        active.secret_hash = Set(secret_hash);
        active.update(db).await?;

        tracing::info!(client_id = %client_id, "Rotated OAuth2 client secret");
        Ok(client_secret)
    }

    /// Soft-revoke a client. Returns `false` if it was already revoked.
    pub async fn revoke_client<C: ConnectionTrait>(
        &self,
        db: &C,
        client: &oauth2_client::Model,
    ) -> Result<bool, StoreError> {
        let revoked = revocable::revoke(db, client).await?;
        if revoked {
            tracing::info!(client_id = %client.id, "Revoked OAuth2 client");
        }
        Ok(revoked)
    }

    pub async fn add_redirect_uri<C: ConnectionTrait>(
        &self,
        db: &C,
        client_id: &str,
        uri: &str,
    ) -> Result<(), StoreError> {
        url::Url::parse(uri).map_err(|e| StoreError::InvalidRedirectUri(e.to_string()))?;

        oauth2_redirect_uri::ActiveModel {
            client_id: Set(client_id.to_string()),
            uri: Set(uri.to_string()),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                StoreError::DuplicateRedirectUri(uri.to_string())
            }
            _ => StoreError::Database(e),
        })?;
        Ok(())
    }

    pub async fn find_client<C: ConnectionTrait>(
        &self,
        db: &C,
        client_id: &str,
    ) -> Result<Option<oauth2_client::Model>, StoreError> {
        Ok(oauth2_client::Entity::find_by_id(client_id).one(db).await?)
    }

    /// Redirect URIs registered for a client, in registration order.
    pub async fn redirect_uris<C: ConnectionTrait>(
        &self,
        db: &C,
        client_id: &str,
    ) -> Result<Vec<String>, StoreError> {
        let uris = oauth2_redirect_uri::Entity::find()
            .filter(oauth2_redirect_uri::Column::ClientId.eq(client_id))
            .order_by_asc(oauth2_redirect_uri::Column::Id)
            .all(db)
            .await?;
        Ok(uris.into_iter().map(|r| r.uri).collect())
    }

    pub async fn find_token_by_access<C: ConnectionTrait>(
        &self,
        db: &C,
        access_token: &str,
    ) -> Result<Option<oauth2_token::Model>, StoreError> {
        Ok(oauth2_token::Entity::find()
            .filter(oauth2_token::Column::AccessToken.eq(access_token))
            .one(db)
            .await?)
    }

    pub async fn find_token_by_refresh<C: ConnectionTrait>(
        &self,
        db: &C,
        refresh_token: &str,
    ) -> Result<Option<oauth2_token::Model>, StoreError> {
        Ok(oauth2_token::Entity::find()
            .filter(oauth2_token::Column::RefreshToken.eq(refresh_token))
            .one(db)
            .await?)
    }

    pub async fn find_authorization<C: ConnectionTrait>(
        &self,
        db: &C,
        authcode: &str,
    ) -> Result<Option<oauth2_authorization::Model>, StoreError> {
        Ok(oauth2_authorization::Entity::find_by_id(authcode)
            .one(db)
            .await?)
    }
}
