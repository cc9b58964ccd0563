//! Grant engine: the token endpoint's protocol state machine.
//!
//! A request moves through `validate_transport` -> `authenticate_client` ->
//! grant dispatch. Each step consumes the previous state, so a grant can only
//! be dispatched for a client that was authenticated over an accepted
//! transport. Everything after transport validation runs inside one database
//! transaction that is committed only when a token was issued.

use std::collections::HashMap;
use std::sync::Arc;

use axum::http::Method;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::config::OAuth2Config;
use crate::entity::{oauth2_client, oauth2_token};
use crate::error::{OAuth2Error, StoreError};
use crate::oauth2::auth_check::AuthCheck;
use crate::oauth2::credentials::Credentials;
use crate::oauth2::revocable::{self, Revocable};
use crate::oauth2::store::CredentialStore;

/// A token or revocation request as received from the transport.
#[derive(Clone, Debug)]
pub struct GrantRequest {
    pub method: Method,
    /// Whether the request arrived over an encrypted transport.
    pub secure: bool,
    /// Raw `Authorization` header value
    pub authorization: Option<String>,
    /// Decoded form fields
    pub fields: HashMap<String, String>,
}

/// Method and transport accepted.
#[derive(Debug)]
pub struct TransportValidated {
    authorization: Option<String>,
    fields: HashMap<String, String>,
}

/// Client credentials verified against the store.
#[derive(Debug)]
pub struct ClientAuthenticated {
    pub client: oauth2_client::Model,
    fields: HashMap<String, String>,
}

/// Supported grant types.
#[derive(Clone, PartialEq, Eq)]
pub enum Grant {
    Password {
        username: String,
        password: String,
    },
    RefreshToken {
        refresh_token: String,
        user_id: String,
    },
    AuthorizationCode {
        code: String,
        redirect_uri: Option<String>,
    },
}

impl std::fmt::Debug for Grant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.grant_type())
    }
}

fn required(fields: &HashMap<String, String>, name: &'static str) -> Result<String, OAuth2Error> {
    fields.get(name).cloned().ok_or_else(|| {
        tracing::info!(field = name, "Rejected grant: missing field");
        OAuth2Error::MissingParameter(name)
    })
}

impl Grant {
    pub fn from_fields(fields: &HashMap<String, String>) -> Result<Self, OAuth2Error> {
        match fields.get("grant_type").map(String::as_str) {
            Some("password") => Ok(Grant::Password {
                username: required(fields, "username")?,
                password: required(fields, "password")?,
            }),
            Some("refresh_token") => Ok(Grant::RefreshToken {
                refresh_token: required(fields, "refresh_token")?,
                user_id: required(fields, "user_id")?,
            }),
            Some("authorization_code") => Ok(Grant::AuthorizationCode {
                code: required(fields, "code")?,
                redirect_uri: fields.get("redirect_uri").cloned(),
            }),
            other => {
                tracing::info!(grant_type = ?other, "Rejected grant: unsupported grant type");
                Err(OAuth2Error::UnsupportedGrantType(other.map(String::from)))
            }
        }
    }

    pub fn grant_type(&self) -> &'static str {
        match self {
            Grant::Password { .. } => "password",
            Grant::RefreshToken { .. } => "refresh_token",
            Grant::AuthorizationCode { .. } => "authorization_code",
        }
    }
}

/// Successful token endpoint response.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    /// Always `bearer`
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    pub refresh_token: String,
    pub user_id: i64,
}

impl From<oauth2_token::Model> for TokenResponse {
    fn from(token: oauth2_token::Model) -> Self {
        Self {
            access_token: token.access_token,
            token_type: "bearer".to_string(),
            expires_in: token.expires_in,
            refresh_token: token.refresh_token,
            user_id: token.user_id,
        }
    }
}

/// Processes token and revocation requests. Built once from configuration.
#[derive(Clone)]
pub struct GrantEngine {
    store: CredentialStore,
    auth_check: Arc<dyn AuthCheck>,
    require_ssl: bool,
    refresh_token_lifetime: i64,
}

impl GrantEngine {
    pub fn new(config: &OAuth2Config, auth_check: Arc<dyn AuthCheck>) -> Result<Self, StoreError> {
        Ok(Self {
            store: CredentialStore::new(config)?,
            auth_check,
            require_ssl: config.require_ssl,
            refresh_token_lifetime: config.refresh_token_lifetime,
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Run a token request to completion: a token is issued and persisted,
    /// or nothing is.
    #[tracing::instrument(skip_all, fields(client_id, grant_type))]
    pub async fn process(
        &self,
        db: &DatabaseConnection,
        request: GrantRequest,
    ) -> Result<TokenResponse, OAuth2Error> {
        let validated = self.validate_transport(request)?;

        let txn = db.begin().await?;
        let authenticated = self.authenticate_client(&txn, validated).await?;
        tracing::Span::current().record("client_id", authenticated.client.id.as_str());

        let grant = Grant::from_fields(&authenticated.fields)?;
        tracing::Span::current().record("grant_type", grant.grant_type());

        let token = self.dispatch(&txn, &authenticated.client, grant).await?;
        txn.commit().await?;

        tracing::info!(user_id = token.user_id, "Issued token");
        Ok(token.into())
    }

    pub fn validate_transport(
        &self,
        request: GrantRequest,
    ) -> Result<TransportValidated, OAuth2Error> {
        if request.method != Method::POST {
            tracing::info!(method = %request.method, "Rejected request: invalid method");
            return Err(OAuth2Error::MethodNotAllowed(request.method.to_string()));
        }
        if self.require_ssl && !request.secure {
            tracing::info!("Rejected request: not made over HTTPS");
            return Err(OAuth2Error::InsecureTransport);
        }
        Ok(TransportValidated {
            authorization: request.authorization,
            fields: request.fields,
        })
    }

    /// Re-validates the client even if an outer layer already did.
    pub async fn authenticate_client<C: ConnectionTrait>(
        &self,
        db: &C,
        request: TransportValidated,
    ) -> Result<ClientAuthenticated, OAuth2Error> {
        let (client_id, client_secret) = Credentials::basic(request.authorization.as_deref())
            .map_err(|e| {
                tracing::info!(reason = %e, "Rejected request: no client credentials");
                OAuth2Error::MissingClientCredentials
            })?;

        let client = match self.store.find_client(db, &client_id).await? {
            Some(client) if !client.is_revoked() => client,
            Some(_) => {
                self.store.verify_missing_client_secret(&client_secret).await;
                tracing::info!(client_id = %client_id, "Rejected request: client revoked");
                return Err(OAuth2Error::InvalidClientCredentials);
            }
            None => {
                self.store.verify_missing_client_secret(&client_secret).await;
                tracing::info!(client_id = %client_id, "Rejected request: unknown client");
                return Err(OAuth2Error::InvalidClientCredentials);
            }
        };

        if !self.store.verify_client_secret(&client, &client_secret).await {
            tracing::info!(client_id = %client_id, "Rejected request: invalid client secret");
            return Err(OAuth2Error::InvalidClientCredentials);
        }

        Ok(ClientAuthenticated {
            client,
            fields: request.fields,
        })
    }

    async fn dispatch<C: ConnectionTrait>(
        &self,
        db: &C,
        client: &oauth2_client::Model,
        grant: Grant,
    ) -> Result<oauth2_token::Model, OAuth2Error> {
        match grant {
            Grant::Password { username, password } => {
                self.password_grant(db, client, &username, &password).await
            }
            Grant::RefreshToken {
                refresh_token,
                user_id,
            } => {
                self.refresh_grant(db, client, &refresh_token, &user_id)
                    .await
            }
            Grant::AuthorizationCode { code, redirect_uri } => {
                self.authorization_code_grant(db, client, &code, redirect_uri.as_deref())
                    .await
            }
        }
    }

    async fn password_grant<C: ConnectionTrait>(
        &self,
        db: &C,
        client: &oauth2_client::Model,
        username: &str,
        password: &str,
    ) -> Result<oauth2_token::Model, OAuth2Error> {
        let Some(user_id) = self.auth_check.check_credentials(username, password).await else {
            tracing::info!("Rejected password grant: invalid user credentials");
            return Err(OAuth2Error::InvalidUserCredentials);
        };
        Ok(self.store.issue_token(db, &client.id, user_id).await?)
    }

    async fn refresh_grant<C: ConnectionTrait>(
        &self,
        db: &C,
        client: &oauth2_client::Model,
        refresh_token: &str,
        user_id: &str,
    ) -> Result<oauth2_token::Model, OAuth2Error> {
        let Some(token) = self.store.find_token_by_refresh(db, refresh_token).await? else {
            tracing::info!("Rejected refresh grant: unknown refresh_token");
            return Err(OAuth2Error::InvalidToken(
                "Provided refresh_token is not valid.".into(),
            ));
        };

        if token.client_id != client.id {
            tracing::info!("Rejected refresh grant: client does not own refresh_token");
            return Err(OAuth2Error::OwnershipMismatch(
                "Client does not own this refresh_token.".into(),
            ));
        }

        if token.user_id.to_string() != user_id {
            tracing::info!("Rejected refresh grant: user_id mismatch");
            return Err(OAuth2Error::OwnershipMismatch(
                "The given user_id does not match the given refresh_token.".into(),
            ));
        }

        let refresh_expired = OffsetDateTime::now_utc()
            > token.refresh_token_expires_at(self.refresh_token_lifetime);
        if token.is_revoked() || refresh_expired {
            tracing::info!(
                revoked = token.is_revoked(),
                "Rejected refresh grant: refresh_token no longer valid"
            );
            return Err(OAuth2Error::InvalidToken(
                "Provided refresh_token is no longer valid.".into(),
            ));
        }

        match self.store.refresh(db, &token).await {
            Ok(new_token) => Ok(new_token),
            Err(StoreError::AlreadyRevoked) => {
                tracing::info!("Rejected refresh grant: refresh_token already used");
                Err(OAuth2Error::InvalidToken(
                    "Provided refresh_token is no longer valid.".into(),
                ))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn authorization_code_grant<C: ConnectionTrait>(
        &self,
        db: &C,
        client: &oauth2_client::Model,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<oauth2_token::Model, OAuth2Error> {
        let Some(authorization) = self.store.find_authorization(db, code).await? else {
            tracing::info!("Rejected authorization_code grant: unknown code");
            return Err(OAuth2Error::InvalidToken(
                "Provided code is not valid.".into(),
            ));
        };

        if authorization.client_id != client.id {
            tracing::info!("Rejected authorization_code grant: client does not own code");
            return Err(OAuth2Error::OwnershipMismatch(
                "Client does not own this code.".into(),
            ));
        }

        if let Some(uri) = redirect_uri
            && uri != authorization.redirect_uri
        {
            tracing::info!("Rejected authorization_code grant: redirect_uri mismatch");
            return Err(OAuth2Error::OwnershipMismatch(
                "The given redirect_uri does not match the one the code was issued for.".into(),
            ));
        }

        if revocable::is_expired_or_revoked(db, &authorization).await? {
            tracing::info!("Rejected authorization_code grant: code expired or used");
            return Err(OAuth2Error::InvalidToken(
                "Provided code is no longer valid.".into(),
            ));
        }

        match self.store.consume_authorization_code(db, &authorization).await {
            Ok(()) => {}
            Err(StoreError::AlreadyRevoked) => {
                tracing::info!("Rejected authorization_code grant: code already used");
                return Err(OAuth2Error::InvalidToken(
                    "Provided code is no longer valid.".into(),
                ));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(self
            .store
            .issue_token(db, &client.id, authorization.user_id)
            .await?)
    }

    /// Revoke a token owned by the authenticated client.
    ///
    /// Unknown tokens, tokens of other clients and already revoked tokens
    /// are all accepted silently so token existence is not disclosed.
    #[tracing::instrument(skip_all, fields(client_id))]
    pub async fn revoke(
        &self,
        db: &DatabaseConnection,
        request: GrantRequest,
    ) -> Result<(), OAuth2Error> {
        let validated = self.validate_transport(request)?;

        let txn = db.begin().await?;
        let authenticated = self.authenticate_client(&txn, validated).await?;
        tracing::Span::current().record("client_id", authenticated.client.id.as_str());

        let value = required(&authenticated.fields, "token")?;
        let refresh_first = matches!(
            authenticated.fields.get("token_type_hint").map(String::as_str),
            Some("refresh_token")
        );

        let token = if refresh_first {
            match self.store.find_token_by_refresh(&txn, &value).await? {
                Some(token) => Some(token),
                None => self.store.find_token_by_access(&txn, &value).await?,
            }
        } else {
            match self.store.find_token_by_access(&txn, &value).await? {
                Some(token) => Some(token),
                None => self.store.find_token_by_refresh(&txn, &value).await?,
            }
        };

        match token {
            Some(token) if token.client_id == authenticated.client.id => {
                if revocable::revoke(&txn, &token).await? {
                    tracing::info!(user_id = token.user_id, "Revoked token");
                }
            }
            Some(_) => tracing::info!("Ignored revocation of another client's token"),
            None => tracing::debug!("Ignored revocation of unknown token"),
        }

        txn.commit().await?;
        Ok(())
    }
}
