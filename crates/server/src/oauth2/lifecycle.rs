//! Issue, rotate and consume tokens and authorization codes.

use sea_orm::{ActiveModelTrait, ActiveValue::Set, ConnectionTrait};
use time::OffsetDateTime;

use crate::entity::{oauth2_authorization, oauth2_token};
use crate::error::StoreError;
use crate::oauth2::generators::generate_identifier;
use crate::oauth2::revocable;
use crate::oauth2::store::CredentialStore;

impl CredentialStore {
    /// Allocate a fresh access/refresh pair for (client, user).
    pub async fn issue_token<C: ConnectionTrait>(
        &self,
        db: &C,
        client_id: &str,
        user_id: i64,
    ) -> Result<oauth2_token::Model, StoreError> {
        let access_token = generate_identifier(Some(client_id))?;
        let refresh_token = generate_identifier(Some(client_id))?;

        let token = oauth2_token::ActiveModel {
            id: Set(uuid::Uuid::new_v4().to_string()),
            access_token: Set(access_token),
            refresh_token: Set(refresh_token),
            client_id: Set(client_id.to_string()),
            user_id: Set(user_id),
            expires_in: Set(self.access_token_lifetime),
            creation_date: Set(OffsetDateTime::now_utc()),
            revoked: Set(false),
            revocation_date: Set(None),
        }
        .insert(db)
        .await
        .map_err(|e| StoreError::from_insert(e, "token"))?;

        tracing::debug!(client_id = %client_id, user_id, "Issued token");
        Ok(token)
    }

    /// Revoke `token` and issue its replacement for the same (client, user).
    ///
    /// Only one caller can revoke a given token; the loser gets
    /// [`StoreError::AlreadyRevoked`] and nothing is issued.
    pub async fn refresh<C: ConnectionTrait>(
        &self,
        db: &C,
        token: &oauth2_token::Model,
    ) -> Result<oauth2_token::Model, StoreError> {
        if !revocable::revoke(db, token).await? {
            return Err(StoreError::AlreadyRevoked);
        }
        self.issue_token(db, &token.client_id, token.user_id).await
    }

    pub async fn issue_authorization_code<C: ConnectionTrait>(
        &self,
        db: &C,
        client_id: &str,
        user_id: i64,
        redirect_uri: &str,
    ) -> Result<oauth2_authorization::Model, StoreError> {
        let authcode = generate_identifier(Some(client_id))?;

        let code = oauth2_authorization::ActiveModel {
            authcode: Set(authcode),
            client_id: Set(client_id.to_string()),
            user_id: Set(user_id),
            redirect_uri: Set(redirect_uri.to_string()),
            expires_in: Set(self.authorization_code_lifetime),
            creation_date: Set(OffsetDateTime::now_utc()),
            revoked: Set(false),
            revocation_date: Set(None),
        }
        .insert(db)
        .await
        .map_err(|e| StoreError::from_insert(e, "authorization code"))?;

        tracing::debug!(client_id = %client_id, user_id, "Issued authorization code");
        Ok(code)
    }

    /// Mark a code as redeemed. A code can be consumed exactly once.
    pub async fn consume_authorization_code<C: ConnectionTrait>(
        &self,
        db: &C,
        code: &oauth2_authorization::Model,
    ) -> Result<(), StoreError> {
        if revocable::revoke(db, code).await? {
            Ok(())
        } else {
            Err(StoreError::AlreadyRevoked)
        }
    }
}
