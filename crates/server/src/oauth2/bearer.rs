//! Bearer access-token gate for resource endpoints.
//!
//! Resolves `Authorization: Bearer <access_token>` to the token's user and
//! stores an [`AuthenticatedUser`] in the request extensions.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

use crate::error::OAuth2Error;
use crate::oauth2::credentials::Credentials;
use crate::oauth2::revocable;
use crate::oauth2::state::OAuth2State;

/// The resource owner behind a validated access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: i64,
    /// Client the token was issued to
    pub client_id: String,
}

/// Validate an `Authorization` header value against the token store.
pub async fn authenticate_bearer(
    state: &OAuth2State,
    authorization: Option<&str>,
) -> Result<AuthenticatedUser, OAuth2Error> {
    let access_token = Credentials::bearer(authorization).map_err(|e| {
        tracing::info!(reason = %e, "Rejected bearer request: no bearer token");
        OAuth2Error::Unauthenticated
    })?;

    let db = state.db.as_ref();
    let Some(token) = state.store().find_token_by_access(db, &access_token).await? else {
        tracing::info!("Rejected bearer request: unknown access token");
        return Err(OAuth2Error::InvalidToken("Token not found".into()));
    };

    if revocable::is_expired_or_revoked(db, &token).await? {
        tracing::info!(user_id = token.user_id, "Rejected bearer request: token expired or revoked");
        return Err(OAuth2Error::InvalidToken(
            "Token has expired or been revoked".into(),
        ));
    }

    Ok(AuthenticatedUser {
        user_id: token.user_id,
        client_id: token.client_id,
    })
}

/// Middleware rejecting requests without a valid bearer token.
pub async fn require_bearer(
    State(state): State<OAuth2State>,
    mut request: Request,
    next: Next,
) -> Result<Response, OAuth2Error> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let user = authenticate_bearer(&state, authorization).await?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
