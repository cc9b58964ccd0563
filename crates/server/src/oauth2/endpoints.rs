//! OAuth2 HTTP endpoints.
//!
//! Thin adapters between axum and the grant engine:
//! - Token endpoint
//! - Authorization endpoint (behind the bearer gate)
//! - Token revocation

use std::collections::HashMap;

use axum::{
    Extension, Form, Json,
    extract::{Query, State, rejection::FormRejection},
    http::{HeaderMap, Method, StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::any,
};
use serde::Deserialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::error::{ErrorResponse, OAuth2Error};
use crate::oauth2::authorize::{self, AuthorizeRequest};
use crate::oauth2::bearer::{AuthenticatedUser, require_bearer};
use crate::oauth2::grant::{GrantRequest, TokenResponse};
use crate::oauth2::{
    OAUTH2_TAG,
    state::{OAuth2State, TlsConnection},
};

/// Creates the OAuth2 router.
///
/// `/token` accepts every method so that non-POST requests get the engine's
/// JSON rejection instead of a bare 405.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    let authorize_routes = OpenApiRouter::new()
        .routes(routes!(authorize, authorize_submit))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer));

    OpenApiRouter::new()
        .route("/token", any(token))
        .routes(routes!(revoke))
        .merge(authorize_routes)
        .with_state(state)
}

// =============================================================================
// Request Types (documentation only; handlers read raw form fields)
// =============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// `password`, `refresh_token` or `authorization_code`
    pub grant_type: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub refresh_token: Option<String>,
    /// Must match the user the refresh token was issued to
    pub user_id: Option<String>,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: String,
    /// `access_token` or `refresh_token`; decides which lookup runs first
    pub token_type_hint: Option<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// OAuth2 Token endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/oauth2/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Issue or refresh a bearer token",
    description = "Processes a grant and returns a bearer token pair.\n\n\
                   **Supported grant types:**\n\
                   - `password`: resource owner `username` and `password`\n\
                   - `refresh_token`: `refresh_token` plus the `user_id` it was issued to\n\
                   - `authorization_code`: `code` from the authorize endpoint, optional `redirect_uri`\n\n\
                   **Client authentication:** HTTP Basic `client_id:client_secret` is required.\n\n\
                   The request must be made over HTTPS unless `oauth2.require_ssl` is disabled.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    security(
        ("client_basic" = [])
    ),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Malformed request, insecure transport, invalid client or unsupported grant", body = ErrorResponse),
        (status = 401, description = "Missing client credentials, invalid user credentials or invalid token", body = ErrorResponse),
        (status = 405, description = "Method other than POST", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    method: Method,
    tls: Option<Extension<TlsConnection>>,
    headers: HeaderMap,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<Response, OAuth2Error> {
    let request = grant_request(&state, method, tls, &headers, form);
    let token = state.engine.process(&state.db, request).await?;
    Ok(no_store(Json(token)))
}

/// Token revocation endpoint.
///
/// Unknown, foreign and already revoked tokens all succeed so token existence
/// is not disclosed.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke an access or refresh token",
    description = "Revokes the token pair an access or refresh token belongs to. \
                   Requires the same client authentication as the token endpoint.\n\n\
                   Returns 200 even if the token does not exist, belongs to another client \
                   or was already revoked.",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token revocation request"
    ),
    security(
        ("client_basic" = [])
    ),
    responses(
        (status = 200, description = "Token revoked (or was already invalid)"),
        (status = 400, description = "Missing token parameter or invalid client", body = ErrorResponse),
        (status = 401, description = "Missing client credentials", body = ErrorResponse),
    )
)]
pub async fn revoke(
    State(state): State<OAuth2State>,
    method: Method,
    tls: Option<Extension<TlsConnection>>,
    headers: HeaderMap,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Result<Response, OAuth2Error> {
    let request = grant_request(&state, method, tls, &headers, form);
    state.engine.revoke(&state.db, request).await?;
    Ok(no_store(StatusCode::OK))
}

/// OAuth2 Authorization endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Issue an authorization code",
    description = "Issues an authorization code for the resource owner identified by the bearer \
                   token and redirects to the client's redirect URI with `code` and `state` appended.\n\n\
                   `redirect_uri` may be omitted when the client registered exactly one URI. \
                   Only `response_type=code` is supported.",
    params(AuthorizeRequest),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 302, description = "Redirect to the client with an authorization code"),
        (status = 400, description = "Unknown client, unregistered redirect_uri or unsupported response_type", body = ErrorResponse),
        (status = 401, description = "Resource owner not authenticated", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    user: Option<Extension<AuthenticatedUser>>,
    Query(params): Query<AuthorizeRequest>,
) -> Result<Response, OAuth2Error> {
    issue_code(&state, user, params).await
}

/// OAuth2 Authorization endpoint, form variant.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize (form)",
    summary = "Issue an authorization code from a form submission",
    request_body(
        content = AuthorizeRequest,
        content_type = "application/x-www-form-urlencoded",
    ),
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 302, description = "Redirect to the client with an authorization code"),
        (status = 400, description = "Unknown client, unregistered redirect_uri or unsupported response_type", body = ErrorResponse),
        (status = 401, description = "Resource owner not authenticated", body = ErrorResponse),
    )
)]
pub async fn authorize_submit(
    State(state): State<OAuth2State>,
    user: Option<Extension<AuthenticatedUser>>,
    Form(params): Form<AuthorizeRequest>,
) -> Result<Response, OAuth2Error> {
    issue_code(&state, user, params).await
}

// =============================================================================
// Helper Functions
// =============================================================================

fn grant_request(
    state: &OAuth2State,
    method: Method,
    tls: Option<Extension<TlsConnection>>,
    headers: &HeaderMap,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> GrantRequest {
    let fields = match form {
        Ok(Form(fields)) => fields,
        Err(e) => {
            tracing::debug!(error = %e, "Unreadable form body, treating as empty");
            HashMap::new()
        }
    };

    GrantRequest {
        method,
        secure: state.is_secure(tls.map(|Extension(tls)| tls), headers),
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        fields,
    }
}

async fn issue_code(
    state: &OAuth2State,
    user: Option<Extension<AuthenticatedUser>>,
    params: AuthorizeRequest,
) -> Result<Response, OAuth2Error> {
    let Some(Extension(user)) = user else {
        tracing::info!("Rejected authorize request: resource owner not authenticated");
        return Err(OAuth2Error::Unauthenticated);
    };

    let target = authorize::authorize(state.store(), &state.db, user.user_id, params).await?;
    Ok((StatusCode::FOUND, [(header::LOCATION, target.to_string())]).into_response())
}

/// Token endpoint traffic must never be cached.
fn no_store(body: impl IntoResponse) -> Response {
    (
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        body,
    )
        .into_response()
}
