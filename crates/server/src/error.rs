use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use sea_orm::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Failures raised by the credential store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),
    #[error("Generated {0} collided with an existing record")]
    IdentifierCollision(&'static str),
    #[error("Record was already revoked")]
    AlreadyRevoked,
    #[error("Secret derivation failed: {0}")]
    Kdf(String),
    #[error("Entropy source failed: {0}")]
    Entropy(String),
    #[error("Invalid redirect URI: {0}")]
    InvalidRedirectUri(String),
    #[error("Redirect URI {0} is already registered for this client")]
    DuplicateRedirectUri(String),
}

impl StoreError {
    /// A fresh attempt may succeed; nothing was persisted.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::IdentifierCollision(_))
    }

    /// Maps unique-constraint violations on insert to a collision on `what`.
    pub(crate) fn from_insert(err: DbErr, what: &'static str) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => StoreError::IdentifierCollision(what),
            _ => StoreError::Database(err),
        }
    }
}

/// Rejection classes a caller can branch on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Request did not arrive over an encrypted transport.
    Transport,
    /// Wrong HTTP method.
    Method,
    /// Missing, malformed or invalid client (or user) credentials.
    ClientAuth,
    /// A required field is missing or a value is malformed.
    RequestShape,
    /// Grant type not supported.
    GrantType,
    /// Unknown, expired or revoked token or code.
    Token,
    /// Token or code does not belong to the authenticated client or stated user.
    OwnershipMismatch,
    /// No authenticated resource owner on an authorize request.
    ResourceOwner,
    /// Store failure.
    Internal,
}

/// A terminal rejection of an OAuth2 request.
#[derive(Debug, Error)]
pub enum OAuth2Error {
    #[error("This endpoint only supports the POST method, got {0}.")]
    MethodNotAllowed(String),
    #[error("OAuth2 requires all requests to be made via HTTPS.")]
    InsecureTransport,
    #[error("Invalid client credentials.")]
    MissingClientCredentials,
    #[error("Invalid client credentials.")]
    InvalidClientCredentials,
    #[error("Username and password are invalid.")]
    InvalidUserCredentials,
    #[error("The {0} field is required.")]
    MissingParameter(&'static str),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("{}", unsupported_grant_description(.0.as_deref()))]
    UnsupportedGrantType(Option<String>),
    #[error("{0}")]
    InvalidToken(String),
    #[error("{0}")]
    OwnershipMismatch(String),
    #[error("The resource owner is not authenticated.")]
    Unauthenticated,
    #[error(transparent)]
    Store(#[from] StoreError),
}

fn unsupported_grant_description(grant_type: Option<&str>) -> String {
    match grant_type {
        Some(grant_type) => format!(
            "Only password, refresh_token and authorization_code grant types are supported, got {grant_type}."
        ),
        None => "The grant_type field is required.".to_string(),
    }
}

impl From<DbErr> for OAuth2Error {
    fn from(err: DbErr) -> Self {
        OAuth2Error::Store(StoreError::Database(err))
    }
}

impl OAuth2Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OAuth2Error::MethodNotAllowed(_) => ErrorKind::Method,
            OAuth2Error::InsecureTransport => ErrorKind::Transport,
            OAuth2Error::MissingClientCredentials
            | OAuth2Error::InvalidClientCredentials
            | OAuth2Error::InvalidUserCredentials => ErrorKind::ClientAuth,
            OAuth2Error::MissingParameter(_) | OAuth2Error::InvalidRequest(_) => {
                ErrorKind::RequestShape
            }
            OAuth2Error::UnsupportedGrantType(_) => ErrorKind::GrantType,
            OAuth2Error::InvalidToken(_) => ErrorKind::Token,
            OAuth2Error::OwnershipMismatch(_) => ErrorKind::OwnershipMismatch,
            OAuth2Error::Unauthenticated => ErrorKind::ResourceOwner,
            OAuth2Error::Store(_) => ErrorKind::Internal,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            OAuth2Error::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            OAuth2Error::MissingClientCredentials
            | OAuth2Error::InvalidUserCredentials
            | OAuth2Error::InvalidToken(_)
            | OAuth2Error::Unauthenticated => StatusCode::UNAUTHORIZED,
            OAuth2Error::Store(e) if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            OAuth2Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }

    /// Stable machine-readable `error` code.
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuth2Error::MethodNotAllowed(_)
            | OAuth2Error::InsecureTransport
            | OAuth2Error::MissingParameter(_)
            | OAuth2Error::InvalidRequest(_) => "invalid_request",
            OAuth2Error::MissingClientCredentials
            | OAuth2Error::InvalidClientCredentials
            | OAuth2Error::InvalidUserCredentials
            | OAuth2Error::OwnershipMismatch(_) => "invalid_client",
            OAuth2Error::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuth2Error::InvalidToken(_) => "invalid_token",
            OAuth2Error::Unauthenticated => "unauthorized_client",
            OAuth2Error::Store(e) if e.is_retryable() => "temporarily_unavailable",
            OAuth2Error::Store(_) => "server_error",
        }
    }

    fn description(&self) -> String {
        match self {
            // Store internals stay in the logs.
            OAuth2Error::Store(e) if e.is_retryable() => {
                "The request could not be completed, retry it.".to_string()
            }
            OAuth2Error::Store(_) => "Internal server error.".to_string(),
            other => other.to_string(),
        }
    }

    pub fn to_response_body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            error_description: self.description(),
        }
    }
}

/// JSON error body returned by every OAuth2 endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: String,
}

impl IntoResponse for OAuth2Error {
    fn into_response(self) -> Response {
        if let OAuth2Error::Store(ref e) = self {
            tracing::error!(retryable = e.is_retryable(), "OAuth2 store failure: {e}");
        }

        let mut response = (self.status_code(), Json(self.to_response_body())).into_response();
        let challenge = match self {
            OAuth2Error::MissingClientCredentials => Some("Basic realm=\"oauth2\""),
            OAuth2Error::InvalidToken(_) => Some("Bearer error=\"invalid_token\""),
            _ => None,
        };
        if let Some(challenge) = challenge {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        response
    }
}
