//! `Authorization` header parsing.

use base64::{Engine, engine::general_purpose::STANDARD};
use thiserror::Error;

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// HTTP Basic client authentication
    Basic {
        client_id: String,
        client_secret: String,
    },
    /// Bearer access token
    Bearer(String),
}

// Secrets stay out of debug output.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Basic { client_id, .. } => f
                .debug_struct("Basic")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            Credentials::Bearer(_) => f.write_str("Bearer(..)"),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("Authorization header is missing")]
    Missing,
    #[error("Unsupported authorization scheme")]
    UnsupportedScheme,
    #[error("Malformed authorization header")]
    Malformed,
}

impl Credentials {
    /// Parse `<scheme> <value>`; the scheme is matched case-insensitively.
    pub fn parse(header: Option<&str>) -> Result<Self, CredentialsError> {
        let header = header.ok_or(CredentialsError::Missing)?;
        let mut parts = header.split_whitespace();
        let (Some(scheme), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(CredentialsError::Malformed);
        };

        if scheme.eq_ignore_ascii_case("basic") {
            let decoded = STANDARD
                .decode(value)
                .map_err(|_| CredentialsError::Malformed)?;
            let decoded = String::from_utf8(decoded).map_err(|_| CredentialsError::Malformed)?;
            let (client_id, client_secret) = decoded
                .split_once(':')
                .ok_or(CredentialsError::Malformed)?;
            Ok(Credentials::Basic {
                client_id: client_id.to_string(),
                client_secret: client_secret.to_string(),
            })
        } else if scheme.eq_ignore_ascii_case("bearer") {
            Ok(Credentials::Bearer(value.to_string()))
        } else {
            Err(CredentialsError::UnsupportedScheme)
        }
    }

    /// Client id and secret from a Basic header.
    pub fn basic(header: Option<&str>) -> Result<(String, String), CredentialsError> {
        match Self::parse(header)? {
            Credentials::Basic {
                client_id,
                client_secret,
            } => Ok((client_id, client_secret)),
            Credentials::Bearer(_) => Err(CredentialsError::UnsupportedScheme),
        }
    }

    /// Access token from a Bearer header.
    pub fn bearer(header: Option<&str>) -> Result<String, CredentialsError> {
        match Self::parse(header)? {
            Credentials::Bearer(token) => Ok(token),
            Credentials::Basic { .. } => Err(CredentialsError::UnsupportedScheme),
        }
    }
}

/// Build a Basic header value for `client_id:client_secret`.
pub fn basic_header(client_id: &str, client_secret: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{client_id}:{client_secret}")))
}
