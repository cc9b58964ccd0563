//! Shared state handed to the OAuth2 endpoints.

use std::sync::Arc;

use axum::http::HeaderMap;
use sea_orm::DatabaseConnection;

use crate::config::OAuth2Config;
use crate::error::StoreError;
use crate::oauth2::auth_check::AuthCheck;
use crate::oauth2::grant::GrantEngine;
use crate::oauth2::store::CredentialStore;

/// Request extension marking a connection that was accepted over TLS.
///
/// Only a TLS-terminating listener may insert it; nothing the client sends
/// can produce it.
#[derive(Clone, Copy, Debug, Default)]
pub struct TlsConnection;

#[derive(Clone)]
pub struct OAuth2State {
    pub db: Arc<DatabaseConnection>,
    pub engine: GrantEngine,
    /// Honour `X-Forwarded-Proto` when deciding whether a request was encrypted
    pub trust_forwarded_proto: bool,
}

impl OAuth2State {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &OAuth2Config,
        auth_check: Arc<dyn AuthCheck>,
    ) -> Result<Self, StoreError> {
        Ok(Self {
            db,
            engine: GrantEngine::new(config, auth_check)?,
            trust_forwarded_proto: config.trust_forwarded_proto,
        })
    }

    pub fn store(&self) -> &CredentialStore {
        self.engine.store()
    }

    /// Whether the request arrived over TLS, directly or via a trusted proxy.
    ///
    /// The request target is never consulted: an HTTP/1.1 client may send an
    /// absolute-form `https://` target over a plaintext socket.
    pub fn is_secure(&self, tls: Option<TlsConnection>, headers: &HeaderMap) -> bool {
        if tls.is_some() {
            return true;
        }
        self.trust_forwarded_proto
            && headers
                .get("x-forwarded-proto")
                .and_then(|v| v.to_str().ok())
                .is_some_and(|proto| proto.eq_ignore_ascii_case("https"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KdfConfig;
    use crate::oauth2::auth_check::ConfiguredUsers;
    use axum::http::HeaderValue;

    fn state(trust_forwarded_proto: bool) -> OAuth2State {
        let config = OAuth2Config {
            trust_forwarded_proto,
            kdf: KdfConfig {
                memory_cost: 1024,
                time_cost: 1,
                parallelism: 1,
                output_len: 32,
            },
            ..OAuth2Config::default()
        };
        OAuth2State::new(
            Arc::new(DatabaseConnection::Disconnected),
            &config,
            Arc::new(ConfiguredUsers::new(Vec::new())),
        )
        .unwrap()
    }

    fn forwarded(proto: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static(proto));
        headers
    }

    #[test]
    fn tls_connection_is_secure() {
        assert!(state(false).is_secure(Some(TlsConnection), &HeaderMap::new()));
        assert!(!state(false).is_secure(None, &HeaderMap::new()));
    }

    #[test]
    fn forwarded_proto_needs_trust() {
        assert!(!state(false).is_secure(None, &forwarded("https")));
        assert!(state(true).is_secure(None, &forwarded("HTTPS")));
        assert!(!state(true).is_secure(None, &forwarded("http")));
    }
}
