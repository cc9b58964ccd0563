//! Authorization-code flow: redirect URI resolution and code issuance.

use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Deserialize;
use url::Url;
use utoipa::{IntoParams, ToSchema};

use crate::error::OAuth2Error;
use crate::oauth2::revocable::Revocable;
use crate::oauth2::store::CredentialStore;

/// Authorization request parameters (query string or form body).
#[derive(Clone, Debug, Default, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeRequest {
    /// Must be `code`
    pub response_type: Option<String>,
    pub client_id: Option<String>,
    /// Optional when the client registered exactly one redirect URI
    pub redirect_uri: Option<String>,
    /// Opaque value echoed back on the redirect
    pub state: Option<String>,
}

/// Pick the redirect target for an authorization response.
///
/// With exactly one registered URI an absent or identical `supplied` value
/// selects it; otherwise `supplied` must match a registered URI exactly.
pub fn resolve_redirect_uri<'a>(
    registered: &'a [String],
    supplied: Option<&str>,
) -> Result<&'a str, OAuth2Error> {
    if let [only] = registered
        && supplied.is_none_or(|s| s == only.as_str())
    {
        return Ok(only.as_str());
    }

    supplied
        .and_then(|s| registered.iter().find(|r| *r == s))
        .map(String::as_str)
        .ok_or_else(|| {
            tracing::info!(
                registered = registered.len(),
                supplied = supplied.is_some(),
                "Rejected authorize request: redirect_uri not registered"
            );
            OAuth2Error::InvalidRequest("Redirect URI validation failed.".into())
        })
}

/// Issue an authorization code for `user_id` and return the redirect target
/// carrying `code` (and `state` when supplied).
#[tracing::instrument(skip_all, fields(client_id = request.client_id.as_deref(), user_id = user_id))]
pub async fn authorize(
    store: &CredentialStore,
    db: &DatabaseConnection,
    user_id: i64,
    request: AuthorizeRequest,
) -> Result<Url, OAuth2Error> {
    let (Some(client_id), Some(response_type)) = (&request.client_id, &request.response_type)
    else {
        tracing::info!("Rejected authorize request: missing client_id or response_type");
        return Err(OAuth2Error::InvalidRequest(
            "Both client_id and response_type are required.".into(),
        ));
    };

    let txn = db.begin().await?;

    let client = match store.find_client(&txn, client_id).await? {
        Some(client) if !client.is_revoked() => client,
        _ => {
            tracing::info!("Rejected authorize request: unknown or revoked client");
            return Err(OAuth2Error::InvalidRequest("Invalid client_id.".into()));
        }
    };

    let registered = store.redirect_uris(&txn, &client.id).await?;
    let redirect_uri = resolve_redirect_uri(&registered, request.redirect_uri.as_deref())?;

    match response_type.as_str() {
        "code" => {}
        "token" => {
            tracing::info!("Rejected authorize request: implicit grant not supported");
            return Err(OAuth2Error::InvalidRequest(
                "The implicit grant (response_type=token) is not supported.".into(),
            ));
        }
        other => {
            tracing::info!(response_type = other, "Rejected authorize request: unknown response_type");
            return Err(OAuth2Error::InvalidRequest(format!(
                "Unsupported response_type: {other}"
            )));
        }
    }

    let mut target = Url::parse(redirect_uri).map_err(|e| {
        tracing::info!(error = %e, "Rejected authorize request: unparseable redirect_uri");
        OAuth2Error::InvalidRequest("Redirect URI validation failed.".into())
    })?;

    let code = store
        .issue_authorization_code(&txn, &client.id, user_id, redirect_uri)
        .await?;
    txn.commit().await?;

    {
        let mut query = target.query_pairs_mut();
        query.append_pair("code", &code.authcode);
        if let Some(state) = &request.state {
            query.append_pair("state", state);
        }
    }

    tracing::info!("Issued authorization code");
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uris(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn zero_registered_always_rejects() {
        let none = uris(&[]);
        assert!(resolve_redirect_uri(&none, None).is_err());
        assert!(resolve_redirect_uri(&none, Some("https://a.example/cb")).is_err());
    }

    #[test]
    fn single_registered_is_auto_selected() {
        let one = uris(&["https://a.example/cb"]);
        assert_eq!(resolve_redirect_uri(&one, None).unwrap(), "https://a.example/cb");
        assert_eq!(
            resolve_redirect_uri(&one, Some("https://a.example/cb")).unwrap(),
            "https://a.example/cb"
        );
        assert!(resolve_redirect_uri(&one, Some("https://evil.example/cb")).is_err());
    }

    #[test]
    fn several_registered_require_exact_match() {
        let two = uris(&["https://a.example/cb", "https://b.example/cb"]);
        assert!(resolve_redirect_uri(&two, None).is_err());
        assert_eq!(
            resolve_redirect_uri(&two, Some("https://b.example/cb")).unwrap(),
            "https://b.example/cb"
        );
        assert!(resolve_redirect_uri(&two, Some("https://b.example/cb/")).is_err());
    }
}
