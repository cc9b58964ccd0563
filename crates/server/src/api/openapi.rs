//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        let basic = HttpBuilder::new()
            .scheme(HttpAuthScheme::Basic)
            .description(Some(
                "`client_id:client_secret` as issued by `manage-clients create`.",
            ))
            .build();
        components.add_security_scheme("client_basic", SecurityScheme::Http(basic));

        let bearer = HttpBuilder::new()
            .scheme(HttpAuthScheme::Bearer)
            .description(Some(
                "Access token obtained from the `/oauth2/token` endpoint.",
            ))
            .build();
        components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));
    }
}

/// OpenAPI documentation configuration.
///
/// The token endpoint is routed for every method, so it is listed here
/// rather than collected by the router.
#[derive(OpenApi)]
#[openapi(
    paths(crate::oauth2::endpoints::token),
    modifiers(&SecurityAddon),
    info(
        title = "OAuth2 Provider API",
        version = "1.0.0",
        description = "OAuth2 authorization server: password, refresh token and authorization code grants."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 authorization server endpoints")
    )
)]
pub struct ApiDoc;
