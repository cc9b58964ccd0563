//! Liveness probe.

/// Tag for OpenAPI documentation.
pub const MISC_TAG: &str = "Miscellaneous";

#[tracing::instrument()]
#[utoipa::path(
    method(get, head),
    path = "/healthz",
    tag = MISC_TAG,
    operation_id = "Health Check",
    summary = "Service health check",
    description = "Returns `ok` while the process is accepting requests. Does not touch the database.",
    responses(
        (status = 200, description = "Service is up", body = str, content_type = "text/plain", example = "ok")
    )
)]
pub async fn health() -> &'static str {
    "ok"
}
