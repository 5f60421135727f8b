use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
};

#[derive(OpenApi)]
/// OpenAPI document for the WAN Show bingo backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::chat_stream,
        crate::routes::sse::host_stream,
        crate::routes::aggregate::current_show,
        crate::routes::aggregate::push_aggregate,
        crate::routes::shows::latest_show,
        crate::routes::shows::show_by_id,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::aggregate::Aggregate,
            crate::dto::show::ShowSummary,
            crate::dto::sse::TimerExpiredEvent,
            crate::dto::sse::TileConfirmEvent,
            crate::dto::sse::ChatMessageEvent,
            crate::dao::models::ShowState,
        )
    ),
    modifiers(&HostPasswordAuth),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "aggregate", description = "Feed snapshot ingestion"),
        (name = "shows", description = "Persisted shows"),
    )
)]
pub struct ApiDoc;

/// Registers the bearer scheme used by snapshot pushes.
struct HostPasswordAuth;

impl Modify for HostPasswordAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "host_password",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sse/chat",
            "/sse/host",
            "/aggregate",
            "/shows/latest",
            "/shows/{id}",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
