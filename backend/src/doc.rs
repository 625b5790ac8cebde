//! OpenAPI documentation configuration.
//!
//! [`ApiDoc`] registers the HTTP endpoints of the inbound layer (health
//! probes and the API-mode action endpoint) with the envelope schemas and
//! the bearer credential scheme. The document backs Swagger UI in debug
//! builds and is exported via `cargo run --bin openapi-dump`.

use crate::domain::{
    ActionRequest, ActionType, ApiResponse, ResponseCode, ResponseType, SiteInfoView, UserView,
};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Enrich the generated document with the bearer security scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(utoipa::openapi::Components::default);

        components.add_security_scheme(
            "BearerToken",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some("Token issued by the realtime signin method."))
                    .build(),
            ),
        );
    }
}

/// OpenAPI document for the HTTP surface.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Site hub API",
        description = "API-mode account actions and health probes."
    ),
    servers(
        (url = "/", description = "Relative to the deployment base URL")
    ),
    paths(
        crate::inbound::http::actions::run_action,
        crate::inbound::http::health::ready,
        crate::inbound::http::health::live,
    ),
    components(schemas(
        ActionRequest,
        ActionType,
        ApiResponse,
        ResponseCode,
        ResponseType,
        SiteInfoView,
        UserView
    )),
    tags(
        (name = "actions", description = "Account actions over an API credential"),
        (name = "health", description = "Endpoints for health checks")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;
    use utoipa::openapi::RefOr;
    use utoipa::openapi::schema::Schema;

    fn schema<'a>(doc: &'a utoipa::openapi::OpenApi, name: &str) -> &'a RefOr<Schema> {
        doc.components
            .as_ref()
            .expect("components")
            .schemas
            .get(name)
            .unwrap_or_else(|| panic!("{name} schema registered"))
    }

    #[test]
    fn envelope_schema_matches_the_wire_names() {
        let doc = ApiDoc::openapi();
        match schema(&doc, "ApiResponse") {
            RefOr::T(Schema::Object(obj)) => {
                for field in ["codeText", "code", "message", "data"] {
                    assert!(obj.properties.contains_key(field), "missing {field}");
                }
            }
            _ => panic!("expected Object schema"),
        }
    }

    #[test]
    fn documents_every_endpoint_and_the_bearer_scheme() {
        let doc = ApiDoc::openapi();
        for path in ["/api/v1/actions", "/health/ready", "/health/live"] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
        let components = doc.components.as_ref().expect("components");
        assert!(components.security_schemes.contains_key("BearerToken"));
    }
}
