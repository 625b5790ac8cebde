//! API-mode action endpoint.
//!
//! ```text
//! POST /api/v1/actions
//! Authorization: Bearer <token>
//! {"action":"InternalSendEmailVerification","request":{"userId":"..."}}
//! ```
//!
//! Requests made here run with the API credential fence: user-scoped
//! actions beyond the cookie boundary are hidden, and `Internal*` actions
//! need an administrator.

use actix_web::http::header::AUTHORIZATION;
use actix_web::{HttpRequest, HttpResponse, post, web};

use crate::domain::{ActionRequest, ApiResponse};
use crate::inbound::http::error::envelope_response;
use crate::inbound::http::state::HttpState;

fn bearer_token(req: &HttpRequest) -> String {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
        .unwrap_or_default()
}

/// Run one action with an API bearer credential.
#[utoipa::path(
    post,
    path = "/api/v1/actions",
    request_body = ActionRequest,
    responses(
        (status = 200, description = "Action succeeded", body = ApiResponse),
        (status = 400, description = "Invalid request", body = ApiResponse),
        (status = 401, description = "Missing or rejected credential", body = ApiResponse),
        (status = 404, description = "Action not available to this credential", body = ApiResponse),
        (status = 409, description = "Conflicting state", body = ApiResponse),
        (status = 503, description = "System data still loading", body = ApiResponse),
        (status = 500, description = "Internal server error", body = ApiResponse)
    ),
    tags = ["actions"],
    operation_id = "runAction",
    security(("BearerToken" = []))
)]
#[post("/actions")]
pub async fn run_action(
    state: web::Data<HttpState>,
    req: HttpRequest,
    payload: web::Json<ActionRequest>,
) -> HttpResponse {
    let envelope = state
        .hub
        .api_request(bearer_token(&req), payload.into_inner())
        .await;
    envelope_response(&envelope)
}
