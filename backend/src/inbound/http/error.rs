//! HTTP status mapping for response envelopes.
//!
//! The envelope is the body of every action response; the status code is a
//! coarse summary of its `code` for proxies and load balancers.

use actix_web::{HttpResponse, http::StatusCode};

use crate::domain::{ApiResponse, ResponseCode, TRACE_ID_HEADER, TraceId};

/// Status summarising `code`.
pub fn status_for(code: ResponseCode) -> StatusCode {
    match code {
        ResponseCode::Ok => StatusCode::OK,
        ResponseCode::InvalidCredentials => StatusCode::UNAUTHORIZED,
        ResponseCode::InsufficientPermissionMember => StatusCode::FORBIDDEN,
        ResponseCode::NotFound | ResponseCode::NoData => StatusCode::NOT_FOUND,
        ResponseCode::Duplicate
        | ResponseCode::EmailUnavailable
        | ResponseCode::StoragePreconditionFailed => StatusCode::CONFLICT,
        ResponseCode::SiteDown
        | ResponseCode::Loading
        | ResponseCode::NotLoaded
        | ResponseCode::Maintenance => StatusCode::SERVICE_UNAVAILABLE,
        ResponseCode::NotImplemented => StatusCode::NOT_IMPLEMENTED,
        code if code.is_internal() => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Render `envelope` as JSON with its summary status and the trace id in
/// scope.
pub fn envelope_response(envelope: &ApiResponse) -> HttpResponse {
    let mut builder = HttpResponse::build(status_for(envelope.code()));
    if let Some(id) = TraceId::current() {
        builder.insert_header((TRACE_ID_HEADER, id.to_string()));
    }
    builder.json(envelope)
}
