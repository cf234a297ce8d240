use axum::{
    http::{
        StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, HeaderValue},
    },
    response::{IntoResponse, Response},
};
use serde_json::Value;
use shared::models::ErrorResponse;

/// RFC 7807 body shared with clients through [`ErrorResponse`].
#[derive(Debug)]
pub struct ProblemDetails(ErrorResponse);

impl ProblemDetails {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        let title = status.canonical_reason().unwrap_or("Error");
        Self(ErrorResponse::new(status.as_u16(), code, message).with_title(title))
    }

    #[must_use]
    pub fn with_details(self, details: Value) -> Self {
        Self(self.0.with_details(details))
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, axum::Json(self.0)).into_response();
        response.headers_mut().insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        response
            .headers_mut()
            .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        response
    }
}
