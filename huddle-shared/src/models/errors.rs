use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Problem body returned by the server for every failed request
/// (`application/problem+json`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, ToSchema)]
pub struct ErrorResponse {
    #[serde(rename = "type", default)]
    pub problem_type: String,
    #[serde(default)]
    pub title: String,
    pub status: u16,
    /// Stable machine-readable code, e.g. `not_found`.
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<Value>,
}

impl ErrorResponse {
    /// Creates a problem body without details.
    pub fn new(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            problem_type: format!("https://huddle.chat/problems/{code}"),
            title: String::new(),
            status,
            code,
            message: message.into(),
            details: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    #[must_use]
    pub const fn has_details(&self) -> bool {
        self.details.is_some()
    }
}

impl std::fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.status, self.code, self.message)
    }
}

impl std::error::Error for ErrorResponse {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_response_new() {
        let error = ErrorResponse::new(404, "not_found", "Message not found");
        assert_eq!(error.problem_type, "https://huddle.chat/problems/not_found");
        assert_eq!(error.status, 404);
        assert!(!error.has_details());
        assert_eq!(error.to_string(), "404 not_found: Message not found");
    }

    #[test]
    fn test_error_response_deserializes_problem_json() {
        let body = json!({
            "type": "https://huddle.chat/problems/bad_request",
            "title": "Bad Request",
            "status": 400,
            "code": "bad_request",
            "message": "Channel ID missing",
        });

        let error: ErrorResponse = serde_json::from_value(body).unwrap();
        assert_eq!(error.title, "Bad Request");
        assert_eq!(error.code, "bad_request");
        assert_eq!(error.details, None);
    }

    #[test]
    fn test_error_response_details_round_trip() {
        let error = ErrorResponse::new(500, "internal_error", "database error 23505")
            .with_title("Internal Server Error")
            .with_details(json!({ "sqlstate": "23505" }));

        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "https://huddle.chat/problems/internal_error");
        assert_eq!(json["details"]["sqlstate"], "23505");

        let parsed: ErrorResponse = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, error);
    }
}
