use std::str::FromStr;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName},
    middleware::Next,
    response::Response,
};
use shared::config::server::Config;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::middleware::request_context::RequestContext;

/// Reads the profile id forwarded by the upstream auth provider.
#[derive(Clone, Debug)]
pub struct AuthState {
    header: HeaderName,
}

impl AuthState {
    pub fn from_config(config: &Config) -> Self {
        let header = HeaderName::from_str(&config.auth.profile_header)
            .unwrap_or_else(|_| HeaderName::from_static("x-huddle-profile"));
        Self { header }
    }
}

/// Attaches the caller's profile id to the request context. Requests without
/// a valid identity pass through unauthenticated; handlers decide whether
/// that is acceptable.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let profile_id = extract_profile_id(req.headers(), &state.header);

    if let Some(context) = req.extensions_mut().get_mut::<RequestContext>() {
        context.profile_id = profile_id;
    } else {
        req.extensions_mut().insert(RequestContext {
            request_id: String::new(),
            profile_id,
        });
    }

    debug!(
        path = req.uri().path(),
        authenticated = profile_id.is_some(),
        "auth middleware processed request"
    );
    next.run(req).await
}

fn extract_profile_id(headers: &HeaderMap, header: &HeaderName) -> Option<Uuid> {
    let raw = headers.get(header)?.to_str().ok()?.trim();
    match Uuid::parse_str(raw) {
        Ok(id) => Some(id),
        Err(_) => {
            warn!(header = %header, "ignoring malformed profile header");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn header() -> HeaderName {
        HeaderName::from_static("x-huddle-profile")
    }

    #[test]
    fn parses_valid_profile_header() {
        let id = Uuid::new_v4();
        let mut headers = HeaderMap::new();
        headers.insert(header(), HeaderValue::from_str(&id.to_string()).unwrap());

        assert_eq!(extract_profile_id(&headers, &header()), Some(id));
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_profile_id(&headers, &header()), None);

        headers.insert(header(), HeaderValue::from_static("not-a-uuid"));
        assert_eq!(extract_profile_id(&headers, &header()), None);
    }
}
