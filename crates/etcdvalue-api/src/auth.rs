//! HTTP basic authentication for every route.

use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use tracing::warn;

use etcdvalue_core::AuthConfig;

use crate::ApiState;

pub const CHALLENGE: &str = "Basic realm=Restricted";

/// Reject requests without matching credentials. A no-op unless both a
/// username and a password are configured.
pub async fn basic_auth(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    if !state.auth.enabled() || authorized(&state.auth, request.headers()) {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "rejecting request without valid credentials");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, CHALLENGE)],
        "Unauthorized\n",
    )
        .into_response()
}

fn authorized(auth: &AuthConfig, headers: &HeaderMap) -> bool {
    credentials(headers).is_some_and(|(user, pass)| {
        // Both comparisons always run.
        let user_ok = constant_time_eq(user.as_bytes(), auth.username.as_bytes());
        let pass_ok = constant_time_eq(pass.as_bytes(), auth.password.as_bytes());
        user_ok & pass_ok
    })
}

/// Byte comparison whose running time depends only on the lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let diff = a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y));
    std::hint::black_box(diff) == 0
}

/// Decode `Authorization: Basic base64(user:pass)`.
fn credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = BASE64_STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (user, pass) = decoded.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    fn auth() -> AuthConfig {
        AuthConfig {
            username: "prom".into(),
            password: "s3cret:x".into(),
        }
    }

    #[test]
    fn decodes_basic_credentials() {
        let encoded = BASE64_STANDARD.encode("prom:s3cret:x");
        assert_eq!(
            credentials(&headers(&format!("Basic {encoded}"))),
            Some(("prom".into(), "s3cret:x".into()))
        );
        assert!(authorized(&auth(), &headers(&format!("basic {encoded}"))));
    }

    #[test]
    fn constant_time_eq_compares_bytes() {
        assert!(constant_time_eq(b"s3cret", b"s3cret"));
        assert!(!constant_time_eq(b"s3cret", b"s3creT"));
        assert!(!constant_time_eq(b"s3cret", b"s3cre"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn rejects_wrong_or_malformed_credentials() {
        let wrong = BASE64_STANDARD.encode("prom:nope");
        assert!(!authorized(&auth(), &headers(&format!("Basic {wrong}"))));
        assert!(!authorized(&auth(), &headers("Basic !!!not-base64")));
        assert!(!authorized(&auth(), &headers("Bearer abc")));
        assert!(!authorized(&auth(), &HeaderMap::new()));
    }
}
