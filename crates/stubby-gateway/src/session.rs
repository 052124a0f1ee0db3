use axum::extract::{Request, State};
use axum::http::header::{COOKIE, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use cookie::Cookie;
use tracing::warn;

use crate::error::Result;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// Resolves the caller's identity and exposes it as a `UserId` extension.
///
/// A missing or rejected cookie silently yields a fresh identity, whose token
/// is set on the response.
pub async fn session_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let token = session_token(request.headers());
    let identity = state.shortener().identify(token.as_deref())?;

    request.extensions_mut().insert(identity.user_id);
    let mut response = next.run(request).await;

    if let Some(token) = identity.issued_token {
        let cookie = Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .build();
        match HeaderValue::from_str(&cookie.to_string()) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(err) => warn!(error = %err, "session cookie is not a valid header value"),
        }
    }

    Ok(response)
}

fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(|cookie| cookie.ok())
        .find(|cookie| cookie.name() == SESSION_COOKIE)
        .map(|cookie| cookie.value().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookies: &[&str]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for cookie in cookies {
            headers.append(COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        headers
    }

    #[test]
    fn finds_session_among_other_cookies() {
        let headers = headers(&["theme=dark; session=abc+/def", "lang=en"]);
        assert_eq!(session_token(&headers).as_deref(), Some("abc+/def"));
    }

    #[test]
    fn missing_session_cookie() {
        assert_eq!(session_token(&headers(&["theme=dark"])), None);
        assert_eq!(session_token(&HeaderMap::new()), None);
    }
}
