/// Session and bearer-token authentication
///
/// [`resolve_principal`] runs on every request. It looks for an
/// `Authorization: Bearer` API token first, then for the session cookie, and
/// on success stores the [`Principal`] (and, for cookies, the live
/// [`Session`]) in the request extensions. It never rejects a request;
/// guards further in decide what an anonymous request may reach.
///
/// [`require_auth`] is the guard for page routes: anonymous `GET`s are sent
/// to the login page with a `from` target, anything else gets 401.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use cookie::time::Duration;
use modest_shared::auth::principal::Principal;
use tracing::debug;

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};

/// Resolves the request's principal, if any
pub async fn resolve_principal(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let bearer = bearer_token(req.headers()).map(str::to_string);
    let cookie = session_cookie(
        &CookieJar::from_headers(req.headers()),
        &state.config.session.cookie_name,
    );

    if let Some(token) = bearer {
        if let Some(principal) = state.accounts.resolve_api_token(&token).await? {
            req.extensions_mut().insert(principal);
        }
    } else if let Some(session_id) = cookie {
        if let Some((principal, session)) = state.accounts.resolve_session(&session_id).await? {
            req.extensions_mut().insert(principal);
            req.extensions_mut().insert(session);
        } else {
            debug!("Unknown or expired session cookie");
        }
    }

    Ok(next.run(req).await)
}

/// Rejects anonymous requests to page routes
pub async fn require_auth(req: Request, next: Next) -> Response {
    if req.extensions().get::<Principal>().is_some() {
        return next.run(req).await;
    }

    if req.method() == Method::GET {
        let target = format!("/login?from={}", req.uri().path());
        return Redirect::to(&target).into_response();
    }

    ApiError::unauthenticated().into_response()
}

/// The session id of a cookie-authenticated principal
///
/// Pages that keep per-session state (form tokens, cached prices) are not
/// available to API tokens.
pub fn session_id(principal: &Principal) -> ApiResult<&str> {
    principal
        .session_id
        .as_deref()
        .ok_or_else(|| ApiError::Unauthorized("a browser session is required".to_string()))
}

/// Token from an `Authorization: Bearer` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Value of the cookie `name`, if present and not empty
pub fn session_cookie(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty())
}

/// Cookie carrying a new session id
pub fn new_session_cookie(state: &AppState, session_id: &str) -> Cookie<'static> {
    build_cookie(state, session_id.to_string())
        .max_age(Duration::hours(state.config.session.ttl_hours))
        .build()
}

/// Cookie telling the browser to drop the session id
pub fn expired_session_cookie(state: &AppState) -> Cookie<'static> {
    let mut cookie = build_cookie(state, String::new()).build();
    cookie.make_removal();
    cookie
}

fn build_cookie(state: &AppState, value: String) -> cookie::CookieBuilder<'static> {
    Cookie::build((state.config.session.cookie_name.clone(), value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.api.production)
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::Config;
    use axum::http::HeaderValue;
    use modest_shared::{mail::MemoryMailer, oauth::IdentityProviders, store::Stores};
    use std::sync::Arc;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_session_cookie() {
        let jar = CookieJar::from_headers(&headers(&[(
            header::COOKIE,
            "theme=dark; modest_session=abc123; other=1",
        )]));
        assert_eq!(session_cookie(&jar, "modest_session").as_deref(), Some("abc123"));
        assert!(session_cookie(&jar, "missing").is_none());

        let jar = CookieJar::from_headers(&headers(&[
            (header::COOKIE, "a=1"),
            (header::COOKIE, "modest_session=xyz"),
        ]));
        assert_eq!(session_cookie(&jar, "modest_session").as_deref(), Some("xyz"));

        let jar = CookieJar::from_headers(&headers(&[(header::COOKIE, "modest_session=")]));
        assert!(session_cookie(&jar, "modest_session").is_none());
    }

    #[test]
    fn test_session_cookie_attributes() {
        let state = AppState::new(
            Config::default().validate().unwrap(),
            Stores::memory(),
            Arc::new(MemoryMailer::new()),
            IdentityProviders::new(),
            None,
        );

        let cookie = new_session_cookie(&state, "abc123").to_string();
        assert!(cookie.starts_with("modest_session=abc123"));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Path=/"));
        assert!(cookie.contains(&format!("Max-Age={}", state.config.session.ttl_hours * 3600)));
        assert!(!cookie.contains("Secure"));

        let expired = expired_session_cookie(&state).to_string();
        assert!(expired.starts_with("modest_session=;"));
        assert!(expired.contains("Max-Age=0"));
    }

    #[test]
    fn test_bearer_token() {
        let map = headers(&[(header::AUTHORIZATION, "Bearer tok.en.value")]);
        assert_eq!(bearer_token(&map), Some("tok.en.value"));

        let map = headers(&[(header::AUTHORIZATION, "Basic dXNlcjpwYXNz")]);
        assert!(bearer_token(&map).is_none());

        assert!(bearer_token(&HeaderMap::new()).is_none());
    }
}
