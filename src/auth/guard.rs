//! Route guards: extractors that resolve the session token before a handler
//! body runs. Handlers opt in by taking [`SessionClaims`] (any authenticated
//! account) or [`Doctor`] (doctor role required) as an argument; a failed
//! check rejects the request with 401/403 instead of reaching the handler.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{AUTHORIZATION, COOKIE},
        request::Parts,
        HeaderMap,
    },
};
use chrono::Utc;
use tracing::debug;

use crate::api::error::ApiError;
use crate::auth::token::{Role, SessionClaims, TokenSigner};

pub const SESSION_COOKIE_NAME: &str = "cadrisk_session";

/// Pull the session token out of the `Authorization: Bearer` header or the
/// session cookie, preferring the header.
#[must_use]
pub fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE_NAME && !value.is_empty()).then(|| value.to_string())
        })
        .next()
}

#[async_trait]
impl<S> FromRequestParts<S> for SessionClaims
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let signer = parts
            .extensions
            .get::<TokenSigner>()
            .ok_or(ApiError::ServiceUnavailable)?;

        let token = extract_session_token(&parts.headers).ok_or(ApiError::Unauthorized)?;

        signer.verify(&token, Utc::now()).map_err(|err| {
            debug!("session token rejected: {err}");
            ApiError::Unauthorized
        })
    }
}

/// Doctor-only guard: a valid session of any other role is rejected with
/// 403, an observable refusal rather than a redirect to the caller's data.
#[derive(Debug, Clone)]
pub struct Doctor(pub SessionClaims);

#[async_trait]
impl<S> FromRequestParts<S> for Doctor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let claims = SessionClaims::from_request_parts(parts, state).await?;

        if claims.role != Role::Doctor {
            return Err(ApiError::Forbidden);
        }

        Ok(Self(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_bearer_token_wins() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        headers.insert(
            COOKIE,
            HeaderValue::from_static("cadrisk_session=cookie-token"),
        );

        assert_eq!(
            extract_session_token(&headers).as_deref(),
            Some("abc.def.ghi")
        );
    }

    #[test]
    fn test_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; cadrisk_session=tok123; lang=en"),
        );

        assert_eq!(extract_session_token(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_missing_or_empty() {
        assert_eq!(extract_session_token(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("cadrisk_session="));
        assert_eq!(extract_session_token(&headers), None);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(extract_session_token(&headers), None);
    }
}
