//! Anonymous session cookie
//!
//! Panelists are identified only by a random key in the `tasex_session`
//! cookie. A visitor without a valid cookie gets a new key, which the
//! response hands back through `Set-Cookie`.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{
        header::{COOKIE, SET_COOKIE},
        request::Parts,
        HeaderValue,
    },
    response::Response,
};
use std::convert::Infallible;

use crate::wizard::SessionKey;

pub const SESSION_COOKIE: &str = "tasex_session";

/// Session key of the current visitor
#[derive(Debug, Clone)]
pub struct AnonymousSession {
    pub key: SessionKey,
    /// True when the key was generated for this request
    pub is_new: bool,
}

impl AnonymousSession {
    /// Attach `Set-Cookie` to a response when the key is new
    pub fn apply(&self, mut response: Response) -> Response {
        if self.is_new {
            let cookie = format!(
                "{}={}; Path=/; HttpOnly; SameSite=Lax",
                SESSION_COOKIE, self.key
            );
            if let Ok(value) = HeaderValue::from_str(&cookie) {
                response.headers_mut().append(SET_COOKIE, value);
            }
        }
        response
    }
}

/// Find a cookie value in the request's `Cookie` headers
fn cookie_value<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value)
}

#[async_trait]
impl<S> FromRequestParts<S> for AnonymousSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match cookie_value(parts, SESSION_COOKIE).and_then(SessionKey::parse) {
            Some(key) => Ok(Self { key, is_new: false }),
            None => Ok(Self {
                key: SessionKey::generate(),
                is_new: true,
            }),
        }
    }
}
