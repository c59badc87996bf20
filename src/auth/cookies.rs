use std::{convert::Infallible, fmt};

use axum::{
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    response::{IntoResponseParts, ResponseParts},
};
use time::Duration;

pub const SESSION_COOKIE: &str = "session_token";
pub const WORKSPACE_COOKIE: &str = "current_workspace_id";

/// Value of the first cookie called `name` across all `Cookie` headers.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
        .filter(|v| !v.is_empty())
}

/// A `Set-Cookie` header scoped to the whole site, HTTP-only and `SameSite=Lax`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCookie {
    pub name: &'static str,
    pub value: String,
    pub max_age: Duration,
    pub secure: bool,
}

impl SetCookie {
    pub fn new(name: &'static str, value: impl Into<String>, max_age: Duration, secure: bool) -> Self {
        Self {
            name,
            value: value.into(),
            max_age,
            secure,
        }
    }

    /// Instructs the browser to drop the cookie.
    pub fn removal(name: &'static str, secure: bool) -> Self {
        Self::new(name, "", Duration::ZERO, secure)
    }
}

impl fmt::Display for SetCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}={}; Path=/; Max-Age={}; HttpOnly; SameSite=Lax",
            self.name,
            self.value,
            self.max_age.whole_seconds().max(0)
        )?;
        if self.secure {
            f.write_str("; Secure")?;
        }
        Ok(())
    }
}

impl IntoResponseParts for SetCookie {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        match HeaderValue::from_str(&self.to_string()) {
            Ok(v) => {
                res.headers_mut().append(SET_COOKIE, v);
            }
            Err(e) => tracing::error!(error = %e, cookie = self.name, "unencodable cookie"),
        }
        Ok(res)
    }
}
