//! Coarse page protection in front of every route.
//!
//! Only the presence of a `session_token` cookie is looked at; whether the
//! session is still valid is decided later by the session manager.

use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tracing::debug;

use crate::auth::cookies::{read_cookie, SESSION_COOKIE};

const PUBLIC_PATHS: [&str; 4] = ["/", "/login", "/register", "/forgot-password"];
const AUTH_PAGES: [&str; 2] = ["/login", "/register"];
const EXCLUDED_PREFIXES: [&str; 4] = ["/api", "/static", "/assets", "/favicon.ico"];
const PROTECTED_PREFIX: &str = "/dashboard";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Redirect(String),
}

fn is_excluded(path: &str) -> bool {
    EXCLUDED_PREFIXES.iter().any(|p| {
        path.strip_prefix(p)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    })
}

/// Query-safe form of a path that leaves `/` readable.
fn encode_redirect_target(path: &str) -> String {
    urlencoding::encode(path).replace("%2F", "/")
}

pub fn decide(path: &str, has_session_cookie: bool) -> GateDecision {
    if is_excluded(path) {
        return GateDecision::Pass;
    }
    if PUBLIC_PATHS.contains(&path) {
        if has_session_cookie && AUTH_PAGES.contains(&path) {
            return GateDecision::Redirect(PROTECTED_PREFIX.to_string());
        }
        return GateDecision::Pass;
    }
    if path.starts_with(PROTECTED_PREFIX) && !has_session_cookie {
        return GateDecision::Redirect(format!(
            "/login?redirect={}",
            encode_redirect_target(path)
        ));
    }
    GateDecision::Pass
}

pub async fn access_gate(request: Request, next: Next) -> Response {
    let has_cookie = read_cookie(request.headers(), SESSION_COOKIE).is_some();
    match decide(request.uri().path(), has_cookie) {
        GateDecision::Pass => next.run(request).await,
        GateDecision::Redirect(to) => {
            debug!(path = %request.uri().path(), %to, "gate redirect");
            Redirect::temporary(&to).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{header::LOCATION, Request, StatusCode},
        routing::get,
        Router,
    };
    use tower::ServiceExt;

    #[test]
    fn anonymous_dashboard_goes_to_login_with_return_path() {
        assert_eq!(
            decide("/dashboard/projects", false),
            GateDecision::Redirect("/login?redirect=/dashboard/projects".into())
        );
        assert_eq!(
            decide("/dashboard", false),
            GateDecision::Redirect("/login?redirect=/dashboard".into())
        );
    }

    #[test]
    fn logged_in_user_is_sent_away_from_auth_pages() {
        assert_eq!(decide("/login", true), GateDecision::Redirect("/dashboard".into()));
        assert_eq!(decide("/register", true), GateDecision::Redirect("/dashboard".into()));
        assert_eq!(decide("/forgot-password", true), GateDecision::Pass);
        assert_eq!(decide("/", true), GateDecision::Pass);
    }

    #[test]
    fn public_and_unmatched_paths_pass() {
        for path in ["/", "/login", "/register", "/forgot-password", "/pricing"] {
            assert_eq!(decide(path, false), GateDecision::Pass, "{path}");
        }
        assert_eq!(decide("/dashboard/team", true), GateDecision::Pass);
    }

    #[test]
    fn excluded_prefixes_bypass_the_gate() {
        assert_eq!(decide("/api/auth/me", false), GateDecision::Pass);
        assert_eq!(decide("/static/app.css", false), GateDecision::Pass);
        assert_eq!(decide("/favicon.ico", false), GateDecision::Pass);
        assert_eq!(decide("/api", false), GateDecision::Pass);
    }

    #[test]
    fn redirect_target_is_query_safe() {
        assert_eq!(
            decide("/dashboard/a b&c", false),
            GateDecision::Redirect("/login?redirect=/dashboard/a%20b%26c".into())
        );
    }

    async fn page() -> &'static str {
        "page"
    }

    #[tokio::test]
    async fn middleware_redirects_and_passes() {
        let app = Router::new()
            .route("/dashboard/projects", get(page))
            .route("/login", get(page))
            .layer(axum::middleware::from_fn(access_gate));

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/dashboard/projects")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response.headers()[LOCATION],
            "/login?redirect=/dashboard/projects"
        );

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/login")
                    .header("cookie", "session_token=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.headers()[LOCATION], "/dashboard");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/dashboard/projects")
                    .header("cookie", "session_token=abc")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
