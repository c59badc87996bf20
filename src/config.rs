use serde::Deserialize;
use uuid::Uuid;

/// Well-known workspace new users are dropped into when it exists.
pub const DEFAULT_DEMO_WORKSPACE_ID: Uuid = Uuid::from_u128(0xaaaaaaaa_aaaa_aaaa_aaaa_aaaaaaaaaaaa);

#[derive(Debug, Clone, Deserialize)]
pub struct CookieConfig {
    pub secure: bool,
    pub session_ttl_days: i64,
    pub workspace_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub cookies: CookieConfig,
    pub demo_workspace_id: Uuid,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let production = std::env::var("APP_ENV")
            .map(|v| v.eq_ignore_ascii_case("production"))
            .unwrap_or(false);
        let cookies = CookieConfig {
            secure: production,
            session_ttl_days: std::env::var("SESSION_TTL_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(30),
            workspace_ttl_days: std::env::var("WORKSPACE_COOKIE_DAYS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(30),
        };
        let demo_workspace_id = match std::env::var("DEMO_WORKSPACE_ID") {
            Ok(v) => v.parse::<Uuid>()?,
            Err(_) => DEFAULT_DEMO_WORKSPACE_ID,
        };
        Ok(Self {
            database_url,
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("APP_PORT")
                .ok()
                .and_then(|v| v.parse::<u16>().ok())
                .unwrap_or(8080),
            cookies,
            demo_workspace_id,
        })
    }

    /// Development defaults against an in-memory SQLite database.
    pub fn local() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            host: "127.0.0.1".into(),
            port: 8080,
            cookies: CookieConfig {
                secure: false,
                session_ttl_days: 30,
                workspace_ttl_days: 30,
            },
            demo_workspace_id: DEFAULT_DEMO_WORKSPACE_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_workspace_id_matches_well_known_value() {
        assert_eq!(
            DEFAULT_DEMO_WORKSPACE_ID.to_string(),
            "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa"
        );
    }
}
