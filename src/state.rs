use std::sync::Arc;

use anyhow::Context;
use time::OffsetDateTime;

use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::store::{postgres::PgStore, sqlite::SqliteStore, Store};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub config: Arc<AppConfig>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);
        let store = connect_store(&config.database_url).await?;
        Ok(Self {
            store,
            config,
            clock: Arc::new(SystemClock),
        })
    }

    pub fn from_parts(store: Arc<dyn Store>, config: Arc<AppConfig>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Fresh in-memory SQLite database with local defaults.
    pub async fn in_memory(clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let store = SqliteStore::open_in_memory()
            .await
            .context("open in-memory store")?;
        Ok(Self {
            store: Arc::new(store),
            config: Arc::new(AppConfig::local()),
            clock,
        })
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }
}

/// Picks the backend from the URL scheme and brings its schema up to date.
async fn connect_store(url: &str) -> anyhow::Result<Arc<dyn Store>> {
    if url.starts_with("sqlite:") {
        let store = SqliteStore::open(url).await.context("open sqlite store")?;
        return Ok(Arc::new(store));
    }

    let store = PgStore::connect(url).await.context("connect to database")?;
    if let Err(e) = store.migrate().await {
        tracing::warn!(error = %e, "migration failed; continuing");
    }
    Ok(Arc::new(store))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::clock::ManualClock;

    pub(crate) fn epoch() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    pub(crate) async fn test_state() -> (AppState, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(epoch()));
        let state = AppState::in_memory(clock.clone())
            .await
            .expect("in-memory state");
        (state, clock)
    }

    /// Like [`test_state`] but also hands back the concrete store for seeding.
    pub(crate) async fn test_state_with_store() -> (AppState, Arc<ManualClock>, SqliteStore) {
        let clock = Arc::new(ManualClock::new(epoch()));
        let store = SqliteStore::open_in_memory().await.expect("open store");
        let state = AppState::from_parts(
            Arc::new(store.clone()),
            Arc::new(AppConfig::local()),
            clock.clone(),
        );
        (state, clock, store)
    }
}
