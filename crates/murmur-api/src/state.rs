//! Application state wiring the engine to its store.
//!
//! AppState holds the concrete instances used by both CLI and REST API.
//! The engine is generic over [`MessageStore`], but AppState pins it to
//! [`RelayStore`] so `--ephemeral` can swap SQLite for memory at runtime.
//!
//! [`MessageStore`]: murmur_core::repository::message::MessageStore

use std::path::PathBuf;
use std::sync::Arc;

use murmur_core::broadcast::{BroadcastEngine, EngineSettings};
use murmur_core::repository::memory::InMemoryMessageStore;
use murmur_infra::config::{PORT_ENV, apply_env_overrides, load_relay_config};
use murmur_infra::paths::resolve_data_dir;
use murmur_infra::sqlite::message::SqliteMessageStore;
use murmur_infra::sqlite::pool::{DatabasePool, database_url};
use murmur_infra::store::RelayStore;
use murmur_types::config::RelayConfig;

/// Engine pinned to the runtime-selected store.
pub type RelayEngine = BroadcastEngine<RelayStore>;

/// Shared application state.
///
/// Used by CLI commands, REST handlers, and the WebSocket adapter.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RelayEngine>,
    pub config: Arc<RelayConfig>,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state: load config, open the store, build the engine.
    ///
    /// With `ephemeral` set, messages live in memory and the database is not opened.
    pub async fn init(ephemeral: bool) -> anyhow::Result<Self> {
        let data_dir = resolve_data_dir();

        // Ensure data directory exists
        tokio::fs::create_dir_all(&data_dir).await?;

        let config = load_relay_config(&data_dir).await;
        let config = apply_env_overrides(config, std::env::var(PORT_ENV).ok());

        let store = if ephemeral {
            tracing::info!("Using in-memory message store");
            RelayStore::Memory(InMemoryMessageStore::new())
        } else {
            let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;
            RelayStore::Sqlite(SqliteMessageStore::new(db_pool))
        };

        Ok(Self::from_parts(store, config, data_dir))
    }

    /// Assemble state from an already-opened store.
    pub fn from_parts(store: RelayStore, config: RelayConfig, data_dir: PathBuf) -> Self {
        let engine = BroadcastEngine::new(store, EngineSettings::from_config(&config));
        Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
            data_dir,
        }
    }
}

#[cfg(test)]
impl AppState {
    /// In-memory state for handler tests.
    pub fn for_tests() -> Self {
        Self::from_parts(
            RelayStore::Memory(InMemoryMessageStore::new()),
            RelayConfig::default(),
            std::env::temp_dir(),
        )
    }
}
