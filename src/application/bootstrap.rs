use crate::domain::models::{BossClearRecord, PitchedItemRecord};
use crate::infrastructure::config::{ensure_default_configs, load_configs, StoreBackend};
use crate::infrastructure::error::InfraError;
use crate::infrastructure::record_store::{RecordFilter, RecordStore};
use crate::infrastructure::rest_record_store::RestRecordStore;
use crate::infrastructure::sqlite_record_store::SqliteRecordStore;
use crate::infrastructure::storage::initialize_database;
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DATABASE_FILE: &str = "pitchtrack.sqlite";
pub const API_KEY_ENV: &str = "PITCHTRACK_STORE_API_KEY";

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub database_path: PathBuf,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    let config_dir = workspace_root.join("config");
    let state_dir = workspace_root.join("state");
    let logs_dir = workspace_root.join("logs");
    let database_path = state_dir.join(DATABASE_FILE);

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&state_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_configs(&config_dir)?;
    let _ = load_configs(&config_dir)?;
    initialize_database(&database_path)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        database_path,
    })
}

/// Installs `env_logger` once. `RUST_LOG` wins over `default_level`; later calls
/// are ignored.
pub fn init_logging(default_level: &str) {
    let env = env_logger::Env::default().default_filter_or(default_level);
    if env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init()
        .is_ok()
    {
        log::debug!("logging initialized at {default_level}");
    }
}

/// Record store picked by `store.json`.
#[derive(Debug, Clone)]
pub enum ConfiguredStore {
    Sqlite(SqliteRecordStore),
    Rest(RestRecordStore),
}

pub fn open_record_store(
    backend: &StoreBackend,
    database_path: &Path,
) -> Result<ConfiguredStore, InfraError> {
    match backend {
        StoreBackend::Sqlite => {
            log::info!("using sqlite record store at {}", database_path.display());
            Ok(ConfiguredStore::Sqlite(SqliteRecordStore::new(database_path)))
        }
        StoreBackend::Rest {
            base_url,
            timeout_seconds,
        } => {
            let mut store = RestRecordStore::new(base_url, Duration::from_secs(*timeout_seconds))?;
            if let Ok(api_key) = std::env::var(API_KEY_ENV) {
                store = store.with_api_key(api_key);
            }
            log::info!("using rest record store at {base_url}");
            Ok(ConfiguredStore::Rest(store))
        }
    }
}

#[async_trait]
impl RecordStore for ConfiguredStore {
    async fn read_boss_clears(
        &self,
        user_id: &str,
        filter: RecordFilter,
    ) -> Result<Vec<BossClearRecord>, InfraError> {
        match self {
            Self::Sqlite(store) => store.read_boss_clears(user_id, filter).await,
            Self::Rest(store) => store.read_boss_clears(user_id, filter).await,
        }
    }

    async fn write_boss_clears(
        &self,
        user_id: &str,
        records: &[BossClearRecord],
    ) -> Result<(), InfraError> {
        match self {
            Self::Sqlite(store) => store.write_boss_clears(user_id, records).await,
            Self::Rest(store) => store.write_boss_clears(user_id, records).await,
        }
    }

    async fn read_pitched_items(
        &self,
        user_id: &str,
        filter: RecordFilter,
    ) -> Result<Vec<PitchedItemRecord>, InfraError> {
        match self {
            Self::Sqlite(store) => store.read_pitched_items(user_id, filter).await,
            Self::Rest(store) => store.read_pitched_items(user_id, filter).await,
        }
    }

    async fn write_pitched_items(
        &self,
        user_id: &str,
        records: &[PitchedItemRecord],
    ) -> Result<(), InfraError> {
        match self {
            Self::Sqlite(store) => store.write_pitched_items(user_id, records).await,
            Self::Rest(store) => store.write_pitched_items(user_id, records).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static NEXT_TEMP_DIR: AtomicUsize = AtomicUsize::new(0);

    struct TempWorkspace {
        path: PathBuf,
    }

    impl TempWorkspace {
        fn new() -> Self {
            let sequence = NEXT_TEMP_DIR.fetch_add(1, Ordering::Relaxed);
            let path = std::env::temp_dir().join(format!(
                "pitchtrack-bootstrap-tests-{}-{}",
                std::process::id(),
                sequence
            ));
            fs::create_dir_all(&path).expect("create temp workspace");
            Self { path }
        }
    }

    impl Drop for TempWorkspace {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.path);
        }
    }

    #[test]
    fn bootstrap_creates_layout_and_schema() {
        let workspace = TempWorkspace::new();
        let result = bootstrap_workspace(&workspace.path).expect("bootstrap");

        assert!(result.config_dir.join("tracker.json").exists());
        assert!(result.config_dir.join("store.json").exists());
        assert!(result.logs_dir.is_dir());
        assert!(result.database_path.ends_with("state/pitchtrack.sqlite"));

        let connection = rusqlite::Connection::open(&result.database_path).expect("open db");
        let tables: i64 = connection
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'
                 AND name IN ('boss_clears', 'pitched_items')",
                [],
                |row| row.get(0),
            )
            .expect("count tables");
        assert_eq!(tables, 2);

        bootstrap_workspace(&workspace.path).expect("second bootstrap is idempotent");
    }

    #[test]
    fn bootstrap_rejects_unknown_schema() {
        let workspace = TempWorkspace::new();
        let config_dir = workspace.path.join("config");
        fs::create_dir_all(&config_dir).expect("create config dir");
        fs::write(config_dir.join("tracker.json"), r#"{"schema": 2}"#).expect("write config");

        let result = bootstrap_workspace(&workspace.path);
        assert!(matches!(result, Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn open_record_store_follows_backend() {
        let workspace = TempWorkspace::new();
        let database_path = workspace.path.join("records.sqlite");

        let sqlite = open_record_store(&StoreBackend::Sqlite, &database_path).expect("sqlite");
        assert!(matches!(sqlite, ConfiguredStore::Sqlite(_)));

        let rest = open_record_store(
            &StoreBackend::Rest {
                base_url: "https://records.example.com/api/".to_string(),
                timeout_seconds: 5,
            },
            &database_path,
        )
        .expect("rest");
        assert!(matches!(rest, ConfiguredStore::Rest(_)));

        let invalid = open_record_store(
            &StoreBackend::Rest {
                base_url: "not a url".to_string(),
                timeout_seconds: 5,
            },
            &database_path,
        );
        assert!(matches!(invalid, Err(InfraError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn configured_sqlite_store_round_trips_records() {
        let workspace = TempWorkspace::new();
        let result = bootstrap_workspace(&workspace.path).expect("bootstrap");
        let store = open_record_store(&StoreBackend::Sqlite, &result.database_path)
            .expect("open store");

        assert!(store
            .read_pitched_items("user-1", RecordFilter::all())
            .await
            .expect("read empty")
            .is_empty());
    }

    #[test]
    fn init_logging_can_be_called_twice() {
        init_logging("debug");
        init_logging("info");
    }
}
