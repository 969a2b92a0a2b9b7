//! Startup orchestration: turn a validated config into a [`Runtime`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::RecommendedWatcher;
use thiserror::Error;

use crate::config::headers::{load_header_config, resolve_header_config_path};
use crate::config::watcher::ConfigWatcher;
use crate::config::{ConfigError, RequestLogStoreKind, RuntimeConfig};
use crate::db::{Database, DbError, DbMode, PgDatabase};
use crate::endpoints::remote::{ApiRegistry, RemoteError};
use crate::observability::tracing::{TracingConfig, TracingManager};
use crate::request_log::stores::{DbRequestStore, NoRequestStore, TracingRequestStore};
use crate::request_log::RequestLogStore;
use crate::runtime::Runtime;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("database: {0}")]
    Database(#[from] DbError),

    #[error("no driver for database mode '{}'", .0.as_str())]
    UnsupportedDatabase(DbMode),

    #[error("request log store 'database' needs a database")]
    StoreWithoutDatabase,

    #[error("remote apis: {0}")]
    Remote(#[from] RemoteError),

    #[error("config watcher: {0}")]
    Watcher(#[from] notify::Error),
}

/// What startup produced; keep `watcher` alive for hot reload.
pub struct Started {
    pub runtime: Arc<Runtime>,
    pub watcher: Option<RecommendedWatcher>,
}

async fn connect(config: &RuntimeConfig) -> Result<Option<Arc<dyn Database>>, StartupError> {
    match config.database.mode {
        DbMode::None => Ok(None),
        DbMode::Postgres => {
            let db = PgDatabase::connect(&config.database).await?;
            Ok(Some(Arc::new(db)))
        }
        other => Err(StartupError::UnsupportedDatabase(other)),
    }
}

fn request_store(
    config: &RuntimeConfig,
    db: Option<&Arc<dyn Database>>,
) -> Result<Arc<dyn RequestLogStore>, StartupError> {
    Ok(match config.request_log.store {
        RequestLogStoreKind::None => Arc::new(NoRequestStore),
        RequestLogStoreKind::Log => Arc::new(TracingRequestStore),
        RequestLogStoreKind::Database => {
            let db = db.ok_or(StartupError::StoreWithoutDatabase)?;
            Arc::new(DbRequestStore::new(db.clone(), config.request_log.clone()))
        }
    })
}

fn header_config_path(config: &RuntimeConfig) -> Option<PathBuf> {
    config
        .header_config_path
        .as_ref()
        .map(PathBuf::from)
        .or_else(resolve_header_config_path)
}

/// Build the runtime for `config`.
///
/// `config_path` is the file the config came from; when given, its message
/// tables are reloaded on change.
pub async fn bootstrap(config: &RuntimeConfig, config_path: Option<&Path>) -> Result<Started, StartupError> {
    let db = connect(config).await?;
    let store = request_store(config, db.as_ref())?;

    let mut builder = Runtime::builder().config(config).request_log(store);
    if let Some(db) = db {
        builder = builder.db(db);
    }

    if let Some(path) = header_config_path(config) {
        let headers = load_header_config(&path)?;
        tracing::info!(path = ?path, entries = headers.entries().count(), "Header configuration loaded");
        builder = builder.header_config(headers);
    }

    let tracing_config = TracingConfig::load(config.tracing_config_path.as_deref().map(Path::new))?;
    let manager = TracingManager::new(tracing_config);
    if manager.is_enabled() {
        builder = builder.tracing(Arc::new(manager));
    }

    builder = builder.apis(ApiRegistry::from_config(&config.apis)?);
    let runtime = builder.build();

    let watcher = match config_path {
        Some(path) => Some(ConfigWatcher::new(path, runtime.message_handle()).run()?),
        None => None,
    };

    tracing::info!(
        db = config.database.mode.as_str(),
        request_log = runtime.request_log().name(),
        apis = config.apis.len(),
        simulation = runtime.simulation(),
        "Runtime ready"
    );
    Ok(Started { runtime, watcher })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;

    #[tokio::test]
    async fn test_defaults_need_no_database() {
        let started = bootstrap(&RuntimeConfig::default(), None).await.unwrap();
        assert!(started.runtime.db().is_none());
        assert_eq!(started.runtime.request_log().name(), "log");
        assert!(started.watcher.is_none());
    }

    #[tokio::test]
    async fn test_unsupported_driver() {
        let config = parse_config(
            r#"
[database]
mode = "oracle"
url = "oracle://db/core"
"#,
        )
        .unwrap();
        let err = bootstrap(&config, None).await.err().unwrap();
        assert!(matches!(err, StartupError::UnsupportedDatabase(DbMode::Oracle)));
    }

    #[tokio::test]
    async fn test_header_config_and_apis() {
        let dir = tempfile::tempdir().unwrap();
        let headers = dir.path().join("headers.yaml");
        std::fs::write(
            &headers,
            "required:\n  id:\n    headerName: Request-Id\n    required: true\n",
        )
        .unwrap();
        let mut config = parse_config(
            r#"
[apis.core]
base_url = "http://core.local"
"#,
        )
        .unwrap();
        config.header_config_path = Some(headers.display().to_string());

        let started = bootstrap(&config, None).await.unwrap();
        assert!(started.runtime.header_config().is_some());
        assert!(started.runtime.apis().get("core").is_ok());
    }
}
