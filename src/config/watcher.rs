//! Configuration file watcher for hot reload of the message tables.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::loader::load_config;
use crate::http::response::MessageTables;

/// A watcher that reloads message and error-description tables on change.
pub struct ConfigWatcher {
    path: PathBuf,
    tables: Arc<ArcSwap<MessageTables>>,
}

impl ConfigWatcher {
    /// Create a new ConfigWatcher publishing into `tables`.
    pub fn new(path: &Path, tables: Arc<ArcSwap<MessageTables>>) -> Self {
        Self {
            path: path.to_path_buf(),
            tables,
        }
    }

    /// Start watching the file in a background thread.
    ///
    /// The returned watcher must be kept alive for as long as reloads are wanted.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let tables = self.tables.clone();
        let path = self.path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) => {
                    if event.kind.is_modify() || event.kind.is_create() {
                        tracing::info!("Config file change detected, reloading message tables");
                        match load_config(&path) {
                            Ok(new_config) => {
                                tables.store(Arc::new(MessageTables::from_config(&new_config)));
                            }
                            Err(e) => {
                                tracing::error!(
                                    error = %e,
                                    "Failed to reload config. Keeping current tables."
                                );
                            }
                        }
                    }
                }
                Err(e) => tracing::error!(error = ?e, "Watch error"),
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&self.path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = ?self.path, "Config watcher started");
        Ok(watcher)
    }
}
