//! The process-wide collaborators every pipeline registration shares.
//!
//! Built once at startup and passed as `Arc<Runtime>` to each handler
//! registration. Message tables sit behind an `ArcSwap` so the config
//! watcher can replace them while requests hold a consistent snapshot.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::{HeaderConfig, RuntimeConfig};
use crate::db::Database;
use crate::endpoints::remote::ApiRegistry;
use crate::errors::sanitize::DEFAULT_MAX_DESCRIPTION_LEN;
use crate::http::response::MessageTables;
use crate::observability::tracing::{set_global_manager, TracingManager};
use crate::request_log::{RequestLogStore, TracingRequestStore};
use crate::validation::{self, Validator};

pub struct Runtime {
    validator: Arc<Validator>,
    tracing: Option<Arc<TracingManager>>,
    request_log: Arc<dyn RequestLogStore>,
    db: Option<Arc<dyn Database>>,
    apis: Arc<ApiRegistry>,
    messages: Arc<ArcSwap<MessageTables>>,
    header_config: Option<Arc<HeaderConfig>>,
    simulation: bool,
    reraise_panics: bool,
    description_max_len: usize,
    body_limit: usize,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    pub fn tracing(&self) -> Option<&TracingManager> {
        self.tracing.as_deref()
    }

    pub fn tracing_manager(&self) -> Option<Arc<TracingManager>> {
        self.tracing.clone()
    }

    pub fn request_log(&self) -> &dyn RequestLogStore {
        self.request_log.as_ref()
    }

    pub fn db(&self) -> Option<Arc<dyn Database>> {
        self.db.clone()
    }

    pub fn apis(&self) -> &ApiRegistry {
        &self.apis
    }

    /// Current message tables.
    pub fn messages(&self) -> Arc<MessageTables> {
        self.messages.load_full()
    }

    /// The swappable handle, for the config watcher.
    pub fn message_handle(&self) -> Arc<ArcSwap<MessageTables>> {
        self.messages.clone()
    }

    pub fn header_config(&self) -> Option<&HeaderConfig> {
        self.header_config.as_deref()
    }

    pub fn simulation(&self) -> bool {
        self.simulation
    }

    pub fn reraise_panics(&self) -> bool {
        self.reraise_panics
    }

    pub fn description_max_len(&self) -> usize {
        self.description_max_len
    }

    pub fn body_limit(&self) -> usize {
        self.body_limit
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("tracing", &self.tracing.is_some())
            .field("request_log", &self.request_log.name())
            .field("db", &self.db.as_ref().map(|db| db.mode()))
            .field("apis", &self.apis.names())
            .field("simulation", &self.simulation)
            .field("reraise_panics", &self.reraise_panics)
            .finish()
    }
}

/// Builder for [`Runtime`]; unset parts fall back to defaults.
pub struct RuntimeBuilder {
    validator: Option<Arc<Validator>>,
    tracing: Option<Arc<TracingManager>>,
    request_log: Option<Arc<dyn RequestLogStore>>,
    db: Option<Arc<dyn Database>>,
    apis: ApiRegistry,
    messages: MessageTables,
    header_config: Option<Arc<HeaderConfig>>,
    simulation: bool,
    reraise_panics: bool,
    description_max_len: usize,
    body_limit: usize,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        let defaults = RuntimeConfig::default();
        Self {
            validator: None,
            tracing: None,
            request_log: None,
            db: None,
            apis: ApiRegistry::default(),
            messages: MessageTables::from_config(&defaults),
            header_config: None,
            simulation: false,
            reraise_panics: false,
            description_max_len: DEFAULT_MAX_DESCRIPTION_LEN,
            body_limit: defaults.server.max_body_bytes,
        }
    }
}

impl RuntimeBuilder {
    /// Take the plain settings (messages, flags, limits) from a config.
    pub fn config(mut self, config: &RuntimeConfig) -> Self {
        self.messages = MessageTables::from_config(config);
        self.simulation = config.simulation;
        self.reraise_panics = config.reraise_panics;
        self.description_max_len = config.description_max_len;
        self.body_limit = config.server.max_body_bytes;
        self
    }

    pub fn validator(mut self, validator: Arc<Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn tracing(mut self, manager: Arc<TracingManager>) -> Self {
        self.tracing = Some(manager);
        self
    }

    pub fn request_log(mut self, store: Arc<dyn RequestLogStore>) -> Self {
        self.request_log = Some(store);
        self
    }

    pub fn db(mut self, db: Arc<dyn Database>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn apis(mut self, apis: ApiRegistry) -> Self {
        self.apis = apis;
        self
    }

    pub fn messages(mut self, messages: MessageTables) -> Self {
        self.messages = messages;
        self
    }

    pub fn header_config(mut self, config: HeaderConfig) -> Self {
        self.header_config = Some(Arc::new(config));
        self
    }

    pub fn simulation(mut self, simulation: bool) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn reraise_panics(mut self, reraise: bool) -> Self {
        self.reraise_panics = reraise;
        self
    }

    pub fn build(self) -> Arc<Runtime> {
        if let Some(manager) = &self.tracing {
            if !set_global_manager(manager.clone()) {
                tracing::debug!("Global tracing manager already registered");
            }
        }
        Arc::new(Runtime {
            validator: self.validator.unwrap_or_else(validation::global),
            tracing: self.tracing,
            request_log: self
                .request_log
                .unwrap_or_else(|| Arc::new(TracingRequestStore)),
            db: self.db,
            apis: Arc::new(self.apis),
            messages: Arc::new(ArcSwap::from_pointee(self.messages)),
            header_config: self.header_config,
            simulation: self.simulation,
            reraise_panics: self.reraise_panics,
            description_max_len: self.description_max_len,
            body_limit: self.body_limit,
        })
    }
}
