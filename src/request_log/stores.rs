//! Request log store implementations.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::RequestLogConfig;
use crate::db::command::count_placeholders;
use crate::db::Database;
use crate::errors::{self, Error, Result};
use crate::request_log::model::RequestLog;
use crate::request_log::RequestLogStore;

/// Keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRequestStore;

#[async_trait]
impl RequestLogStore for NoRequestStore {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn check_duplicate(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, _log: &RequestLog) -> Result<()> {
        Ok(())
    }

    async fn update(&self, _log: &RequestLog) -> Result<()> {
        Ok(())
    }
}

/// Emits the request log as structured log events; never detects duplicates.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRequestStore;

#[async_trait]
impl RequestLogStore for TracingRequestStore {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn check_duplicate(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn insert(&self, log: &RequestLog) -> Result<()> {
        tracing::info!(
            request_id = %log.id,
            action = %log.action_id,
            user = %log.user_id,
            branch = %log.branch_id,
            incoming = %log.incoming,
            "Request started"
        );
        Ok(())
    }

    async fn update(&self, log: &RequestLog) -> Result<()> {
        tracing::info!(
            request_id = %log.id,
            result = %log.result,
            events = log.events.len(),
            outgoing = %log.outgoing,
            "Request finished"
        );
        Ok(())
    }
}

/// Persists into the `request` table with the configured statements.
pub struct DbRequestStore {
    db: Arc<dyn Database>,
    config: RequestLogConfig,
}

impl DbRequestStore {
    pub fn new(db: Arc<dyn Database>, config: RequestLogConfig) -> Self {
        Self { db, config }
    }
}

fn record_json(log: &RequestLog) -> Result<Value> {
    serde_json::to_value(log).map_err(|e| Error::internal(errors::PARSE_DB_RESP_ERROR, e.to_string()))
}

#[async_trait]
impl RequestLogStore for DbRequestStore {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn check_duplicate(&self, id: &str) -> Result<()> {
        let rows = self
            .db
            .query(&self.config.check_duplicate_sql, &[Value::from(id)])
            .await
            .map_err(|e| Error::from(e).input(id))?;
        if rows.is_empty() {
            Ok(())
        } else {
            Err(Error::bad_request(errors::DUPLICATE_REQUEST, format!("request '{}' was already received", id)))
        }
    }

    async fn insert(&self, log: &RequestLog) -> Result<()> {
        let mut args = vec![record_json(log)?];
        if count_placeholders(&self.config.insert_sql) >= 2 {
            args.push(log.incoming.clone());
        }
        self.db.execute(&self.config.insert_sql, &args).await?;
        Ok(())
    }

    async fn update(&self, log: &RequestLog) -> Result<()> {
        let mut args = vec![record_json(log)?, Value::from(log.id.clone())];
        if count_placeholders(&self.config.update_sql) >= 3 {
            args.push(log.outgoing.clone());
        }
        self.db.execute(&self.config.update_sql, &args).await?;
        Ok(())
    }
}
