//! Database seam used by the request log, DML and query endpoints.
//!
//! # Data Flow
//! ```text
//! DML endpoint
//!     → command.rs (placeholder count / verb checks)
//!     → TxBatch { session, statements }
//!     → Database::execute_batch
//!         begin → session.rs set-variable commands → statements → commit
//!         (any failure rolls back)
//!
//! Query endpoint / request log
//!     → Database::query(sql, args) → Vec<Row>
//! ```
//!
//! # Design Decisions
//! - One narrow async trait; `postgres.rs` is the shipped driver and the
//!   scripted double lives in `crate::testing`
//! - Rows are ordered JSON maps so transformers and the envelope never see
//!   driver types
//! - Arguments are JSON values bound by variant

pub mod command;
pub mod postgres;
pub mod session;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::errors::{self, Error};

pub use postgres::PgDatabase;
pub use session::SessionVars;

/// A result row, columns in select order.
pub type Row = Map<String, Value>;

/// SQL dialect of the configured database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbMode {
    Oracle,
    Postgres,
    Mysql,
    Sqlite,
    /// No database; session variables are skipped.
    #[default]
    None,
}

impl DbMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DbMode::Oracle => "oracle",
            DbMode::Postgres => "postgres",
            DbMode::Mysql => "mysql",
            DbMode::Sqlite => "sqlite",
            DbMode::None => "none",
        }
    }
}

/// One statement of a transaction batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Command name, echoed in the result map and in errors.
    pub name: String,
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    pub fn new(name: impl Into<String>, sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            args,
        }
    }
}

/// Statements executed in a single transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxBatch {
    /// Audit variables set before the first statement.
    pub session: Option<SessionVars>,
    pub statements: Vec<Statement>,
}

/// Driver-level failures.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("database is not configured")]
    NotConfigured,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("query '{sql}' failed: {message}")]
    Query { sql: String, message: String },

    #[error("statement '{name}' failed: {message}")]
    Execute { name: String, message: String },

    #[error("unable to decode column '{column}': {message}")]
    Decode { column: String, message: String },

    #[error("transaction failed: {0}")]
    Transaction(String),
}

impl From<DbError> for Error {
    fn from(err: DbError) -> Self {
        let code = match &err {
            DbError::NotConfigured => errors::DB_NOT_CONFIGURED,
            DbError::Connect(_) | DbError::Transaction(_) => errors::DB_READ_ERROR,
            DbError::Query { .. } => errors::UNABLE_TO_QUERY_STATEMENT,
            DbError::Execute { .. } => errors::ERROR_CALLING_DB_FUNCTION,
            DbError::Decode { .. } => errors::UNABLE_TO_GET_SCAN_ROW,
        };
        Error::internal(code, err.to_string())
    }
}

/// Pooled database handle shared by every request.
#[async_trait]
pub trait Database: Send + Sync {
    /// Dialect, used for session variables and pagination.
    fn mode(&self) -> DbMode;

    /// Run a read statement and collect its rows.
    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, DbError>;

    /// Run every statement in one transaction; rows affected per statement.
    async fn execute_batch(&self, batch: TxBatch) -> Result<Vec<u64>, DbError>;

    /// Run one statement in its own transaction.
    async fn execute(&self, sql: &str, args: &[Value]) -> Result<u64, DbError> {
        let batch = TxBatch {
            session: None,
            statements: vec![Statement::new("execute", sql, args.to_vec())],
        };
        Ok(self.execute_batch(batch).await?.into_iter().next().unwrap_or(0))
    }
}
