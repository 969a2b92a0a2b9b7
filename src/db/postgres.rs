//! PostgreSQL driver on a `sqlx` pool.

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};

use crate::config::DatabaseConfig;
use crate::db::{Database, DbError, DbMode, Row, TxBatch};

/// [`Database`] backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgDatabase {
    pool: PgPool,
}

impl PgDatabase {
    /// Open a pool for the configured URL.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url)
            .await
            .map_err(|e| DbError::Connect(e.to_string()))?;
        tracing::info!(max_connections = config.max_connections, "Database pool ready");
        Ok(Self { pool })
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_all<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    args: &[Value],
) -> Query<'q, Postgres, PgArguments> {
    for arg in args {
        query = match arg {
            Value::Null => query.bind(Option::<String>::None),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => query.bind(s.clone()),
            other => query.bind(sqlx::types::Json(other.clone())),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row, DbError> {
    let mut out = Map::new();
    for column in row.columns() {
        let name = column.name();
        let idx = column.ordinal();
        let decode_err = |e: sqlx::Error| DbError::Decode {
            column: name.to_string(),
            message: e.to_string(),
        };
        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<Option<bool>, _>(idx).map_err(decode_err)?.map(Value::Bool),
            "INT2" => row
                .try_get::<Option<i16>, _>(idx)
                .map_err(decode_err)?
                .map(Value::from),
            "INT4" => row
                .try_get::<Option<i32>, _>(idx)
                .map_err(decode_err)?
                .map(Value::from),
            "INT8" => row
                .try_get::<Option<i64>, _>(idx)
                .map_err(decode_err)?
                .map(Value::from),
            "FLOAT4" | "FLOAT8" => row
                .try_get::<Option<f64>, _>(idx)
                .map_err(decode_err)?
                .and_then(Number::from_f64)
                .map(Value::Number),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(idx).map_err(decode_err)?,
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(idx)
                .map_err(decode_err)?
                .map(|u| Value::from(u.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
                .map_err(decode_err)?
                .map(|t| Value::from(t.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
                .map_err(decode_err)?
                .map(|t| Value::from(t.to_string())),
            "DATE" => row
                .try_get::<Option<chrono::NaiveDate>, _>(idx)
                .map_err(decode_err)?
                .map(|d| Value::from(d.to_string())),
            _ => row
                .try_get::<Option<String>, _>(idx)
                .map_err(decode_err)?
                .map(Value::from),
        };
        out.insert(name.to_string(), value.unwrap_or(Value::Null));
    }
    Ok(out)
}

#[async_trait]
impl Database for PgDatabase {
    fn mode(&self) -> DbMode {
        DbMode::Postgres
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, DbError> {
        let rows = bind_all(sqlx::query(sql), args)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| DbError::Query {
                sql: sql.to_string(),
                message: e.to_string(),
            })?;
        metrics::counter!("db_statements_total", "kind" => "query", "outcome" => "ok").increment(1);
        rows.iter().map(decode_row).collect()
    }

    async fn execute_batch(&self, batch: TxBatch) -> Result<Vec<u64>, DbError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;

        let session = batch
            .session
            .as_ref()
            .map(|vars| vars.statements(DbMode::Postgres))
            .unwrap_or_default();
        for stmt in &session {
            if let Err(e) = bind_all(sqlx::query(&stmt.sql), &stmt.args)
                .execute(&mut *tx)
                .await
            {
                let _ = tx.rollback().await;
                return Err(DbError::Execute {
                    name: stmt.name.clone(),
                    message: e.to_string(),
                });
            }
        }

        let mut affected = Vec::with_capacity(batch.statements.len());
        for stmt in &batch.statements {
            match bind_all(sqlx::query(&stmt.sql), &stmt.args)
                .execute(&mut *tx)
                .await
            {
                Ok(result) => affected.push(result.rows_affected()),
                Err(e) => {
                    metrics::counter!("db_statements_total", "kind" => "execute", "outcome" => "error")
                        .increment(1);
                    tracing::warn!(statement = %stmt.name, error = %e, "Statement failed, rolling back");
                    let _ = tx.rollback().await;
                    return Err(DbError::Execute {
                        name: stmt.name.clone(),
                        message: e.to_string(),
                    });
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DbError::Transaction(e.to_string()))?;
        metrics::counter!("db_statements_total", "kind" => "execute", "outcome" => "ok")
            .increment(affected.len() as u64);
        Ok(affected)
    }
}
