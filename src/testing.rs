//! Scripted database double for tests.
//!
//! Queries and executes are matched by SQL fragment; the first matching
//! script wins. Every statement and transaction is recorded so tests can
//! assert what ran and what was rolled back.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::db::{Database, DbError, DbMode, Row, Statement, TxBatch};

type QueryScript = Arc<dyn Fn(&[Value]) -> Vec<Row> + Send + Sync>;
type ExecuteScript = Arc<dyn Fn(&[Value]) -> Result<u64, String> + Send + Sync>;

/// A statement seen by the double.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub sql: String,
    pub args: Vec<Value>,
}

/// A transaction seen by the double.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTx {
    /// Session-variable statements followed by the batch statements.
    pub statements: Vec<Recorded>,
    pub committed: bool,
}

#[derive(Default)]
struct State {
    queries: Vec<Recorded>,
    transactions: Vec<RecordedTx>,
}

/// In-memory [`Database`] with scripted answers.
pub struct MockDatabase {
    mode: DbMode,
    query_scripts: Mutex<Vec<(String, QueryScript)>>,
    failing_queries: Mutex<Vec<String>>,
    execute_scripts: Mutex<Vec<(String, ExecuteScript)>>,
    state: Mutex<State>,
}

impl MockDatabase {
    pub fn new(mode: DbMode) -> Self {
        Self {
            mode,
            query_scripts: Mutex::new(Vec::new()),
            failing_queries: Mutex::new(Vec::new()),
            execute_scripts: Mutex::new(Vec::new()),
            state: Mutex::new(State::default()),
        }
    }

    /// Answer queries containing `fragment` with fixed rows.
    pub fn on_query(&self, fragment: &str, rows: Vec<Row>) -> &Self {
        self.on_query_with(fragment, move |_| rows.clone())
    }

    /// Answer queries containing `fragment` from their arguments.
    pub fn on_query_with<F>(&self, fragment: &str, f: F) -> &Self
    where
        F: Fn(&[Value]) -> Vec<Row> + Send + Sync + 'static,
    {
        self.query_scripts
            .lock()
            .push((fragment.to_string(), Arc::new(f)));
        self
    }

    /// Decide rows affected (or failure) for statements containing `fragment`.
    pub fn on_execute_with<F>(&self, fragment: &str, f: F) -> &Self
    where
        F: Fn(&[Value]) -> Result<u64, String> + Send + Sync + 'static,
    {
        self.execute_scripts
            .lock()
            .push((fragment.to_string(), Arc::new(f)));
        self
    }

    /// Fail every statement containing `fragment`.
    pub fn fail_on(&self, fragment: &str) -> &Self {
        let message = format!("scripted failure on '{}'", fragment);
        self.on_execute_with(fragment, move |_| Err(message.clone()))
    }

    /// Fail every query containing `fragment`.
    pub fn fail_query_on(&self, fragment: &str) -> &Self {
        self.failing_queries.lock().push(fragment.to_string());
        self
    }

    pub fn queries(&self) -> Vec<Recorded> {
        self.state.lock().queries.clone()
    }

    pub fn transactions(&self) -> Vec<RecordedTx> {
        self.state.lock().transactions.clone()
    }

    /// Statements of committed transactions, in execution order.
    pub fn committed(&self) -> Vec<Recorded> {
        self.state
            .lock()
            .transactions
            .iter()
            .filter(|tx| tx.committed)
            .flat_map(|tx| tx.statements.clone())
            .collect()
    }

    fn run_statement(&self, stmt: &Statement) -> Result<u64, String> {
        let script = self
            .execute_scripts
            .lock()
            .iter()
            .find(|(fragment, _)| stmt.sql.contains(fragment.as_str()))
            .map(|(_, f)| f.clone());
        match script {
            Some(f) => f(&stmt.args),
            None => Ok(1),
        }
    }
}

impl Default for MockDatabase {
    fn default() -> Self {
        Self::new(DbMode::Postgres)
    }
}

#[async_trait]
impl Database for MockDatabase {
    fn mode(&self) -> DbMode {
        self.mode
    }

    async fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, DbError> {
        self.state.lock().queries.push(Recorded {
            sql: sql.to_string(),
            args: args.to_vec(),
        });
        if let Some(fragment) = self
            .failing_queries
            .lock()
            .iter()
            .find(|fragment| sql.contains(fragment.as_str()))
        {
            return Err(DbError::Query {
                sql: sql.to_string(),
                message: format!("scripted failure on '{}'", fragment),
            });
        }
        let script = self
            .query_scripts
            .lock()
            .iter()
            .find(|(fragment, _)| sql.contains(fragment.as_str()))
            .map(|(_, f)| f.clone());
        Ok(script.map(|f| f(args)).unwrap_or_default())
    }

    async fn execute_batch(&self, batch: TxBatch) -> Result<Vec<u64>, DbError> {
        let mut recorded = RecordedTx {
            statements: Vec::new(),
            committed: false,
        };
        let session = batch
            .session
            .as_ref()
            .map(|vars| vars.statements(self.mode))
            .unwrap_or_default();
        for stmt in &session {
            recorded.statements.push(Recorded {
                sql: stmt.sql.clone(),
                args: stmt.args.clone(),
            });
        }

        let mut affected = Vec::new();
        for stmt in &batch.statements {
            recorded.statements.push(Recorded {
                sql: stmt.sql.clone(),
                args: stmt.args.clone(),
            });
            match self.run_statement(stmt) {
                Ok(rows) => affected.push(rows),
                Err(message) => {
                    self.state.lock().transactions.push(recorded);
                    return Err(DbError::Execute {
                        name: stmt.name.clone(),
                        message,
                    });
                }
            }
        }

        recorded.committed = true;
        self.state.lock().transactions.push(recorded);
        Ok(affected)
    }
}

/// Build a row from `(column, value)` pairs.
pub fn row<I, K>(pairs: I) -> Row
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SessionVars;
    use serde_json::json;

    #[tokio::test]
    async fn test_scripted_query() {
        let db = MockDatabase::default();
        db.on_query("FROM accounts", vec![row([("id", json!(7))])]);

        let rows = db.query("SELECT id FROM accounts WHERE a = $1", &[json!("x")]).await.unwrap();
        assert_eq!(rows[0]["id"], json!(7));
        assert!(db.query("SELECT 1", &[]).await.unwrap().is_empty());
        assert_eq!(db.queries().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_statement_rolls_back() {
        let db = MockDatabase::default();
        db.fail_on("INSERT INTO audit");

        let batch = TxBatch {
            session: Some(SessionVars::new("p", "m", "x", "u")),
            statements: vec![
                Statement::new("one", "UPDATE accounts SET a = $1", vec![json!(1)]),
                Statement::new("two", "INSERT INTO audit VALUES ($1)", vec![json!(2)]),
            ],
        };
        assert!(db.execute_batch(batch).await.is_err());

        let txs = db.transactions();
        assert_eq!(txs.len(), 1);
        assert!(!txs[0].committed);
        assert_eq!(txs[0].statements.len(), 6);
        assert!(db.committed().is_empty());
    }
}
