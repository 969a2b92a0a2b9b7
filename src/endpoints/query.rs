//! Read endpoints: one SQL command per handler, picked by database mode,
//! with optional result caching and pagination.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::db::command::{check_arguments, check_verb};
use crate::db::{Database, DbMode, Row};
use crate::errors::{self, Error, Result};
use crate::http::pagination::{count_command, paginate_command, PaginationData, TOTAL_COUNT_HEADER};
use crate::http::parser::get_args;
use crate::observability::metrics;
use crate::pipeline::{Handler, HandlerParameters, HandlerRequest};
use crate::validation::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    /// Exactly one row.
    Single,
    All,
    /// Rows folded into `key → value`.
    Map,
    /// Shaped by a custom transformer.
    Transforms,
}

#[derive(Debug, Clone)]
pub struct QueryCommand {
    pub name: String,
    /// Used when `command_map` has no entry for the database mode.
    pub command: String,
    pub command_map: HashMap<DbMode, String>,
    /// Request fields bound to the placeholders, in order.
    pub args: Vec<String>,
    pub kind: QueryType,
}

impl QueryCommand {
    pub fn new(name: impl Into<String>, kind: QueryType, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            command_map: HashMap::new(),
            args: Vec::new(),
            kind,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Dialect-specific text for `mode`.
    pub fn for_mode(mut self, mode: DbMode, command: impl Into<String>) -> Self {
        self.command_map.insert(mode, command.into());
        self
    }

    pub fn sql(&self, mode: DbMode) -> &str {
        self.command_map
            .get(&mode)
            .map(String::as_str)
            .unwrap_or(&self.command)
    }

    /// Positional values for `args`, read from the serialized request first,
    /// then from the identity/URL argument map.
    pub fn bind(&self, request: &Value, fallback: &Map<String, Value>) -> Result<Vec<Value>> {
        self.args
            .iter()
            .map(|name| {
                request
                    .get(name)
                    .or_else(|| fallback.get(name))
                    .cloned()
                    .ok_or_else(|| {
                        Error::internal(
                            errors::COMMAND_ARGUMENT_ERROR,
                            format!("query '{}' has no value for argument '{}'", self.name, name),
                        )
                    })
            })
            .collect()
    }
}

/// Turns the rows of a query into the response value.
pub trait RowTransformer: Send + Sync {
    fn transform(&self, rows: Vec<Row>) -> Result<Value>;

    /// Value returned for an empty result when empty is allowed.
    fn empty(&self) -> Value {
        Value::Array(Vec::new())
    }
}

/// `[row]`; any other row count fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct QuerySingleTransformer;

impl RowTransformer for QuerySingleTransformer {
    fn transform(&self, mut rows: Vec<Row>) -> Result<Value> {
        match rows.len() {
            0 => Err(Error::bad_request(errors::NO_DATA_FOUND, "query returned no rows")),
            1 => Ok(Value::Array(vec![Value::Object(rows.remove(0))])),
            n => Err(Error::internal(
                errors::PARSE_DB_RESP_ERROR,
                format!("expected one row, query returned {}", n),
            )),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct QueryAllTransformer;

impl RowTransformer for QueryAllTransformer {
    fn transform(&self, rows: Vec<Row>) -> Result<Value> {
        Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
    }
}

/// `{row[key] → row[value]}`, or the whole row when no value column is set.
#[derive(Debug, Clone)]
pub struct QueryMapTransformer {
    pub key: String,
    pub value: Option<String>,
}

impl Default for QueryMapTransformer {
    fn default() -> Self {
        Self {
            key: "id".to_string(),
            value: None,
        }
    }
}

impl RowTransformer for QueryMapTransformer {
    fn transform(&self, rows: Vec<Row>) -> Result<Value> {
        let mut out = Map::new();
        for mut row in rows {
            let key = match row.get(&self.key) {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => {
                    return Err(Error::internal(
                        errors::PARSE_DB_RESP_ERROR,
                        format!("row has no '{}' column", self.key),
                    ))
                }
                Some(other) => other.to_string(),
            };
            let value = match &self.value {
                Some(column) => row.remove(column).unwrap_or(Value::Null),
                None => Value::Object(row),
            };
            out.insert(key, value);
        }
        Ok(Value::Object(out))
    }

    fn empty(&self) -> Value {
        Value::Object(Map::new())
    }
}

/// Reshapes rows with a closure.
pub struct FnTransformer<F>(pub F);

impl<F> RowTransformer for FnTransformer<F>
where
    F: Fn(Vec<Row>) -> Result<Value> + Send + Sync,
{
    fn transform(&self, rows: Vec<Row>) -> Result<Value> {
        (self.0)(rows)
    }
}

/// Rows plus the unpaginated total when the query was paginated.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryOutput {
    pub rows: Vec<Row>,
    pub total_rows: Option<u64>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    output: QueryOutput,
    taken_at: Instant,
}

/// Entries kept per handler; stale ones are swept before this is enforced.
pub const MAX_CACHE_ENTRIES: usize = 1024;

/// Per-handler results keyed by argument tuple.
#[derive(Debug)]
pub struct QueryCache {
    entries: DashMap<String, CacheEntry>,
    max_age: Duration,
}

impl QueryCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_age,
        }
    }

    pub fn key(args: &[Value], pg: Option<&PaginationData>) -> String {
        let mut key = Value::Array(args.to_vec()).to_string();
        if let Some(pg) = pg {
            key.push_str(&format!(
                "|{}:{}:{}:{}",
                pg.page,
                pg.page_size,
                pg.order_by.as_deref().unwrap_or_default(),
                pg.desc
            ));
        }
        key
    }

    fn is_fresh(&self, entry: &CacheEntry, now: Instant) -> bool {
        now < entry.taken_at + self.max_age
    }

    /// Fresh entry for `key`; hit iff `now < taken_at + max_age`. A stale
    /// entry is dropped.
    pub fn get(&self, key: &str) -> Option<QueryOutput> {
        let now = Instant::now();
        {
            let entry = self.entries.get(key)?;
            if self.is_fresh(&entry, now) {
                return Some(entry.output.clone());
            }
        }
        self.entries.remove_if(key, |_, entry| !self.is_fresh(entry, now));
        None
    }

    /// Store `output`. A full cache is swept of stale entries first and
    /// the new entry is skipped when that frees nothing.
    pub fn put(&self, key: String, output: QueryOutput) {
        if self.entries.len() >= MAX_CACHE_ENTRIES && !self.entries.contains_key(&key) {
            let now = Instant::now();
            self.entries.retain(|_, entry| self.is_fresh(entry, now));
            if self.entries.len() >= MAX_CACHE_ENTRIES {
                tracing::debug!(entries = self.entries.len(), "Query cache full");
                return;
            }
        }
        self.entries.insert(
            key,
            CacheEntry {
                output,
                taken_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn total_of(rows: &[Row]) -> Option<u64> {
    match rows.first()?.get("total_rows")? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Run `command` with `args`; paginated runs also count the full result.
pub async fn run_query(
    db: &dyn Database,
    command: &QueryCommand,
    args: &[Value],
    pg: Option<&PaginationData>,
) -> Result<QueryOutput> {
    let sql = command.sql(db.mode());
    check_arguments(&command.name, sql, args.len())?;
    check_verb(&command.name, sql, &["select", "with"])?;

    let (rows, total_rows) = match pg {
        Some(pg) => {
            let page = paginate_command(sql, pg, db.mode());
            let rows = db.query(&page, args).await;
            let count = db.query(&count_command(sql), args).await;
            match (rows, count) {
                (Ok(rows), Ok(count)) => (rows, total_of(&count)),
                (Err(e), _) | (_, Err(e)) => {
                    metrics::record_db_statement("query", "error");
                    return Err(e.into());
                }
            }
        }
        None => match db.query(sql, args).await {
            Ok(rows) => (rows, None),
            Err(e) => {
                metrics::record_db_statement("query", "error");
                return Err(e.into());
            }
        },
    };
    metrics::record_db_statement("query", "ok");
    Ok(QueryOutput { rows, total_rows })
}

/// Answers with the transformed rows of one query.
pub struct QueryHandler<Req> {
    params: HandlerParameters,
    command: QueryCommand,
    transformer: Arc<dyn RowTransformer>,
    cache: Option<QueryCache>,
    on_empty_200: bool,
    _request: PhantomData<fn() -> Req>,
}

impl<Req> QueryHandler<Req> {
    pub fn new(params: HandlerParameters, command: QueryCommand) -> Self {
        let transformer: Arc<dyn RowTransformer> = match command.kind {
            QueryType::Single => Arc::new(QuerySingleTransformer),
            QueryType::Map => Arc::new(QueryMapTransformer::default()),
            QueryType::All | QueryType::Transforms => Arc::new(QueryAllTransformer),
        };
        Self {
            params,
            command,
            transformer,
            cache: None,
            on_empty_200: false,
            _request: PhantomData,
        }
    }

    pub fn transformer(mut self, transformer: impl RowTransformer + 'static) -> Self {
        self.transformer = Arc::new(transformer);
        self
    }

    pub fn cache(mut self, max_age: Duration) -> Self {
        self.cache = Some(QueryCache::new(max_age));
        self
    }

    /// Answer an empty result with an empty 200 instead of `NO_DATA_FOUND`.
    pub fn on_empty_200(mut self, on: bool) -> Self {
        self.on_empty_200 = on;
        self
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.as_ref().map(QueryCache::len).unwrap_or(0)
    }
}

#[async_trait]
impl<Req> Handler for QueryHandler<Req>
where
    Req: DeserializeOwned + Serialize + Validate + Send + Sync + 'static,
{
    type Request = Req;
    type Response = Value;

    fn parameters(&self) -> HandlerParameters {
        self.params.clone()
    }

    async fn handler(&self, trx: &mut HandlerRequest<Req, Value>) -> Result<Value> {
        let db = trx.db()?;
        let request = serde_json::to_value(trx.request()?)
            .map_err(|e| Error::internal(errors::RESPONSE_ENCODING_ERROR, e.to_string()))?;
        let url_params: Vec<&str> = self.command.args.iter().map(String::as_str).collect();
        let fallback = get_args(trx.parser(), &url_params);
        let args = self.command.bind(&request, &fallback)?;
        let pg = if self.params.body_mode.is_paginated() {
            Some(trx.pagination().map(|pg| (*pg).clone()).unwrap_or_default())
        } else {
            None
        };

        let key = QueryCache::key(&args, pg.as_ref());
        let cached = self.cache.as_ref().and_then(|cache| cache.get(&key));
        let output = match cached {
            Some(output) => {
                tracing::debug!(query = %self.command.name, "Query cache hit");
                output
            }
            None => {
                let output = run_query(db.as_ref(), &self.command, &args, pg.as_ref()).await?;
                if let Some(cache) = &self.cache {
                    cache.put(key, output.clone());
                }
                output
            }
        };

        if let Some(total) = output.total_rows {
            trx.parser_mut()
                .set_resp_header(TOTAL_COUNT_HEADER, &total.to_string());
        }
        if output.rows.is_empty() {
            if self.on_empty_200 {
                return Ok(self.transformer.empty());
            }
            return Err(Error::bad_request(errors::NO_DATA_FOUND, self.command.name.clone()));
        }
        self.transformer.transform(output.rows)
    }
}
