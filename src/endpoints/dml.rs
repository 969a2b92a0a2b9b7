//! DML model executor: pre-control checks, one transaction per key, and
//! best-effort finalize statements.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::command::{check_arguments, check_verb};
use crate::db::{Database, SessionVars, Statement, TxBatch};
use crate::errors::{self, Error, Result};
use crate::http::header::RequestHeader;
use crate::observability::metrics;
use crate::pipeline::{Handler, HandlerParameters, HandlerRequest};
use crate::validation::Validate;

/// Rows affected per command name.
pub type DmlResult = BTreeMap<String, u64>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DmlCommandType {
    /// Passes when the query returns no rows.
    CheckNotExists,
    /// Passes when the query returns at least one row.
    CheckExists,
    Insert,
    Update,
    Delete,
    /// Any statement; the verb is not checked.
    Transforms,
}

impl DmlCommandType {
    fn verbs(self) -> &'static [&'static str] {
        match self {
            DmlCommandType::CheckNotExists | DmlCommandType::CheckExists => &["select", "with"],
            DmlCommandType::Insert => &["insert"],
            DmlCommandType::Update => &["update"],
            DmlCommandType::Delete => &["delete"],
            DmlCommandType::Transforms => &[],
        }
    }

    fn is_check(self) -> bool {
        matches!(self, DmlCommandType::CheckNotExists | DmlCommandType::CheckExists)
    }

    fn label(self) -> &'static str {
        match self {
            DmlCommandType::CheckNotExists => "check_not_exists",
            DmlCommandType::CheckExists => "check_exists",
            DmlCommandType::Insert => "insert",
            DmlCommandType::Update => "update",
            DmlCommandType::Delete => "delete",
            DmlCommandType::Transforms => "transforms",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DmlCommand {
    pub name: String,
    pub command: String,
    pub args: Vec<Value>,
    pub kind: DmlCommandType,
    /// Replaces the default failure of a check command.
    pub custom_error: Option<Error>,
}

impl DmlCommand {
    pub fn new(
        name: impl Into<String>,
        kind: DmlCommandType,
        command: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args,
            kind,
            custom_error: None,
        }
    }

    pub fn custom_error(mut self, err: Error) -> Self {
        self.custom_error = Some(err);
        self
    }

    /// Placeholder count must match the arguments and the verb the type.
    #[track_caller]
    pub fn validate(&self) -> Result<()> {
        check_arguments(&self.name, &self.command, self.args.len())?;
        if self.kind != DmlCommandType::Transforms {
            check_verb(&self.name, &self.command, self.kind.verbs())?;
        }
        Ok(())
    }

    fn statement(&self) -> Statement {
        Statement::new(self.name.clone(), self.command.clone(), self.args.clone())
    }
}

/// Commands grouped by logical key.
#[derive(Debug, Clone, Default)]
pub struct DmlModel {
    pub pre_control: BTreeMap<String, Vec<DmlCommand>>,
    pub dml: BTreeMap<String, Vec<DmlCommand>>,
    pub finalize: BTreeMap<String, Vec<DmlCommand>>,
}

impl DmlModel {
    pub fn pre_control(mut self, key: &str, command: DmlCommand) -> Self {
        self.pre_control.entry(key.to_string()).or_default().push(command);
        self
    }

    pub fn dml(mut self, key: &str, command: DmlCommand) -> Self {
        self.dml.entry(key.to_string()).or_default().push(command);
        self
    }

    pub fn finalize(mut self, key: &str, command: DmlCommand) -> Self {
        self.finalize.entry(key.to_string()).or_default().push(command);
        self
    }

    fn commands<'a>(map: &'a BTreeMap<String, Vec<DmlCommand>>, key: &str) -> &'a [DmlCommand] {
        map.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Requests that describe their own DML.
pub trait DmlRequest {
    fn dml_model(&self, header: &RequestHeader) -> DmlModel;
}

/// Run one pre-control command; the underlying failure code.
async fn run_check(db: &dyn Database, cmd: &DmlCommand) -> Result<()> {
    cmd.validate()?;
    if !cmd.kind.is_check() {
        db.execute(&cmd.command, &cmd.args).await?;
        metrics::record_db_statement(cmd.kind.label(), "ok");
        return Ok(());
    }

    let rows = match db.query(&cmd.command, &cmd.args).await {
        Ok(rows) => rows.len(),
        Err(e) => {
            metrics::record_db_statement(cmd.kind.label(), "error");
            return Err(Error::from(e));
        }
    };
    let failed = match cmd.kind {
        DmlCommandType::CheckNotExists if rows > 0 => Some(errors::DUPLICATE_FOUND),
        DmlCommandType::CheckExists if rows == 0 => Some(errors::NO_DATA_FOUND),
        _ => None,
    };
    metrics::record_db_statement(cmd.kind.label(), if failed.is_some() { "rejected" } else { "ok" });
    match failed {
        None => Ok(()),
        Some(code) => Err(match &cmd.custom_error {
            Some(custom) => custom.clone(),
            None => Error::bad_request(code, cmd.name.clone()),
        }),
    }
}

/// Run `pre_control[key]` in order; the first failure aborts as
/// `{500, <failure code>, title}`.
pub async fn pre_control(db: &dyn Database, model: &DmlModel, key: &str, title: &str) -> Result<()> {
    for cmd in DmlModel::commands(&model.pre_control, key) {
        if let Err(err) = run_check(db, cmd).await {
            tracing::debug!(command = %cmd.name, code = %err.code(), "Pre-control failed");
            return Err(Error::new(500, err.description.clone(), title).child(err));
        }
    }
    Ok(())
}

/// Run `commands` in one transaction after setting `session`.
async fn run_batch(db: &dyn Database, session: SessionVars, commands: &[DmlCommand]) -> Result<DmlResult> {
    for cmd in commands {
        cmd.validate()?;
    }
    if commands.is_empty() {
        return Ok(DmlResult::new());
    }
    let batch = TxBatch {
        session: Some(session),
        statements: commands.iter().map(DmlCommand::statement).collect(),
    };
    match db.execute_batch(batch).await {
        Ok(affected) => {
            for cmd in commands {
                metrics::record_db_statement(cmd.kind.label(), "ok");
            }
            Ok(commands
                .iter()
                .map(|cmd| cmd.name.clone())
                .zip(affected)
                .collect())
        }
        Err(e) => {
            metrics::record_db_statement("batch", "error");
            Err(e.into())
        }
    }
}

/// Run `dml[key]`: every command commits or none does.
pub async fn execute_dml(
    db: &dyn Database,
    model: &DmlModel,
    key: &str,
    session: SessionVars,
) -> Result<DmlResult> {
    run_batch(db, session, DmlModel::commands(&model.dml, key)).await
}

/// Run `finalize[key]`; failures are logged only.
pub async fn finalize_dml(db: &dyn Database, model: &DmlModel, key: &str, session: SessionVars) {
    if let Err(err) = run_batch(db, session, DmlModel::commands(&model.finalize, key)).await {
        tracing::warn!(key = %key, error = %err.log_value(), "Finalize DML failed");
    }
}

fn session_of(header: &RequestHeader) -> SessionVars {
    SessionVars::new(&header.program, &header.module, &header.method, &header.user)
}

/// Runs the request's DML model under one key.
pub struct DmlHandler<Req> {
    params: HandlerParameters,
    key: String,
    _request: PhantomData<fn() -> Req>,
}

impl<Req> DmlHandler<Req> {
    pub fn new(params: HandlerParameters, key: impl Into<String>) -> Self {
        Self {
            params,
            key: key.into(),
            _request: PhantomData,
        }
    }
}

#[async_trait]
impl<Req> Handler for DmlHandler<Req>
where
    Req: DmlRequest + DeserializeOwned + Serialize + Validate + Send + Sync + 'static,
{
    type Request = Req;
    type Response = DmlResult;

    fn parameters(&self) -> HandlerParameters {
        self.params.clone()
    }

    async fn handler(&self, trx: &mut HandlerRequest<Req, DmlResult>) -> Result<DmlResult> {
        let db = trx.db()?;
        let model = trx.request()?.dml_model(&trx.header);
        pre_control(db.as_ref(), &model, &self.key, &trx.title).await?;
        execute_dml(db.as_ref(), &model, &self.key, session_of(&trx.header)).await
    }

    async fn finalizer(&self, trx: &mut HandlerRequest<Req, DmlResult>) {
        if !trx.resp_sent {
            return;
        }
        let (Ok(db), Ok(request)) = (trx.db(), trx.request()) else {
            return;
        };
        let model = request.dml_model(&trx.header);
        finalize_dml(db.as_ref(), &model, &self.key, session_of(&trx.header)).await;
    }
}
