//! Audit session variables set at the start of every DML transaction.

use serde_json::Value;

use crate::db::{DbMode, Statement};

pub const ORACLE_SET: &str = "BEGIN AUDIT_TRAIL.SET_MODIF_ARGS(:1, :2); END;";
pub const POSTGRES_SET: &str = "SELECT set_config($1,$2,true);";

/// Identity stamped on the transaction (`request.APP`, `request.USER`, ...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionVars {
    /// `program.module`
    pub app: String,
    pub user: String,
    pub module: String,
    pub method: String,
}

impl SessionVars {
    pub fn new(program: &str, module: &str, method: &str, user: &str) -> Self {
        Self {
            app: format!("{}.{}", program, module),
            user: user.to_string(),
            module: module.to_string(),
            method: method.to_string(),
        }
    }

    pub fn pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("request.APP", self.app.as_str()),
            ("request.USER", self.user.as_str()),
            ("request.MODULE", self.module.as_str()),
            ("request.METHOD", self.method.as_str()),
        ]
    }

    /// The set-variable statements for `mode`; empty for `none`.
    pub fn statements(&self, mode: DbMode) -> Vec<Statement> {
        self.pairs()
            .iter()
            .filter_map(|(name, value)| set_statement(mode, name, value))
            .collect()
    }
}

fn set_statement(mode: DbMode, name: &str, value: &str) -> Option<Statement> {
    let stmt = match mode {
        DbMode::Oracle => Statement::new(
            name,
            ORACLE_SET,
            vec![Value::from(name), Value::from(value)],
        ),
        DbMode::Postgres => Statement::new(
            name,
            POSTGRES_SET,
            vec![Value::from(name), Value::from(value)],
        ),
        DbMode::Mysql => Statement::new(
            name,
            format!("SET @{} = '{}';", name, quote(value)),
            Vec::new(),
        ),
        DbMode::Sqlite => Statement::new(
            name,
            format!("PRAGMA {} = '{}';", name, quote(value)),
            Vec::new(),
        ),
        DbMode::None => return None,
    };
    Some(stmt)
}

fn quote(value: &str) -> String {
    value.replace('\'', "''")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> SessionVars {
        SessionVars::new("core", "accounts", "create", "o'neil")
    }

    #[test]
    fn test_postgres_commands() {
        let stmts = vars().statements(DbMode::Postgres);
        assert_eq!(stmts.len(), 4);
        assert_eq!(stmts[0].sql, POSTGRES_SET);
        assert_eq!(stmts[0].args, vec![Value::from("request.APP"), Value::from("core.accounts")]);
        assert_eq!(stmts[3].args[0], Value::from("request.METHOD"));
    }

    #[test]
    fn test_mysql_and_sqlite_quote_values() {
        let mysql = vars().statements(DbMode::Mysql);
        assert_eq!(mysql[1].sql, "SET @request.USER = 'o''neil';");
        assert!(mysql[1].args.is_empty());

        let sqlite = vars().statements(DbMode::Sqlite);
        assert_eq!(sqlite[2].sql, "PRAGMA request.MODULE = 'accounts';");
    }

    #[test]
    fn test_oracle_and_none() {
        assert_eq!(vars().statements(DbMode::Oracle)[0].sql, ORACLE_SET);
        assert!(vars().statements(DbMode::None).is_empty());
    }
}
