//! Page/offset extraction and SQL rewriting for paginated queries.

use serde::{Deserialize, Serialize};

use crate::db::DbMode;

/// Local holding the request's [`PaginationData`].
pub const PAGINATION_LOCAL: &str = "paginationData";

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 1000;

/// Response header carrying the unpaginated row count.
pub const TOTAL_COUNT_HEADER: &str = "X-Total-Count";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationData {
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub order_by: Option<String>,
    pub desc: bool,
}

impl Default for PaginationData {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            order_by: None,
            desc: false,
        }
    }
}

impl PaginationData {
    /// Read `page`, `pageSize`, `orderBy` and `desc` from a raw query string.
    ///
    /// Unparseable values fall back to the defaults; the page size is clamped.
    pub fn from_query(query: &str) -> Self {
        let mut pg = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "page" => {
                    if let Some(page) = value.parse::<u32>().ok().filter(|p| *p >= 1) {
                        pg.page = page;
                    }
                }
                "pageSize" => {
                    if let Some(size) = value.parse::<u32>().ok().filter(|p| *p >= 1) {
                        pg.page_size = size.min(MAX_PAGE_SIZE);
                    }
                }
                "orderBy" if is_identifier(&value) => pg.order_by = Some(value.into_owned()),
                "desc" => pg.desc = matches!(value.as_ref(), "true" | "1" | "yes"),
                _ => {}
            }
        }
        pg
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

/// Only plain column names may be spliced into ORDER BY.
fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

/// Wrap `sql` with ordering and the page window for `mode`.
pub fn paginate_command(sql: &str, pg: &PaginationData, mode: DbMode) -> String {
    let mut out = sql.trim().trim_end_matches(';').to_string();
    if let Some(order_by) = &pg.order_by {
        out = format!(
            "SELECT * FROM ({}) q ORDER BY {}{}",
            out,
            order_by,
            if pg.desc { " DESC" } else { "" }
        );
    }
    match mode {
        DbMode::Oracle => format!(
            "{} OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
            out,
            pg.offset(),
            pg.page_size
        ),
        _ => format!("{} LIMIT {} OFFSET {}", out, pg.page_size, pg.offset()),
    }
}

/// Count query over the unpaginated statement; the column is `total_rows`.
pub fn count_command(sql: &str) -> String {
    format!(
        "SELECT COUNT(*) AS total_rows FROM ({}) q",
        sql.trim().trim_end_matches(';')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_query() {
        let pg = PaginationData::from_query("page=3&pageSize=50&orderBy=created_at&desc=true");
        assert_eq!(pg.page, 3);
        assert_eq!(pg.page_size, 50);
        assert_eq!(pg.order_by.as_deref(), Some("created_at"));
        assert!(pg.desc);
        assert_eq!(pg.offset(), 100);
    }

    #[test]
    fn test_defaults_and_clamping() {
        let pg = PaginationData::from_query("page=0&pageSize=5000&orderBy=1;drop");
        assert_eq!(pg.page, 1);
        assert_eq!(pg.page_size, MAX_PAGE_SIZE);
        assert_eq!(pg.order_by, None);
        assert_eq!(PaginationData::from_query(""), PaginationData::default());
    }

    #[test]
    fn test_paginate_per_mode() {
        let pg = PaginationData {
            page: 2,
            page_size: 10,
            order_by: None,
            desc: false,
        };
        assert_eq!(
            paginate_command("SELECT * FROM t;", &pg, DbMode::Postgres),
            "SELECT * FROM t LIMIT 10 OFFSET 10"
        );
        assert_eq!(
            paginate_command("SELECT * FROM t", &pg, DbMode::Oracle),
            "SELECT * FROM t OFFSET 10 ROWS FETCH NEXT 10 ROWS ONLY"
        );
        assert_eq!(
            count_command("SELECT * FROM t"),
            "SELECT COUNT(*) AS total_rows FROM (SELECT * FROM t) q"
        );
    }
}
