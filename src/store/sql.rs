//! Small SQL-building helpers shared by every typed store (spec 4.1).
//!
//! There is no generic `Table<T>` trait object here: sqlx's compile-time
//! query checking works against literal SQL strings, so each concrete store
//! builds its own `INSERT ... ON CONFLICT` text through [`upsert_sql`] and
//! binds its own parameters. What *is* shared is the column-role discipline
//! (pk / immutable / mutable) and the whitespace-normalized trace logging.

use std::time::Instant;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Part of the primary key (or a secondary index) - conflict target,
    /// never assigned to in the UPDATE SET list.
    Pk,
    /// Not part of any key, but the engine still forbids updating it
    /// because a secondary index covers it (spec 9).
    Immutable,
    /// Freely overwritten on conflict.
    Mutable,
}

pub struct Column {
    pub name: &'static str,
    pub role: ColumnRole,
}

pub const fn pk(name: &'static str) -> Column {
    Column { name, role: ColumnRole::Pk }
}

pub const fn immutable(name: &'static str) -> Column {
    Column { name, role: ColumnRole::Immutable }
}

pub const fn mutable(name: &'static str) -> Column {
    Column { name, role: ColumnRole::Mutable }
}

/// Builds `INSERT INTO <table> (...) VALUES (...) ON CONFLICT (<pk>) DO
/// UPDATE SET <mutable-only> = EXCLUDED.<mutable-only>` (or `DO NOTHING`
/// when there are no mutable columns), enforcing that immutable/indexed
/// columns are never placed in the UPDATE SET.
pub fn upsert_sql(table: &str, columns: &[Column]) -> String {
    let all_names: Vec<&str> = columns.iter().map(|c| c.name).collect();
    let placeholders: Vec<String> = (1..=all_names.len()).map(|i| format!("${i}")).collect();
    let pk_names: Vec<&str> = columns
        .iter()
        .filter(|c| c.role == ColumnRole::Pk)
        .map(|c| c.name)
        .collect();
    let mutable_names: Vec<&str> = columns
        .iter()
        .filter(|c| c.role == ColumnRole::Mutable)
        .map(|c| c.name)
        .collect();

    let mut sql = format!(
        "INSERT INTO {table} ({cols}) VALUES ({vals}) ON CONFLICT ({pk})",
        table = table,
        cols = all_names.join(", "),
        vals = placeholders.join(", "),
        pk = pk_names.join(", "),
    );

    if mutable_names.is_empty() {
        sql.push_str(" DO NOTHING");
    } else {
        let set_clause = mutable_names
            .iter()
            .map(|c| format!("{c} = EXCLUDED.{c}"))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(" DO UPDATE SET ");
        sql.push_str(&set_clause);
    }

    sql
}

/// Collapses runs of whitespace to one space and trims, matching spec
/// 4.1's "raw statement is whitespace-normalized" requirement for trace
/// logs.
pub fn normalize_whitespace(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Logs a query at trace level with its execution duration, the way every
/// call into the store is instrumented per spec 4.1.
pub struct QueryTimer<'a> {
    sql: &'a str,
    started: Instant,
}

impl<'a> QueryTimer<'a> {
    pub fn start(sql: &'a str) -> Self {
        Self { sql, started: Instant::now() }
    }
}

impl<'a> Drop for QueryTimer<'a> {
    fn drop(&mut self) {
        trace!(
            statement = %normalize_whitespace(self.sql),
            duration_us = self.started.elapsed().as_micros() as u64,
            "executed statement"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_sql_excludes_immutable_columns_from_update() {
        let sql = upsert_sql(
            "widgets",
            &[pk("id"), immutable("created_at"), mutable("status")],
        );
        assert!(sql.contains("ON CONFLICT (id)"));
        assert!(sql.contains("status = EXCLUDED.status"));
        assert!(!sql.contains("created_at = EXCLUDED.created_at"));
        assert!(!sql.contains("id = EXCLUDED.id"));
    }

    #[test]
    fn upsert_sql_with_only_pk_columns_does_nothing_on_conflict() {
        let sql = upsert_sql("edges", &[pk("a"), pk("b")]);
        assert!(sql.ends_with("DO NOTHING"));
    }

    #[test]
    fn normalize_whitespace_collapses_and_trims() {
        assert_eq!(normalize_whitespace("  select   1\n  from  dual "), "select 1 from dual");
    }
}
