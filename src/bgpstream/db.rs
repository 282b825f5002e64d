use std::path::Path;

use anyhow::Context;
use bgpm::{
    db::{DBResult, PooledConnection, ToSqlIter},
    event::{Record, Table},
    ingest::EventStore,
    plan::HighWater,
};
use tokio_postgres::{error::SqlState, types::ToSql};

pub const TABLE_NAMES: &str = "table_names.txt";
pub const SCHEMA: &str = "schema.sql";

pub struct PgStore {
    conn: PooledConnection,
    /// Print every insert before running it.
    debug: bool,
}

/// `INSERT INTO <table> (<columns>) VALUES ($1, ...)` for `record`.
pub fn insert_sql(record: &Record) -> String {
    let names = record.columns.iter().map(|(name, _)| name).collect::<Vec<_>>();
    let placeholders = (1..=names.len())
        .map(|i| format!("${i}"))
        .collect::<Vec<_>>();
    format!(
        "insert into {} ({}) values ({})",
        record.table,
        names.join(", "),
        placeholders.join(", ")
    )
}

impl PgStore {
    pub const fn new(conn: PooledConnection, debug: bool) -> Self {
        Self { conn, debug }
    }

    /// Drops every table by recreating the `public` schema.
    pub async fn clear(&mut self) -> DBResult<()> {
        self.conn
            .batch_execute("drop schema if exists public cascade; create schema public;")
            .await?;
        tracing::info!(target: "db", "\x1b[33mdatabase cleared\x1b[0m");
        Ok(())
    }

    pub async fn missing_tables(&mut self, names: &[String]) -> DBResult<Vec<String>> {
        const SQL: &str = "select t from unnest($1::text[]) as t where to_regclass(t) is null";

        let stmt = self.conn.prepare(SQL).await?;
        let rows = self
            .conn
            .query(&stmt, &[&ToSqlIter(names.iter().map(String::as_str))])
            .await?;
        rows.iter().map(|row| row.try_get(0)).collect()
    }

    /// Recreates the schema from `sql_dir` unless every listed table exists.
    pub async fn ensure_schema(&mut self, sql_dir: &Path) -> anyhow::Result<()> {
        let path = sql_dir.join(TABLE_NAMES);
        let names = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(ToOwned::to_owned)
            .collect::<Vec<_>>();

        let missing = self.missing_tables(&names).await?;
        if missing.is_empty() {
            tracing::debug!(target: "db", "schema complete: {names:?}");
            return Ok(());
        }

        tracing::warn!(target: "db", "missing tables {missing:?}, recreating the schema");
        let path = sql_dir.join(SCHEMA);
        let ddl = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("cannot read {}", path.display()))?;
        self.clear().await?;
        self.conn.batch_execute(&ddl).await?;
        Ok(())
    }
}

impl EventStore for PgStore {
    async fn high_water(&mut self) -> anyhow::Result<HighWater> {
        let mut high_water = HighWater::default();
        for table in Table::EVENTS {
            let sql = format!("select max(id) from {table}");
            let max = match self.conn.query_one(sql.as_str(), &[]).await {
                Ok(row) => row.try_get::<_, Option<i64>>(0)?.unwrap_or(0),
                Err(e) if e.code() == Some(&SqlState::UNDEFINED_TABLE) => 0,
                Err(e) => return Err(e).with_context(|| format!("high-water mark of {table}")),
            };
            high_water.set(table, max);
        }
        Ok(high_water)
    }

    async fn insert_event(&mut self, id: i64, records: &[Record]) -> anyhow::Result<u64> {
        let txn = self.conn.transaction().await?;
        let mut n = 0;
        for record in records {
            if self.debug {
                println!("{record}");
            }
            let sql = insert_sql(record);
            let params = record
                .columns
                .iter()
                .map(|(_, value)| value as &(dyn ToSql + Sync))
                .collect::<Vec<_>>();
            n += txn
                .execute(sql.as_str(), &params)
                .await
                .with_context(|| format!("[#{id}] {record}"))?;
        }
        // dropping the transaction on error rolls the whole event back
        txn.commit().await?;
        Ok(n)
    }
}
