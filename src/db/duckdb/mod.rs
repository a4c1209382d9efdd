//! DuckDB-backed candle cache

pub mod models;
mod migrations;

use crate::db::{CandleCache, CandleCacheKey};
use crate::error::{AppError, Result};
use crate::models::candle::{Candle, CandleSeries};
use chrono::NaiveDate;
use duckdb::Connection;
use models::{CandleBarRow, CatalogEntry};
use parking_lot::Mutex;
use std::path::Path;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// DuckDB database wrapper
pub struct DuckDb {
    conn: Mutex<Connection>,
}

impl DuckDb {
    /// Open (or create) the cache database at `path`
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Cache that lives only as long as the process
    pub fn in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let db = Self {
            conn: Mutex::new(conn),
        };

        // Run migrations
        db.run_migrations()?;

        Ok(db)
    }

    /// Run database migrations
    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock();
        migrations::run_migrations(&conn)
    }

    fn catalog_entry(conn: &Connection, key: &CandleCacheKey) -> Result<Option<CatalogEntry>> {
        let mut stmt = conn.prepare(
            "SELECT fetched_on, bar_count
             FROM candle_cache_catalog
             WHERE symbol = ? AND from_date = ? AND to_date = ?",
        )?;

        let mut entries = stmt
            .query_map(
                duckdb::params![
                    key.symbol,
                    key.from_date.format(DATE_FORMAT).to_string(),
                    key.to_date.format(DATE_FORMAT).to_string(),
                ],
                |row| {
                    Ok(CatalogEntry {
                        fetched_on: row.get(0)?,
                        bar_count: row.get(1)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries.pop())
    }

    fn query_bars(conn: &Connection, key: &CandleCacheKey) -> Result<Vec<CandleBarRow>> {
        let mut stmt = conn.prepare(
            "SELECT bar_index, high, low, close
             FROM candle_bars
             WHERE symbol = ? AND from_date = ? AND to_date = ?
             ORDER BY bar_index ASC",
        )?;

        let rows = stmt
            .query_map(
                duckdb::params![
                    key.symbol,
                    key.from_date.format(DATE_FORMAT).to_string(),
                    key.to_date.format(DATE_FORMAT).to_string(),
                ],
                |row| {
                    Ok(CandleBarRow {
                        bar_index: row.get(0)?,
                        high: row.get(1)?,
                        low: row.get(2)?,
                        close: row.get(3)?,
                    })
                },
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

impl CandleCache for DuckDb {
    fn get(&self, key: &CandleCacheKey, today: NaiveDate) -> Result<Option<CandleSeries>> {
        let conn = self.conn.lock();

        let entry = match Self::catalog_entry(&conn, key)? {
            Some(entry) => entry,
            None => return Ok(None),
        };

        if entry.fetched_on != today.format(DATE_FORMAT).to_string() {
            tracing::debug!(
                "Cache entry for {} is from {}, treating as stale",
                key.symbol,
                entry.fetched_on
            );
            return Ok(None);
        }

        let rows = Self::query_bars(&conn, key)?;
        let contiguous = rows
            .iter()
            .enumerate()
            .all(|(idx, row)| row.bar_index == idx as i64);
        if !contiguous || rows.len() as i64 != entry.bar_count {
            return Err(AppError::Internal(format!(
                "Candle cache for {} is inconsistent: catalog says {} bars, found {}",
                key.symbol,
                entry.bar_count,
                rows.len()
            )));
        }

        let bars: Vec<Candle> = rows.into_iter().map(Candle::from).collect();
        Ok(Some(CandleSeries::new(bars)))
    }

    fn put(&self, key: &CandleCacheKey, series: &CandleSeries, today: NaiveDate) -> Result<()> {
        let mut conn = self.conn.lock();
        let from_date = key.from_date.format(DATE_FORMAT).to_string();
        let to_date = key.to_date.format(DATE_FORMAT).to_string();

        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM candle_bars WHERE symbol = ? AND from_date = ? AND to_date = ?",
            duckdb::params![key.symbol, from_date, to_date],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO candle_bars (symbol, from_date, to_date, bar_index, high, low, close)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )?;

            for (idx, bar) in series.bars().iter().enumerate() {
                stmt.execute(duckdb::params![
                    key.symbol,
                    from_date,
                    to_date,
                    idx as i64,
                    bar.high,
                    bar.low,
                    bar.close,
                ])?;
            }
        }

        tx.execute(
            "INSERT INTO candle_cache_catalog (symbol, from_date, to_date, fetched_on, bar_count)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (symbol, from_date, to_date) DO UPDATE SET
               fetched_on = excluded.fetched_on, bar_count = excluded.bar_count",
            duckdb::params![
                key.symbol,
                from_date,
                to_date,
                today.format(DATE_FORMAT).to_string(),
                series.len() as i64,
            ],
        )?;

        tx.commit()?;

        Ok(())
    }
}
