//! DuckDB migrations

use crate::error::Result;
use duckdb::Connection;

/// Run all DuckDB migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migrations (
            name VARCHAR PRIMARY KEY,
            applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )",
    )?;

    run_migration(conn, "001_candle_cache_catalog", CREATE_CANDLE_CACHE_CATALOG)?;
    run_migration(conn, "002_candle_bars", CREATE_CANDLE_BARS)?;

    tracing::debug!("DuckDB migrations completed");
    Ok(())
}

fn run_migration(conn: &Connection, name: &str, sql: &str) -> Result<()> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM migrations WHERE name = ?",
        [name],
        |row| row.get(0),
    )?;

    if !exists {
        tracing::info!("Running DuckDB migration: {}", name);
        conn.execute_batch(sql)?;
        conn.execute("INSERT INTO migrations (name) VALUES (?)", [name])?;
    }

    Ok(())
}

const CREATE_CANDLE_CACHE_CATALOG: &str = r#"
CREATE TABLE IF NOT EXISTS candle_cache_catalog (
    symbol VARCHAR NOT NULL,
    from_date VARCHAR NOT NULL,
    to_date VARCHAR NOT NULL,
    fetched_on VARCHAR NOT NULL,
    bar_count BIGINT NOT NULL DEFAULT 0,
    PRIMARY KEY (symbol, from_date, to_date)
);
"#;

const CREATE_CANDLE_BARS: &str = r#"
CREATE TABLE IF NOT EXISTS candle_bars (
    symbol VARCHAR NOT NULL,
    from_date VARCHAR NOT NULL,
    to_date VARCHAR NOT NULL,
    bar_index BIGINT NOT NULL,
    high DOUBLE,
    low DOUBLE,
    close DOUBLE,
    PRIMARY KEY (symbol, from_date, to_date, bar_index)
);

CREATE INDEX IF NOT EXISTS idx_candle_bars_symbol ON candle_bars(symbol);
"#;
