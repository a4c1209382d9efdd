//! Candle cache storage
//!
//! A cache entry is keyed by (symbol, from-date, to-date) and is only served
//! on the trading day it was fetched. Anything older is a miss.

pub mod duckdb;

use crate::error::Result;
use crate::models::candle::CandleSeries;
use chrono::NaiveDate;
use dashmap::DashMap;

/// Cache key for one instrument's candle request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CandleCacheKey {
    pub symbol: String,
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
}

impl CandleCacheKey {
    pub fn new(symbol: impl Into<String>, from_date: NaiveDate, to_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.into(),
            from_date,
            to_date,
        }
    }
}

/// Storage for fetched candle series
pub trait CandleCache: Send + Sync {
    /// Series stored under `key`, if it was fetched on `today`
    fn get(&self, key: &CandleCacheKey, today: NaiveDate) -> Result<Option<CandleSeries>>;

    /// Store `series` under `key`, stamped with `today`
    fn put(&self, key: &CandleCacheKey, series: &CandleSeries, today: NaiveDate) -> Result<()>;
}

/// Process-local cache
#[derive(Default)]
pub struct MemoryCandleCache {
    entries: DashMap<CandleCacheKey, (NaiveDate, CandleSeries)>,
}

impl MemoryCandleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CandleCache for MemoryCandleCache {
    fn get(&self, key: &CandleCacheKey, today: NaiveDate) -> Result<Option<CandleSeries>> {
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.value().0 == today)
            .map(|entry| entry.value().1.clone()))
    }

    fn put(&self, key: &CandleCacheKey, series: &CandleSeries, today: NaiveDate) -> Result<()> {
        self.entries.insert(key.clone(), (today, series.clone()));
        Ok(())
    }
}
