//! CSV market data
//!
//! One file per symbol, `<SYMBOL>.csv`, header
//! `timestamp,price,volume[,bid_volume,ask_volume]`. Timestamps are unix
//! seconds or RFC 3339. Prices go through `Decimal` so exchange-formatted
//! values parse exactly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::MarketDataSource;
use crate::core::error::DataUnavailable;
use crate::core::types::{OrderBookSnapshot, Sample, Series};

fn parse_time(field: &str) -> Option<DateTime<Utc>> {
    if let Ok(secs) = field.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    DateTime::parse_from_rfc3339(field).ok().map(|t| t.with_timezone(&Utc))
}

fn parse_number(field: &str, line: usize, name: &str) -> Result<f64, DataUnavailable> {
    Decimal::from_str(field)
        .ok()
        .and_then(|d| d.to_f64())
        .ok_or_else(|| DataUnavailable::Malformed(format!("line {}: bad {} '{}'", line, name, field)))
}

/// Parse a whole CSV document. The order book comes from the last row when
/// it carries bid/ask volume columns.
pub fn parse_csv(symbol: &str, text: &str) -> Result<Series, DataUnavailable> {
    let mut samples = Vec::new();
    let mut book = None;

    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if i == 0 || line.is_empty() {
            continue; // Skip header
        }
        let parts: Vec<&str> = line.split(',').map(str::trim).collect();
        if parts.len() < 3 {
            return Err(DataUnavailable::Malformed(format!("line {}: expected at least 3 fields", i + 1)));
        }
        let time = parse_time(parts[0])
            .ok_or_else(|| DataUnavailable::Malformed(format!("line {}: bad timestamp '{}'", i + 1, parts[0])))?;
        let price = parse_number(parts[1], i + 1, "price")?;
        let volume = parse_number(parts[2], i + 1, "volume")?;
        samples.push(Sample::new(time, price, volume));

        book = if parts.len() >= 5 {
            Some(OrderBookSnapshot {
                bid_volume: parse_number(parts[3], i + 1, "bid_volume")?,
                ask_volume: parse_number(parts[4], i + 1, "ask_volume")?,
            })
        } else {
            None
        };
    }

    if samples.is_empty() {
        return Err(DataUnavailable::NoData(symbol.to_string()));
    }
    samples.sort_by_key(|s| s.time);

    let series = Series::new(symbol, samples);
    Ok(match book {
        Some(book) => series.with_order_book(book),
        None => series,
    })
}

/// Directory of per-symbol CSV files; each fetch re-reads the file and
/// returns the trailing `lookback` samples
pub struct CsvMarketData {
    dir: PathBuf,
    lookback: usize,
}

impl CsvMarketData {
    pub fn new(dir: impl Into<PathBuf>, lookback: usize) -> Self {
        Self {
            dir: dir.into(),
            lookback,
        }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", symbol))
    }
}

#[async_trait]
impl MarketDataSource for CsvMarketData {
    async fn fetch(&self, symbol: &str) -> Result<Series, DataUnavailable> {
        let path = self.path_for(symbol);
        let text = tokio::fs::read_to_string(&path).await.map_err(|e| {
            debug!("[DATA] {}: {}", path.display(), e);
            DataUnavailable::NoData(symbol.to_string())
        })?;
        Ok(parse_csv(symbol, &text)?.tail(self.lookback))
    }
}

struct Cursor {
    series: Series,
    position: usize,
}

/// Steps through preloaded series one sample per fetch. The first fetch
/// returns the first `lookback` samples; once the last sample has been
/// served the source reports `Exhausted`.
pub struct ReplaySource {
    lookback: usize,
    cursors: Mutex<HashMap<String, Cursor>>,
}

impl ReplaySource {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(1),
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn add(&self, series: Series) {
        let position = self.lookback.min(series.len());
        if let Ok(mut cursors) = self.cursors.lock() {
            cursors.insert(series.symbol.clone(), Cursor { series, position });
        }
    }

    /// Load `<SYMBOL>.csv` from disk
    pub fn load(&self, path: impl AsRef<Path>, symbol: &str) -> anyhow::Result<usize> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let series = parse_csv(symbol, &text)?;
        let len = series.len();
        info!("[DATA] Loaded {} samples for {} from {}", len, symbol, path.as_ref().display());
        self.add(series);
        Ok(len)
    }

    /// Fetches left before the symbol is exhausted
    pub fn remaining(&self, symbol: &str) -> usize {
        self.cursors
            .lock()
            .ok()
            .and_then(|c| c.get(symbol).map(|c| (c.series.len() + 1).saturating_sub(c.position.max(1))))
            .unwrap_or(0)
    }
}

#[async_trait]
impl MarketDataSource for ReplaySource {
    async fn fetch(&self, symbol: &str) -> Result<Series, DataUnavailable> {
        let mut cursors = self
            .cursors
            .lock()
            .map_err(|_| DataUnavailable::Transport("replay state poisoned".to_string()))?;
        let cursor = cursors
            .get_mut(symbol)
            .ok_or_else(|| DataUnavailable::NoData(symbol.to_string()))?;
        if cursor.position == 0 || cursor.position > cursor.series.len() {
            return Err(DataUnavailable::Exhausted(symbol.to_string()));
        }
        let end = cursor.position;
        let start = end.saturating_sub(self.lookback);
        let samples = cursor.series.samples()[start..end].to_vec();
        cursor.position += 1;
        Ok(Series::new(symbol, samples))
    }
}
