//! Data Module
//!
//! Market data sources and the audit trail.
//! - CSV directory and replay sources for price/volume windows
//! - Transport-backed source over any [`SecureTransport`]
//! - SQLite audit log for per-cycle decisions

pub mod audit;
pub mod csv_source;

use async_trait::async_trait;

use crate::core::error::{DataUnavailable, TransportError};
use crate::core::types::Series;

pub use audit::{AuditEntry, AuditLog, SqliteAuditLog};
pub use csv_source::{parse_csv, CsvMarketData, ReplaySource};

/// Source of sample windows, one fetch per cycle
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<Series, DataUnavailable>;
}

/// Authenticated byte transport to an upstream data service
#[async_trait]
pub trait SecureTransport: Send + Sync {
    async fn request(&self, path: &str) -> Result<Vec<u8>, TransportError>;
}

/// Market data fetched as `<SYMBOL>.csv` documents over a secure transport
pub struct TransportMarketData<T: SecureTransport> {
    transport: T,
    lookback: usize,
}

impl<T: SecureTransport> TransportMarketData<T> {
    pub fn new(transport: T, lookback: usize) -> Self {
        Self { transport, lookback }
    }
}

#[async_trait]
impl<T: SecureTransport> MarketDataSource for TransportMarketData<T> {
    async fn fetch(&self, symbol: &str) -> Result<Series, DataUnavailable> {
        let bytes = self.transport.request(&format!("{}.csv", symbol)).await?;
        let text = String::from_utf8(bytes).map_err(|e| DataUnavailable::Malformed(e.to_string()))?;
        Ok(parse_csv(symbol, &text)?.tail(self.lookback))
    }
}
