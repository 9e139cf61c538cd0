//! Audit Log - SQLite storage for per-cycle decisions
//!
//! Appends are buffered in memory and written in one transaction per batch
//! or on `flush`, so the blocking cost per cycle stays small.

use std::path::Path;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

/// One persisted cycle decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    /// Serialized fingerprint (JSON)
    pub fingerprint: String,
    pub action: String,
    pub confidence: f64,
    /// Serialized rule in force after the cycle (JSON)
    pub rule: String,
    /// HELD / COMMITTED / ROLLED_BACK / EMERGENCY_HOLD
    pub decision: String,
}

/// Append-only decision log. Implementations are blocking; callers run
/// them off the async executor.
pub trait AuditLog: Send + Sync {
    fn append(&self, entry: &AuditEntry) -> Result<()>;
    fn flush(&self) -> Result<()>;
}

struct Inner {
    conn: rusqlite::Connection,
    pending: Vec<AuditEntry>,
}

pub struct SqliteAuditLog {
    inner: Mutex<Inner>,
    batch_size: usize,
}

impl SqliteAuditLog {
    pub fn open(path: impl AsRef<Path>, batch_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let exists = path.exists();
        let conn = rusqlite::Connection::open(path)?;

        if !exists {
            conn.execute(
                "CREATE TABLE audit (
                    id INTEGER PRIMARY KEY,
                    timestamp TEXT NOT NULL,
                    symbol TEXT NOT NULL,
                    fingerprint TEXT NOT NULL,
                    action TEXT NOT NULL,
                    confidence REAL NOT NULL,
                    rule TEXT NOT NULL,
                    decision TEXT NOT NULL
                )",
                [],
            )?;
            conn.execute("CREATE INDEX idx_audit_symbol ON audit(symbol)", [])?;
            info!("[AUDIT] Created new audit log: {}", path.display());
        } else {
            info!("[AUDIT] Opened existing audit log: {}", path.display());
        }

        Ok(Self {
            inner: Mutex::new(Inner {
                conn,
                pending: Vec::new(),
            }),
            batch_size: batch_size.max(1),
        })
    }

    fn write_pending(inner: &mut Inner) -> Result<usize> {
        if inner.pending.is_empty() {
            return Ok(0);
        }
        let entries = std::mem::take(&mut inner.pending);
        let tx = inner.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO audit (timestamp, symbol, fingerprint, action, confidence, rule, decision)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )?;
            for e in &entries {
                stmt.execute(rusqlite::params![
                    e.timestamp.to_rfc3339(),
                    e.symbol,
                    e.fingerprint,
                    e.action,
                    e.confidence,
                    e.rule,
                    e.decision,
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    /// Most recent persisted entries for a symbol, newest first
    pub fn recent(&self, symbol: &str, limit: usize) -> Result<Vec<AuditEntry>> {
        let inner = self.inner.lock().map_err(|_| anyhow!("audit log lock poisoned"))?;
        let mut stmt = inner.conn.prepare(
            "SELECT timestamp, symbol, fingerprint, action, confidence, rule, decision
             FROM audit WHERE symbol = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![symbol, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                AuditEntry {
                    timestamp: Utc::now(),
                    symbol: row.get(1)?,
                    fingerprint: row.get(2)?,
                    action: row.get(3)?,
                    confidence: row.get(4)?,
                    rule: row.get(5)?,
                    decision: row.get(6)?,
                },
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (timestamp, mut entry) = row?;
            entry.timestamp = DateTime::parse_from_rfc3339(&timestamp)?.with_timezone(&Utc);
            entries.push(entry);
        }
        Ok(entries)
    }

    /// Count of persisted entries
    pub fn count(&self) -> Result<usize> {
        let inner = self.inner.lock().map_err(|_| anyhow!("audit log lock poisoned"))?;
        let n: i64 = inner.conn.query_row("SELECT COUNT(*) FROM audit", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

impl AuditLog for SqliteAuditLog {
    fn append(&self, entry: &AuditEntry) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("audit log lock poisoned"))?;
        inner.pending.push(entry.clone());
        if inner.pending.len() >= self.batch_size {
            Self::write_pending(&mut inner)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(|_| anyhow!("audit log lock poisoned"))?;
        let written = Self::write_pending(&mut inner)?;
        if written > 0 {
            info!("[AUDIT] Flushed {} entries", written);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(symbol: &str, decision: &str) -> AuditEntry {
        AuditEntry {
            timestamp: Utc::now(),
            symbol: symbol.to_string(),
            fingerprint: "{}".to_string(),
            action: "HOLD".to_string(),
            confidence: 0.0,
            rule: "{}".to_string(),
            decision: decision.to_string(),
        }
    }

    #[test]
    fn test_batched_append_and_flush() {
        let dir = tempfile::tempdir().unwrap();
        let log = SqliteAuditLog::open(dir.path().join("audit.db"), 3).unwrap();
        log.append(&entry("EURUSD", "HELD")).unwrap();
        log.append(&entry("EURUSD", "COMMITTED")).unwrap();
        assert_eq!(log.count().unwrap(), 0);
        log.append(&entry("GBPUSD", "HELD")).unwrap();
        assert_eq!(log.count().unwrap(), 3);

        log.append(&entry("EURUSD", "ROLLED_BACK")).unwrap();
        log.flush().unwrap();
        let recent = log.recent("EURUSD", 10).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].decision, "ROLLED_BACK");
    }

    #[test]
    fn test_reopen_existing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.db");
        {
            let log = SqliteAuditLog::open(&path, 1).unwrap();
            log.append(&entry("EURUSD", "HELD")).unwrap();
        }
        let log = SqliteAuditLog::open(&path, 1).unwrap();
        assert_eq!(log.count().unwrap(), 1);
    }
}
