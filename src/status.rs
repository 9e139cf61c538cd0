//! Status file for sharing state between processes

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::orchestrator::CycleOutcome;

/// Last decision seen for one symbol
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SymbolStatus {
    pub action: String,
    pub confidence: f64,
    pub decision: String,
    pub regime: String,
    pub rule_id: Option<u64>,
    pub context_tag: Option<f64>,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SystemStatus {
    pub running: bool,
    pub start_time: i64,
    pub cycles: u64,
    pub emergency_holds: u64,
    pub commits: u64,
    pub rollbacks: u64,
    pub symbols: BTreeMap<String, SymbolStatus>,
}

impl SystemStatus {
    pub fn record(&mut self, outcome: &CycleOutcome) {
        self.cycles += 1;
        if outcome.is_emergency_hold() {
            self.emergency_holds += 1;
        }
        match outcome.kind.as_str() {
            "COMMITTED" => self.commits += 1,
            "ROLLED_BACK" => self.rollbacks += 1,
            _ => {}
        }
        self.symbols.insert(
            outcome.symbol.clone(),
            SymbolStatus {
                action: outcome.action.as_str().to_string(),
                confidence: outcome.confidence,
                decision: outcome.kind.as_str().to_string(),
                regime: outcome.regime.map(|r| r.as_str().to_string()).unwrap_or_default(),
                rule_id: outcome.rule_id,
                context_tag: outcome.context_tag,
                timestamp: outcome.timestamp.timestamp(),
            },
        );
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if path.exists() {
            if let Ok(contents) = fs::read_to_string(path) {
                if let Ok(status) = serde_json::from_str(&contents) {
                    return status;
                }
            }
        }
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.json");
        assert!(!SystemStatus::load(&path).running);

        let mut status = SystemStatus {
            running: true,
            start_time: 1_700_000_000,
            ..Default::default()
        };
        status.cycles = 12;
        status.symbols.insert("EURUSD".to_string(), SymbolStatus {
            action: "BUY".to_string(),
            ..Default::default()
        });
        status.save(&path).unwrap();

        let loaded = SystemStatus::load(&path);
        assert!(loaded.running);
        assert_eq!(loaded.cycles, 12);
        assert_eq!(loaded.symbols["EURUSD"].action, "BUY");
    }
}
