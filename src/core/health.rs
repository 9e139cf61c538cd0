//! Cycle Health - tracks consecutive emergency holds per symbol

use std::time::Instant;

/// Consecutive failures before a warning
const WARN_AFTER: u32 = 3;
/// Consecutive failures before an alert
const ALERT_AFTER: u32 = 5;

pub struct CycleHealth {
    last_success: Option<Instant>,
    consecutive_holds: u32,
    total_holds: u64,
    total_cycles: u64,
}

impl CycleHealth {
    pub fn new() -> Self {
        Self {
            last_success: None,
            consecutive_holds: 0,
            total_holds: 0,
            total_cycles: 0,
        }
    }

    pub fn record_success(&mut self) {
        self.total_cycles += 1;
        self.consecutive_holds = 0; // Reset on recovery
        self.last_success = Some(Instant::now());
    }

    pub fn record_emergency_hold(&mut self) -> HealthStatus {
        self.total_cycles += 1;
        self.total_holds += 1;
        self.consecutive_holds += 1;
        self.check()
    }

    pub fn check(&self) -> HealthStatus {
        if self.should_alert() {
            return HealthStatus::Alert { consecutive: self.consecutive_holds };
        }
        if self.consecutive_holds >= WARN_AFTER {
            return HealthStatus::Degraded { consecutive: self.consecutive_holds };
        }
        HealthStatus::Healthy
    }

    pub fn should_alert(&self) -> bool {
        self.consecutive_holds >= ALERT_AFTER
    }

    pub fn consecutive_holds(&self) -> u32 {
        self.consecutive_holds
    }

    pub fn total_holds(&self) -> u64 {
        self.total_holds
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn secs_since_success(&self) -> Option<u64> {
        self.last_success.map(|t| t.elapsed().as_secs())
    }
}

impl Default for CycleHealth {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Healthy,
    Degraded { consecutive: u32 },
    Alert { consecutive: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation_and_recovery() {
        let mut health = CycleHealth::new();
        assert_eq!(health.record_emergency_hold(), HealthStatus::Healthy);
        health.record_emergency_hold();
        assert_eq!(health.record_emergency_hold(), HealthStatus::Degraded { consecutive: 3 });
        health.record_emergency_hold();
        assert_eq!(health.record_emergency_hold(), HealthStatus::Alert { consecutive: 5 });
        assert!(health.should_alert());

        health.record_success();
        assert_eq!(health.check(), HealthStatus::Healthy);
        assert_eq!(health.total_holds(), 5);
        assert_eq!(health.total_cycles(), 6);
        assert_eq!(health.secs_since_success(), Some(0));
    }
}
