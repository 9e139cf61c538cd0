//! Core regime logic
//!
//! - Metric pipeline that turns a price/volume window into a fingerprint
//! - Fractal decomposition with a content-addressed cache
//! - Bounded semantic memory of efficient (fingerprint, rule) pairs
//! - Reflexive agent that mutates, scores and commits strategy rules
//! - Physiological state and the decision oracle
//! - Cycle orchestrator tying it together per symbol

pub mod types;
pub mod error;
pub mod fingerprint;
pub mod metrics;
pub mod graph;
pub mod clustering;
pub mod fractal;
pub mod rule;
pub mod memory;
pub mod performance;
pub mod reflexive;
pub mod regime;
pub mod physiology;
pub mod oracle;
pub mod health;
pub mod orchestrator;

// Re-export commonly used types
pub use types::{Action, OrderBookSnapshot, Sample, Series};
pub use error::{ComputationError, DataUnavailable, OracleFailure, TransportError};
pub use fingerprint::{Fingerprint, Metric};
pub use metrics::{MetricPipeline, MetricsConfig};
pub use graph::{CoMovementGraphBuilder, RelationGraph, RelationGraphBuilder};
pub use fractal::{FractalCache, FractalConfig, FractalNode, FractalSummary};
pub use rule::StrategyRule;
pub use memory::{cosine_similarity, InsertOutcome, MemoryRecord, SemanticMemory};
pub use performance::{PerformanceConfig, PerformanceTracker};
pub use reflexive::{AgentConfig, AgentDecision, AgentState, DecisionKind, ReflexiveAgent};
pub use regime::{Regime, RegimeConfig};
pub use physiology::{PhysiologicalState, Stimulus};
pub use oracle::{DecisionOracle, LinearOracle, Prediction};
pub use health::{CycleHealth, HealthStatus};
pub use orchestrator::{CycleKind, CycleOrchestrator, CycleOutcome, OrchestratorConfig};
