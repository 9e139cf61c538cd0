//! Reflexive regime engine
//!
//! Fingerprints the market regime of each symbol every cycle, keeps a bounded
//! memory of rules that worked in similar regimes, and lets a reflexive agent
//! mutate its own strategy rule when the regime turns unstable.

pub mod core;
pub mod data;
pub mod config;
pub mod status;
