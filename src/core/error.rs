//! Error taxonomy for one evaluation cycle
//!
//! Only [`DataUnavailable`] aborts a cycle. Everything else degrades a single
//! value and the cycle carries on.

use thiserror::Error;

use super::fingerprint::Metric;

/// Upstream fetch or transport failure. The cycle falls back to an
/// emergency hold and resumes on the next tick.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataUnavailable {
    #[error("no data for symbol {0}")]
    NoData(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed market data: {0}")]
    Malformed(String),

    #[error("replay exhausted for {0}")]
    Exhausted(String),
}

/// Failure reported by a secure transport collaborator
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication rejected")]
    Unauthorized,
}

impl From<TransportError> for DataUnavailable {
    fn from(err: TransportError) -> Self {
        DataUnavailable::Transport(err.to_string())
    }
}

/// A metric sub-computation received degenerate input
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComputationError {
    #[error("window too short: need {needed} samples, got {got}")]
    InsufficientSamples { needed: usize, got: usize },

    #[error("non-positive price in window")]
    NonPositivePrice,

    #[error("{0} input has zero variance")]
    ZeroVariance(Metric),

    #[error("{0} produced a non-finite value")]
    NonFinite(Metric),

    #[error("relation graph has no usable edges")]
    EmptyGraph,
}

/// Timeout or internal error inside the decision oracle
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OracleFailure {
    #[error("oracle timed out after {0} ms")]
    Timeout(u64),

    #[error("oracle internal error: {0}")]
    Internal(String),
}

pub type MetricResult<T> = std::result::Result<T, ComputationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_maps_to_data_unavailable() {
        let err: DataUnavailable = TransportError::Timeout(500).into();
        assert_eq!(err, DataUnavailable::Transport("request timed out after 500 ms".to_string()));
    }

    #[test]
    fn test_error_messages() {
        let err = ComputationError::InsufficientSamples { needed: 100, got: 12 };
        assert_eq!(err.to_string(), "window too short: need 100 samples, got 12");
        assert_eq!(
            ComputationError::ZeroVariance(Metric::Entropy).to_string(),
            "entropy_delta input has zero variance"
        );
    }
}
