//! Error taxonomy for the detection engine.
//!
//! Every kind here corresponds to a named failure mode in the design: most
//! are recorded and replaced with a typed fallback inside the coordinator
//! and never escape to the caller. Only [`Error::Configuration`], raised at
//! construction time, is meant to propagate as a real `Result::Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("geo service failure: {0}")]
    GeoServiceFailure(String),

    #[error("http fingerprint error: {0}")]
    HttpFingerprintError(String),

    #[error("behavior analysis error: {0}")]
    BehaviorAnalysisError(String),

    #[error("tls analysis error: {0}")]
    TlsAnalysisError(String),

    #[error("scoring engine error: {0}")]
    ScoringEngineError(String),

    #[error("operation timed out after {0}ms")]
    TimeoutError(u64),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),
}

pub type Result<T> = std::result::Result<T, Error>;
