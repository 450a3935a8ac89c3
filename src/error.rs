//! Error taxonomy for the ingestion pipeline.
//!
//! Every per-cycle failure is one of these types and is contained by the
//! snapshot publisher; only [`ConfigError`] is fatal, and only at startup.

use std::path::PathBuf;

use thiserror::Error;

use crate::publisher::CycleStage;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("feed request timed out")]
    Timeout,

    #[error("network error: {0}")]
    Network(String),

    #[error("feed endpoint returned HTTP {0}")]
    HttpStatus(u16),

    #[error("feed endpoint returned an empty body")]
    EmptyBody,

    #[error("invalid feed URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("failed to read feed file {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },
}

impl FetchError {
    /// Short tag used in cycle statistics and status reporting.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::Network(_) => "network",
            FetchError::HttpStatus(_) => "http_status",
            FetchError::EmptyBody => "empty_body",
            FetchError::InvalidUrl { .. } => "invalid_url",
            FetchError::Read { .. } => "read",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("no schema available for feed version {version:?}")]
    SchemaUnavailable { version: String },

    #[error("malformed feed payload: {0}")]
    MalformedPayload(String),
}

impl DecodeError {
    pub fn kind(&self) -> &'static str {
        match self {
            DecodeError::SchemaUnavailable { .. } => "schema_unavailable",
            DecodeError::MalformedPayload(_) => "malformed_payload",
        }
    }
}

/// Reference table load failure. Never fatal: the affected table is reported
/// unavailable and enrichment falls back to raw identifiers.
#[derive(Error, Debug)]
pub enum ReferenceLoadError {
    #[error("reference source {path:?} is missing: {source}")]
    SourceMissing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("reference source {path:?} could not be parsed: {reason}")]
    ParseError { path: PathBuf, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("no valid vehicles after sanitizing {entities} entities")]
    EmptyCycle { entities: usize },

    #[error("a cycle is already in flight")]
    CycleInFlight,
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Fetch(e) => e.kind(),
            PipelineError::Decode(e) => e.kind(),
            PipelineError::EmptyCycle { .. } => "empty_cycle",
            PipelineError::CycleInFlight => "cycle_in_flight",
        }
    }

    /// Stage of the cycle state machine the failure occurred in.
    pub fn stage(&self) -> CycleStage {
        match self {
            PipelineError::Fetch(_) => CycleStage::Fetching,
            PipelineError::Decode(_) => CycleStage::Decoding,
            PipelineError::EmptyCycle { .. } => CycleStage::Sanitizing,
            PipelineError::CycleInFlight => CycleStage::Idle,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("feed API key is not configured (set {var} or feed.api_key)")]
    MissingApiKey { var: String },
}
