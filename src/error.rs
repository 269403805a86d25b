//! Error types for the access-control core

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for the access-control core
pub type Result<T> = std::result::Result<T, Error>;

/// Access-control errors
#[derive(Error, Debug)]
pub enum Error {
    /// Policy file is missing (distinct from other I/O failures)
    #[error("Policy file not found: {0}")]
    FileNotFound(PathBuf),

    /// No policy file is configured on the manager
    #[error("No policy file configured")]
    FileNotConfigured,

    /// Syntactic failure of the policy-file line parser
    #[error("Invalid policy file syntax at line {line}: {message}")]
    InvalidFormat {
        /// 1-based line number in the policy file
        line: usize,
        /// What the parser could not accept
        message: String,
    },

    /// Policy-file version is missing, non-numeric, or below 1
    #[error("Invalid policy file version: {0}")]
    InvalidVersion(String),

    /// Default policy is neither `allow` nor `deny`
    #[error("Invalid default policy: {0}")]
    InvalidPolicy(String),

    /// Unknown right atom
    #[error("Invalid right: {0}")]
    InvalidRight(String),

    /// Unknown scope atom
    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    /// Rule has an empty target
    #[error("Rule {0} is missing a target")]
    MissingTarget(usize),

    /// Rule has an empty subject
    #[error("Rule {0} is missing a subject")]
    MissingSubject(usize),

    /// Rule has an empty right set
    #[error("Rule {0} is missing rights")]
    MissingRights(usize),

    /// Admin mutation with a rule index outside `[0, len)`
    #[error("Rule index {index} out of range (rule count: {len})")]
    OutOfRange {
        /// The rejected index
        index: usize,
        /// Rule count at the time of the mutation
        len: usize,
    },

    /// Mutation attempted on a non-leader node
    #[error("Not the cluster leader{}", leader.as_deref().map(|l| format!(" (leader: {l})")).unwrap_or_default())]
    NotLeader {
        /// Current leader address, when known
        leader: Option<String>,
    },

    /// Consensus proposal failed
    #[error("Replication failed: {0}")]
    Replication(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error (snapshot blob, consensus commands)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// HTTP status code for the admin surface.
    ///
    /// `NotLeader` maps to 503 so callers can forward to the returned
    /// leader address; validation failures map to 400, bad indices to 404.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotLeader { .. } => 503,
            Self::OutOfRange { .. } => 404,
            Self::InvalidFormat { .. }
            | Self::InvalidVersion(_)
            | Self::InvalidPolicy(_)
            | Self::InvalidRight(_)
            | Self::InvalidScope(_)
            | Self::MissingTarget(_)
            | Self::MissingSubject(_)
            | Self::MissingRights(_) => 400,
            Self::Replication(_) => 502,
            _ => 500,
        }
    }

    /// Stable machine-readable error code for the admin surface.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::FileNotFound(_) => "file_not_found",
            Self::FileNotConfigured => "file_not_configured",
            Self::InvalidFormat { .. } => "invalid_format",
            Self::InvalidVersion(_) => "invalid_version",
            Self::InvalidPolicy(_) => "invalid_policy",
            Self::InvalidRight(_) => "invalid_right",
            Self::InvalidScope(_) => "invalid_scope",
            Self::MissingTarget(_) => "missing_target",
            Self::MissingSubject(_) => "missing_subject",
            Self::MissingRights(_) => "missing_rights",
            Self::OutOfRange { .. } => "out_of_range",
            Self::NotLeader { .. } => "not_leader",
            Self::Replication(_) => "replication_failed",
            Self::Io(_) => "io_error",
            Self::Json(_) => "json_error",
        }
    }
}
