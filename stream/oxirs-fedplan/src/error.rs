//! Error types for federated query planning

use crate::member::MemberId;

/// Errors raised while planning a federated query
#[derive(Debug, thiserror::Error)]
pub enum FederationError {
    /// A member probe failed; planning of the whole query is aborted
    #[error("Probe of member {member} failed: {source}")]
    Probe {
        member: MemberId,
        #[source]
        source: anyhow::Error,
    },

    /// Invalid optimizer configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FederationError {
    pub fn probe(member: &MemberId, source: anyhow::Error) -> Self {
        FederationError::Probe {
            member: member.clone(),
            source,
        }
    }

    /// Member whose probe failed, if this is a probe error
    pub fn member(&self) -> Option<&MemberId> {
        match self {
            FederationError::Probe { member, .. } => Some(member),
            _ => None,
        }
    }
}

/// Result type alias for planning operations
pub type Result<T> = std::result::Result<T, FederationError>;
