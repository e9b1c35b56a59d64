//! Optimizer Configuration
//!
//! This module contains the configuration of the federation optimizer.
//! Configurations can be built in code or loaded from TOML.

use crate::error::{FederationError, Result};
use crate::member::ProtocolVersion;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Configuration for the federation optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Namespace prefixes whose statements are co-located with their subject
    /// at every member
    pub local_namespaces: HashSet<String>,
    /// Protocol version of the coordinator; only members advertising the same
    /// major/minor get prepared push-down queries
    pub protocol: ProtocolVersion,
    /// Replace patterns no member can match by the empty set
    pub eliminate_empty_patterns: bool,
    /// Move filters, projections and slices into the ownership marker below them
    pub push_unary_into_owner: bool,
    /// Probe all members of a pattern concurrently
    pub parallel_probes: bool,
    /// Attach SPARQL text to prepared markers of SPARQL-capable members
    pub render_remote_queries: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            local_namespaces: HashSet::new(),
            protocol: ProtocolVersion::default(),
            eliminate_empty_patterns: true,
            push_unary_into_owner: true,
            parallel_probes: false,
            render_remote_queries: true,
        }
    }
}

impl OptimizerConfig {
    pub fn with_local_namespaces<I, S>(mut self, namespaces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.local_namespaces = namespaces.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_parallel_probes(mut self, enabled: bool) -> Self {
        self.parallel_probes = enabled;
        self
    }

    /// Parses a TOML document; missing keys take their default value
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| FederationError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(ns) = self.local_namespaces.iter().find(|ns| ns.is_empty()) {
            return Err(FederationError::Config(format!(
                "local namespace prefix must not be empty (got {:?})",
                ns
            )));
        }
        Ok(())
    }
}
