//! Errors raised while processing change events, with retry classification

use super::sink::SinkError;
use crate::config::ConfigError;
use crate::graph::GraphError;
use crate::rules::{RuleDescriptor, RuleError, RuleStage};
use crate::walk::WalkError;
use thiserror::Error;

/// Errors from processing one change or recompute.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no rules registered")]
    NoRules,
    #[error("rule {rule} failed in {stage}: {source}")]
    Rule {
        rule: String,
        stage: RuleStage,
        #[source]
        source: RuleError,
    },
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error(transparent)]
    Walk(WalkError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("superseded by a newer change")]
    Cancelled,
    #[error("engine is shut down")]
    ShutDown,
}

impl EngineError {
    pub fn rule(rule: &RuleDescriptor, stage: RuleStage, source: RuleError) -> Self {
        Self::Rule {
            rule: rule.name(),
            stage,
            source,
        }
    }

    /// Failures worth another attempt after a delay
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rule { .. } | Self::Graph(_) | Self::Walk(_) | Self::Sink(_))
    }
}

impl From<WalkError> for EngineError {
    fn from(err: WalkError) -> Self {
        match err {
            WalkError::Cancelled => Self::Cancelled,
            other => Self::Walk(other),
        }
    }
}
