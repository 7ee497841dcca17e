//! Rule descriptors: how one source `(index, type)` becomes one target document
//!
//! A descriptor bundles four optional behaviours (filter, extract, transform,
//! walks). Absent slots fall back to documented defaults: accept every
//! document, extract nothing, pass the document through unchanged, walk
//! nothing.

use crate::document::Document;
use crate::extract::SubgraphBuilder;
use crate::graph::{Direction, TypeKey};
use crate::walk::TreeView;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by rule functions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuleError {
    #[error("{0}")]
    Failed(String),
    #[error("invalid result: {0}")]
    InvalidShape(String),
}

impl RuleError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    pub fn invalid_shape(message: impl Into<String>) -> Self {
        Self::InvalidShape(message.into())
    }
}

/// Which rule function raised an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleStage {
    Filter,
    Extract,
    Transform,
    Reduce,
}

impl fmt::Display for RuleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleStage::Filter => write!(f, "filter"),
            RuleStage::Extract => write!(f, "extract"),
            RuleStage::Transform => write!(f, "transform"),
            RuleStage::Reduce => write!(f, "reduce"),
        }
    }
}

/// Pure predicate deciding whether a document produces a target document
pub type FilterFn = Arc<dyn Fn(&Document) -> bool + Send + Sync>;
/// Declares the document's edges and node properties into a builder
pub type ExtractFn = Arc<dyn Fn(&Document, &mut SubgraphBuilder) -> Result<(), RuleError> + Send + Sync>;
/// Produces the base target document
pub type TransformFn = Arc<dyn Fn(&Document) -> Result<Document, RuleError> + Send + Sync>;
/// Reduces a walk tree to one denormalized value
pub type ReduceFn = Arc<dyn Fn(&TreeView<'_>) -> Result<Value, RuleError> + Send + Sync>;

/// How one walk property is computed.
#[derive(Clone)]
pub struct ReduceSpec {
    /// Receive the full transitively reachable subtree instead of only the
    /// immediate children
    pub nested: bool,
    pub reduce: ReduceFn,
}

impl ReduceSpec {
    pub fn new(reduce: impl Fn(&TreeView<'_>) -> Result<Value, RuleError> + Send + Sync + 'static) -> Self {
        Self {
            nested: false,
            reduce: Arc::new(reduce),
        }
    }

    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }
}

impl fmt::Debug for ReduceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReduceSpec").field("nested", &self.nested).finish_non_exhaustive()
    }
}

/// A configured traversal and the properties reduced from its tree.
#[derive(Debug, Clone, Default)]
pub struct WalkSpec {
    pub direction: Direction,
    pub properties: BTreeMap<String, ReduceSpec>,
}

impl WalkSpec {
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            properties: BTreeMap::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, spec: ReduceSpec) -> Self {
        self.properties.insert(name.into(), spec);
        self
    }

    /// True if any property needs more than the immediate children
    pub fn needs_nested(&self) -> bool {
        self.properties.values().any(|p| p.nested)
    }
}

/// Immutable rule for one `(source, target)` pair.
#[derive(Clone)]
pub struct RuleDescriptor {
    source: TypeKey,
    target: TypeKey,
    filter: Option<FilterFn>,
    extract: Option<ExtractFn>,
    transform: Option<TransformFn>,
    walks: BTreeMap<String, WalkSpec>,
    /// Stable text of the definition this rule was compiled from, if any
    fingerprint: Option<String>,
}

impl RuleDescriptor {
    pub fn new(source: TypeKey, target: TypeKey) -> Self {
        Self {
            source,
            target,
            filter: None,
            extract: None,
            transform: None,
            walks: BTreeMap::new(),
            fingerprint: None,
        }
    }

    pub fn with_filter(mut self, filter: impl Fn(&Document) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn with_extract(
        mut self,
        extract: impl Fn(&Document, &mut SubgraphBuilder) -> Result<(), RuleError> + Send + Sync + 'static,
    ) -> Self {
        self.extract = Some(Arc::new(extract));
        self
    }

    pub fn with_transform(
        mut self,
        transform: impl Fn(&Document) -> Result<Document, RuleError> + Send + Sync + 'static,
    ) -> Self {
        self.transform = Some(Arc::new(transform));
        self
    }

    pub fn with_walk(mut self, name: impl Into<String>, walk: WalkSpec) -> Self {
        self.walks.insert(name.into(), walk);
        self
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// True when both rules come from the same definition. Rules built in
    /// code carry no fingerprint and never compare equal.
    pub fn same_definition(&self, other: &RuleDescriptor) -> bool {
        self.source == other.source
            && self.target == other.target
            && self.fingerprint.is_some()
            && self.fingerprint == other.fingerprint
    }

    pub fn source(&self) -> &TypeKey {
        &self.source
    }

    pub fn target(&self) -> &TypeKey {
        &self.target
    }

    pub fn walks(&self) -> &BTreeMap<String, WalkSpec> {
        &self.walks
    }

    /// Human-readable name used in logs and errors
    pub fn name(&self) -> String {
        format!("{} -> {}", self.source, self.target)
    }

    /// Apply the filter; accepts everything when no filter is configured.
    pub fn accepts(&self, document: &Document) -> bool {
        self.filter.as_ref().map_or(true, |f| f(document))
    }

    /// Run the extractor into `builder`; a no-op when none is configured.
    pub fn extract_into(&self, document: &Document, builder: &mut SubgraphBuilder) -> Result<(), RuleError> {
        match &self.extract {
            Some(extract) => extract(document, builder),
            None => Ok(()),
        }
    }

    /// Produce the base target document, which must be a JSON object.
    pub fn transform(&self, document: &Document) -> Result<Document, RuleError> {
        let transformed = match &self.transform {
            Some(transform) => transform(document)?,
            None => document.clone(),
        };
        if !transformed.is_object() {
            return Err(RuleError::invalid_shape("transform must produce a JSON object"));
        }
        Ok(transformed)
    }
}

impl fmt::Debug for RuleDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleDescriptor")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("filter", &self.filter.is_some())
            .field("extract", &self.extract.is_some())
            .field("transform", &self.transform.is_some())
            .field("walks", &self.walks)
            .finish()
    }
}
