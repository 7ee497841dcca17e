//! Extractor: turns a source document into the subgraph it declares
//!
//! Every rule registered for the document's `(index, type)` contributes to
//! one merged [`Subgraph`]. Either every rule succeeds and the merged result
//! validates, or the extraction fails as a whole and nothing is committed.

mod builder;

pub use builder::SubgraphBuilder;

use crate::document::Document;
use crate::graph::{NodeId, Subgraph};
use crate::pipeline::EngineError;
use crate::rules::{RuleDescriptor, RuleError, RuleStage};
use std::sync::Arc;
use tracing::debug;

/// Run every rule's extractor for `id` and merge the results.
pub fn extract_subgraph(
    id: &NodeId,
    document: &Document,
    rules: &[Arc<RuleDescriptor>],
) -> Result<Subgraph, EngineError> {
    let mut parts = Vec::with_capacity(rules.len());
    for rule in rules {
        let mut builder = SubgraphBuilder::new(id.clone());
        rule.extract_into(document, &mut builder)
            .map_err(|source| EngineError::rule(rule, RuleStage::Extract, source))?;
        parts.push(builder.finish());
    }

    let subgraph = Subgraph::merge(id.clone(), parts);
    if let Err(message) = subgraph.validate() {
        let rule = rules.first().map(|r| r.name()).unwrap_or_default();
        return Err(EngineError::Rule {
            rule,
            stage: RuleStage::Extract,
            source: RuleError::InvalidShape(message),
        });
    }

    debug!(
        node = %id,
        edges = subgraph.edges.len(),
        properties = subgraph.properties.len(),
        "extracted subgraph"
    );
    Ok(subgraph)
}
