//! Declarative rules: YAML rule files compiled into rule descriptors
//!
//! A rule file lists one entry per `(source, target)` pair. Predicates,
//! value expressions and reducers are a small fixed vocabulary; each entry
//! is compiled once into the same closures a Rust-defined rule would use.
//!
//! ```yaml
//! rules:
//!   - source: { index: poms, type: poms }
//!     target: { index: woord-target, type: program }
//!     filter:
//!       field: { path: locations, non_empty: true }
//!     extract:
//!       edges:
//!         - { label: episodeOf, each: episodeOf, id: urnRef }
//!     transform:
//!       copy: [tags, genres]
//!       fields:
//!         title: { best_value: { key: titles, type: MAIN } }
//!         publishDate: publish_date
//!     walks:
//!       published-series-titles:
//!         direction: OUT
//!         properties:
//!           programTitles:
//!             reduce:
//!               collect:
//!                 where: { field: { path: workflow, equals: PUBLISHED } }
//!                 value: { best_value: { key: titles, type: MAIN } }
//! ```

use super::descriptor::{ReduceSpec, RuleDescriptor, RuleError, WalkSpec};
use super::registry::RuleRegistry;
use super::resolve::{best_value, lookup, publish_date};
use crate::config::ConfigError;
use crate::document::Document;
use crate::extract::SubgraphBuilder;
use crate::graph::{Direction, NodeId, Properties, TypeKey};
use crate::walk::TreeView;
use regex_lite::Regex;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;

// ---------------------------------------------------------------------------
// Spec types
// ---------------------------------------------------------------------------

/// A parsed rule file, before compilation.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleFile {
    pub rules: Vec<RuleSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuleSpec {
    pub source: TypeKey,
    pub target: TypeKey,
    #[serde(default)]
    pub filter: Option<PredicateSpec>,
    #[serde(default)]
    pub extract: Option<ExtractSpec>,
    #[serde(default)]
    pub transform: Option<TransformSpec>,
    #[serde(default)]
    pub walks: BTreeMap<String, WalkYaml>,
    /// Canonical JSON of the rule as written, used to detect edits on reload
    #[serde(skip)]
    pub fingerprint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredicateSpec {
    All(Vec<PredicateSpec>),
    Any(Vec<PredicateSpec>),
    Not(Box<PredicateSpec>),
    Field(FieldSpec),
}

/// Conditions on one field; every condition given must hold.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub path: String,
    #[serde(default)]
    pub equals: Option<Value>,
    #[serde(default)]
    pub matches: Option<String>,
    #[serde(default)]
    pub exists: Option<bool>,
    #[serde(default)]
    pub non_empty: Option<bool>,
    /// Holds if any element of the array field satisfies the predicate
    #[serde(default)]
    pub any: Option<Box<PredicateSpec>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueExpr {
    Field(String),
    BestValue {
        key: String,
        #[serde(rename = "type")]
        value_type: String,
    },
    PublishDate,
    Literal(Value),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractSpec {
    #[serde(default)]
    pub when: Option<PredicateSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeRuleSpec>,
    /// Node property name → field path
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EdgeRuleSpec {
    pub label: String,
    /// Path of the other document's id; relative to the element with `each`
    pub id: String,
    /// Array field to iterate, one edge per element
    #[serde(default)]
    pub each: Option<String>,
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default, rename = "type")]
    pub doc_type: Option<String>,
    #[serde(default)]
    pub inward: bool,
    /// Edge property name → field path
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransformSpec {
    #[serde(default)]
    pub copy: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, ValueExpr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalkYaml {
    pub direction: Direction,
    pub properties: BTreeMap<String, WalkPropertyYaml>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalkPropertyYaml {
    #[serde(default)]
    pub nested: bool,
    pub reduce: ReducerSpec,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReducerSpec {
    /// An object of fields read from the first existing child
    FirstChild { fields: BTreeMap<String, ValueExpr> },
    /// One value read from the first existing child, or null
    FirstChildValue(ValueExpr),
    /// One value per existing child matching `where`
    Collect {
        #[serde(default, rename = "where")]
        filter: Option<PredicateSpec>,
        value: ValueExpr,
    },
    Count,
    /// The tree itself in `{_id, _value, _children}` form
    FullTree,
}

// ---------------------------------------------------------------------------
// Compiled forms
// ---------------------------------------------------------------------------

#[derive(Debug)]
enum Predicate {
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
    Not(Box<Predicate>),
    Field(FieldTest),
}

#[derive(Debug)]
struct FieldTest {
    path: String,
    equals: Option<Value>,
    matches: Option<Regex>,
    exists: Option<bool>,
    non_empty: Option<bool>,
    any: Option<Box<Predicate>>,
}

impl Predicate {
    fn compile(spec: &PredicateSpec) -> Result<Self, ConfigError> {
        Ok(match spec {
            PredicateSpec::All(parts) => Predicate::All(parts.iter().map(Self::compile).collect::<Result<_, _>>()?),
            PredicateSpec::Any(parts) => Predicate::Any(parts.iter().map(Self::compile).collect::<Result<_, _>>()?),
            PredicateSpec::Not(inner) => Predicate::Not(Box::new(Self::compile(inner)?)),
            PredicateSpec::Field(field) => {
                let matches = field
                    .matches
                    .as_deref()
                    .map(|pattern| {
                        Regex::new(pattern).map_err(|source| ConfigError::Regex {
                            pattern: pattern.to_string(),
                            source,
                        })
                    })
                    .transpose()?;
                let any = field
                    .any
                    .as_deref()
                    .map(Self::compile)
                    .transpose()?
                    .map(Box::new);
                Predicate::Field(FieldTest {
                    path: field.path.clone(),
                    equals: field.equals.clone(),
                    matches,
                    exists: field.exists,
                    non_empty: field.non_empty,
                    any,
                })
            }
        })
    }

    fn eval(&self, document: &Value) -> bool {
        match self {
            Predicate::All(parts) => parts.iter().all(|p| p.eval(document)),
            Predicate::Any(parts) => parts.iter().any(|p| p.eval(document)),
            Predicate::Not(inner) => !inner.eval(document),
            Predicate::Field(test) => test.eval(document),
        }
    }
}

impl FieldTest {
    fn eval(&self, document: &Value) -> bool {
        let value = lookup(document, &self.path).filter(|v| !v.is_null());

        if let Some(want) = self.exists {
            if value.is_some() != want {
                return false;
            }
        }
        let unconstrained = self.equals.is_none() && self.matches.is_none() && self.non_empty.is_none() && self.any.is_none();
        if unconstrained {
            return self.exists.is_some() || value.is_some();
        }
        let Some(value) = value else {
            return self.non_empty == Some(false) && self.equals.is_none() && self.matches.is_none() && self.any.is_none();
        };

        if let Some(expected) = &self.equals {
            if value != expected {
                return false;
            }
        }
        if let Some(regex) = &self.matches {
            if !value.as_str().is_some_and(|s| regex.is_match(s)) {
                return false;
            }
        }
        if let Some(want) = self.non_empty {
            let non_empty = match value {
                Value::Array(items) => !items.is_empty(),
                Value::String(s) => !s.is_empty(),
                Value::Object(map) => !map.is_empty(),
                _ => true,
            };
            if non_empty != want {
                return false;
            }
        }
        if let Some(inner) = &self.any {
            let hit = match value {
                Value::Array(items) => items.iter().any(|item| inner.eval(item)),
                Value::Object(map) => map.values().any(|item| inner.eval(item)),
                _ => false,
            };
            if !hit {
                return false;
            }
        }
        true
    }
}

impl ValueExpr {
    /// `None` when the referenced field is missing, so callers can omit it.
    fn eval(&self, document: &Value) -> Option<Value> {
        match self {
            ValueExpr::Field(path) => lookup(document, path).cloned(),
            ValueExpr::BestValue { key, value_type } => Some(best_value(document, key, value_type)),
            ValueExpr::PublishDate => Some(publish_date(document)),
            ValueExpr::Literal(value) => Some(value.clone()),
        }
    }
}

fn scalar_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn collect_properties(source: &Value, paths: &BTreeMap<String, String>) -> Properties {
    paths
        .iter()
        .filter_map(|(key, path)| lookup(source, path).map(|v| (key.clone(), v.clone())))
        .collect()
}

fn compile_extract(
    spec: ExtractSpec,
) -> Result<impl Fn(&Document, &mut SubgraphBuilder) -> Result<(), RuleError> + Send + Sync + 'static, ConfigError> {
    let when = spec.when.as_ref().map(Predicate::compile).transpose()?;
    let edges = spec.edges;
    let properties = spec.properties;

    Ok(move |document: &Document, builder: &mut SubgraphBuilder| {
        if when.as_ref().is_some_and(|p| !p.eval(document)) {
            return Ok(());
        }
        for edge in &edges {
            let elements: Vec<&Value> = match &edge.each {
                Some(path) => match lookup(document, path) {
                    Some(Value::Array(items)) => items.iter().collect(),
                    Some(Value::Null) | None => Vec::new(),
                    Some(_) => {
                        return Err(RuleError::invalid_shape(format!("'{}' is not an array", path)));
                    }
                },
                None => vec![document],
            };
            for element in elements {
                let Some(raw) = lookup(element, &edge.id).filter(|v| !v.is_null()) else {
                    continue;
                };
                let Some(id) = scalar_id(raw) else {
                    return Err(RuleError::invalid_shape(format!(
                        "edge {} id at '{}' is not a string or number",
                        edge.label, edge.id
                    )));
                };
                let owner = builder.node();
                let other = NodeId::new(
                    edge.index.clone().unwrap_or_else(|| owner.index.clone()),
                    edge.doc_type.clone().unwrap_or_else(|| owner.doc_type.clone()),
                    id,
                );
                let props = collect_properties(element, &edge.properties);
                builder.link(edge.label.clone(), other, edge.inward, props);
            }
        }
        for (key, value) in collect_properties(document, &properties) {
            builder.set_property(key, value);
        }
        Ok(())
    })
}

fn compile_transform(spec: TransformSpec) -> impl Fn(&Document) -> Result<Document, RuleError> + Send + Sync + 'static {
    move |document: &Document| {
        let mut out = Map::new();
        for field in &spec.copy {
            if let Some(value) = document.get(field).filter(|v| !v.is_null()) {
                out.insert(field.clone(), value.clone());
            }
        }
        for (name, expr) in &spec.fields {
            if let Some(value) = expr.eval(document) {
                out.insert(name.clone(), value);
            }
        }
        Ok(Value::Object(out))
    }
}

fn compile_reducer(spec: WalkPropertyYaml) -> Result<ReduceSpec, ConfigError> {
    let nested = spec.nested;
    let scope = move |view: &TreeView<'_>| -> Vec<Value> {
        let nodes = if nested { view.descendants() } else { view.children() };
        nodes.into_iter().filter_map(|n| n.value().cloned()).collect()
    };

    let reduce = match spec.reduce {
        ReducerSpec::FirstChild { fields } => ReduceSpec::new(move |view| {
            let mut out = Map::new();
            if let Some(child) = view.existing_children().first().and_then(|c| c.value()) {
                for (name, expr) in &fields {
                    if let Some(value) = expr.eval(child) {
                        out.insert(name.clone(), value);
                    }
                }
            }
            Ok(Value::Object(out))
        }),
        ReducerSpec::FirstChildValue(expr) => ReduceSpec::new(move |view| {
            Ok(view
                .existing_children()
                .first()
                .and_then(|c| c.value())
                .and_then(|child| expr.eval(child))
                .unwrap_or(Value::Null))
        }),
        ReducerSpec::Collect { filter, value } => {
            let filter = filter.as_ref().map(Predicate::compile).transpose()?;
            ReduceSpec::new(move |view| {
                let values = scope(view)
                    .iter()
                    .filter(|doc| filter.as_ref().map_or(true, |p| p.eval(doc)))
                    .filter_map(|doc| value.eval(doc))
                    .collect();
                Ok(Value::Array(values))
            })
        }
        ReducerSpec::Count => ReduceSpec::new(move |view| Ok(Value::from(scope(view).len()))),
        ReducerSpec::FullTree => ReduceSpec::new(|view| Ok(view.to_json())),
    };
    Ok(if nested { reduce.nested() } else { reduce })
}

impl RuleSpec {
    /// Compile into a descriptor, validating patterns.
    pub fn compile(self) -> Result<RuleDescriptor, ConfigError> {
        let mut rule = RuleDescriptor::new(self.source, self.target);

        if let Some(filter) = &self.filter {
            let predicate = Predicate::compile(filter)?;
            rule = rule.with_filter(move |doc| predicate.eval(doc));
        }
        if let Some(extract) = self.extract {
            rule = rule.with_extract(compile_extract(extract)?);
        }
        if let Some(transform) = self.transform {
            rule = rule.with_transform(compile_transform(transform));
        }
        for (name, walk) in self.walks {
            let mut spec = WalkSpec::new(walk.direction);
            for (property, reducer) in walk.properties {
                spec = spec.with_property(property, compile_reducer(reducer)?);
            }
            rule = rule.with_walk(name, spec);
        }
        if let Some(fingerprint) = self.fingerprint {
            rule = rule.with_fingerprint(fingerprint);
        }
        Ok(rule)
    }
}

impl RuleFile {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: serde_yaml::Value = serde_yaml::from_str(yaml)?;
        let json = serde_json::to_value(raw).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        let mut file: RuleFile = serde_json::from_value(json.clone())
            .map_err(|e| ConfigError::Invalid(format!("rule file: {}", e)))?;
        if let Some(raw_rules) = json.get("rules").and_then(Value::as_array) {
            for (spec, raw) in file.rules.iter_mut().zip(raw_rules) {
                spec.fingerprint = Some(raw.to_string());
            }
        }
        Ok(file)
    }

    pub fn into_registry(self) -> Result<RuleRegistry, ConfigError> {
        let rules = self
            .rules
            .into_iter()
            .map(RuleSpec::compile)
            .collect::<Result<Vec<_>, _>>()?;
        RuleRegistry::from_rules(rules)
    }
}

/// Parse and compile a YAML rule file.
pub fn parse_rules(yaml: &str) -> Result<RuleRegistry, ConfigError> {
    RuleFile::from_yaml_str(yaml)?.into_registry()
}

pub fn load_rules(path: &Path) -> Result<RuleRegistry, ConfigError> {
    let yaml = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rules(&yaml)
}
