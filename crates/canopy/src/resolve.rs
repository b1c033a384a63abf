//! Recursive resolution of a configuration tree against criteria
//!
//! Resolution is a pure function of (tree, path, criteria). Misses of any
//! kind (unknown path, fork key, or criteria lookup) yield `None`, never an
//! error; validation already happened at load time. An optional audit sink
//! collects one [`AppliedFilter`] record per filter/range evaluated, in
//! traversal order (outer before inner).

use serde::Serialize;
use serde_json::{Map, Value};

use crate::coerce::coerce;
use crate::criteria::{criterion_number, criterion_string, reach};
use crate::node::{FilterKey, FilterNode, Node, Outcome, ParamNode, RangeEntry};

/// One audit record: which branch a filter or range selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedFilter {
    /// The filter's criteria path (or environment variable name).
    pub filter: String,
    /// Matched case key, `"$default"`, or a range entry's identifier.
    /// Absent when the filter selected nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_id: Option<String>,
    /// The owning node's `$id`, when declared.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_id: Option<String>,
}

/// One resolution pass over a tree.
///
/// Holds the effective criteria (bound layered under call-time) and the
/// caller's audit sink for the duration of a single `get`/`meta` call.
pub(crate) struct Walker<'w> {
    criteria: &'w Value,
    applied: Option<&'w mut Vec<AppliedFilter>>,
}

impl<'w> Walker<'w> {
    pub fn new(criteria: &'w Value, applied: Option<&'w mut Vec<AppliedFilter>>) -> Self {
        Self { criteria, applied }
    }

    /// Resolve the node at a slash-delimited path into a concrete value.
    pub fn lookup(&mut self, tree: &Node, key: &str) -> Option<Value> {
        let node = self.descend(tree, key)?;
        self.resolve(node)
    }

    /// Return the `$meta` of the node a path selects, without
    /// materializing its value. Base merging never applies to metadata.
    pub fn lookup_meta(&mut self, tree: &Node, key: &str) -> Option<Value> {
        let node = self.descend(tree, key)?;
        self.select(node)?.meta().cloned()
    }

    /// Walk the path segments, unwrapping filter selections at every
    /// level. A missing fork key stops descent immediately.
    fn descend<'n>(&mut self, tree: &'n Node, key: &'n str) -> Option<&'n Node> {
        let segments = parse_key(key)?;
        let mut node = tree;
        for segment in segments {
            node = match self.select(node)? {
                Node::Fork(fork) => fork.children.get(segment)?,
                Node::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                // Value and param nodes are leaves for traversal purposes.
                _ => return None,
            };
        }
        Some(node)
    }

    /// Unwrap a chain of filter/range selections down to the first
    /// non-filter node, recording audit entries along the way.
    fn select<'n>(&mut self, node: &'n Node) -> Option<&'n Node> {
        let mut current = node;
        while let Node::Filter(filter) = current {
            current = self.branch(filter)?;
        }
        Some(current)
    }

    /// Materialize a node into a value.
    fn resolve(&mut self, node: &Node) -> Option<Value> {
        match node {
            Node::Scalar(Value::Null) => None,
            Node::Scalar(value) => Some(value.clone()),
            Node::Value(value) => Some(value.value.clone()),
            Node::Array(items) => Some(Value::Array(
                items.iter().filter_map(|item| self.resolve(item)).collect(),
            )),
            Node::Fork(fork) => {
                let mut out = Map::new();
                for (key, child) in &fork.children {
                    if let Some(value) = self.resolve(child) {
                        out.insert(key.clone(), value);
                    }
                }
                Some(Value::Object(out))
            }
            Node::Param(param) => self.param(param),
            Node::Filter(filter) => {
                let selected = self.branch(filter);
                let branch_value = selected.and_then(|branch| self.resolve(branch));
                match &filter.base {
                    None => branch_value,
                    Some(base) => {
                        if base_replaces(base) {
                            return branch_value;
                        }
                        let base_value = self.resolve(base);
                        merge_base(base_value, branch_value)
                    }
                }
            }
        }
    }

    /// Select a filter/range branch and record the decision.
    fn branch<'n>(&mut self, filter: &'n FilterNode) -> Option<&'n Node> {
        let criterion = self.criterion(&filter.key);

        match &filter.outcome {
            Outcome::Cases(cases) => {
                if let Some(name) = criterion.as_ref().and_then(criterion_string) {
                    if let Some(case) = cases.get(&name) {
                        self.log(filter, Some(name));
                        return Some(case);
                    }
                }
            }
            Outcome::Range(entries) => {
                if let Some(value) = criterion.as_ref().and_then(criterion_number) {
                    for entry in entries {
                        if value <= entry.limit {
                            self.log(filter, Some(range_value_id(entry)));
                            return Some(&entry.value);
                        }
                    }
                }
            }
        }

        match &filter.default {
            Some(default) => {
                self.log(filter, Some("$default".to_string()));
                Some(default.as_ref())
            }
            None => {
                self.log(filter, None);
                None
            }
        }
    }

    fn criterion(&self, key: &FilterKey) -> Option<Value> {
        match key {
            FilterKey::Criteria(path) => reach(self.criteria, path).cloned(),
            FilterKey::Env(name) => std::env::var(name).ok().map(Value::String),
        }
    }

    /// Substitute an external criteria value, coercing on request.
    /// Coercion never applies to the `$default`, and a failed coercion
    /// falls back to it.
    fn param(&mut self, param: &ParamNode) -> Option<Value> {
        let default = param.default.as_deref();
        match reach(self.criteria, &param.path) {
            None => default.and_then(|node| self.resolve(node)),
            Some(raw) => match &param.coerce {
                None => Some(raw.clone()),
                Some(kind) => match coerce(raw, kind) {
                    Some(value) => Some(value),
                    None => default.and_then(|node| self.resolve(node)),
                },
            },
        }
    }

    fn log(&mut self, filter: &FilterNode, value_id: Option<String>) {
        if let Some(sink) = self.applied.as_mut() {
            sink.push(AppliedFilter {
                filter: filter.key.name().to_string(),
                value_id,
                filter_id: filter.id.clone(),
            });
        }
    }
}

/// Audit identifier for a selected range entry: the entry's own id, the
/// string form of a scalar value, or the `[object]` marker.
fn range_value_id(entry: &RangeEntry) -> String {
    if let Some(id) = &entry.id {
        return id.clone();
    }
    match &entry.value {
        Node::Scalar(Value::String(s)) => s.clone(),
        Node::Scalar(Value::Number(n)) => n.to_string(),
        Node::Scalar(Value::Bool(b)) => b.to_string(),
        _ => "[object]".to_string(),
    }
}

/// `$replace: true` on the base's value wrapper discards the base
/// entirely, even though it was declared.
fn base_replaces(base: &Node) -> bool {
    matches!(base, Node::Value(value) if value.replace)
}

/// Arrays concatenate base-first; any non-array on either side means the
/// branch wins outright.
fn merge_base(base: Option<Value>, branch: Option<Value>) -> Option<Value> {
    match (base, branch) {
        (Some(Value::Array(mut items)), Some(Value::Array(extra))) => {
            items.extend(extra);
            Some(Value::Array(items))
        }
        (_, branch) => branch,
    }
}

/// Split a slash-delimited resolution key into fork segments.
///
/// `/` is the root; every other key must be `/`-prefixed with non-empty
/// word-character segments. Anything else is a miss.
fn parse_key(key: &str) -> Option<Vec<&str>> {
    if key == "/" {
        return Some(Vec::new());
    }
    let rest = key.strip_prefix('/')?;
    let mut segments = Vec::new();
    for segment in rest.split('/') {
        if segment.is_empty()
            || !segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return None;
        }
        segments.push(segment);
    }
    Some(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_key() {
        assert_eq!(parse_key("/"), Some(vec![]));
        assert_eq!(parse_key("/a/b_2"), Some(vec!["a", "b_2"]));
        assert_eq!(parse_key("key"), None);
        assert_eq!(parse_key("/a/"), None);
        assert_eq!(parse_key("/a b"), None);
        assert_eq!(parse_key(""), None);
    }

    #[test]
    fn test_merge_base_laws() {
        assert_eq!(
            merge_base(Some(json!(["a"])), Some(json!(["c"]))),
            Some(json!(["a", "c"]))
        );
        assert_eq!(merge_base(Some(json!(["a"])), Some(json!({}))), Some(json!({})));
        assert_eq!(merge_base(Some(json!({"x": 1})), Some(json!(["c"]))), Some(json!(["c"])));
        assert_eq!(merge_base(Some(json!(["a"])), None), None);
    }

    #[test]
    fn test_range_value_id_forms() {
        let entry = |value, id: Option<&str>| RangeEntry {
            limit: 1.0,
            value,
            id: id.map(str::to_string),
        };
        assert_eq!(range_value_id(&entry(Node::Scalar(json!(4)), None)), "4");
        assert_eq!(range_value_id(&entry(Node::Scalar(json!("x")), None)), "x");
        assert_eq!(range_value_id(&entry(Node::Scalar(json!(4)), Some("ab"))), "ab");
        assert_eq!(
            range_value_id(&entry(Node::Array(vec![Node::Scalar(json!(1))]), None)),
            "[object]"
        );
    }
}
