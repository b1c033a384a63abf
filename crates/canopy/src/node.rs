//! Typed configuration tree and the document validator
//!
//! A document is a plain `serde_json::Value` using the reserved directive
//! keys (`$filter`, `$range`, `$value`, `$param`, `$coerce`, `$splitToken`,
//! `$default`, `$base`, `$replace`, `$meta`, `$id`). [`Node::parse`] checks
//! the whole directive grammar once, at load time, and produces a closed
//! sum type so resolution never has to re-inspect raw JSON for directives.
//! Every node carries exactly one role; mixing directives (e.g. `$value`
//! with `$filter`) is rejected with an error naming the offending key.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::coerce::{Coercion, SplitToken};
use crate::error::{Error, Result};

/// Grammar for `$filter` and `$param` criteria paths.
static DOTTED_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\w+(?:\.\w+)*$").unwrap());

const DIRECTIVES: &[&str] = &[
    "$base",
    "$coerce",
    "$default",
    "$filter",
    "$id",
    "$meta",
    "$param",
    "$range",
    "$replace",
    "$splitToken",
    "$value",
];

/// One addressable point in the configuration tree.
#[derive(Debug, Clone)]
pub enum Node {
    /// JSON scalar leaf (null, boolean, number, or string).
    Scalar(Value),
    /// Sequence of nodes.
    Array(Vec<Node>),
    /// Plain mapping traversed by path segment.
    Fork(ForkNode),
    /// `$value` wrapper; an authored terminal, opaque to resolution.
    Value(ValueNode),
    /// `$filter`/`$range` selection over a criteria lookup.
    Filter(FilterNode),
    /// `$param` substitution of an external criteria value.
    Param(ParamNode),
}

#[derive(Debug, Clone, Default)]
pub struct ForkNode {
    pub children: BTreeMap<String, Node>,
    pub id: Option<String>,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ValueNode {
    pub value: Value,
    /// `$replace: true`; only valid inside a `$base` wrapper with an array value.
    pub replace: bool,
    pub id: Option<String>,
    pub meta: Option<Value>,
}

/// Where a filter reads its criterion from.
#[derive(Debug, Clone)]
pub enum FilterKey {
    /// Dotted path into the criteria object.
    Criteria(String),
    /// Long form `{"$env": "NAME"}`: read the named process environment
    /// variable at resolution time.
    Env(String),
}

impl FilterKey {
    pub fn name(&self) -> &str {
        match self {
            FilterKey::Criteria(path) => path,
            FilterKey::Env(name) => name,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// Named branches keyed by the stringified criterion.
    Cases(BTreeMap<String, Node>),
    /// Ascending numeric buckets; the first entry with `limit >= criterion` wins.
    Range(Vec<RangeEntry>),
}

#[derive(Debug, Clone)]
pub struct RangeEntry {
    pub limit: f64,
    pub value: Node,
    pub id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FilterNode {
    pub key: FilterKey,
    pub outcome: Outcome,
    pub default: Option<Box<Node>>,
    pub base: Option<Box<Node>>,
    pub id: Option<String>,
    pub meta: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct ParamNode {
    pub path: String,
    pub default: Option<Box<Node>>,
    pub coerce: Option<Coercion>,
    pub meta: Option<Value>,
}

impl Node {
    /// Parse and validate a raw document into a typed tree.
    ///
    /// Scalars and `null` pass unchecked; only object and array subtrees
    /// carry grammar. Errors identify the path of the offending key.
    pub fn parse(document: &Value) -> Result<Self> {
        parse_node(document, "/", false)
    }

    /// The node's attached `$meta`, if any.
    ///
    /// Metadata is pure side information and never participates in value
    /// resolution.
    pub fn meta(&self) -> Option<&Value> {
        match self {
            Node::Scalar(_) | Node::Array(_) => None,
            Node::Fork(fork) => fork.meta.as_ref(),
            Node::Value(value) => value.meta.as_ref(),
            Node::Filter(filter) => filter.meta.as_ref(),
            Node::Param(param) => param.meta.as_ref(),
        }
    }
}

fn child_path(path: &str, key: &str) -> String {
    if path == "/" {
        format!("/{key}")
    } else {
        format!("{path}/{key}")
    }
}

fn parse_node(value: &Value, path: &str, in_base: bool) -> Result<Node> {
    match value {
        Value::Object(map) => parse_object(map, path, in_base),
        Value::Array(items) => {
            let mut nodes = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                nodes.push(parse_node(item, &child_path(path, &index.to_string()), false)?);
            }
            Ok(Node::Array(nodes))
        }
        scalar => Ok(Node::Scalar(scalar.clone())),
    }
}

fn parse_object(map: &Map<String, Value>, path: &str, in_base: bool) -> Result<Node> {
    for key in map.keys() {
        if key.starts_with('$') && !DIRECTIVES.contains(&key.as_str()) {
            return Err(Error::invalid(path, format!("\"{key}\" is not allowed")));
        }
    }

    let id = parse_id(map, path)?;
    let meta = map.get("$meta").cloned();

    if map.contains_key("$replace") && !map.contains_key("$value") {
        return Err(Error::invalid(path, "$replace requires an array $value"));
    }

    if let Some(value) = map.get("$value") {
        return parse_value(map, value, path, in_base, id, meta);
    }
    if let Some(param) = map.get("$param") {
        return parse_param(map, param, path, meta);
    }
    if let Some(filter) = map.get("$filter") {
        return parse_filter(map, filter, path, id, meta);
    }
    parse_fork(map, path, id, meta)
}

fn parse_id(map: &Map<String, Value>, path: &str) -> Result<Option<String>> {
    match map.get("$id") {
        None => Ok(None),
        Some(Value::String(id)) if !id.is_empty() => Ok(Some(id.clone())),
        Some(_) => Err(Error::invalid(path, "$id must be a non-empty string")),
    }
}

fn forbid_keys(map: &Map<String, Value>, owner: &str, forbidden: &[&str], path: &str) -> Result<()> {
    for key in forbidden {
        if map.contains_key(*key) {
            return Err(Error::invalid(
                path,
                format!("\"{key}\" is not allowed with {owner}"),
            ));
        }
    }
    Ok(())
}

fn forbid_fork_keys(map: &Map<String, Value>, owner: &str, path: &str) -> Result<()> {
    for key in map.keys() {
        if !key.starts_with('$') {
            return Err(Error::invalid(
                path,
                format!("\"{key}\" is not allowed with {owner}"),
            ));
        }
    }
    Ok(())
}

fn parse_value(
    map: &Map<String, Value>,
    value: &Value,
    path: &str,
    in_base: bool,
    id: Option<String>,
    meta: Option<Value>,
) -> Result<Node> {
    forbid_keys(
        map,
        "$value",
        &["$filter", "$range", "$param", "$default", "$base", "$coerce", "$splitToken"],
        path,
    )?;
    forbid_fork_keys(map, "$value", path)?;

    // The wrapped value is opaque to resolution but still has to be a
    // grammatically valid subtree.
    parse_node(value, &child_path(path, "$value"), false)?;

    let replace = match map.get("$replace") {
        None => false,
        Some(Value::Bool(replace)) => {
            if !in_base {
                return Err(Error::invalid(path, "$replace is only allowed inside $base"));
            }
            if !value.is_array() {
                return Err(Error::invalid(path, "$replace requires an array $value"));
            }
            *replace
        }
        Some(_) => return Err(Error::invalid(path, "$replace must be a boolean")),
    };

    Ok(Node::Value(ValueNode {
        value: value.clone(),
        replace,
        id,
        meta,
    }))
}

fn parse_param(
    map: &Map<String, Value>,
    param: &Value,
    path: &str,
    meta: Option<Value>,
) -> Result<Node> {
    forbid_keys(map, "$param", &["$filter", "$range", "$base", "$id"], path)?;
    forbid_fork_keys(map, "$param", path)?;

    let param_path = match param {
        Value::String(p) if DOTTED_PATH.is_match(p) => p.clone(),
        _ => {
            return Err(Error::invalid(
                path,
                "$param must be a non-empty dotted identifier",
            ));
        }
    };

    let coerce = match map.get("$coerce") {
        None => {
            if map.contains_key("$splitToken") {
                return Err(Error::invalid(path, "$splitToken requires $coerce: \"array\""));
            }
            None
        }
        Some(Value::String(kind)) => Some(parse_coercion(map, kind, path)?),
        Some(_) => return Err(Error::invalid(path, "$coerce must be a string")),
    };

    let default = match map.get("$default") {
        None => None,
        Some(value) => Some(Box::new(parse_node(value, &child_path(path, "$default"), false)?)),
    };

    Ok(Node::Param(ParamNode {
        path: param_path,
        default,
        coerce,
        meta,
    }))
}

fn parse_coercion(map: &Map<String, Value>, kind: &str, path: &str) -> Result<Coercion> {
    if kind != "array" && map.contains_key("$splitToken") {
        return Err(Error::invalid(path, "$splitToken requires $coerce: \"array\""));
    }

    match kind {
        "array" => {
            let split = match map.get("$splitToken") {
                None => SplitToken::default(),
                Some(Value::String(token)) if !token.is_empty() => {
                    SplitToken::Literal(token.clone())
                }
                Some(Value::Object(pattern)) => match pattern.get("$regex") {
                    Some(Value::String(source)) if pattern.len() == 1 => {
                        let regex = Regex::new(source).map_err(|err| {
                            Error::invalid(path, format!("$splitToken pattern is invalid: {err}"))
                        })?;
                        SplitToken::Pattern(regex)
                    }
                    _ => {
                        return Err(Error::invalid(
                            path,
                            "$splitToken object requires a single $regex string",
                        ));
                    }
                },
                Some(_) => {
                    return Err(Error::invalid(
                        path,
                        "$splitToken must be a non-empty string or a $regex object",
                    ));
                }
            };
            Ok(Coercion::Array { split })
        }
        "boolean" => Ok(Coercion::Boolean),
        "number" => Ok(Coercion::Number),
        "object" => Ok(Coercion::Object),
        other => Err(Error::invalid(
            path,
            format!("\"{other}\" is not a valid $coerce kind"),
        )),
    }
}

fn parse_filter(
    map: &Map<String, Value>,
    filter: &Value,
    path: &str,
    id: Option<String>,
    meta: Option<Value>,
) -> Result<Node> {
    forbid_keys(map, "$filter", &["$coerce", "$splitToken"], path)?;

    let key = match filter {
        Value::String(key) if DOTTED_PATH.is_match(key) => FilterKey::Criteria(key.clone()),
        Value::String(_) => {
            return Err(Error::invalid(
                path,
                "$filter must be a non-empty dotted identifier",
            ));
        }
        Value::Object(long) => match long.get("$env") {
            Some(Value::String(name)) if !name.is_empty() && long.len() == 1 => {
                FilterKey::Env(name.clone())
            }
            _ => {
                return Err(Error::invalid(
                    path,
                    "$filter object requires a single non-empty $env string",
                ));
            }
        },
        _ => {
            return Err(Error::invalid(
                path,
                "$filter must be a string or an object with $env",
            ));
        }
    };

    let default = match map.get("$default") {
        None => None,
        Some(value) => Some(Box::new(parse_node(value, &child_path(path, "$default"), false)?)),
    };

    let base = match map.get("$base") {
        None => None,
        Some(value) => Some(Box::new(parse_node(value, &child_path(path, "$base"), true)?)),
    };

    let outcome = if let Some(range) = map.get("$range") {
        forbid_fork_keys(map, "$range", path)?;
        Outcome::Range(parse_range(range, &child_path(path, "$range"))?)
    } else {
        let mut cases = BTreeMap::new();
        for (key, value) in map {
            if key.starts_with('$') {
                continue;
            }
            cases.insert(key.clone(), parse_node(value, &child_path(path, key), false)?);
        }
        if cases.is_empty() {
            let message = if default.is_some() {
                "$filter with only a $default is not allowed"
            } else {
                "$filter requires at least one selectable outcome"
            };
            return Err(Error::invalid(path, message));
        }
        Outcome::Cases(cases)
    };

    Ok(Node::Filter(FilterNode {
        key,
        outcome,
        default,
        base,
        id,
        meta,
    }))
}

fn parse_range(range: &Value, path: &str) -> Result<Vec<RangeEntry>> {
    let items = match range {
        Value::Array(items) if !items.is_empty() => items,
        Value::Array(_) => return Err(Error::invalid(path, "$range must not be empty")),
        _ => return Err(Error::invalid(path, "$range must be an array")),
    };

    let mut entries: Vec<RangeEntry> = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let entry_path = child_path(path, &index.to_string());
        let entry = match item {
            Value::Object(entry) => entry,
            _ => return Err(Error::invalid(&entry_path, "$range entries must be objects")),
        };
        for key in entry.keys() {
            if key != "limit" && key != "value" && key != "id" {
                return Err(Error::invalid(
                    &entry_path,
                    format!("\"{key}\" is not allowed in a $range entry"),
                ));
            }
        }

        let limit = match entry.get("limit") {
            Some(Value::Number(limit)) => limit.as_f64().ok_or_else(|| {
                Error::invalid(&entry_path, "$range entry limit is out of range")
            })?,
            Some(_) => return Err(Error::invalid(&entry_path, "$range entry limit must be a number")),
            None => return Err(Error::invalid(&entry_path, "$range entry requires a limit")),
        };

        let value = match entry.get("value") {
            Some(value) => parse_node(value, &child_path(&entry_path, "value"), false)?,
            None => return Err(Error::invalid(&entry_path, "$range entry requires a value")),
        };

        let id = match entry.get("id") {
            None => None,
            Some(Value::String(id)) if !id.is_empty() => Some(id.clone()),
            Some(_) => {
                return Err(Error::invalid(&entry_path, "$range entry id must be a non-empty string"));
            }
        };

        if let Some(previous) = entries.last()
            && limit <= previous.limit
        {
            return Err(Error::invalid(
                &entry_path,
                "$range limits must be strictly ascending",
            ));
        }

        entries.push(RangeEntry { limit, value, id });
    }

    Ok(entries)
}

fn parse_fork(
    map: &Map<String, Value>,
    path: &str,
    id: Option<String>,
    meta: Option<Value>,
) -> Result<Node> {
    if map.contains_key("$default") {
        return Err(Error::invalid(path, "$default requires a $filter or $param"));
    }
    if map.contains_key("$range") {
        return Err(Error::invalid(path, "$range requires a $filter"));
    }
    if map.contains_key("$base") {
        return Err(Error::invalid(path, "$base requires a $filter"));
    }
    if map.contains_key("$coerce") || map.contains_key("$splitToken") {
        return Err(Error::invalid(path, "$coerce requires a $param"));
    }

    let mut children = BTreeMap::new();
    for (key, value) in map {
        if key.starts_with('$') {
            continue;
        }
        children.insert(key.clone(), parse_node(value, &child_path(path, key), false)?);
    }

    Ok(Node::Fork(ForkNode { children, id, meta }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_scalars_pass() {
        assert!(Node::parse(&json!(null)).is_ok());
        assert!(Node::parse(&json!("abc")).is_ok());
        assert!(Node::parse(&json!(42)).is_ok());
    }

    #[test]
    fn test_parse_plain_fork() {
        let node = Node::parse(&json!({"a": 1, "b": {"c": 2}})).unwrap();
        match node {
            Node::Fork(fork) => assert_eq!(fork.children.len(), 2),
            other => panic!("expected fork, got {other:?}"),
        }
    }

    #[test]
    fn test_unknown_directive_names_key() {
        let err = Node::parse(&json!({"$c": 3})).unwrap_err();
        assert!(err.to_string().contains("\"$c\" is not allowed"), "{err}");
    }

    #[test]
    fn test_error_names_nested_path() {
        let err = Node::parse(&json!({"key": {"sub": {"$b": 5}}})).unwrap_err();
        assert!(err.to_string().contains("/key/sub"), "{err}");
    }

    #[test]
    fn test_filter_long_form_env() {
        let node = Node::parse(&json!({"$filter": {"$env": "NODE_ENV"}, "production": 1})).unwrap();
        match node {
            Node::Filter(filter) => assert_eq!(filter.key.name(), "NODE_ENV"),
            other => panic!("expected filter, got {other:?}"),
        }
    }

    #[test]
    fn test_range_entries_parsed_in_order() {
        let node = Node::parse(&json!({
            "$filter": "a",
            "$range": [{"limit": 1, "value": 10}, {"limit": 5, "value": 20, "id": "hi"}],
            "$default": 0
        }))
        .unwrap();
        match node {
            Node::Filter(FilterNode { outcome: Outcome::Range(entries), .. }) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[1].id.as_deref(), Some("hi"));
            }
            other => panic!("expected range filter, got {other:?}"),
        }
    }

    #[test]
    fn test_meta_attaches_to_variants() {
        let node = Node::parse(&json!({"$value": 0, "$meta": "something"})).unwrap();
        assert_eq!(node.meta(), Some(&json!("something")));

        let node = Node::parse(&json!({"$param": "a.b", "$meta": "p"})).unwrap();
        assert_eq!(node.meta(), Some(&json!("p")));

        let node = Node::parse(&json!({"a": 1})).unwrap();
        assert_eq!(node.meta(), None);
    }
}
