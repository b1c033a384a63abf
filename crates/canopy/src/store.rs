//! The store façade: load a document, resolve values against criteria
//!
//! A [`Store`] owns one validated, immutable tree and an optional
//! persistently bound criteria fragment. `load` replaces the tree
//! wholesale; `get`/`meta` are read-only and safe to call from multiple
//! call sites as long as nothing concurrently calls `load`/`bind`.

use serde_json::{Map, Value};

use crate::criteria::deep_merge;
use crate::error::Result;
use crate::node::Node;
use crate::resolve::{AppliedFilter, Walker};

/// A loaded configuration document plus bound criteria.
#[derive(Debug, Clone)]
pub struct Store {
    tree: Node,
    bound: Value,
}

impl Store {
    /// Create an empty store; resolves everything to nothing until a
    /// document is loaded.
    pub fn new() -> Self {
        Self {
            tree: Node::Fork(Default::default()),
            bound: Value::Object(Map::new()),
        }
    }

    /// Create a store from a document, validating it first.
    pub fn with_document(document: &Value) -> Result<Self> {
        let mut store = Self::new();
        store.load(document)?;
        Ok(store)
    }

    /// Validate a candidate document without loading it.
    ///
    /// Scalar and `null` candidates pass; only object and array subtrees
    /// carry the directive grammar.
    pub fn validate(document: &Value) -> Result<()> {
        Node::parse(document).map(|_| ())
    }

    /// Validate and atomically replace the stored tree.
    ///
    /// On failure the previously loaded tree (if any) stays in effect and
    /// the error names the offending key.
    pub fn load(&mut self, document: &Value) -> Result<()> {
        match Node::parse(document) {
            Ok(tree) => {
                self.tree = tree;
                tracing::debug!("document loaded");
                Ok(())
            }
            Err(err) => {
                tracing::debug!("document rejected: {err}");
                Err(err)
            }
        }
    }

    /// Resolve a slash-delimited key using only bound criteria.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_with(key, &Value::Null)
    }

    /// Resolve a key with call-time criteria layered over bound criteria.
    pub fn get_with(&self, key: &str, criteria: &Value) -> Option<Value> {
        let criteria = self.effective_criteria(criteria);
        Walker::new(&criteria, None).lookup(&self.tree, key)
    }

    /// Like [`get_with`](Store::get_with), appending one record per
    /// filter/range evaluated to `applied`, in traversal order.
    pub fn get_traced(
        &self,
        key: &str,
        criteria: &Value,
        applied: &mut Vec<AppliedFilter>,
    ) -> Option<Value> {
        let criteria = self.effective_criteria(criteria);
        Walker::new(&criteria, Some(applied)).lookup(&self.tree, key)
    }

    /// The `$meta` attached to the node a key selects, using only bound
    /// criteria.
    pub fn meta(&self, key: &str) -> Option<Value> {
        self.meta_with(key, &Value::Null)
    }

    /// The `$meta` attached to the node a key selects.
    pub fn meta_with(&self, key: &str, criteria: &Value) -> Option<Value> {
        let criteria = self.effective_criteria(criteria);
        Walker::new(&criteria, None).lookup_meta(&self.tree, key)
    }

    /// Deep-merge a fragment into the bound criteria. Bindings accumulate
    /// across calls; the fragment wins on conflicts at leaf level.
    pub fn bind(&mut self, fragment: &Value) {
        deep_merge(&mut self.bound, fragment);
    }

    /// Reset bound criteria to empty.
    pub fn unbind(&mut self) {
        self.bound = Value::Object(Map::new());
    }

    fn effective_criteria(&self, criteria: &Value) -> Value {
        let mut merged = self.bound.clone();
        if !criteria.is_null() {
            deep_merge(&mut merged, criteria);
        }
        merged
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_empty_store_resolves_empty_root() {
        let store = Store::new();
        assert_eq!(store.get("/"), Some(json!({})));
        assert_eq!(store.get("/anything"), None);
    }

    #[test]
    fn test_load_keeps_previous_tree_on_failure() {
        let mut store = Store::with_document(&json!({"key": "old"})).unwrap();
        assert!(store.load(&json!({"$c": 3})).is_err());
        assert_eq!(store.get("/key"), Some(json!("old")));
    }

    #[test]
    fn test_load_replaces_tree_wholesale() {
        let mut store = Store::with_document(&json!({"a": 1, "b": 2})).unwrap();
        store.load(&json!({"c": 3})).unwrap();
        assert_eq!(store.get("/"), Some(json!({"c": 3})));
    }

    #[test]
    fn test_validate_accepts_scalars() {
        assert!(Store::validate(&json!(null)).is_ok());
        assert!(Store::validate(&json!("text")).is_ok());
    }

    #[test]
    fn test_call_time_criteria_wins_over_bound() {
        let mut store = Store::with_document(&json!({
            "flag": {"$param": "a.b", "$default": "none"}
        }))
        .unwrap();
        store.bind(&json!({"a": {"b": "bound"}}));
        assert_eq!(store.get("/flag"), Some(json!("bound")));
        assert_eq!(
            store.get_with("/flag", &json!({"a": {"b": "call"}})),
            Some(json!("call"))
        );
    }
}
