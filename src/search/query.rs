//! Query body construction.
//!
//! Pure value types; no backend ownership. Field names arrive at runtime, so
//! bodies are assembled from `serde_json::Map`s rather than the `json!`
//! macro.

use serde_json::{Map, Value};

/// Result window: skip `from` documents, return at most `size`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub from: u64,
    pub size: u64,
}

impl Window {
    pub fn new(from: u64, size: u64) -> Self {
        Self { from, size }
    }
}

fn obj(key: &str, value: Value) -> Value {
    let mut map = Map::with_capacity(1);
    map.insert(key.to_string(), value);
    Value::Object(map)
}

/// Single-field exact match: `{"term": {field: value}}`.
pub fn term(field: &str, value: impl Into<Value>) -> Value {
    obj("term", obj(field, value.into()))
}

/// Multi-field best-fields match. An empty field list matches all fields.
pub fn multi_match(text: &str, fields: &[&str]) -> Value {
    let mut inner = Map::new();
    inner.insert("query".into(), Value::String(text.to_string()));
    if !fields.is_empty() {
        inner.insert(
            "fields".into(),
            Value::Array(fields.iter().map(|f| Value::String((*f).to_string())).collect()),
        );
    }
    obj("multi_match", Value::Object(inner))
}

/// Free-text query-string match.
pub fn query_string(query: &str) -> Value {
    obj("query_string", obj("query", Value::String(query.to_string())))
}

/// Range filter `field >= gte`.
pub fn range_gte(field: &str, gte: impl Into<Value>) -> Value {
    obj("range", obj(field, obj("gte", gte.into())))
}

/// Wrap a query with a random score function (sampling).
pub fn random_score(inner: Value) -> Value {
    let mut body = Map::new();
    body.insert("query".into(), inner);
    body.insert("random_score".into(), Value::Object(Map::new()));
    obj("function_score", Value::Object(body))
}

/// Descending sort clause for one field.
pub fn sort_desc(field: &str) -> Value {
    obj(field, obj("order", Value::String("desc".into())))
}

/// Ascending sort clause for one field.
pub fn sort_asc(field: &str) -> Value {
    obj(field, obj("order", Value::String("asc".into())))
}

/// Assemble a full `_search` body from one query clause.
pub fn search_body(query: Value, sort: Vec<Value>, window: Window) -> Value {
    let mut body = Map::new();
    body.insert("from".into(), window.from.into());
    body.insert("size".into(), window.size.into());
    if !sort.is_empty() {
        body.insert("sort".into(), Value::Array(sort));
    }
    body.insert("query".into(), query);
    Value::Object(body)
}

/// Assembled boolean query submitted as raw JSON.
///
/// `must` collects positive and text clauses; `must_not`, `filter`, and
/// `sort` are carried through verbatim.
#[derive(Debug, Clone)]
pub struct BoolQuery {
    window: Window,
    must: Vec<Value>,
    must_not: Vec<Value>,
    filter: Vec<Value>,
    sort: Vec<Value>,
}

impl BoolQuery {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            must: Vec::new(),
            must_not: Vec::new(),
            filter: Vec::new(),
            sort: Vec::new(),
        }
    }

    /// Add a `terms` clause from a field→values map.
    pub fn terms(mut self, terms: Value) -> Self {
        if terms.as_object().is_some_and(|m| !m.is_empty()) {
            self.must.push(obj("terms", terms));
        }
        self
    }

    /// Add a text clause (multi-match over `fields`). Empty text is skipped.
    pub fn text(mut self, query: &str, fields: &[&str]) -> Self {
        if !query.is_empty() {
            self.must.push(multi_match(query, fields));
        }
        self
    }

    /// Add one positive clause verbatim.
    pub fn must(mut self, clause: Value) -> Self {
        self.must.push(clause);
        self
    }

    /// Add one negative clause.
    pub fn must_not(mut self, clause: Value) -> Self {
        self.must_not.push(clause);
        self
    }

    /// Add one non-scoring filter clause.
    pub fn filter(mut self, clause: Value) -> Self {
        self.filter.push(clause);
        self
    }

    /// Add one sort clause.
    pub fn sort(mut self, clause: Value) -> Self {
        self.sort.push(clause);
        self
    }

    /// The `{from, size, sort, query: {bool: {…}}}` body.
    pub fn body(&self) -> Value {
        let mut boolean = Map::new();
        boolean.insert("must".into(), Value::Array(self.must.clone()));
        boolean.insert("must_not".into(), Value::Array(self.must_not.clone()));
        boolean.insert("filter".into(), Value::Array(self.filter.clone()));

        let mut body = Map::new();
        body.insert("from".into(), self.window.from.into());
        body.insert("size".into(), self.window.size.into());
        body.insert("sort".into(), Value::Array(self.sort.clone()));
        body.insert("query".into(), obj("bool", Value::Object(boolean)));
        Value::Object(body)
    }
}
