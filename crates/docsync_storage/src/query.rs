//! Structured queries over document collections.
//!
//! A [`Query`] is a predicate tree: simple `{key, operator, value}` leaves
//! combined with `and` / `or` / `not`. [`QueryOptions`] bundles the predicate
//! with sorting, projection and limits, and knows how to evaluate itself over
//! an in-memory set of documents, which is what backends without a native
//! query engine use to honour `all_docs`.
//!
//! ```rust
//! use docsync_storage::{Query, QueryOptions, SortOrder};
//!
//! let options = QueryOptions::new()
//!     .with_query(Query::eq("type", "note").and(Query::gt("rank", 2)))
//!     .with_sort_on("rank", SortOrder::Descending)
//!     .with_select_list(["title"])
//!     .with_limit(0, 10);
//! assert!(options.query.is_some());
//! ```

use crate::document::{AllDocsResponse, AllDocsRow, Document};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Comparison applied by a simple query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Values are equal.
    #[serde(rename = "=")]
    Eq,
    /// Values differ.
    #[serde(rename = "!=")]
    Ne,
    /// Field is lower than the value.
    #[serde(rename = "<")]
    Lt,
    /// Field is lower than or equal to the value.
    #[serde(rename = "<=")]
    Le,
    /// Field is greater than the value.
    #[serde(rename = ">")]
    Gt,
    /// Field is greater than or equal to the value.
    #[serde(rename = ">=")]
    Ge,
}

/// Boolean combinator of a complex query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    /// Every sub-query matches.
    And,
    /// At least one sub-query matches.
    Or,
    /// No sub-query matches.
    Not,
}

/// A structured query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Query {
    /// Compares one field against a value.
    Simple {
        /// Field name.
        key: String,
        /// Comparison.
        operator: Operator,
        /// Right-hand side.
        value: Value,
    },
    /// Combines sub-queries.
    Complex {
        /// Combinator.
        operator: LogicalOperator,
        /// Sub-queries.
        query_list: Vec<Query>,
    },
}

impl Query {
    /// Creates a simple query.
    pub fn simple(key: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Query::Simple {
            key: key.into(),
            operator,
            value: value.into(),
        }
    }

    /// `key = value`
    pub fn eq(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::simple(key, Operator::Eq, value)
    }

    /// `key != value`
    pub fn ne(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::simple(key, Operator::Ne, value)
    }

    /// `key < value`
    pub fn lt(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::simple(key, Operator::Lt, value)
    }

    /// `key > value`
    pub fn gt(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::simple(key, Operator::Gt, value)
    }

    /// Both this query and `other` match.
    pub fn and(self, other: Query) -> Self {
        Query::Complex {
            operator: LogicalOperator::And,
            query_list: vec![self, other],
        }
    }

    /// Either this query or `other` matches.
    pub fn or(self, other: Query) -> Self {
        Query::Complex {
            operator: LogicalOperator::Or,
            query_list: vec![self, other],
        }
    }

    /// Negates this query.
    pub fn negate(self) -> Self {
        Query::Complex {
            operator: LogicalOperator::Not,
            query_list: vec![self],
        }
    }

    /// Evaluates the predicate against a document.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Query::Simple {
                key,
                operator,
                value,
            } => match doc.get(key) {
                Some(field) => compare(field, *operator, value),
                // A missing field only satisfies "!="
                None => *operator == Operator::Ne,
            },
            Query::Complex {
                operator,
                query_list,
            } => match operator {
                LogicalOperator::And => query_list.iter().all(|q| q.matches(doc)),
                LogicalOperator::Or => query_list.iter().any(|q| q.matches(doc)),
                LogicalOperator::Not => !query_list.iter().any(|q| q.matches(doc)),
            },
        }
    }
}

fn compare(field: &Value, operator: Operator, value: &Value) -> bool {
    // An array field matches if any of its items does.
    if let Value::Array(items) = field {
        if !value.is_array() {
            return items.iter().any(|item| compare(item, operator, value));
        }
    }
    match operator {
        Operator::Eq => order(field, value) == Some(Ordering::Equal),
        Operator::Ne => order(field, value) != Some(Ordering::Equal),
        Operator::Lt => order(field, value) == Some(Ordering::Less),
        Operator::Le => matches!(
            order(field, value),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::Gt => order(field, value) == Some(Ordering::Greater),
        Operator::Ge => matches!(
            order(field, value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
    }
}

/// Orders two JSON values of the same kind; mixed kinds are incomparable.
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Array(_), Value::Array(_)) | (Value::Object(_), Value::Object(_)) => {
            (a == b).then_some(Ordering::Equal)
        }
        _ => None,
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Smallest first.
    Ascending,
    /// Largest first.
    Descending,
}

/// Options accepted by [`DocumentStorage::all_docs`](crate::DocumentStorage::all_docs).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryOptions {
    /// Predicate; `None` lists everything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    /// Sort keys, most significant first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sort_on: Vec<(String, SortOrder)>,
    /// Fields projected into each row's `value`.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub select_list: Vec<String>,
    /// `(skip, count)` window applied after sorting.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<(usize, usize)>,
    /// Attach the full document to each row.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub include_docs: bool,
}

impl QueryOptions {
    /// Creates options that list every document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the predicate.
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Appends a sort key.
    pub fn with_sort_on(mut self, key: impl Into<String>, order: SortOrder) -> Self {
        self.sort_on.push((key.into(), order));
        self
    }

    /// Sets the projected fields.
    pub fn with_select_list<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.select_list = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the `(skip, count)` window.
    pub fn with_limit(mut self, skip: usize, count: usize) -> Self {
        self.limit = Some((skip, count));
        self
    }

    /// Requests full documents in the rows.
    pub fn with_include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    /// Returns true if these options only need the list of ids.
    pub fn is_plain_listing(&self) -> bool {
        self.query.is_none()
            && self.sort_on.is_empty()
            && self.select_list.is_empty()
            && self.limit.is_none()
            && !self.include_docs
    }

    /// Evaluates the options over `(id, document)` pairs.
    ///
    /// Rows come back in id order unless `sort_on` says otherwise; ties keep
    /// id order.
    pub fn apply<'a, I>(&self, docs: I) -> AllDocsResponse
    where
        I: IntoIterator<Item = (&'a str, &'a Document)>,
    {
        let mut matched: Vec<(&str, &Document)> = docs
            .into_iter()
            .filter(|(_, doc)| self.query.as_ref().map_or(true, |q| q.matches(doc)))
            .collect();

        matched.sort_by(|a, b| a.0.cmp(b.0));
        if !self.sort_on.is_empty() {
            matched.sort_by(|a, b| self.compare_for_sort(a.1, b.1));
        }

        let (skip, count) = self.limit.unwrap_or((0, usize::MAX));
        let rows = matched
            .into_iter()
            .skip(skip)
            .take(count)
            .map(|(id, doc)| AllDocsRow {
                id: id.to_string(),
                value: self
                    .select_list
                    .iter()
                    .filter_map(|key| doc.get(key).map(|v| (key.clone(), v.clone())))
                    .collect(),
                doc: self.include_docs.then(|| doc.clone()),
            })
            .collect();

        AllDocsResponse::new(rows)
    }

    fn compare_for_sort(&self, a: &Document, b: &Document) -> Ordering {
        for (key, direction) in &self.sort_on {
            // Missing or incomparable fields sort last.
            let ord = match (a.get(key), b.get(key)) {
                (Some(x), Some(y)) => {
                    let ord = order(x, y).unwrap_or(Ordering::Equal);
                    match direction {
                        SortOrder::Ascending => ord,
                        SortOrder::Descending => ord.reverse(),
                    }
                }
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}
