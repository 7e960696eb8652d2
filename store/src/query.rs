//! Filters, sorting, limits and projections over documents.
//!
//! Backends that cannot push these down evaluate them in-process with
//! [`Filter::matches`] and [`FindOptions::apply`].

use serde_json::Value;
use std::cmp::Ordering;

use crate::Document;

/// Compare two JSON values.
///
/// Numbers compare numerically (integers exactly, otherwise as `f64`),
/// strings lexicographically, booleans `false < true`. Values of different
/// kinds, nulls, arrays and objects are incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                return Some(x.cmp(&y));
            }
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                return Some(x.cmp(&y));
            }
            x.as_f64()?.partial_cmp(&y.as_f64()?)
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// A document predicate.
#[derive(Clone, Debug, PartialEq)]
pub enum Filter {
    /// Matches every document.
    All,
    /// `field == value`
    Eq(String, Value),
    /// `field < value`
    Lt(String, Value),
    /// `field >= value`
    Gte(String, Value),
    /// Every inner filter matches.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Lt(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Gte(field.into(), value.into())
    }

    /// Whether `document` satisfies this filter.
    ///
    /// A missing field never matches a comparison.
    pub fn matches(&self, document: &Document) -> bool {
        let cmp = |field: &str, value: &Value| {
            document
                .get(field)
                .and_then(|actual| compare_values(actual, value))
        };
        match self {
            Filter::All => true,
            Filter::Eq(field, value) => cmp(field, value) == Some(Ordering::Equal),
            Filter::Lt(field, value) => cmp(field, value) == Some(Ordering::Less),
            Filter::Gte(field, value) => matches!(
                cmp(field, value),
                Some(Ordering::Greater) | Some(Ordering::Equal)
            ),
            Filter::And(filters) => filters.iter().all(|f| f.matches(document)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Order results by a single field.
#[derive(Clone, Debug, PartialEq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
        }
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        // Documents lacking the field (or holding an incomparable value) sort last
        // in either direction.
        match (a.get(&self.field), b.get(&self.field)) {
            (Some(x), Some(y)) => match compare_values(x, y) {
                Some(ord) if self.direction == SortDirection::Descending => ord.reverse(),
                Some(ord) => ord,
                None => Ordering::Equal,
            },
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        }
    }
}

/// Optional sort, limit and projection for a `find_many`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FindOptions {
    pub sort: Option<Sort>,
    pub limit: Option<usize>,
    /// Field names to return. `None` returns whole documents.
    pub projection: Option<Vec<String>>,
}

impl FindOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn projection<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projection = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Sort, truncate and project already-filtered documents.
    pub fn apply(&self, mut documents: Vec<Document>) -> Vec<Document> {
        if let Some(sort) = &self.sort {
            documents.sort_by(|a, b| sort.compare(a, b));
        }
        if let Some(limit) = self.limit {
            documents.truncate(limit);
        }
        if let Some(fields) = &self.projection {
            for doc in documents.iter_mut() {
                doc.retain(|key, _| fields.iter().any(|f| f == key));
            }
        }
        documents
    }
}
