//! Which slice of a table a view-model mirrors.

use std::fmt;

use barkeep_api::{ID_COLUMN, Query};
use barkeep_core::Entity;

/// A named query over one entity's table.
///
/// The query is what the backend is asked for. The predicate repeats the query's
/// filters on the client so change events can be checked against the view: a row
/// that stops matching leaves the collection, one that starts matching joins it.
pub struct View<E> {
    name: String,
    query: Query,
    predicate: Option<fn(&E) -> bool>,
}

impl<E: Entity> View<E> {
    /// Unfiltered view with the given query.
    pub fn new(name: &str, query: Query) -> Self {
        Self {
            name: name.to_string(),
            query,
            predicate: None,
        }
    }

    /// Every row, oldest first.
    pub fn all(name: &str) -> Self {
        Self::new(name, Query::new().order_by(ID_COLUMN, true))
    }

    pub fn filtered(name: &str, query: Query, predicate: fn(&E) -> bool) -> Self {
        Self {
            name: name.to_string(),
            query,
            predicate: Some(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn is_filtered(&self) -> bool {
        self.predicate.is_some()
    }

    pub fn matches(&self, row: &E) -> bool {
        self.predicate.is_none_or(|predicate| predicate(row))
    }

    pub fn limit(&self) -> Option<usize> {
        self.query.limit
    }

    /// Index at which `row` belongs in `rows`, which are kept in id order.
    pub(crate) fn insertion_index(&self, rows: &[E], row: &E) -> usize {
        let id = row.id();
        if self.query.is_descending() {
            rows.iter().position(|r| r.id() < id).unwrap_or(rows.len())
        } else {
            rows.iter().position(|r| r.id() > id).unwrap_or(rows.len())
        }
    }
}

impl<E> Clone for View<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            query: self.query.clone(),
            predicate: self.predicate,
        }
    }
}

impl<E> fmt::Debug for View<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View")
            .field("name", &self.name)
            .field("query", &self.query)
            .field("filtered", &self.predicate.is_some())
            .finish()
    }
}
