//! Query objects.
//!
//! A [`SearchQuery`] is an immutable description of a search bound to one
//! connection. Every refinement returns a new query; nothing runs until
//! `count`, `results` or `first` is called.
//!
//! ```
//! use sheaf::{ConnectionConfig, Connections, IndexDefinition, SearchQuery, SheafConfig};
//!
//! let connections = Connections::new(
//!     SheafConfig::new("default")
//!         .with_connection("default", ConnectionConfig::memory())
//!         .with_index(IndexDefinition::new("foo").text(["body"])),
//! )
//! .unwrap();
//!
//! let query = SearchQuery::new(connections).filter("foo").models(["foo"]).limit(10);
//! assert_eq!(query.connection(), "default");
//! assert_eq!(query.count().unwrap(), 0);
//! ```

pub mod parser;

pub use parser::{parse_query, Query, QueryNode};

use crate::backend::{OrderBy, SearchHit, SearchOptions, SearchResults};
use crate::connections::Connections;
use crate::error::Result;
use crate::record::RecordType;
use std::fmt;
use std::sync::Arc;

#[derive(Clone)]
pub struct SearchQuery {
    connections: Arc<Connections>,
    connection: String,
    clauses: Vec<String>,
    options: SearchOptions,
}

impl fmt::Debug for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchQuery")
            .field("connection", &self.connection)
            .field("query", &self.query_string())
            .field("options", &self.options)
            .finish()
    }
}

impl SearchQuery {
    /// Query against the router's read connection
    pub fn new(connections: Arc<Connections>) -> Self {
        let connection = connections.router().for_read().to_string();
        Self {
            connections,
            connection,
            clauses: Vec::new(),
            options: SearchOptions::default(),
        }
    }

    /// Name of the connection this query runs against
    pub fn connection(&self) -> &str {
        &self.connection
    }

    /// Same query on another connection
    pub fn using(&self, name: &str) -> Result<Self> {
        let resolved = self.connections.resolve(Some(name))?;
        let mut query = self.clone();
        query.connection = resolved.to_string();
        Ok(query)
    }

    /// Restrict results to the given record types (added to any already set)
    pub fn models<I, T>(&self, types: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<RecordType>,
    {
        let mut query = self.clone();
        for record_type in types.into_iter().map(Into::into) {
            if !query.options.models.contains(&record_type) {
                query.options.models.push(record_type);
            }
        }
        query
    }

    /// Add a query-string clause; clauses are combined with AND
    pub fn filter(&self, query_string: &str) -> Self {
        let mut query = self.clone();
        if !query_string.trim().is_empty() {
            query.clauses.push(query_string.to_string());
        }
        query
    }

    /// Append a sort key (`field` or `-field`)
    pub fn order_by(&self, key: &str) -> Self {
        let mut query = self.clone();
        query.options.order_by.push(OrderBy::parse(key));
        query
    }

    pub fn limit(&self, limit: usize) -> Self {
        let mut query = self.clone();
        query.options.limit = Some(limit);
        query
    }

    pub fn offset(&self, offset: usize) -> Self {
        let mut query = self.clone();
        query.options.offset = offset;
        query
    }

    /// The query string sent to the backend
    pub fn query_string(&self) -> String {
        match self.clauses.as_slice() {
            [] => String::new(),
            [only] => only.clone(),
            clauses => clauses
                .iter()
                .map(|c| format!("({})", c))
                .collect::<Vec<_>>()
                .join(" "),
        }
    }

    /// Number of matching documents, ignoring limit and offset
    pub fn count(&self) -> Result<usize> {
        let options = SearchOptions {
            offset: 0,
            limit: Some(0),
            ..self.options.clone()
        };
        Ok(self.run(&options)?.hits)
    }

    /// Alias of [`count`](Self::count)
    pub fn get_count(&self) -> Result<usize> {
        self.count()
    }

    pub fn execute(&self) -> Result<SearchResults> {
        self.run(&self.options)
    }

    pub fn results(&self) -> Result<Vec<SearchHit>> {
        Ok(self.execute()?.results)
    }

    pub fn first(&self) -> Result<Option<SearchHit>> {
        Ok(self.limit(1).execute()?.results.into_iter().next())
    }

    fn run(&self, options: &SearchOptions) -> Result<SearchResults> {
        let backend = self.connections.get_backend(&self.connection)?;
        let query_string = self.query_string();
        let results = backend.search(&query_string, options)?;
        tracing::debug!(
            connection = %self.connection,
            query = %query_string,
            hits = results.hits,
            "search"
        );
        Ok(results)
    }
}
