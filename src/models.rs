//! Data models for Redash API responses.

use serde::Deserialize;

/// A saved Redash query.
///
/// Redash returns many more fields (schedule, user, tags, ...); only the
/// ones needed to write the `.sql` file are kept.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QueryRecord {
    pub id: i64,
    pub name: String,
    pub query: String,
}

impl QueryRecord {
    /// File name this query is exported to: `{id}_{name}.sql`.
    ///
    /// The name is used verbatim, so a `/` in it lands the file in a
    /// subdirectory of the output directory.
    pub fn file_name(&self) -> String {
        format!("{}_{}.sql", self.id, self.name)
    }
}

/// One page of `GET /api/queries`.
#[derive(Debug, Clone, Deserialize)]
pub struct PageResponse {
    pub count: u64,
    pub page_size: u64,
    pub results: Vec<QueryRecord>,
}

impl PageResponse {
    /// Whether page `page` (1-indexed) is the last one to request.
    ///
    /// Stops once `page * page_size + 1 > count`. With `count == 0` the
    /// first page is already the last.
    pub fn is_last(&self, page: u64) -> bool {
        page.saturating_mul(self.page_size).saturating_add(1) > self.count
    }
}
