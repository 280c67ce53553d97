//! LedgerClient trait for the paginated ledger index.
//!
//! The GraphQL transport is an external collaborator; this module only fixes
//! the shape of a query and of a returned page.
//!
//! Implementations:
//! - `InMemoryLedger` - For testing (tag filtering, newest-first sort, cursor
//!   pagination, scripted failures)

use crate::ids::TransactionId;
use crate::tags::GqlTag;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Query rejected: {0}")]
    Query(String),

    #[error("Transaction not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Default number of records requested per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Match records carrying tag `name` with any of `values`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    pub name: String,
    pub values: Vec<String>,
}

impl TagFilter {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn matches(&self, tags: &[GqlTag]) -> bool {
        tags.iter()
            .any(|tag| tag.name == self.name && self.values.iter().any(|v| *v == tag.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerQuery {
    pub tags: Vec<TagFilter>,
    /// Restrict to records signed by this wallet address
    pub owner: Option<String>,
    /// Only records mined at or above this height
    pub min_height: Option<u64>,
    /// Resume after this edge cursor
    pub cursor: Option<String>,
    /// Page size
    pub first: usize,
}

impl LedgerQuery {
    pub fn new(tags: Vec<TagFilter>) -> Self {
        Self {
            tags,
            owner: None,
            min_height: None,
            cursor: None,
            first: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn min_height(mut self, height: Option<u64>) -> Self {
        self.min_height = height;
        self
    }

    pub fn cursor(mut self, cursor: Option<String>) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn first(mut self, first: usize) -> Self {
        self.first = first;
        self
    }

    /// Look up a tag filter by name.
    pub fn tag_values(&self, name: &str) -> Option<&[String]> {
        self.tags
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.values.as_slice())
    }
}

/// Block a record was mined in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub height: u64,
    /// Block timestamp in seconds
    pub timestamp: u64,
}

/// One ledger record as returned by the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GqlNode {
    pub id: TransactionId,
    pub tags: Vec<GqlTag>,
    /// `None` while the record is pending
    pub block: Option<BlockInfo>,
    /// Wallet address that signed the record
    pub owner: String,
}

impl GqlNode {
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.name == name)
            .map(|t| t.value.as_str())
    }

    pub fn block_height(&self) -> Option<u64> {
        self.block.map(|b| b.height)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GqlEdge {
    pub cursor: String,
    pub node: GqlNode,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LedgerPage {
    pub edges: Vec<GqlEdge>,
    pub has_next_page: bool,
}

impl LedgerPage {
    /// Cursor of the last edge, used to request the next page.
    pub fn last_cursor(&self) -> Option<&str> {
        self.edges.last().map(|e| e.cursor.as_str())
    }
}

/// Read access to the ledger index and transaction bodies.
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
pub trait LedgerClient: Send + Sync {
    /// Fetch one page of records matching `query`, newest block first
    async fn query(&self, query: &LedgerQuery) -> Result<LedgerPage>;

    /// Fetch the body (metadata JSON or sealed bytes) of a transaction
    async fn fetch_body(&self, tx_id: &TransactionId) -> Result<Vec<u8>>;
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl<T: LedgerClient + ?Sized> LedgerClient for std::sync::Arc<T> {
    async fn query(&self, query: &LedgerQuery) -> Result<LedgerPage> {
        (**self).query(query).await
    }

    async fn fetch_body(&self, tx_id: &TransactionId) -> Result<Vec<u8>> {
        (**self).fetch_body(tx_id).await
    }
}

/// In-memory ledger for testing.
///
/// Serves `query` by filtering on tags, owner and minimum height, sorting by
/// height (pending records first when descending), and paginating with the
/// record's index as cursor.
#[derive(Default)]
pub struct InMemoryLedger {
    records: RwLock<Vec<GqlNode>>,
    bodies: RwLock<HashMap<TransactionId, Vec<u8>>>,
    /// Every query served, in order
    queries: RwLock<Vec<LedgerQuery>>,
    /// Fail the Nth query (1-based) with a network error
    fail_on_query: RwLock<Option<usize>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record and its body.
    pub fn insert(&self, node: GqlNode, body: Vec<u8>) {
        self.bodies
            .write()
            .unwrap()
            .insert(node.id.clone(), body);
        self.records.write().unwrap().push(node);
    }

    /// Make the `n`th query (1-based, counted from now on) fail.
    pub fn fail_on_query(&self, n: usize) {
        let served = self.queries.read().unwrap().len();
        *self.fail_on_query.write().unwrap() = Some(served + n);
    }

    /// Queries served so far.
    pub fn queries(&self) -> Vec<LedgerQuery> {
        self.queries.read().unwrap().clone()
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
impl LedgerClient for InMemoryLedger {
    async fn query(&self, query: &LedgerQuery) -> Result<LedgerPage> {
        let query_number = {
            let mut queries = self.queries.write().unwrap();
            queries.push(query.clone());
            queries.len()
        };
        if *self.fail_on_query.read().unwrap() == Some(query_number) {
            return Err(LedgerError::Network(format!("connection reset on query {}", query_number)));
        }

        let records = self.records.read().unwrap();
        let mut matching: Vec<&GqlNode> = records
            .iter()
            .filter(|node| query.tags.iter().all(|f| f.matches(&node.tags)))
            .filter(|node| query.owner.as_ref().is_none_or(|o| *o == node.owner))
            .filter(|node| match (query.min_height, node.block_height()) {
                (None, _) => true,
                (Some(min), Some(height)) => height >= min,
                (Some(_), None) => false,
            })
            .collect();

        // Newest first, pending on top; stable sort keeps insertion order within one height
        matching.sort_by_key(|node| std::cmp::Reverse(node.block_height().unwrap_or(u64::MAX)));

        let start = match &query.cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| LedgerError::Query(format!("bad cursor: {}", cursor)))?
                + 1,
            None => 0,
        };
        let end = (start + query.first.max(1)).min(matching.len());

        let edges = matching
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .enumerate()
            .map(|(offset, node)| GqlEdge {
                cursor: (start + offset).to_string(),
                node: (*node).clone(),
            })
            .collect();

        Ok(LedgerPage {
            edges,
            has_next_page: end < matching.len(),
        })
    }

    async fn fetch_body(&self, tx_id: &TransactionId) -> Result<Vec<u8>> {
        self.bodies
            .read()
            .unwrap()
            .get(tx_id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(tx_id.to_string()))
    }
}
