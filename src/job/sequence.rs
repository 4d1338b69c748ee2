//! # Work Sequences
//!
//! A job exposes its work sequence one batch at a time. Materialized sources
//! return everything in one batch with no next cursor; paginated sources
//! return one upstream page plus the server-issued cursor for the next one.

use super::checkpoint::SourceContext;
use crate::error::IngestResult;
use async_trait::async_trait;

/// One fetch worth of work items
#[derive(Debug, Clone, PartialEq)]
pub struct WorkBatch<T> {
    pub items: Vec<T>,
    /// Cursor for the following batch; `None` signals exhaustion
    pub next_cursor: Option<String>,
}

impl<T> WorkBatch<T> {
    /// The whole, locally materialized sequence
    pub fn materialized(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    /// One page of a remote paginated stream
    pub fn page(items: Vec<T>, next_cursor: Option<String>) -> Self {
        Self { items, next_cursor }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// What happened to a single work item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item's durable external write happened
    Processed,
    /// Nothing to do for this item
    Skipped(String),
}

/// A unit of resumable, bounded-time work
///
/// Implementations rebuild their sequence from the `SourceContext` on every
/// invocation; nothing is cached between invocations.
#[async_trait]
pub trait ResumableJob: Send + Sync {
    type Item: Send + Sync;

    /// Job identifier, also used as the continuation target
    fn name(&self) -> &str;

    /// Fetch the batch addressed by `cursor` (`None` = first batch)
    async fn fetch_batch(
        &self,
        source: &SourceContext,
        cursor: Option<&str>,
    ) -> IngestResult<WorkBatch<Self::Item>>;

    /// Perform the item's side effect. Errors are logged by the runner and
    /// do not stop the loop.
    async fn process_item(&self, source: &SourceContext, item: &Self::Item) -> IngestResult<ItemOutcome>;

    /// Short label for logs
    fn describe_item(&self, item: &Self::Item) -> String {
        let _ = item;
        "item".to_string()
    }

    /// Cursor addressing a batch that begins at `item`
    ///
    /// Jobs whose processing removes items from their own source (deletes)
    /// return one, so a checkpoint taken before `item` does not depend on
    /// offsets that shift once earlier items are gone.
    fn resume_cursor(&self, item: &Self::Item) -> Option<String> {
        let _ = item;
        None
    }

    /// Job to start once when this job's chain starts fresh
    fn downstream_job(&self) -> Option<&str> {
        None
    }
}
