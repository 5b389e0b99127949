use crate::types::{ItemId, ItemSnapshot};
use anyhow::Result;
use chrono::{DateTime, Utc};

pub mod dynamo;
pub use dynamo::DynamoStorage;

/// Result of a fenced summary write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// The stored `summary_generated_at` no longer matched the value read
    /// with the snapshot; nothing was written.
    FenceMismatch,
}

// ============================================================================
// Storage trait
// ============================================================================

#[allow(async_fn_in_trait)]
pub trait Storage: Send + Sync {
    /// Read the item record and all of its comments in one consistent read.
    /// Returns `None` when the item does not exist.
    async fn load_snapshot(&self, item_id: &ItemId) -> Result<Option<ItemSnapshot>>;

    /// Write `summary` and `generated_at` only if the stored
    /// `summary_generated_at` still equals `expected`.
    async fn commit_summary(
        &self,
        item_id: &ItemId,
        expected: Option<DateTime<Utc>>,
        summary: &str,
        generated_at: DateTime<Utc>,
    ) -> Result<CommitOutcome>;

    async fn list_item_ids(&self) -> Result<Vec<ItemId>>;
}

// ============================================================================
// Test utilities — in-memory Storage for in-crate tests
// ============================================================================
