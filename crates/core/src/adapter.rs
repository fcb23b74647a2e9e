//! Narrow contracts between the migration pipeline and the stores it moves
//! data between.

use async_trait::async_trait;

use crate::entry::{Entry, InsertOutcome};
use crate::error::MigrateError;

/// A lazy, finite, non-restartable sequence of entries.
///
/// Pulled by exactly one task; implementations need not be `Sync`.
pub trait EntrySource: Send {
    /// Best-effort entry count, used only for completion percentages.
    fn total_estimate(&self) -> u64;

    /// Next entry, `Ok(None)` at end of sequence.
    fn next_entry(&mut self) -> Result<Option<Entry>, MigrateError>;

    /// Release the underlying resource. Must be safe to call more than once.
    fn release(&mut self);
}

/// Asynchronous conditional insert into the destination store.
///
/// Called concurrently by up to `parallelism` workers. Any retry or backoff
/// happens inside the implementation; its result is final.
#[async_trait]
pub trait RemoteInserter: Send + Sync {
    /// Insert `entry` only if its key is absent.
    async fn try_insert(&self, entry: &Entry) -> Result<InsertOutcome, MigrateError>;
}

#[async_trait]
impl<T: RemoteInserter + ?Sized> RemoteInserter for std::sync::Arc<T> {
    async fn try_insert(&self, entry: &Entry) -> Result<InsertOutcome, MigrateError> {
        (**self).try_insert(entry).await
    }
}
