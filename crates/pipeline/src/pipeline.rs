//! The migration pipeline: one task pulls entries from the source in order and
//! hands each to a worker holding one of `parallelism` semaphore permits. A new
//! entry is only pulled once a permit is free, so the source is consumed no
//! faster than the destination accepts writes.
//!
//! Pulls run on the blocking pool; a store source reads through a memory map
//! and may fault pages in.

use std::sync::Arc;
use std::time::{Duration, Instant};

use cachelift_core::{Entry, EntrySource, MigrateError, RemoteInserter};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::options::PipelineOptions;
use crate::progress::{Completion, ProgressSampler, ProgressSink};

/// Result of a run in which every entry was transferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationSummary {
    /// Entries with an outcome: `inserted + already_present`.
    pub total_completed: u64,
    /// A write whose reply timed out may have been applied anyway; its retry
    /// then finds the key and counts it under `already_present`. The split can
    /// lean that way, the total and the destination contents cannot.
    pub inserted: u64,
    pub already_present: u64,
    pub elapsed: Duration,
}

pub struct MigrationPipeline<I> {
    inserter: Arc<I>,
    options: PipelineOptions,
}

impl<I> MigrationPipeline<I>
where
    I: RemoteInserter + 'static,
{
    pub fn new(inserter: Arc<I>, options: PipelineOptions) -> Result<Self, MigrateError> {
        options.validate()?;
        Ok(Self { inserter, options })
    }

    /// Transfer every entry of `source`, reporting progress to `sink`.
    ///
    /// The source is released exactly once before this returns, on success and
    /// on failure alike.
    pub async fn run<S, P>(&self, source: S, sink: P) -> Result<MigrationSummary, MigrateError>
    where
        S: EntrySource + 'static,
        P: ProgressSink + 'static,
    {
        let started = Instant::now();
        let total_estimate = source.total_estimate();
        let (completions, receiver) = mpsc::channel(self.options.parallelism);
        let sampler = ProgressSampler::new(self.options.update_interval, Some(total_estimate))
            .spawn(receiver, sink);

        info!(
            parallelism = self.options.parallelism,
            total_estimate,
            "starting transfer"
        );

        let mut source = Some(source);
        let dispatched = self.dispatch(&mut source, completions).await;
        match source.as_mut() {
            Some(source) => source.release(),
            None => error!("source lost while reading, it was not released"),
        }

        // Every sender is gone once dispatch returns, so the sampler finishes.
        let last = sampler
            .await
            .map_err(|e| MigrateError::Worker(format!("progress sampler: {e}")))?;

        let dispatched = dispatched?;
        if last.completed != dispatched {
            warn!(
                dispatched,
                completed = last.completed,
                "completion count differs from dispatched entries"
            );
        }

        let summary = MigrationSummary {
            total_completed: last.completed,
            inserted: last.inserted,
            already_present: last.already_present,
            elapsed: started.elapsed(),
        };
        info!(
            completed = summary.total_completed,
            inserted = summary.inserted,
            already_present = summary.already_present,
            elapsed_ms = summary.elapsed.as_millis() as u64,
            "transfer complete"
        );
        Ok(summary)
    }

    /// Pull, dispatch and drain. Returns the number of entries dispatched.
    ///
    /// Stops pulling at the first failure, waits for in-flight inserts to
    /// finish so their outcomes are counted, then reports that failure.
    ///
    /// `source` is only empty afterwards if a pull panicked.
    async fn dispatch<S: EntrySource + 'static>(
        &self,
        source: &mut Option<S>,
        completions: mpsc::Sender<Completion>,
    ) -> Result<u64, MigrateError> {
        let permits = Arc::new(Semaphore::new(self.options.parallelism));
        let mut workers: JoinSet<Result<(), MigrateError>> = JoinSet::new();
        let mut dispatched = 0u64;
        let mut failure: Option<MigrateError> = None;

        loop {
            let permit = match Arc::clone(&permits).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    failure = Some(MigrateError::Worker(e.to_string()));
                    break;
                }
            };

            // A failed worker has already returned its permit; notice it
            // before pulling anything else.
            while let Some(joined) = workers.try_join_next() {
                if let Err(e) = flatten(joined) {
                    failure = Some(e);
                    break;
                }
            }
            if failure.is_some() {
                break;
            }

            let Some(current) = source.take() else {
                failure = Some(MigrateError::Worker("source already lost".into()));
                break;
            };
            let (current, next) = pull(current).await;
            *source = current;
            let entry = match next {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    error!(dispatched, error = %e, "source failed");
                    failure = Some(e);
                    break;
                }
            };
            dispatched += 1;

            let inserter = Arc::clone(&self.inserter);
            let completions = completions.clone();
            workers.spawn(async move {
                let outcome = inserter.try_insert(&entry).await?;
                // Only fails if the sampler is gone, which the caller reports.
                let _ = completions.send(outcome.into()).await;
                drop(permit);
                Ok::<(), MigrateError>(())
            });
        }
        drop(completions);

        if failure.is_some() {
            debug!(in_flight = workers.len(), "draining in-flight inserts after failure");
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = flatten(joined) {
                if failure.is_none() {
                    failure = Some(e);
                } else {
                    warn!(error = %e, "additional failure while draining");
                }
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(dispatched),
        }
    }
}

fn flatten(joined: Result<Result<(), MigrateError>, JoinError>) -> Result<(), MigrateError> {
    joined.map_err(|e| MigrateError::Worker(e.to_string()))?
}

/// Read the next entry on the blocking pool, handing the source back.
async fn pull<S: EntrySource + 'static>(mut source: S) -> (Option<S>, Result<Option<Entry>, MigrateError>) {
    let read = tokio::task::spawn_blocking(move || {
        let next = source.next_entry();
        (source, next)
    })
    .await;
    match read {
        Ok((source, next)) => (Some(source), next),
        Err(e) => (None, Err(MigrateError::Worker(format!("source read panicked: {e}")))),
    }
}
