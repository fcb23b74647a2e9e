use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cachelift_core::config::load_dotenv;
use cachelift_core::RemoteConfig;
use cachelift_pipeline::{Completion, MigrationPipeline, MigrationSummary, ProgressSampler, ProgressSnapshot};
use cachelift_remote::RedisInserter;
use cachelift_store::{Store, StoreError};
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::CliArgs;
use crate::console::Console;

const INDEX_PROGRESS_BUFFER: usize = 1024;

/// What a finished run did.
#[derive(Debug)]
pub struct RunReport {
    /// Live entries in the store when it was opened.
    pub entries: u64,
    pub index_rebuilt: bool,
    /// `None` in rebuild-only mode.
    pub transfer: Option<MigrationSummary>,
}

pub async fn execute(args: &CliArgs, console: Console) -> Result<RunReport> {
    console.banner(args)?;

    if args.rebuild_index_only {
        return rebuild_only(args, console).await;
    }

    load_dotenv(args.env_file.as_deref())?;
    let config = RemoteConfig::from_env().context("invalid remote store settings")?;
    config.log_summary();
    migrate(args, &config, console).await
}

/// Open the store, rebuilding its index if needed, without touching the remote store.
pub async fn rebuild_only(args: &CliArgs, console: Console) -> Result<RunReport> {
    let (mut store, opened_in) = open_store(args, console).await?;
    let entries = store.entry_count();

    if args.force_rebuild {
        console.section("Rebuilding the index")?;
        let started = Instant::now();
        let (rebuilt, _) = with_index_progress(args.update_interval(), console, move |on_indexed| {
            store.rebuild_index(on_indexed)?;
            Ok(store)
        })
        .await?;
        store = rebuilt;
        console.info(&format!(
            "Index rebuilt in {} ms, {} entries",
            started.elapsed().as_millis(),
            store.entry_count()
        ))?;
    }

    info!(
        cache = store.layout().cache(),
        entries,
        open_ms = opened_in.as_millis() as u64,
        "rebuild-only run finished"
    );
    Ok(RunReport {
        entries,
        index_rebuilt: store.index_rebuilt(),
        transfer: None,
    })
}

/// Connect to the remote store, then open the local store and transfer it.
///
/// The store is only opened once the remote store answered, so an unreachable
/// destination costs no index loading and reads no entries.
pub async fn migrate(args: &CliArgs, config: &RemoteConfig, console: Console) -> Result<RunReport> {
    let options = args.pipeline_options();
    options.validate()?;

    console.connecting(config)?;
    let inserter = RedisInserter::connect(config)
        .await
        .with_context(|| format!("cannot connect to {}", config.redacted_url()))?;
    let pipeline = MigrationPipeline::new(Arc::new(inserter), options)?;

    let (store, _) = open_store(args, console).await?;
    let entries = store.entry_count();
    let index_rebuilt = store.index_rebuilt();

    console.section(&format!(
        "Starting remote upload using {} parallel inserts, progress every {} seconds",
        args.parallel_inserts, args.update_frequency
    ))?;
    let summary = pipeline
        .run(store.into_source(), move |snapshot: &ProgressSnapshot| {
            console.transfer_progress(snapshot)
        })
        .await
        .context("transfer aborted")?;
    console.transfer_complete(&summary)?;

    Ok(RunReport {
        entries,
        index_rebuilt,
        transfer: Some(summary),
    })
}

async fn open_store(args: &CliArgs, console: Console) -> Result<(Store, Duration)> {
    console.section(
        "Opening the local store, this may take some time if the index was not shut down cleanly",
    )?;
    let layout = args.layout();
    let started = Instant::now();

    let (store, indexed) = with_index_progress(args.update_interval(), console, move |on_indexed| {
        Store::open_with_progress(&layout, on_indexed)
    })
    .await
    .with_context(|| format!("cannot open cache {} in {}", args.cache, args.location.display()))?;

    let elapsed = started.elapsed();
    console.store_opened(elapsed, store.entry_count())?;
    info!(
        cache = store.layout().cache(),
        entries = store.entry_count(),
        rebuilt = store.index_rebuilt(),
        scanned = indexed,
        elapsed_ms = elapsed.as_millis() as u64,
        "store opened"
    );
    Ok((store, elapsed))
}

/// Run blocking index work with a sampler printing how many records it scanned.
///
/// Resolves to the work's result and the number of records scanned.
async fn with_index_progress<T, F>(interval: Duration, console: Console, work: F) -> Result<(T, u64)>
where
    T: Send + 'static,
    F: FnOnce(&mut dyn FnMut()) -> Result<T, StoreError> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(INDEX_PROGRESS_BUFFER);
    let sampler = ProgressSampler::new(interval, None).spawn(rx, move |snapshot: &ProgressSnapshot| {
        console.index_progress(snapshot)
    });

    let outcome = tokio::task::spawn_blocking(move || {
        let mut on_indexed = || {
            // The sampler only goes away once this sender is dropped.
            let _ = tx.blocking_send(Completion::Indexed);
        };
        work(&mut on_indexed)
    })
    .await
    .context("index task failed")?;

    let last = sampler.await.context("index progress task failed")?;
    Ok((outcome?, last.completed))
}
