use std::path::PathBuf;
use std::time::Duration;

use cachelift_pipeline::PipelineOptions;
use cachelift_store::StoreLayout;
use clap::Parser;

/// Copy every entry of a local cache store into a remote store.
///
/// Entries already present at the destination are left untouched, so an
/// interrupted run can simply be started again.
#[derive(Parser, Debug)]
#[command(name = "cachelift", version, about = "Restore a local cache store into a remote store")]
pub struct CliArgs {
    /// Name of the cache to load
    #[arg(value_name = "CACHE")]
    pub cache: String,

    /// Directory holding the cache directories
    #[arg(value_name = "DIR")]
    pub location: PathBuf,

    /// Data directory name inside the cache directory (default: data)
    #[arg(short = 'd', long)]
    pub data_dir_name: Option<String>,

    /// Index directory name inside the cache directory (default: index)
    #[arg(short = 'i', long)]
    pub index_dir_name: Option<String>,

    /// Seconds between progress lines for index rebuilds and inserts
    #[arg(short = 'f', long, default_value = "5", value_parser = clap::value_parser!(u64).range(1..))]
    pub update_frequency: u64,

    /// Only rebuild the index if required; nothing is sent to the remote store
    #[arg(short = 'r', long)]
    pub rebuild_index_only: bool,

    /// Rebuild the index even if it was shut down cleanly
    #[arg(long, requires = "rebuild_index_only")]
    pub force_rebuild: bool,

    /// How many inserts may be in flight at once. Ignored with -r.
    #[arg(short = 'p', long, default_value = "16", value_parser = clap::value_parser!(u64).range(1..))]
    pub parallel_inserts: u64,

    /// Dotenv file with the remote store settings (default: ./.env if present)
    #[arg(long, env = "CACHELIFT_ENV_FILE")]
    pub env_file: Option<PathBuf>,
}

impl CliArgs {
    pub fn layout(&self) -> StoreLayout {
        StoreLayout::new(&self.location, &self.cache)
            .with_data_dir_name(self.data_dir_name.clone())
            .with_index_dir_name(self.index_dir_name.clone())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_frequency)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions::new(self.parallel_inserts as usize, self.update_interval())
    }
}
