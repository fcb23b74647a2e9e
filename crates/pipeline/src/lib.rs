//! Bounded-concurrency transfer of entries from a local source to a remote
//! destination, with fixed-cadence progress reporting.

pub mod options;
pub mod pipeline;
pub mod progress;

pub use options::PipelineOptions;
pub use pipeline::{MigrationPipeline, MigrationSummary};
pub use progress::{Completion, ProgressSampler, ProgressSink, ProgressSnapshot};
