pub mod adapter;
pub mod config;
pub mod entry;
pub mod error;

pub use adapter::{EntrySource, RemoteInserter};
pub use config::RemoteConfig;
pub use entry::*;
pub use error::*;
