//! Destination store adapter: conditional inserts into Redis.

pub mod error;
pub mod inserter;
pub mod retry;

pub use error::RemoteError;
pub use inserter::RedisInserter;
pub use retry::RetryPolicy;
