//! Local on-disk key/value store: an append-only data log plus a key index
//! that can be rebuilt offline from the log.

pub mod error;
pub mod index;
pub mod layout;
pub mod reader;
pub mod record;
pub mod store;
pub mod writer;

pub use error::StoreError;
pub use index::{IndexEntry, KeyIndex};
pub use layout::StoreLayout;
pub use store::{Store, StoreSource};
pub use writer::StoreWriter;
