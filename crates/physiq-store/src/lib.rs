//! Task storage for physiq.
//!
//! The [`TaskStore`] trait is the only thing the submission service and the
//! worker share. [`SqliteTaskStore`] is the durable implementation used in
//! production; [`MemoryTaskStore`] is a fake for tests and local runs.

mod memory;
mod sqlite;
mod store;

pub use memory::MemoryTaskStore;
pub use sqlite::SqliteTaskStore;
pub use store::{StatusCounts, StoreError, TaskStore};
