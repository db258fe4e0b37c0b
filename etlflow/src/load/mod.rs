//! Load stage: the remote store and the batch loader.

mod batch;
mod loader;
mod store;

pub use batch::batch_ranges;
pub use loader::{BatchLoader, FailedBatch, LoadResult};
#[cfg(feature = "http")]
pub use store::HttpTableStore;
pub use store::RemoteStore;
