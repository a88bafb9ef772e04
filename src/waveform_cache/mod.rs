mod cache;
mod store;

pub use cache::{CacheError, WaveformCache};
pub use store::{load_store, read_store, write_store, CacheEntries, StoreError};
