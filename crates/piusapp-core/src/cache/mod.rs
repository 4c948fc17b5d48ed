//! Local caching module for offline data access.
//!
//! Every data domain (full schedule, per-grade dashboard, calendar) is stored
//! as two artifacts: a digest file (`<domain>.md5`) and the raw JSON payload
//! (`<domain>.json`). The digest is sent with the next fetch so the server
//! can answer "not modified" instead of resending the body.
//!
//! - `CacheStore`: plain key/value persistence, implemented by `FileCache`
//! - `CacheManager`: domain-aware access to digest/payload pairs

pub mod manager;
pub mod store;

pub use manager::{CacheAge, CacheManager};
pub use store::{CacheStore, FileCache};
