use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::store::CacheStore;
use crate::domain::Domain;

/// How long ago a domain's payload was written.
#[derive(Debug, Clone, Copy)]
pub struct CacheAge {
    pub written_at: DateTime<Utc>,
}

impl CacheAge {
    pub fn minutes(&self) -> i64 {
        (Utc::now() - self.written_at).num_minutes()
    }

    pub fn display(&self) -> String {
        let minutes = self.minutes();
        if minutes < 1 {
            // Also covers clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// Domain-aware access to the cache store.
///
/// Clone is cheap; all clones share the same store.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Digest to send with the next fetch.
    ///
    /// Only returned when both the digest and the payload exist: a digest
    /// without its payload would let the server answer "not modified" for
    /// content we no longer have.
    pub fn digest(&self, domain: &Domain) -> Option<String> {
        let payload_file = domain.payload_file();
        let digest_file = domain.digest_file();

        if !(self.store.exists(&payload_file) && self.store.exists(&digest_file)) {
            debug!(domain = %domain, "Cache and/or digest file missing, not sending digest");
            return None;
        }

        self.read_logged(&digest_file)
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
    }

    /// Cached payload of a domain, if any.
    pub fn payload(&self, domain: &Domain) -> Option<String> {
        let payload_file = domain.payload_file();
        if !self.store.exists(&payload_file) {
            return None;
        }
        self.read_logged(&payload_file)
    }

    /// Store a payload together with its digest.
    ///
    /// Without a digest the digest file is blanked, so the previous digest
    /// is never sent for content it does not describe. I/O failures are
    /// logged and otherwise ignored; a missing cache only costs an
    /// unconditional fetch next time.
    pub fn store(&self, domain: &Domain, payload: &str, digest: Option<&str>) {
        if let Err(e) = self.store.write(&domain.payload_file(), payload) {
            warn!(domain = %domain, error = %e, "Failed to write cache payload");
            return;
        }

        if let Err(e) = self.store.write(&domain.digest_file(), digest.unwrap_or_default()) {
            warn!(domain = %domain, error = %e, "Failed to write cache digest");
        }
        debug!(domain = %domain, has_digest = digest.is_some(), "Cache updated");
    }

    /// Forget the digest of a payload that can no longer be used, so the
    /// next fetch is unconditional and brings a fresh copy.
    pub fn invalidate_digest(&self, domain: &Domain) {
        if !self.store.exists(&domain.digest_file()) {
            return;
        }
        match self.store.write(&domain.digest_file(), "") {
            Ok(()) => info!(domain = %domain, "Cached digest invalidated"),
            Err(e) => warn!(domain = %domain, error = %e, "Failed to invalidate cache digest"),
        }
    }

    pub fn age(&self, domain: &Domain) -> Option<CacheAge> {
        self.store
            .modified(&domain.payload_file())
            .map(|written_at| CacheAge { written_at })
    }

    /// Age for the status bar, "never" if the domain was never cached.
    pub fn age_display(&self, domain: &Domain) -> String {
        self.age(domain)
            .map(|a| a.display())
            .unwrap_or_else(|| "never".to_string())
    }

    fn read_logged(&self, name: &str) -> Option<String> {
        match self.store.read(name) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(file = name, error = %e, "Failed to read cache file");
                None
            }
        }
    }
}
