//! Refresh every cached domain in one go.
//!
//! Used by the `--sync` command line mode. Each domain goes through the same
//! conditional fetch and parse-before-write path as a screen load, all
//! domains concurrently.

use futures::future::join_all;
use tracing::{info, warn};

use crate::api::ConditionalFetch;
use crate::cache::CacheManager;
use crate::domain::Domain;
use crate::models::{Calendar, Schedule};
use crate::screen::{resolve, Resolution, ScreenError};

/// Outcome of refreshing one domain.
#[derive(Debug)]
pub struct SyncReport {
    pub domain: Domain,
    pub result: Result<Resolution, ScreenError>,
}

impl SyncReport {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }

    pub fn summary(&self) -> String {
        match &self.result {
            Ok(Resolution::Fetched) => format!("{}: updated", self.domain),
            Ok(Resolution::Cached) => format!("{}: unchanged", self.domain),
            Err(e) => format!("{}: {}", self.domain, e),
        }
    }
}

/// Domains to keep fresh for a grade selection.
pub fn domains_for(grade: Option<&str>) -> Vec<Domain> {
    let mut domains = vec![Domain::Schedule];
    domains.extend(Domain::dashboard_for(grade));
    domains.push(Domain::Calendar);
    domains
}

async fn refresh_domain(fetcher: &dyn ConditionalFetch, cache: &CacheManager, domain: Domain) -> SyncReport {
    let digest = cache.digest(&domain);
    let outcome = fetcher.fetch(&domain.endpoint(), digest.as_deref()).await;

    let result = if domain.is_schedule() {
        resolve::<Schedule>(cache, &domain, outcome).map(|(_, resolution)| resolution)
    } else {
        resolve::<Calendar>(cache, &domain, outcome).map(|(_, resolution)| resolution)
    };

    match &result {
        Ok(resolution) => info!(domain = %domain, ?resolution, "Domain refreshed"),
        Err(e) => warn!(domain = %domain, error = %e, "Domain refresh failed"),
    }
    SyncReport { domain, result }
}

/// Refresh `domains` concurrently. Reports come back in input order.
pub async fn refresh_domains(
    fetcher: &dyn ConditionalFetch,
    cache: &CacheManager,
    domains: Vec<Domain>,
) -> Vec<SyncReport> {
    let futures = domains
        .into_iter()
        .map(|domain| refresh_domain(fetcher, cache, domain));
    join_all(futures).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiClient;
    use crate::cache::FileCache;
    use std::sync::Arc;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_domains_for_grade() {
        assert_eq!(domains_for(None), vec![Domain::Schedule, Domain::Calendar]);
        assert_eq!(
            domains_for(Some("Q1")),
            vec![Domain::Schedule, Domain::Dashboard("Q1".into()), Domain::Calendar]
        );
    }

    #[tokio::test]
    async fn test_refresh_domains() {
        let server = MockServer::start().await;
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheManager::new(Arc::new(FileCache::new(dir.path().to_path_buf()).unwrap()));
        cache.store(&Domain::Calendar, r#"{"_digest":"c1","monthItems":[]}"#, Some("c1"));

        Mock::given(method("GET"))
            .and(path("/vertretungsplan"))
            .respond_with(
                ResponseTemplate::new(200).set_body_string(r#"{"_digest":"s1","lastUpdate":"x","dates":[]}"#),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/calendar"))
            .and(header("if-none-match", "c1"))
            .respond_with(ResponseTemplate::new(304))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/vertretungsplan/5A"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let client = ApiClient::new(server.uri()).unwrap();
        let reports = refresh_domains(&client, &cache, domains_for(Some("5A"))).await;

        assert_eq!(reports.len(), 3);
        assert!(matches!(reports[0].result, Ok(Resolution::Fetched)));
        assert!(matches!(reports[1].result, Err(ScreenError::Status(503))));
        assert!(matches!(reports[2].result, Ok(Resolution::Cached)));
        assert_eq!(reports[2].summary(), "calendar: unchanged");

        assert_eq!(cache.digest(&Domain::Schedule).as_deref(), Some("s1"));
        assert_eq!(cache.payload(&Domain::Dashboard("5A".into())), None);
    }
}
