use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::ScreenError;
use crate::api::{ApiError, ConditionalFetch, FetchResponse, FetchStatus};
use crate::cache::CacheManager;
use crate::domain::Domain;
use crate::models::Document;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScreenState {
    Idle,
    /// `refreshing` loads show an inline spinner instead of a loading screen
    Loading { refreshing: bool },
    Displaying,
    /// Error message waiting to be dismissed
    Failed(String),
}

/// Everything a fetch task needs, handed out by `begin_load`.
#[derive(Debug, Clone)]
pub struct LoadTicket {
    pub generation: u64,
    pub domain: Domain,
    pub digest: Option<String>,
    pub cancel: CancellationToken,
}

/// Result of a fetch task, sent back to the owner of the controller.
#[derive(Debug)]
pub struct LoadCompletion {
    pub domain: Domain,
    pub generation: u64,
    pub outcome: Result<FetchResponse, ApiError>,
}

/// Where a displayed document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// 200 with a new payload, now cached
    Fetched,
    /// 304, served from the cache
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Displayed(Resolution),
    /// The completion belonged to a cancelled or superseded load
    Discarded,
}

/// Turn a fetch outcome into a document.
///
/// A 200 payload is cached only after it parsed, together with its embedded
/// digest. A 304 is answered from the cache; if that copy no longer parses
/// its digest is dropped so the next fetch replaces it.
pub fn resolve<D: Document>(
    cache: &CacheManager,
    domain: &Domain,
    outcome: Result<FetchResponse, ApiError>,
) -> Result<(D, Resolution), ScreenError> {
    let response = outcome?;

    match response.status() {
        FetchStatus::Changed => {
            let payload = response.body.ok_or(ScreenError::EmptyBody)?;
            let document = D::parse(&payload)?;
            cache.store(domain, &payload, document.digest());
            Ok((document, Resolution::Fetched))
        }
        FetchStatus::NotModified => {
            let payload = cache.payload(domain).ok_or(ScreenError::MissingCache)?;
            match D::parse(&payload) {
                Ok(document) => Ok((document, Resolution::Cached)),
                Err(e) => {
                    cache.invalidate_digest(domain);
                    Err(e.into())
                }
            }
        }
        FetchStatus::Failed(status) => Err(ScreenError::Status(status)),
    }
}

/// Load state and current document of one screen.
pub struct ScreenController<D: Document> {
    domain: Domain,
    cache: CacheManager,
    state: ScreenState,
    document: Option<D>,
    generation: u64,
    cancel: CancellationToken,
}

impl<D: Document> ScreenController<D> {
    pub fn new(domain: Domain, cache: CacheManager) -> Self {
        Self {
            domain,
            cache,
            state: ScreenState::Idle,
            document: None,
            generation: 0,
            cancel: CancellationToken::new(),
        }
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn state(&self) -> &ScreenState {
        &self.state
    }

    pub fn document(&self) -> Option<&D> {
        self.document.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, ScreenState::Loading { .. })
    }

    /// Show the cached document, if any, while the first fetch is running.
    pub fn prime_from_cache(&mut self) -> bool {
        if self.document.is_some() {
            return true;
        }
        let Some(payload) = self.cache.payload(&self.domain) else {
            return false;
        };
        match D::parse(&payload) {
            Ok(document) => {
                self.document = Some(document);
                true
            }
            Err(e) => {
                debug!(domain = %self.domain, error = %e, "Cached payload unreadable");
                self.cache.invalidate_digest(&self.domain);
                false
            }
        }
    }

    /// Enter `Loading` and hand out a ticket for the fetch.
    ///
    /// Returns None while another load is in flight.
    pub fn begin_load(&mut self, refreshing: bool) -> Option<LoadTicket> {
        if self.is_loading() {
            debug!(domain = %self.domain, "Load already in progress, ignoring");
            return None;
        }

        self.generation += 1;
        self.cancel = CancellationToken::new();
        self.state = ScreenState::Loading { refreshing };

        let digest = self.cache.digest(&self.domain);
        debug!(
            domain = %self.domain,
            generation = self.generation,
            has_digest = digest.is_some(),
            "Load started"
        );

        Some(LoadTicket {
            generation: self.generation,
            domain: self.domain.clone(),
            digest,
            cancel: self.cancel.clone(),
        })
    }

    /// Begin a load and run the fetch on a background task.
    /// Returns false if a load was already in flight.
    pub fn spawn_load(
        &mut self,
        fetcher: Arc<dyn ConditionalFetch>,
        refreshing: bool,
        tx: mpsc::Sender<LoadCompletion>,
    ) -> bool {
        let Some(ticket) = self.begin_load(refreshing) else {
            return false;
        };
        tokio::spawn(run_fetch(fetcher, ticket, tx));
        true
    }

    /// Apply a finished fetch.
    ///
    /// On failure the previous document stays in place and the state holds
    /// the dialog message.
    pub fn apply(&mut self, completion: LoadCompletion) -> Result<Applied, ScreenError> {
        if completion.generation != self.generation
            || completion.domain != self.domain
            || self.cancel.is_cancelled()
            || !self.is_loading()
        {
            debug!(
                domain = %completion.domain,
                generation = completion.generation,
                "Discarding stale load result"
            );
            return Ok(Applied::Discarded);
        }

        match resolve::<D>(&self.cache, &self.domain, completion.outcome) {
            Ok((document, resolution)) => {
                info!(domain = %self.domain, ?resolution, "{} loaded", D::KIND);
                self.document = Some(document);
                self.state = ScreenState::Displaying;
                Ok(Applied::Displayed(resolution))
            }
            Err(e) => {
                error!(domain = %self.domain, error = %e, "Failed to load {}", D::KIND);
                self.state = ScreenState::Failed(e.user_message());
                Err(e)
            }
        }
    }

    /// The screen went away: cancel the fetch and forget the pending load.
    pub fn teardown(&mut self) {
        self.cancel.cancel();
        if self.is_loading() {
            self.state = ScreenState::Idle;
        }
    }

    pub fn dismiss_error(&mut self) {
        if matches!(self.state, ScreenState::Failed(_)) {
            self.state = ScreenState::Idle;
        }
    }
}

impl<D: Document> Drop for ScreenController<D> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_fetch(
    fetcher: Arc<dyn ConditionalFetch>,
    ticket: LoadTicket,
    tx: mpsc::Sender<LoadCompletion>,
) {
    let LoadTicket {
        generation,
        domain,
        digest,
        cancel,
    } = ticket;
    let endpoint = domain.endpoint();

    let outcome = tokio::select! {
        _ = cancel.cancelled() => {
            debug!(domain = %domain, generation, "Fetch cancelled");
            return;
        }
        outcome = fetcher.fetch(&endpoint, digest.as_deref()) => outcome,
    };

    if cancel.is_cancelled() {
        return;
    }
    if tx
        .send(LoadCompletion {
            domain,
            generation,
            outcome,
        })
        .await
        .is_err()
    {
        debug!("Load receiver dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::FileCache;
    use crate::models::{Calendar, Schedule};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    const SCHEDULE_A: &str = r#"{"_digest":"dA","lastUpdate":"Mo","dates":[{"title":"Montag","gradeItems":[{"grade":"5A","vertretungsplanItems":[["1","Entfall","","","","",""]]}]}]}"#;
    const SCHEDULE_B: &str = r#"{"_digest":"dB","lastUpdate":"Di","dates":[]}"#;

    /// Answers fetches from a script and records what was asked.
    #[derive(Default)]
    struct ScriptedFetcher {
        responses: Mutex<VecDeque<Result<FetchResponse, ApiError>>>,
        requests: Mutex<Vec<(String, Option<String>)>>,
    }

    impl ScriptedFetcher {
        fn with(responses: Vec<Result<FetchResponse, ApiError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl ConditionalFetch for ScriptedFetcher {
        async fn fetch(&self, endpoint: &str, digest: Option<&str>) -> Result<FetchResponse, ApiError> {
            self.requests
                .lock()
                .unwrap()
                .push((endpoint.to_string(), digest.map(str::to_string)));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(FetchResponse::new(500, None)))
        }
    }

    /// Never answers.
    struct HangingFetcher;

    #[async_trait]
    impl ConditionalFetch for HangingFetcher {
        async fn fetch(&self, _endpoint: &str, _digest: Option<&str>) -> Result<FetchResponse, ApiError> {
            std::future::pending().await
        }
    }

    fn cache() -> (tempfile::TempDir, CacheManager) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCache::new(dir.path().to_path_buf()).unwrap();
        (dir, CacheManager::new(Arc::new(store)))
    }

    fn completion(ticket: &LoadTicket, status: u16, body: Option<&str>) -> LoadCompletion {
        LoadCompletion {
            domain: ticket.domain.clone(),
            generation: ticket.generation,
            outcome: Ok(FetchResponse::new(status, body.map(str::to_string))),
        }
    }

    #[test]
    fn test_first_load_caches_payload_and_digest() {
        let (_dir, cache) = cache();
        let mut screen = ScreenController::<Schedule>::new(Domain::Schedule, cache.clone());

        let ticket = screen.begin_load(false).unwrap();
        assert_eq!(ticket.digest, None);
        assert_eq!(screen.state(), &ScreenState::Loading { refreshing: false });

        let applied = screen.apply(completion(&ticket, 200, Some(SCHEDULE_A))).unwrap();
        assert_eq!(applied, Applied::Displayed(Resolution::Fetched));
        assert_eq!(screen.state(), &ScreenState::Displaying);
        assert_eq!(screen.document().unwrap().dates[0].date, "Montag");

        assert_eq!(cache.digest(&Domain::Schedule).as_deref(), Some("dA"));
        assert_eq!(cache.payload(&Domain::Schedule).as_deref(), Some(SCHEDULE_A));

        // The next load sends the stored digest
        let ticket = screen.begin_load(true).unwrap();
        assert_eq!(ticket.digest.as_deref(), Some("dA"));
    }

    #[test]
    fn test_not_modified_uses_cache() {
        let (_dir, cache) = cache();
        cache.store(&Domain::Schedule, SCHEDULE_A, Some("dA"));
        let mut screen = ScreenController::<Schedule>::new(Domain::Schedule, cache.clone());

        let ticket = screen.begin_load(false).unwrap();
        assert_eq!(ticket.digest.as_deref(), Some("dA"));

        let applied = screen.apply(completion(&ticket, 304, None)).unwrap();
        assert_eq!(applied, Applied::Displayed(Resolution::Cached));
        assert_eq!(screen.document().unwrap().last_update, "Mo");
        assert_eq!(cache.payload(&Domain::Schedule).as_deref(), Some(SCHEDULE_A));
    }

    #[test]
    fn test_changed_payload_replaces_cache() {
        let (_dir, cache) = cache();
        cache.store(&Domain::Schedule, SCHEDULE_A, Some("dA"));
        let mut screen = ScreenController::<Schedule>::new(Domain::Schedule, cache.clone());

        let ticket = screen.begin_load(false).unwrap();
        screen.apply(completion(&ticket, 200, Some(SCHEDULE_B))).unwrap();

        assert_eq!(cache.digest(&Domain::Schedule).as_deref(), Some("dB"));
        assert!(screen.document().unwrap().dates.is_empty());
    }

    #[test]
    fn test_server_error_keeps_cache_and_document() {
        let (_dir, cache) = cache();
        cache.store(&Domain::Schedule, SCHEDULE_A, Some("dA"));
        let mut screen = ScreenController::<Schedule>::new(Domain::Schedule, cache.clone());
        assert!(screen.prime_from_cache());

        let ticket = screen.begin_load(true).unwrap();
        let err = screen.apply(completion(&ticket, 500, Some("boom"))).unwrap_err();

        assert!(matches!(err, ScreenError::Status(500)));
        assert!(matches!(screen.state(), ScreenState::Failed(_)));
        assert_eq!(screen.document().unwrap().last_update, "Mo");
        assert_eq!(cache.digest(&Domain::Schedule).as_deref(), Some("dA"));
        assert_eq!(cache.payload(&Domain::Schedule).as_deref(), Some(SCHEDULE_A));

        screen.dismiss_error();
        assert_eq!(screen.state(), &ScreenState::Idle);
    }

    #[test]
    fn test_malformed_payload_is_not_cached() {
        let (_dir, cache) = cache();
        cache.store(&Domain::Calendar, r#"{"_digest":"c1","monthItems":[]}"#, Some("c1"));
        let mut screen = ScreenController::<Calendar>::new(Domain::Calendar, cache.clone());

        let ticket = screen.begin_load(false).unwrap();
        let err = screen.apply(completion(&ticket, 200, Some("{not json"))).unwrap_err();

        assert!(matches!(err, ScreenError::Parse(_)));
        assert_eq!(cache.digest(&Domain::Calendar).as_deref(), Some("c1"));
    }

    #[test]
    fn test_corrupt_cache_recovers_after_not_modified() {
        let (_dir, cache) = cache();
        cache.store(&Domain::Schedule, r#"{"_digest":"dA","lastUpd"#, Some("dA"));
        let mut screen = ScreenController::<Schedule>::new(Domain::Schedule, cache.clone());

        let ticket = screen.begin_load(false).unwrap();
        assert_eq!(ticket.digest.as_deref(), Some("dA"));
        let err = screen.apply(completion(&ticket, 304, None)).unwrap_err();
        assert!(matches!(err, ScreenError::Parse(_)));

        // The refresh is unconditional and the fresh payload heals the cache
        screen.dismiss_error();
        let ticket = screen.begin_load(true).unwrap();
        assert_eq!(ticket.digest, None);
        screen.apply(completion(&ticket, 200, Some(SCHEDULE_A))).unwrap();
        assert_eq!(cache.digest(&Domain::Schedule).as_deref(), Some("dA"));
        assert_eq!(screen.document().unwrap().last_update, "Mo");
    }

    #[test]
    fn test_unreadable_cache_is_not_primed() {
        let (_dir, cache) = cache();
        cache.store(&Domain::Calendar, "{trunc", Some("c1"));
        let mut screen = ScreenController::<Calendar>::new(Domain::Calendar, cache.clone());

        assert!(!screen.prime_from_cache());
        assert_eq!(screen.begin_load(false).unwrap().digest, None);
    }

    #[test]
    fn test_empty_body_and_missing_cache_fail() {
        let (_dir, cache) = cache();
        let mut screen = ScreenController::<Calendar>::new(Domain::Calendar, cache);

        let ticket = screen.begin_load(false).unwrap();
        let err = screen.apply(completion(&ticket, 200, None)).unwrap_err();
        assert!(matches!(err, ScreenError::EmptyBody));

        screen.dismiss_error();
        let ticket = screen.begin_load(false).unwrap();
        let err = screen.apply(completion(&ticket, 304, None)).unwrap_err();
        assert!(matches!(err, ScreenError::MissingCache));
    }

    #[test]
    fn test_transport_error() {
        let (_dir, cache) = cache();
        let mut screen = ScreenController::<Calendar>::new(Domain::Calendar, cache);

        let ticket = screen.begin_load(false).unwrap();
        let err = screen
            .apply(LoadCompletion {
                domain: ticket.domain.clone(),
                generation: ticket.generation,
                outcome: Err(ApiError::Unauthorized),
            })
            .unwrap_err();
        assert!(matches!(err, ScreenError::Transport(ApiError::Unauthorized)));
    }

    #[test]
    fn test_concurrent_refresh_is_ignored() {
        let (_dir, cache) = cache();
        let mut screen = ScreenController::<Schedule>::new(Domain::Schedule, cache);

        assert!(screen.begin_load(false).is_some());
        assert!(screen.begin_load(true).is_none());
        assert_eq!(screen.state(), &ScreenState::Loading { refreshing: false });
    }

    #[test]
    fn test_stale_completion_is_discarded() {
        let (_dir, cache) = cache();
        let mut screen = ScreenController::<Schedule>::new(Domain::Schedule, cache.clone());

        let old = screen.begin_load(false).unwrap();
        screen.teardown();
        assert!(old.cancel.is_cancelled());
        assert_eq!(screen.state(), &ScreenState::Idle);

        let current = screen.begin_load(false).unwrap();
        assert_eq!(
            screen.apply(completion(&old, 200, Some(SCHEDULE_A))).unwrap(),
            Applied::Discarded
        );
        assert_eq!(cache.payload(&Domain::Schedule), None);

        screen.apply(completion(&current, 200, Some(SCHEDULE_B))).unwrap();
        assert_eq!(cache.digest(&Domain::Schedule).as_deref(), Some("dB"));
    }

    #[test]
    fn test_completion_after_teardown_is_discarded() {
        let (_dir, cache) = cache();
        let mut screen = ScreenController::<Schedule>::new(Domain::Schedule, cache.clone());

        let ticket = screen.begin_load(false).unwrap();
        screen.teardown();

        assert_eq!(
            screen.apply(completion(&ticket, 200, Some(SCHEDULE_A))).unwrap(),
            Applied::Discarded
        );
        assert!(screen.document().is_none());
        assert_eq!(cache.payload(&Domain::Schedule), None);
    }

    #[tokio::test]
    async fn test_spawned_load_reports_back() {
        let (_dir, cache) = cache();
        cache.store(&Domain::Dashboard("5A".into()), SCHEDULE_A, Some("dA"));
        let fetcher = ScriptedFetcher::with(vec![Ok(FetchResponse::new(304, None))]);
        let (tx, mut rx) = mpsc::channel(4);

        let mut screen = ScreenController::<Schedule>::new(Domain::Dashboard("5A".into()), cache);
        assert!(screen.spawn_load(fetcher.clone(), false, tx.clone()));
        assert!(!screen.spawn_load(fetcher.clone(), true, tx));

        let done = rx.recv().await.unwrap();
        assert_eq!(screen.apply(done).unwrap(), Applied::Displayed(Resolution::Cached));

        let requests = fetcher.requests.lock().unwrap();
        assert_eq!(
            requests.as_slice(),
            &[("vertretungsplan/5A".to_string(), Some("dA".to_string()))]
        );
    }

    #[tokio::test]
    async fn test_teardown_cancels_spawned_fetch() {
        let (_dir, cache) = cache();
        let (tx, mut rx) = mpsc::channel(4);

        let mut screen = ScreenController::<Calendar>::new(Domain::Calendar, cache);
        assert!(screen.spawn_load(Arc::new(HangingFetcher), false, tx));
        screen.teardown();

        // The task exits without sending, which closes the channel
        let received = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
        assert!(matches!(received, Ok(None)));
    }
}
