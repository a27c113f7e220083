//! Local score cache and the pluggable backends that mirror it to durable storage.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::config::ScoreMethod;
use crate::error::ClaimError;
use crate::types::CollectibleId;

/// Source tag attached to points recorded on a score record
pub const SCORE_SOURCE: &str = "coin-pickup-game";
/// Campaign channel points are credited to
pub const CAMPAIGN_CHANNEL: &str = "game";
/// How long a located score record is trusted before it is looked up again
pub const RECORD_CACHE_TTL: Duration = Duration::from_secs(60);

/// A durable score record located in the user's inventory
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRecord {
    pub id: String,
    pub total: f64,
}

/// External score services. `None` means the service is not installed.
#[allow(async_fn_in_trait)]
pub trait ScoreService {
    async fn find_record(&self, template: &str) -> Option<ScoreRecord>;
    /// `Some(Err(_))` carries the service's own error message
    async fn add_record_points(&self, record_id: &str, points: f64, source: &str) -> Option<Result<(), String>>;
    async fn campaign_points(&self, campaign_id: &str) -> Option<f64>;
    /// Returns the campaign total after the points were added
    async fn add_campaign_points(&self, campaign_id: &str, channel: &str, points: f64) -> Option<f64>;
}

/// Placeholder service for hosts that only keep scores in memory
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScoreService;

impl ScoreService for NoScoreService {
    async fn find_record(&self, _template: &str) -> Option<ScoreRecord> {
        None
    }

    async fn add_record_points(&self, _record_id: &str, _points: f64, _source: &str) -> Option<Result<(), String>> {
        None
    }

    async fn campaign_points(&self, _campaign_id: &str) -> Option<f64> {
        None
    }

    async fn add_campaign_points(&self, _campaign_id: &str, _channel: &str, _points: f64) -> Option<f64> {
        None
    }
}

/**
 * The cached score, split into the confirmed base and the speculative
 * deltas of claims still in flight. Rolling a claim back drops its delta,
 * so the score returns to exactly what it was without that claim; an
 * authoritative total only ever replaces the base.
 */
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScoreLedger {
    base: f64,
    pending: BTreeMap<CollectibleId, f64>,
}

impl ScoreLedger {
    pub fn new(current: f64) -> Self {
        Self { base: current, pending: BTreeMap::new() }
    }

    pub fn current(&self) -> f64 {
        self.pending.values().fold(self.base, |total, delta| total + delta)
    }

    /// Score without any in-flight claim
    pub fn confirmed(&self) -> f64 {
        self.base
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn apply_speculative(&mut self, collectible: CollectibleId, delta: f64) {
        self.pending.insert(collectible, delta);
    }

    /// Drop the speculative delta of a failed claim
    pub fn revert(&mut self, collectible: CollectibleId) {
        if self.pending.remove(&collectible).is_none() {
            log::debug!("No speculative delta to revert for {}", collectible);
        }
    }

    /// Settle a successful claim. A backend total replaces the base, otherwise the delta joins it.
    pub fn commit(&mut self, collectible: CollectibleId, authoritative: Option<f64>) {
        let delta = self.pending.remove(&collectible).unwrap_or_default();
        match authoritative {
            Some(total) => self.base = total,
            None => self.base += delta,
        }
    }

    pub fn replace(&mut self, total: f64) {
        self.base = total;
    }

    /// Pull the authoritative value from `backend`; an absent value keeps the cache
    pub async fn refresh<S: ScoreService>(&mut self, backend: &ScoreBackend<S>) -> Option<f64> {
        let fetched = backend.fetch_score().await;
        match fetched {
            Some(total) => self.replace(total),
            None => log::debug!("Score backend returned no value, keeping cached score {}", self.current()),
        }
        fetched
    }
}

/// Backend selected by configuration
pub enum ScoreBackend<S> {
    InMemory,
    Object(ObjectScoreBackend<S>),
    Campaign(CampaignScoreBackend<S>),
}

impl ScoreBackend<NoScoreService> {
    pub fn in_memory() -> Self {
        ScoreBackend::InMemory
    }
}

impl<S: ScoreService> ScoreBackend<S> {
    pub fn from_method(method: &ScoreMethod, service: S) -> Self {
        match method {
            ScoreMethod::InMemory => ScoreBackend::InMemory,
            ScoreMethod::Object { template } => {
                ScoreBackend::Object(ObjectScoreBackend::new(service, template.clone()))
            }
            ScoreMethod::Campaign { campaign_id } => {
                ScoreBackend::Campaign(CampaignScoreBackend::new(service, campaign_id.clone()))
            }
        }
    }

    pub async fn fetch_score(&self) -> Option<f64> {
        match self {
            ScoreBackend::InMemory => None,
            ScoreBackend::Object(backend) => backend.fetch_score().await,
            ScoreBackend::Campaign(backend) => backend.fetch_score().await,
        }
    }

    /// Record `delta`. `Ok(Some(total))` when the backend reports a new authoritative total.
    pub async fn record_delta(&self, delta: f64) -> Result<Option<f64>, ClaimError> {
        match self {
            ScoreBackend::InMemory => Ok(None),
            ScoreBackend::Object(backend) => backend.record_delta(delta).await.map(|_| None),
            ScoreBackend::Campaign(backend) => backend.record_delta(delta).await.map(Some),
        }
    }
}

struct CachedRecord {
    fetched_at: Instant,
    record: ScoreRecord,
}

/// Score kept on a durable record located by template
pub struct ObjectScoreBackend<S> {
    service: S,
    template: String,
    ttl: Duration,
    cached: RefCell<Option<CachedRecord>>,
}

impl<S: ScoreService> ObjectScoreBackend<S> {
    pub fn new(service: S, template: String) -> Self {
        Self { service, template, ttl: RECORD_CACHE_TTL, cached: RefCell::new(None) }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    fn cached_record(&self) -> Option<ScoreRecord> {
        let cached = self.cached.borrow();
        cached
            .as_ref()
            .filter(|c| c.fetched_at.elapsed() < self.ttl)
            .map(|c| c.record.clone())
    }

    async fn fetch_record(&self) -> Option<ScoreRecord> {
        let found = self.service.find_record(&self.template).await;
        match &found {
            Some(record) => {
                *self.cached.borrow_mut() = Some(CachedRecord { fetched_at: Instant::now(), record: record.clone() });
            }
            None => {
                self.cached.borrow_mut().take();
                log::warn!("Score record '{}' was not found in the user's inventory", self.template);
            }
        }
        found
    }

    pub async fn fetch_score(&self) -> Option<f64> {
        self.fetch_record().await.map(|r| r.total)
    }

    pub async fn record_delta(&self, delta: f64) -> Result<(), ClaimError> {
        let record = match self.cached_record() {
            Some(record) => record,
            None => self.fetch_record().await.ok_or_else(|| {
                ClaimError::NotFound(
                    "We could not find the score record in your inventory. Please open the wallet and try again."
                        .to_string(),
                )
            })?,
        };

        match self.service.add_record_points(&record.id, delta, SCORE_SOURCE).await {
            None => Err(ClaimError::BackendUnavailable(
                "Score update failed! The score record service is not installed.".to_string(),
            )),
            Some(Err(e)) => Err(ClaimError::BackendError(format!("Score update failed! {e}"))),
            Some(Ok(())) => Ok(()),
        }
    }
}

/// Score kept on an external points campaign
pub struct CampaignScoreBackend<S> {
    service: S,
    campaign_id: Option<String>,
}

impl<S: ScoreService> CampaignScoreBackend<S> {
    pub fn new(service: S, campaign_id: Option<String>) -> Self {
        Self { service, campaign_id }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub async fn fetch_score(&self) -> Option<f64> {
        let Some(campaign_id) = self.campaign_id.as_deref() else {
            log::warn!("No campaign ID was specified, score will start at 0");
            return None;
        };
        let points = self.service.campaign_points(campaign_id).await;
        if points.is_none() {
            log::warn!("The campaign service is not available, cannot fetch score for {}", campaign_id);
        }
        points
    }

    pub async fn record_delta(&self, delta: f64) -> Result<f64, ClaimError> {
        let campaign_id = self.campaign_id.as_deref().ok_or_else(|| {
            ClaimError::BackendError("No campaign ID was specified in the configuration.".to_string())
        })?;
        self.service
            .add_campaign_points(campaign_id, CAMPAIGN_CHANNEL, delta)
            .await
            .ok_or_else(|| {
                ClaimError::BackendUnavailable(
                    "The campaign service needs to be installed to use the campaign scoring method.".to_string(),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct FakeService {
        record: RefCell<Option<ScoreRecord>>,
        lookups: Cell<u32>,
        recorded: RefCell<Vec<(String, f64)>>,
        record_error: Option<String>,
        campaign_total: RefCell<Option<f64>>,
    }

    impl ScoreService for &FakeService {
        async fn find_record(&self, _template: &str) -> Option<ScoreRecord> {
            self.lookups.set(self.lookups.get() + 1);
            self.record.borrow().clone()
        }

        async fn add_record_points(&self, record_id: &str, points: f64, _source: &str) -> Option<Result<(), String>> {
            if let Some(e) = &self.record_error {
                return Some(Err(e.clone()));
            }
            self.recorded.borrow_mut().push((record_id.to_string(), points));
            Some(Ok(()))
        }

        async fn campaign_points(&self, _campaign_id: &str) -> Option<f64> {
            *self.campaign_total.borrow()
        }

        async fn add_campaign_points(&self, _campaign_id: &str, _channel: &str, points: f64) -> Option<f64> {
            let mut total = self.campaign_total.borrow_mut();
            let next = (*total)? + points;
            *total = Some(next);
            Some(next)
        }
    }

    fn record(total: f64) -> Option<ScoreRecord> {
        Some(ScoreRecord { id: "rec-1".into(), total })
    }

    #[test]
    fn in_memory_backend_has_nothing_to_fetch_and_always_records() {
        let backend = ScoreBackend::in_memory();
        let mut ledger = ScoreLedger::new(3.0);
        assert_eq!(block_on(ledger.refresh(&backend)), None);
        assert_eq!(ledger.current(), 3.0);
        assert_eq!(block_on(backend.record_delta(5.0)), Ok(None));
    }

    #[test]
    fn reverting_a_fractional_delta_restores_the_exact_score() {
        let mut ledger = ScoreLedger::new(0.1);
        ledger.apply_speculative(CollectibleId(1), 0.2);
        assert!(ledger.current() > 0.1);
        ledger.revert(CollectibleId(1));
        assert_eq!(ledger.current(), 0.1);
        assert_eq!(ledger.pending(), 0);
    }

    #[test]
    fn committed_deltas_join_the_base() {
        let mut ledger = ScoreLedger::new(0.5);
        ledger.apply_speculative(CollectibleId(1), 0.25);
        ledger.apply_speculative(CollectibleId(2), 0.25);
        ledger.commit(CollectibleId(1), None);
        assert_eq!(ledger.confirmed(), 0.75);
        ledger.revert(CollectibleId(2));
        assert_eq!(ledger.current(), 0.75);
    }

    #[test]
    fn rollback_after_an_authoritative_total_leaves_that_total() {
        let mut ledger = ScoreLedger::new(10.0);
        ledger.apply_speculative(CollectibleId(1), 0.3);
        ledger.apply_speculative(CollectibleId(2), 0.7);
        // The backend total already counts claim 1 but knows nothing of claim 2
        ledger.commit(CollectibleId(1), Some(10.3));
        assert_eq!(ledger.current(), 10.3 + 0.7);
        ledger.revert(CollectibleId(2));
        assert_eq!(ledger.current(), 10.3);
    }

    #[test]
    fn refresh_keeps_in_flight_deltas_on_top() {
        let service = FakeService { campaign_total: RefCell::new(Some(4.0)), ..Default::default() };
        let backend = ScoreBackend::Campaign(CampaignScoreBackend::new(&service, Some("spring".into())));
        let mut ledger = ScoreLedger::new(1.0);
        ledger.apply_speculative(CollectibleId(7), 2.0);
        assert_eq!(block_on(ledger.refresh(&backend)), Some(4.0));
        assert_eq!(ledger.current(), 6.0);
        ledger.revert(CollectibleId(7));
        assert_eq!(ledger.current(), 4.0);
    }

    #[test]
    fn object_backend_reuses_the_located_record_within_the_ttl() {
        let service = FakeService { record: RefCell::new(record(40.0)), ..Default::default() };
        let backend = ScoreBackend::Object(ObjectScoreBackend::new(&service, "points".into()));
        let mut ledger = ScoreLedger::default();

        assert_eq!(block_on(ledger.refresh(&backend)), Some(40.0));
        assert_eq!(ledger.current(), 40.0);
        assert_eq!(block_on(backend.record_delta(1.0)), Ok(None));
        assert_eq!(block_on(backend.record_delta(1.0)), Ok(None));
        assert_eq!(service.lookups.get(), 1);
        assert_eq!(service.recorded.borrow().len(), 2);
    }

    #[test]
    fn object_backend_refetches_once_after_expiry_then_reports_not_found() {
        let service = FakeService { record: RefCell::new(record(1.0)), ..Default::default() };
        let backend = ObjectScoreBackend::new(&service, "points".into()).with_cache_ttl(Duration::ZERO);

        assert_eq!(block_on(backend.record_delta(1.0)), Ok(()));
        assert_eq!(service.lookups.get(), 1);

        service.record.borrow_mut().take();
        let err = block_on(backend.record_delta(1.0)).unwrap_err();
        assert!(matches!(err, ClaimError::NotFound(_)));
        assert_eq!(service.lookups.get(), 2);
    }

    #[test]
    fn object_backend_surfaces_explicit_errors_verbatim() {
        let service = FakeService {
            record: RefCell::new(record(1.0)),
            record_error: Some("quota exceeded".into()),
            ..Default::default()
        };
        let backend = ObjectScoreBackend::new(&service, "points".into());
        assert_eq!(
            block_on(backend.record_delta(1.0)),
            Err(ClaimError::BackendError("Score update failed! quota exceeded".into()))
        );
    }

    #[test]
    fn campaign_backend_reports_the_new_total() {
        let service = FakeService { campaign_total: RefCell::new(Some(7.0)), ..Default::default() };
        let backend = ScoreBackend::from_method(&ScoreMethod::Campaign { campaign_id: Some("c1".into()) }, &service);
        assert_eq!(block_on(backend.fetch_score()), Some(7.0));
        assert_eq!(block_on(backend.record_delta(3.0)), Ok(Some(10.0)));
    }

    #[test]
    fn campaign_backend_without_id_or_service_fails() {
        let service = FakeService::default();
        let no_id = CampaignScoreBackend::new(&service, None);
        assert!(matches!(block_on(no_id.record_delta(1.0)), Err(ClaimError::BackendError(_))));

        let missing = CampaignScoreBackend::new(&service, Some("c1".into()));
        assert!(matches!(block_on(missing.record_delta(1.0)), Err(ClaimError::BackendUnavailable(_))));
    }
}
