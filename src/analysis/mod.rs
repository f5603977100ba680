//! Analysis stage
//!
//! Makes sure every candidate listing carries analysis text before ranking.
//! Failures are isolated per listing: a bad completion or store write never
//! stops the rest of the batch.

use crate::llm::Completion;
use crate::models::{Criteria, Listing};
use crate::prompts::build_analysis_prompt;
use crate::store::ListingStore;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod limiter;
pub use limiter::{Clock, RateLimiter, TokioClock};

/// Default spacing between completion calls within one pass
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(500);

/// Outcome counts for one `ensure_analyzed` pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisSummary {
    pub already_analyzed: usize,
    pub analyzed: usize,
    pub failed: usize,
}

pub struct AnalysisStage {
    completion: Arc<dyn Completion>,
    store: Arc<dyn ListingStore>,
    min_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl AnalysisStage {
    pub fn new(completion: Arc<dyn Completion>, store: Arc<dyn ListingStore>) -> Self {
        Self {
            completion,
            store,
            min_interval: DEFAULT_MIN_INTERVAL,
            clock: Arc::new(TokioClock),
        }
    }

    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.min_interval = min_interval;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Analyze every listing that has no analysis yet.
    ///
    /// New analyses are written to the listing in place and to the store.
    /// Listings whose completion comes back empty stay unanalyzed.
    pub async fn ensure_analyzed(
        &self,
        listings: &mut [Listing],
        preferences: &Criteria,
    ) -> AnalysisSummary {
        // Spacing applies to this pass only, not across concurrent requests
        let mut limiter = RateLimiter::new(self.min_interval, self.clock.clone());
        let mut summary = AnalysisSummary::default();

        for listing in listings.iter_mut() {
            if listing.is_analyzed() {
                summary.already_analyzed += 1;
                continue;
            }

            limiter.wait().await;

            let prompt = build_analysis_prompt(listing, preferences);
            let analysis = self.completion.complete(&prompt).await;
            limiter.mark();

            if analysis.trim().is_empty() {
                warn!(listing_id = listing.id, "Empty analysis response, leaving listing unanalyzed");
                summary.failed += 1;
                continue;
            }

            match self.store.save_analysis(listing.id, &analysis).await {
                Ok(true) => debug!(listing_id = listing.id, "Analysis stored"),
                Ok(false) => warn!(listing_id = listing.id, "Listing not found in store, analysis kept in memory only"),
                Err(e) => warn!(listing_id = listing.id, "Error saving analysis, kept in memory only: {}", e),
            }

            listing.analysis = Some(analysis);
            listing.analysis_timestamp = Some(Utc::now());
            summary.analyzed += 1;
        }

        info!(
            analyzed = summary.analyzed,
            failed = summary.failed,
            already_analyzed = summary.already_analyzed,
            "Analysis pass complete"
        );

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::limiter::ManualClock;
    use super::*;
    use crate::error::RecommendationError;
    use crate::llm::MockCompletion;
    use crate::models::fixtures::{analyzed, listing};
    use crate::models::{ListingId, NewListing};
    use crate::store::InMemoryListingStore;
    use crate::Result;

    struct BrokenStore;

    #[async_trait::async_trait]
    impl ListingStore for BrokenStore {
        async fn find(&self, _criteria: &Criteria, _max_count: usize) -> Result<Vec<Listing>> {
            Ok(Vec::new())
        }

        async fn save_analysis(&self, _listing_id: ListingId, _analysis: &str) -> Result<bool> {
            Err(RecommendationError::DatabaseError("disk full".to_string()))
        }

        async fn add_listings(&self, _listings: Vec<NewListing>) -> Result<usize> {
            Ok(0)
        }

        async fn get_listing(&self, _listing_id: ListingId) -> Result<Option<Listing>> {
            Ok(None)
        }

        async fn save_search(&self, _criteria: &Criteria) -> Result<i64> {
            Ok(0)
        }
    }

    async fn seeded_store(listings: &[Listing]) -> Arc<InMemoryListingStore> {
        let store = Arc::new(InMemoryListingStore::new());
        for listing in listings {
            store.insert(listing.clone()).await;
        }
        store
    }

    fn stage(completion: Arc<MockCompletion>, store: Arc<dyn ListingStore>, clock: Arc<ManualClock>) -> AnalysisStage {
        AnalysisStage::new(completion, store).with_clock(clock)
    }

    #[tokio::test]
    async fn test_analyzes_and_persists() {
        let mut cars = vec![
            listing(1, 2020, "Honda", "Civic", Some(20000)),
            listing(2, 2018, "Mazda", "3", Some(15000)),
        ];
        let store = seeded_store(&cars).await;
        let completion = Arc::new(MockCompletion::with_responses(vec!["Recommended", "Consider"], ""));
        let clock = Arc::new(ManualClock::new());

        let summary = stage(completion.clone(), store.clone(), clock.clone())
            .ensure_analyzed(&mut cars, &Criteria::new())
            .await;

        assert_eq!(summary.analyzed, 2);
        assert_eq!(cars[0].analysis.as_deref(), Some("Recommended"));
        assert_eq!(cars[1].analysis.as_deref(), Some("Consider"));
        assert!(cars[0].analysis_timestamp.is_some());

        let stored = store.get_listing(2).await.unwrap().unwrap();
        assert_eq!(stored.analysis.as_deref(), Some("Consider"));
        assert!(completion.prompts()[0].contains("- Make: Honda"));
    }

    #[tokio::test]
    async fn test_already_analyzed_listing_is_not_resent() {
        let mut cars = vec![analyzed(1, 2020, "Honda", "Civic", Some(20000))];
        let store = seeded_store(&cars).await;
        let completion = Arc::new(MockCompletion::new("fresh analysis"));
        let clock = Arc::new(ManualClock::new());

        let summary = stage(completion.clone(), store, clock)
            .ensure_analyzed(&mut cars, &Criteria::new())
            .await;

        assert_eq!(completion.calls(), 0);
        assert_eq!(summary.already_analyzed, 1);
        assert_eq!(cars[0].analysis.as_deref(), Some("Analysis for listing 1"));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_the_rest() {
        let mut cars: Vec<Listing> = (1..=4)
            .map(|id| listing(id, 2015 + id as i32, "Toyota", "Corolla", Some(10000 + id)))
            .collect();
        let store = seeded_store(&cars).await;
        let completion = Arc::new(MockCompletion::with_responses(vec!["ok 1", "", "ok 3", "ok 4"], ""));
        let clock = Arc::new(ManualClock::new());

        let summary = stage(completion, store, clock)
            .ensure_analyzed(&mut cars, &Criteria::new())
            .await;

        assert_eq!(summary, AnalysisSummary { already_analyzed: 0, analyzed: 3, failed: 1 });
        assert!(cars[0].is_analyzed());
        assert!(!cars[1].is_analyzed());
        assert!(cars[2].is_analyzed());
        assert!(cars[3].is_analyzed());
    }

    #[tokio::test]
    async fn test_store_failure_keeps_in_memory_analysis() {
        let mut cars = vec![listing(1, 2019, "Kia", "Soul", Some(14000))];
        let completion = Arc::new(MockCompletion::new("Consider"));
        let clock = Arc::new(ManualClock::new());

        let summary = stage(completion, Arc::new(BrokenStore), clock)
            .ensure_analyzed(&mut cars, &Criteria::new())
            .await;

        assert_eq!(summary.analyzed, 1);
        assert_eq!(cars[0].analysis.as_deref(), Some("Consider"));
    }

    #[tokio::test]
    async fn test_calls_are_spaced_by_min_interval() {
        let mut cars: Vec<Listing> = (1..=3)
            .map(|id| listing(id, 2017, "Subaru", "Impreza", Some(12000)))
            .collect();
        cars.push(analyzed(4, 2017, "Subaru", "Impreza", Some(12000)));
        let store = seeded_store(&cars).await;
        let completion = Arc::new(MockCompletion::new("Consider"));
        let clock = Arc::new(ManualClock::new());

        stage(completion.clone(), store, clock.clone())
            .with_min_interval(Duration::from_millis(250))
            .ensure_analyzed(&mut cars, &Criteria::new())
            .await;

        assert_eq!(completion.calls(), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(250); 2]);
    }

    /// Completion whose every call takes `latency` on the shared clock
    struct SlowCompletion {
        clock: Arc<ManualClock>,
        latency: Duration,
    }

    #[async_trait::async_trait]
    impl Completion for SlowCompletion {
        async fn complete(&self, _prompt: &str) -> String {
            self.clock.advance(self.latency);
            "Consider".to_string()
        }
    }

    #[tokio::test]
    async fn test_slow_calls_still_pause_between_listings() {
        let mut cars: Vec<Listing> = (1..=5)
            .map(|id| listing(id, 2016, "Nissan", "Leaf", Some(9000 + id)))
            .collect();
        let store = seeded_store(&cars).await;
        let clock = Arc::new(ManualClock::new());
        let completion = Arc::new(SlowCompletion {
            clock: clock.clone(),
            latency: Duration::from_millis(600),
        });

        let summary = AnalysisStage::new(completion, store)
            .with_clock(clock.clone())
            .ensure_analyzed(&mut cars, &Criteria::new())
            .await;

        assert_eq!(summary.analyzed, 5);
        assert_eq!(clock.sleeps(), vec![DEFAULT_MIN_INTERVAL; 4]);
    }

    #[tokio::test]
    async fn test_preferences_reach_the_prompt() {
        let mut cars = vec![listing(1, 2021, "Tesla", "Model 3", Some(38000))];
        let store = seeded_store(&cars).await;
        let completion = Arc::new(MockCompletion::new("Recommended"));
        let clock = Arc::new(ManualClock::new());

        stage(completion.clone(), store, clock)
            .ensure_analyzed(&mut cars, &Criteria::new().with("fuel_type", "electric"))
            .await;

        assert!(completion.prompts()[0].contains("USER PREFERENCES:\n- Fuel Type: electric\n"));
    }
}
