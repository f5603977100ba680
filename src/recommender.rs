//! Recommendation orchestrator
//!
//! CRITERIA → CANDIDATES → ANALYZE → RANK → TOP N
//!
//! A request never fails past this boundary: every problem degrades to a
//! shorter, price-ordered or empty list.

use crate::analysis::{AnalysisStage, Clock};
use crate::llm::Completion;
use crate::models::{Criteria, Listing};
use crate::ranking;
use crate::store::ListingStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Recommendations returned when the caller does not ask for a count
pub const DEFAULT_LIMIT: usize = 10;

/// Candidates pulled from the store so ranking has material beyond `limit`
pub const CANDIDATE_POOL: usize = 50;

pub struct Recommender {
    store: Arc<dyn ListingStore>,
    completion: Arc<dyn Completion>,
    analysis: AnalysisStage,
}

impl Recommender {
    pub fn new(store: Arc<dyn ListingStore>, completion: Arc<dyn Completion>) -> Self {
        let analysis = AnalysisStage::new(completion.clone(), store.clone());
        Self {
            store,
            completion,
            analysis,
        }
    }

    /// Spacing between analysis calls within one request
    pub fn with_min_interval(mut self, min_interval: Duration) -> Self {
        self.analysis = self.analysis.with_min_interval(min_interval);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.analysis = self.analysis.with_clock(clock);
        self
    }

    pub fn store(&self) -> &Arc<dyn ListingStore> {
        &self.store
    }

    /// Recommendations for criteria in their JSON wire form.
    ///
    /// Missing or malformed criteria behave exactly like empty criteria.
    pub async fn get_recommendations(&self, criteria: Option<&str>, limit: usize) -> Vec<Listing> {
        let criteria = Criteria::parse(criteria);
        self.recommend(&criteria, limit).await
    }

    /// Recommendations for already-decoded criteria
    pub async fn recommend(&self, criteria: &Criteria, limit: usize) -> Vec<Listing> {
        let mut candidates = match self.store.find(criteria, CANDIDATE_POOL).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Error retrieving candidate listings: {}", e);
                return Vec::new();
            }
        };

        if candidates.is_empty() {
            warn!("No listings found matching criteria");
            return Vec::new();
        }

        info!(candidates = candidates.len(), limit, "Building recommendations");

        self.analysis.ensure_analyzed(&mut candidates, criteria).await;

        let mut ranked = ranking::rank(&candidates, criteria, self.completion.as_ref()).await;
        ranked.truncate(limit);

        info!(returned = ranked.len(), "Recommendations ready");
        ranked
    }
}
