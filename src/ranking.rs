//! Ranking stage
//!
//! Orders analyzed listings into a recommendation list:
//!
//! - one or zero analyzed listings are returned as they are
//! - up to `HEURISTIC_THRESHOLD` listings are ordered by ascending price
//! - larger sets are scored by mining one free-form model ranking response
//!
//! If the model branch fails, every supplied listing (analyzed or not) is
//! ordered by price instead.

use crate::error::RecommendationError;
use crate::llm::Completion;
use crate::models::{Criteria, Listing};
use crate::prompts::build_ranking_prompt;
use crate::Result;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Above this many analyzed listings the model is asked to rank them
pub const HEURISTIC_THRESHOLD: usize = 10;

/// Most listings included in the ranking prompt
pub const RANKING_PROMPT_CAP: usize = 30;

/// Characters after a mention searched for sentiment keywords
pub const SENTIMENT_WINDOW: usize = 200;

const POSITIVE_WORDS: &[&str] = &["recommend", "excellent", "good", "best", "top", "value"];
const NEGATIVE_WORDS: &[&str] = &["avoid", "poor", "worst", "concern", "issue", "problem"];
const KEYWORD_WEIGHT: f64 = 10.0;
const POSITION_DIVISOR: f64 = 1000.0;

/// A listing with its score; lives only for the duration of a sort
#[derive(Debug, Clone)]
pub struct RankedListing {
    pub listing: Listing,
    pub rank_score: f64,
}

/// Rank the analyzed subset of `listings`
pub async fn rank(
    listings: &[Listing],
    preferences: &Criteria,
    completion: &dyn Completion,
) -> Vec<Listing> {
    let analyzed: Vec<Listing> = listings.iter().filter(|l| l.is_analyzed()).cloned().collect();

    match analyzed.len() {
        0 | 1 => analyzed,
        n if n <= HEURISTIC_THRESHOLD => {
            debug!(count = n, "Ranking by price");
            sort_by_price(analyzed)
        }
        n => match rank_with_model(&analyzed, preferences, completion).await {
            Ok(ranked) => {
                info!(count = n, "Ranked listings from model response");
                ranked
            }
            Err(e) => {
                warn!(count = listings.len(), "Error ranking listings, falling back to price order: {}", e);
                sort_by_price(listings.to_vec())
            }
        },
    }
}

/// Ascending price; unknown prices last; equal prices keep input order
pub fn sort_by_price(mut listings: Vec<Listing>) -> Vec<Listing> {
    listings.sort_by_key(|l| (l.price.is_none(), l.price));
    listings
}

async fn rank_with_model(
    analyzed: &[Listing],
    preferences: &Criteria,
    completion: &dyn Completion,
) -> Result<Vec<Listing>> {
    let batch = &analyzed[..analyzed.len().min(RANKING_PROMPT_CAP)];
    let prompt = build_ranking_prompt(batch, preferences);

    let ranking_text = completion.complete(&prompt).await;
    if ranking_text.trim().is_empty() {
        return Err(RecommendationError::LlmError("empty ranking response".to_string()));
    }

    let mut scored = score_listings(&ranking_text, analyzed);
    scored.sort_by(|a, b| b.rank_score.partial_cmp(&a.rank_score).unwrap_or(Ordering::Equal));

    Ok(scored.into_iter().map(|r| r.listing).collect())
}

/// Score every listing against the ranking text, keeping input order
pub fn score_listings(ranking_text: &str, listings: &[Listing]) -> Vec<RankedListing> {
    listings
        .iter()
        .map(|listing| RankedListing {
            rank_score: score_mention(ranking_text, &listing.identifier()),
            listing: listing.clone(),
        })
        .collect()
}

/// Score one identifier by where it is first mentioned and the words near it.
///
/// Unmentioned identifiers score 0. A mention at character offset `p` starts
/// at `-p / 1000`; each distinct positive keyword inside the window that
/// begins at the mention adds 10, each distinct negative keyword subtracts 10.
pub fn score_mention(ranking_text: &str, identifier: &str) -> f64 {
    let Some(start) = ranking_text.find(identifier) else {
        return 0.0;
    };

    let offset = ranking_text[..start].chars().count();
    let tail = &ranking_text[start..];
    let end = tail
        .char_indices()
        .nth(SENTIMENT_WINDOW)
        .map(|(i, _)| i)
        .unwrap_or(tail.len());
    let window = &tail[..end];

    let positives = POSITIVE_WORDS.iter().filter(|w| window.contains(**w)).count();
    let negatives = NEGATIVE_WORDS.iter().filter(|w| window.contains(**w)).count();

    -(offset as f64) / POSITION_DIVISOR + KEYWORD_WEIGHT * (positives as f64 - negatives as f64)
}
