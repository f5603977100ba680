//! Listing persistence layer
//!
//! The recommendation core reads candidates and writes analyses through
//! `ListingStore`. An in-memory store serves development and tests; SQLite
//! backs the binaries.

use crate::models::{Criteria, Listing, ListingId, NewListing, SearchRecord};
use crate::Result;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

pub mod sqlite;
pub use sqlite::SqliteListingStore;

/// Trait for listing persistence
#[async_trait::async_trait]
pub trait ListingStore: Send + Sync {
    /// Listings passing `criteria`, newest scrape first, at most `max_count`
    async fn find(&self, criteria: &Criteria, max_count: usize) -> Result<Vec<Listing>>;

    /// Attach analysis text to a listing; `Ok(false)` when the id is unknown
    async fn save_analysis(&self, listing_id: ListingId, analysis: &str) -> Result<bool>;

    /// Insert new listings, refreshing ones already stored. Returns the insert count.
    async fn add_listings(&self, listings: Vec<NewListing>) -> Result<usize>;

    async fn get_listing(&self, listing_id: ListingId) -> Result<Option<Listing>>;

    async fn save_search(&self, criteria: &Criteria) -> Result<i64>;
}

/// In-memory listing store for development
pub struct InMemoryListingStore {
    listings: Arc<RwLock<HashMap<ListingId, Listing>>>,
    searches: Arc<RwLock<Vec<SearchRecord>>>,
}

impl InMemoryListingStore {
    pub fn new() -> Self {
        Self {
            listings: Arc::new(RwLock::new(HashMap::new())),
            searches: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Seed the store with already-built listings, keeping their ids
    pub async fn insert(&self, listing: Listing) {
        let mut listings = self.listings.write().await;
        listings.insert(listing.id, listing);
    }

    pub async fn searches(&self) -> Vec<SearchRecord> {
        self.searches.read().await.clone()
    }
}

impl Default for InMemoryListingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ListingStore for InMemoryListingStore {
    async fn find(&self, criteria: &Criteria, max_count: usize) -> Result<Vec<Listing>> {
        let listings = self.listings.read().await;

        let mut found: Vec<Listing> = listings
            .values()
            .filter(|listing| criteria.matches(listing))
            .cloned()
            .collect();

        // Newest first; id breaks ties so results are stable
        found.sort_by(|a, b| b.scraped_at.cmp(&a.scraped_at).then(a.id.cmp(&b.id)));
        found.truncate(max_count);

        Ok(found)
    }

    async fn save_analysis(&self, listing_id: ListingId, analysis: &str) -> Result<bool> {
        let mut listings = self.listings.write().await;

        match listings.get_mut(&listing_id) {
            Some(listing) => {
                listing.analysis = Some(analysis.to_string());
                listing.analysis_timestamp = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn add_listings(&self, new_listings: Vec<NewListing>) -> Result<usize> {
        let mut listings = self.listings.write().await;
        let mut added = 0;

        for new in new_listings {
            let scraped_at = new.scraped_at.unwrap_or_else(Utc::now);

            if let Some(existing) = listings.values_mut().find(|l| new.same_vehicle(l)) {
                existing.price = new.price;
                existing.details = new.details;
                existing.scraped_at = scraped_at;
                continue;
            }

            let id = listings.keys().max().copied().unwrap_or(0) + 1;
            listings.insert(
                id,
                Listing {
                    id,
                    source: new.source,
                    year: new.year,
                    make: new.make,
                    model: new.model,
                    price: new.price,
                    url: new.url,
                    details: new.details,
                    scraped_at,
                    analysis: None,
                    analysis_timestamp: None,
                },
            );
            added += 1;
        }

        Ok(added)
    }

    async fn get_listing(&self, listing_id: ListingId) -> Result<Option<Listing>> {
        let listings = self.listings.read().await;
        Ok(listings.get(&listing_id).cloned())
    }

    async fn save_search(&self, criteria: &Criteria) -> Result<i64> {
        let mut searches = self.searches.write().await;
        let id = searches.len() as i64 + 1;
        searches.push(SearchRecord {
            id,
            criteria: criteria.clone(),
            created_at: Utc::now(),
        });
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::listing;
    use chrono::Duration;
    use serde_json::json;

    fn new_listing(make: &str, model: &str, price: i64, url: &str) -> NewListing {
        NewListing {
            source: "kijiji".to_string(),
            year: Some(2018),
            make: Some(make.to_string()),
            model: Some(model.to_string()),
            price: Some(price),
            url: url.to_string(),
            details: Default::default(),
            scraped_at: None,
        }
    }

    #[tokio::test]
    async fn test_find_filters_orders_and_limits() {
        let store = InMemoryListingStore::new();
        let now = Utc::now();

        for (id, make, price, age_hours) in [(1, "Honda", 9000, 3), (2, "Honda", 15000, 1), (3, "Toyota", 12000, 2), (4, "Honda", 30000, 0)] {
            let mut car = listing(id, 2018, make, "Any", Some(price));
            car.scraped_at = now - Duration::hours(age_hours);
            store.insert(car).await;
        }

        let criteria = Criteria::new().with("make", "honda").with("max_price", 20000);
        let found = store.find(&criteria, 50).await.unwrap();
        let ids: Vec<ListingId> = found.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![2, 1]);

        let limited = store.find(&Criteria::new(), 2).await.unwrap();
        assert_eq!(limited.iter().map(|l| l.id).collect::<Vec<_>>(), vec![4, 2]);
    }

    #[tokio::test]
    async fn test_save_analysis() {
        let store = InMemoryListingStore::new();
        store.insert(listing(1, 2020, "Honda", "Civic", Some(20000))).await;

        assert!(store.save_analysis(1, "Recommended").await.unwrap());
        assert!(!store.save_analysis(99, "Recommended").await.unwrap());

        let saved = store.get_listing(1).await.unwrap().unwrap();
        assert_eq!(saved.analysis.as_deref(), Some("Recommended"));
        assert!(saved.analysis_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_add_listings_deduplicates() {
        let store = InMemoryListingStore::new();

        let added = store
            .add_listings(vec![
                new_listing("Honda", "Civic", 15000, "https://kijiji.ca/1"),
                new_listing("Mazda", "3", 12000, "https://kijiji.ca/2"),
            ])
            .await
            .unwrap();
        assert_eq!(added, 2);

        let mut seen_again = new_listing("Honda", "Civic", 14000, "https://kijiji.ca/1");
        seen_again.details.insert("mileage".to_string(), json!("80,000 km"));
        let added = store.add_listings(vec![seen_again]).await.unwrap();
        assert_eq!(added, 0);

        let all = store.find(&Criteria::new(), 10).await.unwrap();
        assert_eq!(all.len(), 2);
        let civic = all.iter().find(|l| l.model.as_deref() == Some("Civic")).unwrap();
        assert_eq!(civic.price, Some(14000));
        assert_eq!(civic.details["mileage"], "80,000 km");
    }

    #[tokio::test]
    async fn test_save_search() {
        let store = InMemoryListingStore::new();
        let criteria = Criteria::new().with("make", "Subaru");
        assert_eq!(store.save_search(&criteria).await.unwrap(), 1);
        assert_eq!(store.save_search(&Criteria::new()).await.unwrap(), 2);
        assert_eq!(store.searches().await[0].criteria, criteria);
    }
}
