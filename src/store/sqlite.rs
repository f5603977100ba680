//! SQLite-backed listing store

use crate::error::RecommendationError;
use crate::models::{Criteria, Details, Listing, ListingId, NewListing};
use crate::store::ListingStore;
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub struct SqliteListingStore {
    pool: SqlitePool,
    schema_ready: Arc<OnceCell<()>>,
}

impl SqliteListingStore {
    /// Open (creating if needed) the database file at `path`
    pub async fn connect(path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                RecommendationError::DatabaseError(format!("Failed to open {}: {}", path, e))
            })?;

        info!(path = %path, "Listing store backend: sqlite");
        Ok(Self::from_pool(pool))
    }

    /// Private in-memory database; a single connection keeps it alive
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS cars (
                      id INTEGER PRIMARY KEY AUTOINCREMENT,
                      source TEXT NOT NULL,
                      year INTEGER,
                      make TEXT,
                      model TEXT,
                      price INTEGER,
                      url TEXT,
                      details TEXT,
                      scraped_at TIMESTAMP,
                      analysis TEXT,
                      analysis_timestamp TIMESTAMP
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS search_criteria (
                      id INTEGER PRIMARY KEY AUTOINCREMENT,
                      criteria TEXT NOT NULL,
                      created_at TIMESTAMP
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                RecommendationError::DatabaseError(format!(
                    "Failed to initialize listing schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

fn listing_from_row(row: &SqliteRow) -> Result<Listing> {
    let id: ListingId = row.try_get("id")?;
    let year: Option<i64> = row.try_get("year")?;
    let raw_details: Option<String> = row.try_get("details")?;

    Ok(Listing {
        id,
        source: row.try_get("source")?,
        year: year.and_then(|y| i32::try_from(y).ok()),
        make: row.try_get("make")?,
        model: row.try_get("model")?,
        price: row.try_get("price")?,
        url: row.try_get::<Option<String>, _>("url")?.unwrap_or_default(),
        details: parse_details(id, raw_details.as_deref()),
        scraped_at: row
            .try_get::<Option<DateTime<Utc>>, _>("scraped_at")?
            .unwrap_or_else(Utc::now),
        analysis: row.try_get("analysis")?,
        analysis_timestamp: row.try_get("analysis_timestamp")?,
    })
}

fn parse_details(listing_id: ListingId, raw: Option<&str>) -> Details {
    match raw.filter(|r| !r.trim().is_empty()) {
        None => Details::new(),
        Some(raw) => serde_json::from_str(raw).unwrap_or_else(|e| {
            warn!(listing_id, error = %e, "Stored details are not a JSON object, ignoring");
            Details::new()
        }),
    }
}

#[async_trait::async_trait]
impl ListingStore for SqliteListingStore {
    async fn find(&self, criteria: &Criteria, max_count: usize) -> Result<Vec<Listing>> {
        self.ensure_schema().await?;

        let mut query = QueryBuilder::<Sqlite>::new("SELECT * FROM cars WHERE 1 = 1");

        if let Some(make) = criteria.make() {
            query.push(" AND make LIKE ").push_bind(format!("%{}%", make));
        }
        if let Some(model) = criteria.model() {
            query.push(" AND model LIKE ").push_bind(format!("%{}%", model));
        }
        if let Some(min_year) = criteria.min_year() {
            query.push(" AND year >= ").push_bind(min_year);
        }
        if let Some(max_year) = criteria.max_year() {
            query.push(" AND year <= ").push_bind(max_year);
        }
        if let Some(max_price) = criteria.max_price() {
            query.push(" AND price <= ").push_bind(max_price);
        }
        if let Some(min_price) = criteria.min_price() {
            query.push(" AND price >= ").push_bind(min_price);
        }

        query
            .push(" ORDER BY scraped_at DESC, id ASC LIMIT ")
            .push_bind(i64::try_from(max_count).unwrap_or(i64::MAX));

        let rows = query.build().fetch_all(&self.pool).await.map_err(|e| {
            RecommendationError::DatabaseError(format!("Failed to query listings: {}", e))
        })?;

        debug!(count = rows.len(), "Listings matched criteria");

        rows.iter().map(listing_from_row).collect()
    }

    async fn save_analysis(&self, listing_id: ListingId, analysis: &str) -> Result<bool> {
        self.ensure_schema().await?;

        let result = sqlx::query(
            "UPDATE cars SET analysis = ?, analysis_timestamp = ? WHERE id = ?",
        )
        .bind(analysis)
        .bind(Utc::now())
        .bind(listing_id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RecommendationError::DatabaseError(format!("Failed to update listing analysis: {}", e))
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn add_listings(&self, listings: Vec<NewListing>) -> Result<usize> {
        self.ensure_schema().await?;

        let mut tx = self.pool.begin().await?;
        let mut added = 0;

        for listing in listings {
            let details = serde_json::to_string(&listing.details)?;
            let scraped_at = listing.scraped_at.unwrap_or_else(Utc::now);

            let existing: Option<ListingId> = sqlx::query_scalar(
                r#"
                SELECT id FROM cars
                WHERE source = ? AND year IS ? AND make IS ? AND model IS ? AND url = ?
                "#,
            )
            .bind(&listing.source)
            .bind(listing.year)
            .bind(&listing.make)
            .bind(&listing.model)
            .bind(&listing.url)
            .fetch_optional(&mut *tx)
            .await?;

            match existing {
                Some(id) => {
                    sqlx::query(
                        "UPDATE cars SET price = ?, details = ?, scraped_at = ? WHERE id = ?",
                    )
                    .bind(listing.price)
                    .bind(&details)
                    .bind(scraped_at)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO cars (source, year, make, model, price, url, details, scraped_at)
                        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&listing.source)
                    .bind(listing.year)
                    .bind(&listing.make)
                    .bind(&listing.model)
                    .bind(listing.price)
                    .bind(&listing.url)
                    .bind(&details)
                    .bind(scraped_at)
                    .execute(&mut *tx)
                    .await?;
                    added += 1;
                }
            }
        }

        tx.commit().await?;
        info!(added, "Stored scraped listings");

        Ok(added)
    }

    async fn get_listing(&self, listing_id: ListingId) -> Result<Option<Listing>> {
        self.ensure_schema().await?;

        let row = sqlx::query("SELECT * FROM cars WHERE id = ?")
            .bind(listing_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(listing_from_row).transpose()
    }

    async fn save_search(&self, criteria: &Criteria) -> Result<i64> {
        self.ensure_schema().await?;

        let result = sqlx::query("INSERT INTO search_criteria (criteria, created_at) VALUES (?, ?)")
            .bind(serde_json::to_string(criteria)?)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }
}
