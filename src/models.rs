//! Core data models for the car recommender

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use tracing::warn;

/// Store-assigned listing identifier
pub type ListingId = i64;

/// Free-form listing details, kept in the order the source produced them
pub type Details = Map<String, Value>;

/// Placeholder rendered for any missing listing field
pub const UNKNOWN: &str = "Unknown";

//
// ================= Listing =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Listing {
    pub id: ListingId,
    pub source: String,
    pub year: Option<i32>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub price: Option<i64>,
    pub url: String,
    #[serde(default)]
    pub details: Details,
    pub scraped_at: DateTime<Utc>,
    #[serde(default)]
    pub analysis: Option<String>,
    #[serde(default)]
    pub analysis_timestamp: Option<DateTime<Utc>>,
}

impl Listing {
    /// Only listings carrying non-empty analysis take part in ranking
    pub fn is_analyzed(&self) -> bool {
        self.analysis.as_deref().is_some_and(|a| !a.is_empty())
    }

    pub fn year_or_unknown(&self) -> String {
        self.year
            .map(|y| y.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn make_or_unknown(&self) -> &str {
        self.make.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn model_or_unknown(&self) -> &str {
        self.model.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn price_or_unknown(&self) -> String {
        self.price
            .map(|p| p.to_string())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// `"{year} {make} {model}"`, the string looked up in ranking text
    pub fn identifier(&self) -> String {
        format!(
            "{} {} {}",
            self.year_or_unknown(),
            self.make_or_unknown(),
            self.model_or_unknown()
        )
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - ${}", self.identifier(), self.price_or_unknown())
    }
}

/// A scraped listing that has not been stored yet
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewListing {
    pub source: String,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub price: Option<i64>,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub details: Details,
    #[serde(default)]
    pub scraped_at: Option<DateTime<Utc>>,
}

impl NewListing {
    /// Listings with the same key are the same vehicle seen again
    pub fn same_vehicle(&self, other: &Listing) -> bool {
        self.source == other.source
            && self.year == other.year
            && self.make == other.make
            && self.model == other.model
            && self.url == other.url
    }
}

//
// ================= Criteria =================
//

/// Caller-supplied filters and preferences.
///
/// Recognised filter keys are `make`, `model`, `min_year`, `max_year`,
/// `min_price` and `max_price`; every other key is a free-form preference.
/// Key order is preserved because it shapes prompt text.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Criteria(Map<String, Value>);

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode criteria from their JSON wire form.
    ///
    /// Absent, malformed or non-object input degrades to empty criteria.
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
            return Self::new();
        };

        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::from_value(value),
            Err(e) => {
                warn!(error = %e, "Invalid JSON criteria provided, using empty criteria");
                Self::new()
            }
        }
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self(map),
            Value::Null => Self::new(),
            other => {
                warn!(kind = %json_kind(&other), "Criteria must be a JSON object, using empty criteria");
                Self::new()
            }
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All keys in caller order, filters included
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn make(&self) -> Option<&str> {
        self.text("make")
    }

    pub fn model(&self) -> Option<&str> {
        self.text("model")
    }

    pub fn min_year(&self) -> Option<i64> {
        self.number("min_year")
    }

    pub fn max_year(&self) -> Option<i64> {
        self.number("max_year")
    }

    pub fn min_price(&self) -> Option<i64> {
        self.number("min_price")
    }

    pub fn max_price(&self) -> Option<i64> {
        self.number("max_price")
    }

    /// Whether a listing passes the recognised filters
    pub fn matches(&self, listing: &Listing) -> bool {
        let contains = |field: &Option<String>, needle: Option<&str>| match needle {
            None => true,
            Some(needle) => field
                .as_deref()
                .is_some_and(|f| f.to_lowercase().contains(&needle.to_lowercase())),
        };
        let at_least = |field: Option<i64>, bound: Option<i64>| match bound {
            None => true,
            Some(bound) => field.is_some_and(|v| v >= bound),
        };
        let at_most = |field: Option<i64>, bound: Option<i64>| match bound {
            None => true,
            Some(bound) => field.is_some_and(|v| v <= bound),
        };

        let year = listing.year.map(i64::from);

        contains(&listing.make, self.make())
            && contains(&listing.model, self.model())
            && at_least(year, self.min_year())
            && at_most(year, self.max_year())
            && at_least(listing.price, self.min_price())
            && at_most(listing.price, self.max_price())
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    // Numeric filters arrive as numbers or numeric strings from form posts.
    fn number(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Render a JSON value the way it should read inside prompt text
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => UNKNOWN.to_string(),
        other => other.to_string(),
    }
}

//
// ================= Search history =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRecord {
    pub id: i64,
    pub criteria: Criteria,
    pub created_at: DateTime<Utc>,
}
