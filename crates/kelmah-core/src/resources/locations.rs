// ── Location search ──
//
// Type-ahead suggestions for the location field. Short TTL: suggestions
// are cheap to refetch and go stale quickly.

use std::time::Duration;

use kelmah_api::ApiRequest;
use serde::{Deserialize, Serialize};

use crate::normalize::PageRequest;
use crate::query::{QueryKey, QuerySpec};

pub const LOCATION_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSuggestion {
    #[serde(alias = "_id", alias = "placeId")]
    pub id: String,
    #[serde(alias = "name")]
    pub description: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default, alias = "lat")]
    pub latitude: Option<f64>,
    #[serde(default, alias = "lng")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationQuery {
    pub text: String,
    pub limit: u32,
}

impl LocationQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: 8,
        }
    }

    /// Case and surrounding whitespace do not change the suggestions.
    fn normalized_text(&self) -> String {
        self.text.trim().to_lowercase()
    }
}

impl QuerySpec for LocationQuery {
    type Item = LocationSuggestion;
    const COLLECTION: &'static str = "locations";

    fn key(&self) -> QueryKey {
        QueryKey::builder()
            .segment(self.normalized_text())
            .segment(self.limit)
            .build()
    }

    fn request(&self) -> ApiRequest {
        ApiRequest::get("locations/search")
            .param("q", self.normalized_text())
            .param("limit", self.limit)
    }

    fn page_request(&self) -> PageRequest {
        PageRequest {
            page: 1,
            limit: self.limit,
        }
    }

    fn ttl(&self) -> Option<Duration> {
        Some(LOCATION_TTL)
    }
}
