// ── Worker search ──

use kelmah_api::ApiRequest;
use serde::{Deserialize, Serialize};

use crate::normalize::PageRequest;
use crate::query::{QueryKey, QuerySpec};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Worker {
    #[serde(alias = "_id", alias = "userId")]
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default, alias = "title")]
    pub profession: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub rating: Option<f64>,
    #[serde(default)]
    pub hourly_rate: Option<f64>,
    #[serde(default)]
    pub is_verified: bool,
}

impl Worker {
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(name), None) | (None, Some(name)) => name.clone(),
            (None, None) => self.id.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSearch {
    pub query: Option<String>,
    pub location: Option<String>,
    pub skills: Vec<String>,
    pub page: u32,
    pub limit: u32,
}

impl Default for WorkerSearch {
    fn default() -> Self {
        Self {
            query: None,
            location: None,
            skills: Vec::new(),
            page: 1,
            limit: 20,
        }
    }
}

impl WorkerSearch {
    /// Blank inputs count as absent so they do not fragment the cache.
    fn trimmed(value: Option<&String>) -> Option<&str> {
        value.map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    fn sorted_skills(&self) -> Vec<&str> {
        let mut skills: Vec<&str> = self
            .skills
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        skills.sort_unstable();
        skills.dedup();
        skills
    }
}

impl QuerySpec for WorkerSearch {
    type Item = Worker;
    const COLLECTION: &'static str = "workers";

    fn key(&self) -> QueryKey {
        QueryKey::builder()
            .optional(Self::trimmed(self.query.as_ref()))
            .optional(Self::trimmed(self.location.as_ref()))
            .set(self.sorted_skills())
            .segment(self.page)
            .segment(self.limit)
            .build()
    }

    fn request(&self) -> ApiRequest {
        let skills = self.sorted_skills();
        let skills = (!skills.is_empty()).then(|| skills.join(","));
        ApiRequest::get("workers/search")
            .param_opt("query", Self::trimmed(self.query.as_ref()))
            .param_opt("location", Self::trimmed(self.location.as_ref()))
            .param_opt("skills", skills)
            .param("page", self.page)
            .param("limit", self.limit)
    }

    fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            limit: self.limit,
        }
    }
}
