use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A candidate reference image surfaced by search. Bytes are attached by the
/// fetch stage; score and rationale by the selection stage.
#[derive(Debug, Clone, Default)]
pub struct Candidate {
    pub url: String,
    pub description: Option<String>,
    pub image_data: Option<Vec<u8>>,
    pub matched_details: Option<String>,
    pub confidence_score: f32,
}

const SEARCH_ENDPOINT: &str = "https://api.tavily.com/search";
const MAX_RESULTS: u32 = 10;

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    include_images: bool,
    include_image_descriptions: bool,
    max_results: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    images: Vec<ImageEntry>,
}

/// The search service mixes `{url, description}` objects and bare URL
/// strings in the same array; anything else is skipped.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImageEntry {
    Described {
        #[serde(default)]
        url: String,
        #[serde(default)]
        description: Option<String>,
    },
    Bare(String),
    Other(serde_json::Value),
}

pub struct SearchClient {
    http: reqwest::Client,
    api_key: String,
}

impl SearchClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }

    /// Query the image search service; network and HTTP failures propagate
    /// to the workflow, which treats an unreachable search as fatal.
    pub async fn search(&self, query: &str) -> Result<Vec<Candidate>> {
        let request = SearchRequest {
            query,
            include_images: true,
            include_image_descriptions: true,
            max_results: MAX_RESULTS,
        };
        let response = self
            .http
            .post(SEARCH_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .context("image search request failed")?
            .error_for_status()
            .context("image search returned an error status")?
            .json::<SearchResponse>()
            .await
            .context("image search response was not valid JSON")?;

        Ok(response
            .images
            .into_iter()
            .filter_map(candidate_from_entry)
            .collect())
    }
}

fn candidate_from_entry(entry: ImageEntry) -> Option<Candidate> {
    let (url, description) = match entry {
        ImageEntry::Described { url, description } => (url, description),
        ImageEntry::Bare(url) => (url, None),
        ImageEntry::Other(_) => return None,
    };
    if url.is_empty() {
        return None;
    }
    Some(Candidate {
        url,
        description,
        ..Default::default()
    })
}
