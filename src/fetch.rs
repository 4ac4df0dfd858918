use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

const FETCH_ENDPOINT: &str = "https://scrapeninja.p.rapidapi.com/scrape";
const FETCH_HOST: &str = "scrapeninja.p.rapidapi.com";
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct FetchRequest<'a> {
    url: &'a str,
    method: &'a str,
    #[serde(rename = "retryNum")]
    retry_num: u32,
    geo: &'a str,
}

#[derive(Deserialize)]
struct FetchResponse {
    /// Base64-encoded response body; absent when the proxy could not reach
    /// the target.
    body: Option<String>,
}

pub struct FetchClient {
    http: reqwest::Client,
    api_key: String,
}

impl FetchClient {
    pub fn new(http: reqwest::Client, api_key: String) -> Self {
        Self { http, api_key }
    }

    /// Retrieve one URL through the fetch proxy. Failures here are per-item:
    /// the workflow logs them and moves on to the next candidate.
    pub async fn fetch(&self, image_url: &str) -> Result<Vec<u8>> {
        let request = FetchRequest {
            url: image_url,
            method: "GET",
            retry_num: 1,
            geo: "us",
        };
        let response = self
            .http
            .post(FETCH_ENDPOINT)
            .header("X-RapidAPI-Key", &self.api_key)
            .header("X-RapidAPI-Host", FETCH_HOST)
            .timeout(FETCH_TIMEOUT)
            .json(&request)
            .send()
            .await
            .context("fetch proxy request failed")?
            .json::<FetchResponse>()
            .await
            .context("fetch proxy response was not valid JSON")?;

        decode_body(response)
    }
}

fn decode_body(response: FetchResponse) -> Result<Vec<u8>> {
    let Some(body) = response.body else {
        bail!("fetch proxy response has no body field");
    };
    BASE64
        .decode(body.as_bytes())
        .context("fetch proxy body is not valid base64")
}
