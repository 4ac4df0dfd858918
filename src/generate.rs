use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AspectRatio, Resolution};
use crate::post::{self, GENERATION_MAX_DIMENSION};
use crate::prompts::{self, StyleSpec};
use crate::search::Candidate;
use crate::workflow::TokenUsage;

const GENERATION_MODEL: &str = "gemini-3-pro-image-preview";

/// What one generation call produced: raw image payloads, token counters,
/// and whatever text the model emitted alongside them.
pub struct GenerationOutput {
    pub images: Vec<Vec<u8>>,
    pub usage: TokenUsage,
    pub text: String,
}

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text { text: String },
    Inline { #[serde(rename = "inlineData")] inline_data: InlineData },
}

#[derive(Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: [&'static str; 2],
    #[serde(rename = "imageConfig")]
    image_config: ImageConfig,
}

#[derive(Serialize)]
struct ImageConfig {
    #[serde(rename = "aspectRatio")]
    aspect_ratio: &'static str,
    #[serde(rename = "imageSize")]
    image_size: &'static str,
}

#[derive(Deserialize, Default)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<ResponseCandidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize)]
struct ResponseCandidate {
    #[serde(default)]
    content: Option<ResponseContent>,
}

#[derive(Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "inlineData", alias = "inline_data", default)]
    inline_data: Option<ResponseInline>,
}

#[derive(Deserialize)]
struct ResponseInline {
    #[serde(default)]
    data: String,
}

#[derive(Deserialize, Default)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u64,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u64,
    #[serde(rename = "totalTokenCount", default)]
    total_token_count: u64,
}

pub struct Generator {
    http: reqwest::Client,
    api_key: String,
    api_base: String,
}

impl Generator {
    pub fn new(http: reqwest::Client, api_key: String, api_base: String) -> Self {
        Self {
            http,
            api_key,
            api_base,
        }
    }

    /// Run one multimodal generation call: task header, interleaved
    /// reference images, closing instructions. References that fail to
    /// re-encode are dropped from the request, not fatal.
    pub async fn generate(
        &self,
        references: &[Candidate],
        subject: &str,
        style: &StyleSpec,
        resolution: Resolution,
        aspect_ratio: AspectRatio,
    ) -> Result<GenerationOutput> {
        let mut parts = vec![Part::Text {
            text: prompts::generation_header(subject),
        }];
        for (i, reference) in references.iter().enumerate() {
            let Some(data) = &reference.image_data else {
                continue;
            };
            match post::optimize(data, GENERATION_MAX_DIMENSION) {
                Ok((mime_type, optimized)) => {
                    parts.push(Part::Text {
                        text: prompts::reference_label(i + 1),
                    });
                    parts.push(Part::Inline {
                        inline_data: InlineData {
                            mime_type,
                            data: BASE64.encode(&optimized),
                        },
                    });
                }
                Err(e) => {
                    warn!(url = %reference.url, error = %e, "dropping reference that failed to re-encode");
                }
            }
        }
        parts.push(Part::Text {
            text: prompts::generation_instructions(style),
        });

        if tracing::enabled!(tracing::Level::DEBUG) {
            let prompt_text: String = parts
                .iter()
                .filter_map(|p| match p {
                    Part::Text { text } => Some(text.as_str()),
                    Part::Inline { .. } => None,
                })
                .collect();
            debug!(
                aspect_ratio = aspect_ratio.as_str(),
                image_size = resolution.size_token(),
                prompt = %prompt_text,
                "generation request"
            );
        }

        let request = GenerateRequest {
            contents: vec![Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                response_modalities: ["IMAGE", "TEXT"],
                image_config: ImageConfig {
                    aspect_ratio: aspect_ratio.as_str(),
                    image_size: resolution.size_token(),
                },
            },
        };

        let url = format!(
            "{}/models/{}:generateContent",
            self.api_base, GENERATION_MODEL
        );
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .context("generation request failed")?;

        let status = response.status();
        let raw = response
            .text()
            .await
            .context("generation response could not be read")?;
        debug!(%status, response = %raw, "generation response");
        if !status.is_success() {
            bail!("generation service returned HTTP {status}: {raw}");
        }

        let parsed: GenerateResponse =
            serde_json::from_str(&raw).context("generation response was not valid JSON")?;
        Ok(extract_output(parsed))
    }
}

/// Pull every inline image payload and every text fragment out of the first
/// candidate's parts; token counters default to zero when absent.
fn extract_output(response: GenerateResponse) -> GenerationOutput {
    let mut images = Vec::new();
    let mut text = String::new();
    if let Some(candidate) = response.candidates.into_iter().next() {
        if let Some(content) = candidate.content {
            for part in content.parts {
                if let Some(inline) = part.inline_data {
                    match BASE64.decode(inline.data.as_bytes()) {
                        Ok(bytes) if !bytes.is_empty() => images.push(bytes),
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "discarding undecodable inline image payload");
                        }
                    }
                }
                if let Some(fragment) = part.text {
                    text.push_str(&fragment);
                }
            }
        }
    }

    let usage = response
        .usage_metadata
        .map(|u| TokenUsage {
            input: u.prompt_token_count,
            output: u.candidates_token_count,
            total: u.total_token_count,
        })
        .unwrap_or_default();

    GenerationOutput {
        images,
        usage,
        text,
    }
}
