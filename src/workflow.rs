use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use crate::config::{AspectRatio, Config, Resolution};
use crate::fetch::FetchClient;
use crate::generate::Generator;
use crate::io::{self, REFS_DIR};
use crate::prompts::StyleSpec;
use crate::search::SearchClient;
use crate::select::{self, Selector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
    pub total: u64,
}

/// The run's sole observable output, serialized once to stdout.
#[derive(Debug, Serialize)]
pub struct GenerationResult {
    pub status: Status,
    pub files: Vec<String>,
    pub reference_images: Vec<String>,
    pub token_usage: TokenUsage,
    pub message: String,
}

impl GenerationResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            files: Vec::new(),
            reference_images: Vec::new(),
            token_usage: TokenUsage::default(),
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| {
            format!("{{\"status\": \"error\", \"message\": \"result serialization failed: {e}\"}}")
        })
    }
}

/// Everything one run needs beyond the static configuration.
pub struct RunParams {
    pub subject: String,
    pub style: StyleSpec,
    pub resolution: Resolution,
    pub aspect_ratio: AspectRatio,
    pub output_dir: PathBuf,
}

/// Owns the stage clients and sequences the pipeline: search, fetch,
/// select, generate, save. Stage-fatal conditions short-circuit into an
/// error result; per-item failures are logged and skipped inside the
/// stages themselves.
pub struct Studio {
    search: SearchClient,
    fetch: FetchClient,
    selector: Selector,
    generator: Generator,
    missing_keys: Vec<&'static str>,
}

impl Studio {
    pub fn new(config: &Config) -> Self {
        let http = reqwest::Client::new();
        Self {
            search: SearchClient::new(http.clone(), config.tavily_key.clone().unwrap_or_default()),
            fetch: FetchClient::new(
                http.clone(),
                config.scrapeninja_key.clone().unwrap_or_default(),
            ),
            selector: Selector::new(
                http.clone(),
                config.anthropic_key.clone().unwrap_or_default(),
            ),
            generator: Generator::new(
                http,
                config.gemini_key.clone().unwrap_or_default(),
                config.gemini_api_base.clone(),
            ),
            missing_keys: config.missing_keys(),
        }
    }

    pub async fn run(&self, params: &RunParams) -> GenerationResult {
        if let Err(problems) = self.preflight(&params.output_dir).await {
            return GenerationResult::error(format!("Preflight failed:\n{problems}"));
        }

        info!("Step 1/5: searching for reference images");
        let candidates = match self.search.search(&params.subject).await {
            Ok(candidates) => candidates,
            Err(e) => return GenerationResult::error(format!("Image search failed: {e:#}")),
        };
        if candidates.is_empty() {
            return GenerationResult::error(format!(
                "No reference images found for: '{}'",
                params.subject
            ));
        }
        info!(count = candidates.len(), "found candidates");

        info!("Step 2/5: fetching reference images");
        let mut fetched = Vec::new();
        for mut candidate in candidates {
            match self.fetch.fetch(&candidate.url).await {
                Ok(bytes) => {
                    info!(url = %candidate.url, "fetched candidate");
                    candidate.image_data = Some(bytes);
                    fetched.push(candidate);
                }
                Err(e) => {
                    warn!(url = %candidate.url, error = %format!("{e:#}"), "failed to fetch candidate");
                }
            }
        }
        if fetched.is_empty() {
            return GenerationResult::error("Failed to fetch any reference images");
        }
        info!(count = fetched.len(), "fetched images");

        info!("Step 3/5: selecting reference images");
        let references = self
            .selector
            .select(fetched, &params.subject, select::MIN_SCORE)
            .await;
        info!(count = references.len(), "selected references");

        info!("Step 4/5: generating image");
        let output = match self
            .generator
            .generate(
                &references,
                &params.subject,
                &params.style,
                params.resolution,
                params.aspect_ratio,
            )
            .await
        {
            Ok(output) => output,
            Err(e) => return GenerationResult::error(format!("Image generation failed: {e:#}")),
        };
        if output.images.is_empty() {
            return GenerationResult::error(format!(
                "Generation service returned no images. Response: {}",
                output.text
            ));
        }
        info!(count = output.images.len(), "generated images");

        info!("Step 5/5: saving outputs");
        let (files, reference_files) =
            match io::save_outputs(&output.images, &references, &params.output_dir).await {
                Ok(paths) => paths,
                Err(e) => return GenerationResult::error(format!("Failed to save outputs: {e:#}")),
            };

        GenerationResult {
            status: Status::Success,
            message: format!("Generated {} image(s)", files.len()),
            files: files.iter().map(|p| p.display().to_string()).collect(),
            reference_images: reference_files
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
            token_usage: output.usage,
        }
    }

    /// Validate credentials and output paths before any external call.
    /// Problems are accumulated so the caller sees the complete list.
    async fn preflight(&self, output_dir: &Path) -> Result<(), String> {
        let mut problems: Vec<String> = self
            .missing_keys
            .iter()
            .map(|key| format!("{key} not set"))
            .collect();
        if let Err(e) = tokio::fs::create_dir_all(output_dir.join(REFS_DIR)).await {
            problems.push(format!("Cannot create output directory: {e}"));
        }
        if problems.is_empty() {
            Ok(())
        } else {
            Err(problems
                .iter()
                .map(|p| format!("- {p}"))
                .collect::<Vec<_>>()
                .join("\n"))
        }
    }
}
