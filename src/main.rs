use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod config;
mod fetch;
mod generate;
mod io;
mod post;
mod prompts;
mod search;
mod select;
mod workflow;

use config::{AspectRatio, Config, Resolution};
use prompts::{CreationNeeds, StyleSpec};
use workflow::{RunParams, Studio};

/// AI-powered product image generation: search the web for reference
/// photos, pick the best matches, and generate a product image from them.
#[derive(Debug, Parser)]
#[command(name = "prodgen", version, about)]
struct Cli {
    /// Product/component description used for search and generation
    #[arg(long)]
    subject: String,

    /// Free-form format and style directives
    #[arg(long, default_value = "", conflicts_with = "creation_needs")]
    style_instructions: String,

    /// Structured style directives as JSON, e.g.
    /// {"colors":["matte black"],"style":"line art","labels":["560H"],"layout_sketch":null}
    #[arg(long, value_parser = parse_creation_needs)]
    creation_needs: Option<CreationNeeds>,

    /// Output resolution
    #[arg(long, value_enum, default_value = "1k")]
    resolution: Resolution,

    /// Output aspect ratio
    #[arg(long, value_enum, default_value = "21:9")]
    aspect_ratio: AspectRatio,

    /// Output directory
    #[arg(long, default_value = "assets/generated/")]
    output: PathBuf,

    /// Echo prompts and raw service responses to stderr
    #[arg(long)]
    debug: bool,
}

fn parse_creation_needs(raw: &str) -> Result<CreationNeeds, String> {
    serde_json::from_str(raw).map_err(|e| format!("invalid creation needs JSON: {e}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();

    // Stdout carries exactly one JSON result per run; everything else goes
    // to stderr through tracing.
    let filter = if cli.debug {
        EnvFilter::new("prodgen=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    let studio = Studio::new(&config);

    let style = match cli.creation_needs {
        Some(needs) => StyleSpec::Structured(needs),
        None if cli.style_instructions.is_empty() => StyleSpec::None,
        None => StyleSpec::Freeform(cli.style_instructions),
    };

    let params = RunParams {
        subject: cli.subject,
        style,
        resolution: cli.resolution,
        aspect_ratio: cli.aspect_ratio,
        output_dir: cli.output,
    };

    let result = studio.run(&params).await;
    println!("{}", result.to_json());
    if result.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_enumerated_resolution_and_ratio() {
        let base = ["prodgen", "--subject", "widget"];

        assert!(Cli::try_parse_from(base).is_ok());
        assert!(Cli::try_parse_from(
            base.iter().copied().chain(["--resolution", "2k"])
        )
        .is_ok());
        assert!(Cli::try_parse_from(
            base.iter().copied().chain(["--resolution", "8k"])
        )
        .is_err());
        assert!(Cli::try_parse_from(
            base.iter().copied().chain(["--aspect-ratio", "16:9"])
        )
        .is_ok());
        assert!(Cli::try_parse_from(
            base.iter().copied().chain(["--aspect-ratio", "7:5"])
        )
        .is_err());
    }

    #[test]
    fn style_flags_are_mutually_exclusive() {
        assert!(Cli::try_parse_from([
            "prodgen",
            "--subject",
            "widget",
            "--style-instructions",
            "flat lay",
            "--creation-needs",
            r#"{"colors":["red"]}"#,
        ])
        .is_err());
    }

    #[test]
    fn creation_needs_must_be_valid_json() {
        assert!(Cli::try_parse_from([
            "prodgen",
            "--subject",
            "widget",
            "--creation-needs",
            r#"{"colors":["red"]}"#,
        ])
        .is_ok());
        assert!(Cli::try_parse_from([
            "prodgen",
            "--subject",
            "widget",
            "--creation-needs",
            "not json",
        ])
        .is_err());
    }

    #[test]
    fn defaults_match_the_documented_surface() {
        let cli = Cli::try_parse_from(["prodgen", "--subject", "widget"]).unwrap();
        assert_eq!(cli.resolution, Resolution::OneK);
        assert_eq!(cli.aspect_ratio, AspectRatio::TwentyOneNine);
        assert_eq!(cli.output, PathBuf::from("assets/generated/"));
        assert!(cli.style_instructions.is_empty());
        assert!(cli.creation_needs.is_none());
        assert!(!cli.debug);
    }
}
