use clap::ValueEnum;

const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Credentials and endpoints for the four external services, loaded once at
/// startup and passed by reference into each stage client.
#[derive(Debug, Clone)]
pub struct Config {
    pub tavily_key: Option<String>,
    pub scrapeninja_key: Option<String>,
    pub gemini_key: Option<String>,
    pub anthropic_key: Option<String>,
    pub gemini_api_base: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            tavily_key: non_empty_env("TAVILY_API_KEY"),
            scrapeninja_key: non_empty_env("SCRAPENINJA_API_KEY"),
            gemini_key: non_empty_env("GEMINI_API_KEY"),
            anthropic_key: non_empty_env("ANTHROPIC_API_KEY"),
            gemini_api_base: non_empty_env("GEMINI_API_BASE")
                .map(|v| v.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
        }
    }

    /// Names of required credentials that are not set, in preflight order.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.tavily_key.is_none() {
            missing.push("TAVILY_API_KEY");
        }
        if self.scrapeninja_key.is_none() {
            missing.push("SCRAPENINJA_API_KEY");
        }
        if self.gemini_key.is_none() {
            missing.push("GEMINI_API_KEY");
        }
        if self.anthropic_key.is_none() {
            missing.push("ANTHROPIC_API_KEY");
        }
        missing
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Output resolution, mapped to the generation service's size tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Resolution {
    #[value(name = "1k")]
    OneK,
    #[value(name = "2k")]
    TwoK,
    #[value(name = "4k")]
    FourK,
}

impl Resolution {
    pub fn size_token(self) -> &'static str {
        match self {
            Resolution::OneK => "1K",
            Resolution::TwoK => "2K",
            Resolution::FourK => "4K",
        }
    }
}

/// Output aspect ratio, passed through to the generation service verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AspectRatio {
    #[value(name = "1:1")]
    Square,
    #[value(name = "4:3")]
    FourThree,
    #[value(name = "3:4")]
    ThreeFour,
    #[value(name = "16:9")]
    SixteenNine,
    #[value(name = "9:16")]
    NineSixteen,
    #[value(name = "21:9")]
    TwentyOneNine,
    #[value(name = "3:2")]
    ThreeTwo,
    #[value(name = "2:3")]
    TwoThree,
}

impl AspectRatio {
    pub fn as_str(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::FourThree => "4:3",
            AspectRatio::ThreeFour => "3:4",
            AspectRatio::SixteenNine => "16:9",
            AspectRatio::NineSixteen => "9:16",
            AspectRatio::TwentyOneNine => "21:9",
            AspectRatio::ThreeTwo => "3:2",
            AspectRatio::TwoThree => "2:3",
        }
    }
}
