use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use time::UtcOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Zh,
    En,
}

impl Language {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "cn" => Some(Self::Zh),
            "en" | "en-us" => Some(Self::En),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecognitionConfig {
    pub api_key: String,
    pub model: String,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub language: Language,
}

impl RecognitionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub recognition: RecognitionConfig,
    pub daily_target_kcal: f64,
    /// Language of user-facing labels such as weekday names.
    pub language: Language,
    /// Offset used to bucket meals into calendar days.
    pub utc_offset: UtcOffset,
}

impl AppConfig {
    /// Reads configuration from the environment.
    ///
    /// Must run before any extra threads exist: on Unix the system UTC offset
    /// is only readable from a single-threaded process.
    pub fn from_env() -> anyhow::Result<Self> {
        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_else(|_| {
            tracing::warn!("GEMINI_API_KEY not set; recognition calls will fail");
            String::new()
        });

        let app_language = language_from_env("APP_LANGUAGE")?.unwrap_or(Language::Zh);
        let language = language_from_env("RECOGNITION_LANGUAGE")?.unwrap_or(app_language);

        let recognition = RecognitionConfig {
            api_key,
            model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-3-flash-preview".into()),
            endpoint: std::env::var("GEMINI_ENDPOINT")
                .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into()),
            timeout_secs: std::env::var("RECOGNITION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(30),
            language,
        };

        let daily_target_kcal = std::env::var("DAILY_TARGET_KCAL")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v > 0.0)
            .unwrap_or(2000.0);

        let utc_offset = resolve_utc_offset(
            std::env::var("UTC_OFFSET_MINUTES").ok(),
            || UtcOffset::current_local_offset().ok(),
        )?;

        Ok(Self {
            data_dir,
            recognition,
            daily_target_kcal,
            language: app_language,
            utc_offset,
        })
    }
}

fn language_from_env(var: &str) -> anyhow::Result<Option<Language>> {
    match std::env::var(var) {
        Ok(raw) => Language::parse(&raw)
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("unsupported {var}: {raw}")),
        Err(_) => Ok(None),
    }
}

/// `UTC_OFFSET_MINUTES` wins; otherwise the system offset, then UTC.
fn resolve_utc_offset(
    explicit: Option<String>,
    system: impl FnOnce() -> Option<UtcOffset>,
) -> anyhow::Result<UtcOffset> {
    if let Some(raw) = explicit {
        return offset_from_minutes(&raw);
    }
    match system() {
        Some(offset) => {
            tracing::info!(%offset, "using system UTC offset for calendar days");
            Ok(offset)
        }
        None => {
            tracing::warn!(
                "system UTC offset could not be determined; using UTC (set UTC_OFFSET_MINUTES to override)"
            );
            Ok(UtcOffset::UTC)
        }
    }
}

fn offset_from_minutes(raw: &str) -> anyhow::Result<UtcOffset> {
    let minutes: i32 = raw
        .trim()
        .parse()
        .map_err(|_| anyhow::anyhow!("UTC_OFFSET_MINUTES must be an integer, got {raw:?}"))?;
    UtcOffset::from_whole_seconds(minutes * 60)
        .map_err(|e| anyhow::anyhow!("UTC_OFFSET_MINUTES out of range: {e}"))
}
