use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use reqwest::Url;

use crate::bitbucket::{Auth, BitbucketConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.bitbucket.org";
pub const DEFAULT_CUSTOM_PROMPT: &str =
    "Please review the following diff for technical quality and best practices.";
pub const DEFAULT_EXCLUDE_PATTERNS: [&str; 2] = [r"\.md$", "^docs/"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Sqlite,
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bitbucket: BitbucketConfig,
    pub exclude_patterns: Vec<String>,
    pub custom_prompt: String,
    pub store_backend: StoreBackend,
    pub db_path: PathBuf,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any variable source; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{key} environment variable is required"));

        let base_url = var("BITBUCKET_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let base_url = Url::parse(&base_url)
            .with_context(|| format!("BITBUCKET_BASE_URL must be a valid URL, got {base_url:?}"))?;

        let auth = match (
            var("BITBUCKET_AUTH_TOKEN"),
            var("BITBUCKET_USERNAME"),
            var("BITBUCKET_PASSWORD"),
        ) {
            (Some(token), _, _) => Auth::Token(token),
            (None, Some(username), Some(password)) => Auth::Basic { username, password },
            _ => bail!(
                "No authentication method provided. Set either BITBUCKET_AUTH_TOKEN or \
                 BITBUCKET_USERNAME and BITBUCKET_PASSWORD"
            ),
        };

        let bitbucket = BitbucketConfig {
            base_url,
            project_key: required("BITBUCKET_PROJECT_KEY")?,
            repository_slug: required("BITBUCKET_REPOSITORY_SLUG")?,
            auth,
        };

        let exclude_patterns = parse_exclude_patterns(var("EXCLUDE_PATTERNS"));
        for pattern in &exclude_patterns {
            regex::Regex::new(pattern)
                .with_context(|| format!("EXCLUDE_PATTERNS contains an invalid regex: {pattern:?}"))?;
        }

        let custom_prompt =
            var("CUSTOM_PROMPT").unwrap_or_else(|| DEFAULT_CUSTOM_PROMPT.to_string());

        let store_backend = match var("REVIEW_STORE").as_deref().map(str::to_ascii_lowercase) {
            None => StoreBackend::Sqlite,
            Some(kind) if kind == "sqlite" => StoreBackend::Sqlite,
            Some(kind) if kind == "memory" => StoreBackend::Memory,
            Some(other) => {
                return Err(anyhow!(
                    "REVIEW_STORE must be `sqlite` or `memory`, got {other:?}"
                ))
            }
        };

        let db_path = var("REVIEW_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);

        let port = var("PORT")
            .unwrap_or_else(|| "3000".to_string())
            .parse::<u16>()
            .context("PORT must be a valid number")?;

        Ok(Config {
            bitbucket,
            exclude_patterns,
            custom_prompt,
            store_backend,
            db_path,
            port,
        })
    }
}

/// `EXCLUDE_PATTERNS` is a JSON array of regexes. Unset or unparsable values
/// fall back to the defaults.
pub fn parse_exclude_patterns(value: Option<String>) -> Vec<String> {
    let defaults = || DEFAULT_EXCLUDE_PATTERNS.iter().map(|p| p.to_string()).collect();

    match value {
        None => defaults(),
        Some(raw) => serde_json::from_str::<Vec<String>>(&raw).unwrap_or_else(|e| {
            tracing::warn!("EXCLUDE_PATTERNS is not a JSON string array ({}); using defaults", e);
            defaults()
        }),
    }
}

/// Platform data directory, or the working directory if none can be determined.
pub fn default_db_path() -> PathBuf {
    directories::ProjectDirs::from("", "", "pr-reviewer")
        .map(|dirs| dirs.data_dir().join("reviews.db"))
        .unwrap_or_else(|| PathBuf::from("pr-reviewer.db"))
}
