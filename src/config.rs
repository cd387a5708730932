use crate::ai::transport::DEFAULT_API_ENDPOINT;
use anyhow::{Context, Result};
use std::path::PathBuf;
use url::Url;

pub const API_KEY_ENV: &str = "AI_API_KEY";
pub const API_ENDPOINT_ENV: &str = "AI_API_ENDPOINT";
pub const SETTINGS_PATH_ENV: &str = "SUMMARIZER_SETTINGS";
pub const DEFAULT_SETTINGS_FILE: &str = "summarizer-settings.json";

/// Process configuration: where settings live and which endpoint to call.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub endpoint: Url,
    /// Credential from the environment, used when settings hold none.
    pub env_api_key: Option<String>,
    pub settings_path: PathBuf,
}

impl AppConfig {
    /// Environment first, explicit overrides on top.
    pub fn resolve(endpoint: Option<&str>, settings_path: Option<PathBuf>) -> Result<Self> {
        let endpoint = endpoint
            .map(str::to_string)
            .or_else(|| std::env::var(API_ENDPOINT_ENV).ok())
            .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string());
        let endpoint = Url::parse(&endpoint)
            .with_context(|| format!("Invalid completion endpoint: {}", endpoint))?;

        let settings_path = match settings_path {
            Some(path) => path,
            None => match std::env::var(SETTINGS_PATH_ENV) {
                Ok(path) => PathBuf::from(path),
                Err(_) => std::env::current_dir()
                    .context("Failed to get current_dir")?
                    .join(DEFAULT_SETTINGS_FILE),
            },
        };

        Ok(Self {
            endpoint,
            env_api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty()),
            settings_path,
        })
    }
}
