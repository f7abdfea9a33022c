use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::completion::openrouter::{DEFAULT_API_URL, DEFAULT_MODEL};
use crate::document::DEFAULT_MAX_UPLOAD_BYTES;

const DEFAULT_PORT: u16 = 3000;

/// Runtime settings, read from the environment (and `.env`, loaded by `main`).
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential for the completion API. Never leaves the server.
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub db_path: PathBuf,
    pub port: u16,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_key = lookup("OPENROUTER_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .context("OPENROUTER_API_KEY must be set")?;

        // We use ~/.buddi/buddi.db unless told otherwise
        let db_path = match lookup("BUDDI_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => {
                let home_dir = lookup("HOME").unwrap_or_else(|| ".".into());
                PathBuf::from(home_dir).join(".buddi").join("buddi.db")
            }
        };

        let port = match lookup("BUDDI_PORT") {
            Some(port) => port
                .parse()
                .with_context(|| format!("Invalid BUDDI_PORT: {}", port))?,
            None => DEFAULT_PORT,
        };

        let max_upload_bytes = match lookup("BUDDI_MAX_UPLOAD_BYTES") {
            Some(size) => size
                .parse()
                .with_context(|| format!("Invalid BUDDI_MAX_UPLOAD_BYTES: {}", size))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            api_key,
            api_url: lookup("BUDDI_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            model: lookup("BUDDI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            db_path,
            port,
            max_upload_bytes,
        })
    }
}
