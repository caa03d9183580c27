// exercise-tutor/crates/exercise-tutor/src/config.rs

use anyhow::{Context, Result};
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::error::TutorError;
use crate::task::DEFAULT_TASK;

#[derive(Debug, Clone)]
pub struct Config {
    pub ledger_uri: String,
    pub db_name: String,
    pub collection_name: String,
    pub openai_api_key: String,
    pub api_host: String,
    pub api_port: u16,
    pub corpus_dir: PathBuf,
    pub index_dir: PathBuf,
    pub chat_base_url: String,
    pub chat_model: String,
    pub chat_temperature: f32,
    pub retrieval_top_k: usize,
    pub python_bin: String,
    pub exec_timeout_seconds: u64,
    pub task_description: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        load_dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    ///
    /// `LEDGER_URI`, `DB_NAME`, `COLLECTION_NAME` and `OPENAI_API_KEY` have no
    /// defaults; a missing or blank value aborts startup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .with_context(|| format!("{} environment variable not set. Please set it in your .env file", key))
        };
        let optional = |key: &str, default: &str| -> String {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let ledger_uri = required("LEDGER_URI")?;
        let db_name = required("DB_NAME")?;
        let collection_name = required("COLLECTION_NAME")?;
        let openai_api_key = required("OPENAI_API_KEY")?;

        if !is_identifier(&collection_name) {
            return Err(TutorError::InvalidConfig(format!(
                "COLLECTION_NAME must be a plain identifier (letters, digits, underscore), got: {}",
                collection_name
            ))
            .into());
        }
        if db_name.contains(['/', '\\']) || db_name.starts_with('.') {
            return Err(TutorError::InvalidConfig(format!(
                "DB_NAME must not contain path separators, got: {}",
                db_name
            ))
            .into());
        }

        let task_description = lookup("TASK_DESCRIPTION")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_TASK.to_string());

        let config = Self {
            ledger_uri,
            db_name,
            collection_name,
            openai_api_key,
            api_host: optional("API_HOST", "127.0.0.1"),
            api_port: optional("API_PORT", "7860")
                .parse()
                .context("API_PORT must be a port number")?,
            corpus_dir: PathBuf::from(optional("CORPUS_DIR", "./data")),
            index_dir: PathBuf::from(optional("INDEX_DIR", "./storage")),
            chat_base_url: optional("CHAT_BASE_URL", "https://api.openai.com")
                .trim_end_matches('/')
                .to_string(),
            chat_model: optional("CHAT_MODEL", "gpt-3.5-turbo"),
            chat_temperature: optional("CHAT_TEMPERATURE", "0.1")
                .parse()
                .context("CHAT_TEMPERATURE must be a number")?,
            retrieval_top_k: optional("RETRIEVAL_TOP_K", "2")
                .parse()
                .context("RETRIEVAL_TOP_K must be a positive integer")?,
            python_bin: optional("PYTHON_BIN", "python3"),
            exec_timeout_seconds: optional("EXEC_TIMEOUT_SECONDS", "30")
                .parse()
                .context("EXEC_TIMEOUT_SECONDS must be a whole number of seconds")?,
            task_description,
        };

        if config.retrieval_top_k == 0 {
            warn!("RETRIEVAL_TOP_K is 0; answers will not be grounded in the corpus");
        }

        Ok(config)
    }

    pub fn print_config(&self) {
        info!("Current Configuration:");
        info!("- Ledger URI: {}", self.ledger_uri);
        info!("- Ledger Database: {}", self.db_name);
        info!("- Ledger Collection: {}", self.collection_name);
        info!("- API Key: {}", redact(&self.openai_api_key));
        info!("- API: {}:{}", self.api_host, self.api_port);
        info!("- Corpus Dir: {}", self.corpus_dir.display());
        info!("- Index Dir: {}", self.index_dir.display());
        info!("- Chat Backend: {} ({})", self.chat_base_url, self.chat_model);
        info!("- Retrieval Top K: {}", self.retrieval_top_k);
        info!("- Python: {} (timeout {}s)", self.python_bin, self.exec_timeout_seconds);
    }

    pub fn api_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.api_host, self.api_port)
            .parse()
            .with_context(|| format!("Invalid API address {}:{}", self.api_host, self.api_port))
    }
}

#[cfg(feature = "cli")]
fn load_dotenv() {
    if let Err(e) = dotenvy::dotenv() {
        warn!("Failed to load .env file: {}. Using system environment variables.", e);
    } else {
        info!("Loaded environment variables from .env file");
    }
}

#[cfg(not(feature = "cli"))]
fn load_dotenv() {}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn redact(secret: &str) -> String {
    if secret.len() <= 8 {
        "****".to_string()
    } else {
        format!("{}****", secret.chars().take(4).collect::<String>())
    }
}
