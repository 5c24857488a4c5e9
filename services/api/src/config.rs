//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Credentials for the Vercel Edge Config store. Both parts must be set.
#[derive(Clone, Debug)]
pub struct EdgeConfigSettings {
    pub config_id: String,
    pub api_token: String,
    pub api_base_url: String,
}

/// Credentials for the Replicate background remover.
#[derive(Clone, Debug)]
pub struct ReplicateSettings {
    pub api_token: String,
    pub api_base_url: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub cors_origin: String,

    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,

    pub blob_token: String,
    pub blob_base_url: String,
    pub edge_config: Option<EdgeConfigSettings>,

    pub openai_api_key: Option<String>,
    pub tts_voice: String,

    pub replicate: Option<ReplicateSettings>,

    pub uploadthing_app_id: Option<String>,
    pub audio_manifest_path: PathBuf,
    pub download_dir: PathBuf,
    pub default_language: String,
    pub mirror_timeout: Duration,
    pub bitmap_size: u32,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |name: &str, default: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| ConfigError::MissingVar(name.to_string()))
        };

        // --- Load Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = var_or("DATABASE_URL", "sqlite://toy_stories.db?mode=rwc");

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let cors_origin = var_or("CORS_ORIGIN", "http://localhost:3000");

        // --- Load Vendor Credentials ---
        let gemini_api_key = required("GEMINI_API_KEY")?;
        let gemini_model = var_or("GEMINI_MODEL", "gemini-2.0-flash");
        let gemini_base_url = var_or(
            "GEMINI_BASE_URL",
            "https://generativelanguage.googleapis.com",
        );

        let blob_token = required("BLOB_READ_WRITE_TOKEN")?;
        let blob_base_url = var_or("BLOB_BASE_URL", "https://blob.vercel-storage.com");

        let edge_config = match (lookup("EDGE_CONFIG_ID"), lookup("VERCEL_API_TOKEN")) {
            (Some(config_id), Some(api_token)) => Some(EdgeConfigSettings {
                config_id,
                api_token,
                api_base_url: var_or("VERCEL_API_BASE_URL", "https://api.vercel.com"),
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::MissingVar("VERCEL_API_TOKEN".to_string())),
            (None, Some(_)) => return Err(ConfigError::MissingVar("EDGE_CONFIG_ID".to_string())),
        };

        let openai_api_key = lookup("OPENAI_API_KEY").filter(|v| !v.trim().is_empty());
        let tts_voice = var_or("TTS_VOICE", "alloy");

        let replicate = lookup("REPLICATE_API_TOKEN")
            .filter(|v| !v.trim().is_empty())
            .map(|api_token| ReplicateSettings {
                api_token,
                api_base_url: var_or("REPLICATE_BASE_URL", "https://api.replicate.com"),
            });

        // --- Load Pipeline Settings ---
        let uploadthing_app_id = lookup("UPLOADTHING_APP_ID").filter(|v| !v.trim().is_empty());
        let audio_manifest_path = PathBuf::from(var_or("AUDIO_MANIFEST_PATH", "./file_list.txt"));
        let download_dir = PathBuf::from(var_or("DOWNLOAD_DIR", "./tmp"));
        let default_language = var_or("DEFAULT_LANGUAGE", "Spanish");

        let mirror_timeout = parse_number::<u64>("MIRROR_TIMEOUT_SECS", &var_or("MIRROR_TIMEOUT_SECS", "5"))
            .map(Duration::from_secs)?;
        let bitmap_size = parse_number::<u32>("BITMAP_SIZE", &var_or("BITMAP_SIZE", "120"))?;
        if bitmap_size == 0 {
            return Err(ConfigError::InvalidValue(
                "BITMAP_SIZE".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            cors_origin,
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            blob_token,
            blob_base_url,
            edge_config,
            openai_api_key,
            tts_voice,
            replicate,
            uploadthing_app_id,
            audio_manifest_path,
            download_dir,
            default_language,
            mirror_timeout,
            bitmap_size,
        })
    }

    /// The public CDN URL the upload widget serves a file key from.
    pub fn upload_url(&self, file_key: &str) -> Option<String> {
        self.uploadthing_app_id
            .as_ref()
            .map(|app_id| format!("https://{app_id}.ufs.sh/f/{file_key}"))
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}
