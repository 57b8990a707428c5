use crate::services::decoder::OutputMode;
use crate::utils::formats::{DEFAULT_SOURCE_EXTENSION, DEFAULT_TARGET_EXTENSION, FormatPair};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn env_formats() -> FormatPair {
    FormatPair::new(
        &env::var("SOURCE_EXTENSION").unwrap_or_else(|_| DEFAULT_SOURCE_EXTENSION.to_string()),
        &env::var("TARGET_EXTENSION").unwrap_or_else(|_| DEFAULT_TARGET_EXTENSION.to_string()),
    )
}

/// Conversion server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum upload size in bytes (default: 200 MB)
    pub max_file_size: usize,

    /// Directory for in-flight conversions (default: "uploads")
    pub staging_dir: PathBuf,

    /// Decoder type: "command" or "passthrough" (default: "command")
    pub decoder_type: String,

    /// External decoder program (default: "ncmdump")
    pub decoder_program: String,

    /// How the external decoder delivers its output (default: stdout)
    pub decoder_output_mode: OutputMode,

    /// Execution budget for a single decode (default: 120 s)
    pub decoder_timeout: Duration,

    /// Decoder processes allowed to run at once (default: 4)
    pub max_concurrent_decodes: usize,

    /// Rate limit: conversions per hour per client IP, 0 disables (default: 600)
    pub conversions_per_hour: u32,

    /// Key the rate limit on `X-Forwarded-For`/`X-Real-IP` instead of the
    /// peer address. Only safe behind a proxy that sets them (default: false)
    pub trust_proxy_headers: bool,

    /// Staged artifacts older than this are swept (default: 60 min)
    pub staging_cleanup_age: Duration,

    /// Allowed CORS origins (comma separated, "*" for any)
    pub allowed_origins: Vec<String>,

    /// Accepted container extension and produced audio extension
    pub formats: FormatPair,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_file_size: 200 * 1024 * 1024, // 200 MB
            staging_dir: PathBuf::from("uploads"),
            decoder_type: "command".to_string(),
            decoder_program: "ncmdump".to_string(),
            decoder_output_mode: OutputMode::Stdout,
            decoder_timeout: Duration::from_secs(120),
            max_concurrent_decodes: 4,
            conversions_per_hour: 600,
            trust_proxy_headers: false,
            staging_cleanup_age: Duration::from_secs(60 * 60),
            allowed_origins: vec!["*".to_string()],
            formats: FormatPair::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            max_file_size: env_parse("MAX_FILE_SIZE").unwrap_or(default.max_file_size),

            staging_dir: env::var("STAGING_DIR")
                .map(PathBuf::from)
                .unwrap_or(default.staging_dir),

            decoder_type: env::var("DECODER_TYPE").unwrap_or(default.decoder_type),

            decoder_program: env::var("DECODER_PROGRAM").unwrap_or(default.decoder_program),

            decoder_output_mode: env::var("DECODER_OUTPUT_MODE")
                .ok()
                .and_then(|v| OutputMode::from_name(&v))
                .unwrap_or(default.decoder_output_mode),

            decoder_timeout: env_parse("DECODER_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.decoder_timeout),

            max_concurrent_decodes: env_parse("MAX_CONCURRENT_DECODES")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(default.max_concurrent_decodes),

            conversions_per_hour: env_parse("CONVERSIONS_PER_HOUR")
                .unwrap_or(default.conversions_per_hour),

            trust_proxy_headers: env::var("TRUST_PROXY_HEADERS")
                .map(|v| matches!(v.trim().to_lowercase().as_str(), "true" | "1" | "yes"))
                .unwrap_or(default.trust_proxy_headers),

            staging_cleanup_age: env_parse("STAGING_CLEANUP_AGE_MINUTES")
                .map(|m: u64| Duration::from_secs(m * 60))
                .unwrap_or(default.staging_cleanup_age),

            allowed_origins: env::var("ALLOWED_ORIGINS")
                .ok()
                .map(|v| {
                    v.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or(default.allowed_origins),

            formats: env_formats(),
        }
    }

    /// Create config for development (no external decoder, no rate limit)
    pub fn development() -> Self {
        Self {
            decoder_type: "passthrough".to_string(),
            conversions_per_hour: 0,
            ..Self::default()
        }
    }
}

/// Batch client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the conversion server (default: "http://127.0.0.1:3000")
    pub server_url: String,

    /// Per-request timeout covering upload, decode and download (default: 300 s)
    pub request_timeout: Duration,

    pub formats: FormatPair,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:3000".to_string(),
            request_timeout: Duration::from_secs(300),
            formats: FormatPair::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            server_url: env::var("CONVERTER_URL").unwrap_or(default.server_url),
            request_timeout: env_parse("CLIENT_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(default.request_timeout),
            formats: env_formats(),
        }
    }
}
