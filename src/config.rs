use anyhow::Result;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::extraction::{DEFAULT_MAX_DOCUMENT_BYTES, PDF_MEDIA_TYPE};

/// Main configuration structure for voucher verification
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VoucherVerifyConfig {
    /// Document limits and extraction tuning
    pub extraction: ExtractionConfig,
    /// Observability settings
    pub observability: ObservabilityConfig,
    /// Database settings (optional)
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Largest accepted upload, in bytes
    pub max_document_bytes: u64,
    /// Media type uploads must declare
    pub accepted_media_type: String,
    /// Scale applied when rasterizing page one for visual codes
    pub raster_scale: f32,
    /// Path segment preceding the code inside visual-code payloads
    pub visual_path_fragment: String,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            accepted_media_type: PDF_MEDIA_TYPE.to_string(),
            raster_scale: 2.0,
            visual_path_fragment: "/vale/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level used when RUST_LOG is not set
    pub log_level: String,
    /// Emit logs as JSON lines
    pub json_logs: bool,
    /// Log pipeline counters on shutdown
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: true,
            metrics_enabled: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Database URL (SQLite file path or connection string)
    pub url: String,
    /// Maximum connections in pool
    pub max_connections: u32,
    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for VoucherVerifyConfig {
    fn default() -> Self {
        Self {
            extraction: ExtractionConfig::default(),
            observability: ObservabilityConfig::default(),
            database: Some(DatabaseConfig {
                url: "sqlite://.voucher-verify/vouchers.db".to_string(),
                max_connections: 10,
                auto_migrate: true,
            }),
        }
    }
}

impl VoucherVerifyConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration files (voucher-verify.toml, .voucher-verify-rc)
    /// 3. Environment variables (prefixed with VOUCHER_VERIFY_, nested keys split by __)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if Path::new("voucher-verify.toml").exists() {
            builder = builder.add_source(File::with_name("voucher-verify"));
        }

        if Path::new(".voucher-verify-rc").exists() {
            builder = builder.add_source(File::with_name(".voucher-verify-rc").format(config::FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("VOUCHER_VERIFY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        let voucher_config: VoucherVerifyConfig = config.try_deserialize()?;
        voucher_config.validate()?;

        Ok(voucher_config)
    }

    fn validate(&self) -> Result<()> {
        if self.extraction.max_document_bytes == 0 {
            anyhow::bail!("extraction.max_document_bytes must be positive");
        }
        if !(self.extraction.raster_scale.is_finite() && self.extraction.raster_scale > 0.0) {
            anyhow::bail!(
                "extraction.raster_scale must be a positive number, got {}",
                self.extraction.raster_scale
            );
        }
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let toml_content = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_content)?;
        Ok(())
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }
}

/// Global configuration instance
static CONFIG: std::sync::LazyLock<Result<VoucherVerifyConfig, anyhow::Error>> =
    std::sync::LazyLock::new(|| {
        // Load .env file first
        let _ = VoucherVerifyConfig::load_env_file();
        VoucherVerifyConfig::load()
    });

/// Get the global configuration
pub fn config() -> Result<&'static VoucherVerifyConfig> {
    CONFIG
        .as_ref()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))
}
