//! Configuration - credentials from the environment, layout from the CLI
//!
//! Credentials are never read from flags. A missing credential is fatal
//! before the first client is touched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::compositor::QualityTier;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-image-1";
const DEFAULT_COMPOSITOR_TIMEOUT_SECS: u64 = 90;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
const DEFAULT_FROM_NAME: &str = "Your Company Name";
const DEFAULT_SMTP_HOST: &str = "smtp.gmail.com";
const DEFAULT_SMTP_PORT: u16 = 587;
const DEFAULT_SMTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SUBJECT: &str = "Your Customized Product Designs";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Settings for the external compositor service.
#[derive(Debug, Clone)]
pub struct CompositorSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub quality: QualityTier,
    pub timeout: Duration,
}

/// SMTP settings; absent when mail delivery is disabled.
#[derive(Debug, Clone)]
pub struct MailSettings {
    pub user: String,
    pub password: String,
    pub from_name: String,
    pub subject: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub compositor: CompositorSettings,
    pub mail: Option<MailSettings>,
    pub download_timeout: Duration,
}

impl Settings {
    /// Load settings from the process environment.
    ///
    /// | Variable                  | Required         | Default                     |
    /// |---------------------------|------------------|-----------------------------|
    /// | `OPENAI_API_KEY`          | yes              | --                          |
    /// | `OPENAI_BASE_URL`         | no               | `https://api.openai.com/v1` |
    /// | `COMPOSITOR_MODEL`        | no               | `gpt-image-1`               |
    /// | `COMPOSITOR_QUALITY`      | no               | `low`                       |
    /// | `COMPOSITOR_TIMEOUT_SECS` | no               | `90`                        |
    /// | `DOWNLOAD_TIMEOUT_SECS`   | no               | `30`                        |
    /// | `EMAIL_USER`              | when mail is on  | --                          |
    /// | `EMAIL_PASSWORD`          | when mail is on  | --                          |
    /// | `EMAIL_FROM_NAME`         | no               | `Your Company Name`         |
    /// | `EMAIL_SUBJECT`           | no               | `Your Customized Product Designs` |
    /// | `SMTP_HOST`               | no               | `smtp.gmail.com`            |
    /// | `SMTP_PORT`               | no               | `587`                       |
    /// | `SMTP_TIMEOUT_SECS`       | no               | `30`                        |
    pub fn from_env(require_mail: bool) -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok(), require_mail)
    }

    /// Resolve settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F, require_mail: bool) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let api_key = required("OPENAI_API_KEY")?;

        let quality = match get("COMPOSITOR_QUALITY") {
            Some(value) => value
                .parse::<QualityTier>()
                .map_err(|_| ConfigError::Invalid { var: "COMPOSITOR_QUALITY", value })?,
            None => QualityTier::default(),
        };

        let compositor = CompositorSettings {
            api_key,
            base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            model: get("COMPOSITOR_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            quality,
            timeout: Duration::from_secs(parse_or(
                get("COMPOSITOR_TIMEOUT_SECS"),
                "COMPOSITOR_TIMEOUT_SECS",
                DEFAULT_COMPOSITOR_TIMEOUT_SECS,
            )?),
        };

        let download_timeout = Duration::from_secs(parse_or(
            get("DOWNLOAD_TIMEOUT_SECS"),
            "DOWNLOAD_TIMEOUT_SECS",
            DEFAULT_DOWNLOAD_TIMEOUT_SECS,
        )?);

        let mail = if require_mail {
            Some(MailSettings {
                user: required("EMAIL_USER")?,
                password: required("EMAIL_PASSWORD")?,
                from_name: get("EMAIL_FROM_NAME").unwrap_or_else(|| DEFAULT_FROM_NAME.to_string()),
                subject: get("EMAIL_SUBJECT").unwrap_or_else(|| DEFAULT_SUBJECT.to_string()),
                smtp_host: get("SMTP_HOST").unwrap_or_else(|| DEFAULT_SMTP_HOST.to_string()),
                smtp_port: parse_or(get("SMTP_PORT"), "SMTP_PORT", DEFAULT_SMTP_PORT)?,
                timeout: Duration::from_secs(parse_or(
                    get("SMTP_TIMEOUT_SECS"),
                    "SMTP_TIMEOUT_SECS",
                    DEFAULT_SMTP_TIMEOUT_SECS,
                )?),
            })
        } else {
            None
        };

        Ok(Self {
            compositor,
            mail,
            download_timeout,
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    value: Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        Some(value) => value.parse().map_err(|_| ConfigError::Invalid { var, value }),
        None => Ok(default),
    }
}

/// Filesystem locations used by one batch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLayout {
    pub clients_csv: PathBuf,
    pub products_dir: PathBuf,
    pub masks_dir: PathBuf,
    pub passthrough_dir: PathBuf,
    pub staging_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl AssetLayout {
    /// Conventional layout relative to `root`.
    pub fn rooted_at(root: &Path) -> Self {
        Self {
            clients_csv: root.join("clients.csv"),
            products_dir: root.join("products"),
            masks_dir: root.join("products_masks"),
            passthrough_dir: root.join("product_images_no_conversion"),
            staging_dir: root.join("downloaded_images"),
            output_dir: root.join("generated_images"),
        }
    }
}

impl Default for AssetLayout {
    fn default() -> Self {
        Self::rooted_at(Path::new("."))
    }
}
