//! LogoBatch Core - per-client logo personalization
//!
//! For each client: fetch the logo, composite it onto every product image
//! (inside the product's mask when one exists), write the results, and
//! mail them along with the pass-through images.
//!
//! # Failure domains
//! 1. Configuration and an empty product catalog stop the run up front.
//! 2. A download or composition failure stops one client only.
//! 3. A delivery failure never affects the generated images.

pub mod config;
pub mod records;
pub mod catalog;
pub mod artifact;
pub mod fetcher;
pub mod compositor;
pub mod notifier;
pub mod pipeline;
pub mod batch;

pub use config::{AssetLayout, ConfigError, Settings};
pub use records::{ClientRecord, RecordError, load_clients, parse_clients};
pub use catalog::{AssetCatalog, CatalogError, list_assets, match_mask};
pub use artifact::{GeneratedArtifact, SlugRegistry, client_slug};
pub use fetcher::{DownloadError, HttpLogoFetcher, LogoFetcher, StagedLogo};
pub use compositor::{CompositionError, CompositionRequest, Compositor, OpenAiCompositor, QualityTier};
pub use notifier::{DeliveryError, Mailer, MessageTemplate, Notifier, SmtpMailer};
pub use pipeline::{ClientError, CompositionPipeline};
pub use batch::{BatchDriver, BatchError, BatchReport, ClientOutcome, NotificationOutcome};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
