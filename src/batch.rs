//! Batch Driver - every client, one at a time
//!
//! A client's failure is recorded against that client and the batch moves
//! on. Generation and notification are separate failure domains.

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::artifact::{GeneratedArtifact, SlugRegistry};
use crate::catalog::{AssetCatalog, CatalogError};
use crate::compositor::CompositionError;
use crate::config::ConfigError;
use crate::fetcher::DownloadError;
use crate::notifier::{attachment_list, DeliveryError, Notifier};
use crate::pipeline::{ClientError, CompositionPipeline};
use crate::records::{ClientRecord, RecordError};

/// Errors that stop the whole batch before any client is processed.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Records(#[from] RecordError),

    #[error("No product images to process")]
    EmptyCatalog,

    #[error("Failed to build logo fetcher: {0}")]
    Fetcher(#[from] DownloadError),

    #[error("Failed to build compositor client: {0}")]
    Compositor(#[from] CompositionError),

    #[error("Failed to build mail transport: {0}")]
    Mailer(#[from] DeliveryError),

    #[error("Failed to read body template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to prepare working directories: {0}")]
    Workspace(#[source] ClientError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationOutcome {
    Sent { to: String, attachments: usize },
    /// No email address on the record.
    Skipped,
    /// Mail delivery turned off for this run.
    Disabled,
    Failed { to: String, error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClientOutcome {
    Completed {
        artifacts: Vec<GeneratedArtifact>,
        notification: NotificationOutcome,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientReport {
    pub client: String,
    pub slug: String,
    #[serde(flatten)]
    pub outcome: ClientOutcome,
}

impl ClientReport {
    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ClientOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub clients: Vec<ClientReport>,
}

impl BatchReport {
    pub fn completed(&self) -> usize {
        self.clients.len() - self.failed()
    }

    pub fn failed(&self) -> usize {
        self.clients.iter().filter(|c| c.is_failed()).count()
    }

    pub fn client(&self, name: &str) -> Option<&ClientReport> {
        self.clients.iter().find(|c| c.client == name)
    }
}

pub struct BatchDriver {
    pipeline: CompositionPipeline,
    notifier: Option<Notifier>,
}

impl BatchDriver {
    pub fn new(pipeline: CompositionPipeline, notifier: Option<Notifier>) -> Self {
        Self { pipeline, notifier }
    }

    /// Process every client in source order.
    ///
    /// Only pre-flight conditions return `Err`; per-client failures are
    /// recorded in the report.
    pub async fn run(
        &self,
        clients: &[ClientRecord],
        catalog: &AssetCatalog,
    ) -> Result<BatchReport, BatchError> {
        if catalog.is_empty() {
            return Err(BatchError::EmptyCatalog);
        }
        self.pipeline
            .prepare()
            .await
            .map_err(BatchError::Workspace)?;

        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        tracing::info!(run_id = %run_id, clients = clients.len(), "Batch started");

        let mut slugs = SlugRegistry::new();
        let mut reports = Vec::with_capacity(clients.len());

        for client in clients {
            let slug = slugs.assign(&client.name);
            tracing::info!(client = %client.name, slug = %slug, "Processing client");

            let outcome = match self.pipeline.process_client(client, &slug, catalog).await {
                Ok(artifacts) => {
                    tracing::info!(client = %client.name, images = artifacts.len(), "Successfully processed client");
                    let notification = self.notify(client, &artifacts, catalog).await;
                    ClientOutcome::Completed {
                        artifacts,
                        notification,
                    }
                }
                Err(e) => {
                    report_failure(client, &e);
                    ClientOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            reports.push(ClientReport {
                client: client.name.clone(),
                slug,
                outcome,
            });
        }

        let report = BatchReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            clients: reports,
        };
        tracing::info!(
            run_id = %report.run_id,
            completed = report.completed(),
            failed = report.failed(),
            "Batch finished",
        );
        Ok(report)
    }

    async fn notify(
        &self,
        client: &ClientRecord,
        artifacts: &[GeneratedArtifact],
        catalog: &AssetCatalog,
    ) -> NotificationOutcome {
        let Some(notifier) = &self.notifier else {
            return NotificationOutcome::Disabled;
        };
        let Some(to) = client.email() else {
            tracing::warn!(client = %client.name, "No email address provided");
            return NotificationOutcome::Skipped;
        };

        let generated: Vec<PathBuf> = artifacts.iter().map(|a| a.path.clone()).collect();
        let attachments = attachment_list(&generated, catalog.passthrough());

        match notifier.notify(client, to, &attachments).await {
            Ok(()) => NotificationOutcome::Sent {
                to: to.to_string(),
                attachments: attachments.len(),
            },
            Err(e) => {
                tracing::error!(client = %client.name, to, error = %e, "Failed to send email");
                NotificationOutcome::Failed {
                    to: to.to_string(),
                    error: e.to_string(),
                }
            }
        }
    }
}

fn report_failure(client: &ClientRecord, error: &ClientError) {
    match error {
        ClientError::Download(e) => {
            tracing::error!(client = %client.name, url = %client.logo_url, error = %e, "Logo download failed")
        }
        ClientError::Composition { product, source } => {
            tracing::error!(client = %client.name, product = %product.display(), error = %source, "Composition failed")
        }
        ClientError::Io { path, source } => {
            tracing::error!(client = %client.name, path = %path.display(), error = %source, "File error")
        }
    }
}
