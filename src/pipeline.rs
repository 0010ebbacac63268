//! Composition Pipeline - one client, every product
//!
//! The staged logo is released on every exit path. A failure on any
//! product aborts the rest of that client's products.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::artifact::{artifact_file_name, logo_staging_name, sha256_hex, GeneratedArtifact};
use crate::catalog::{stem, AssetCatalog};
use crate::compositor::{CompositionError, CompositionRequest, Compositor, ImagePart, QualityTier};
use crate::fetcher::{DownloadError, LogoFetcher, StagedLogo};
use crate::records::ClientRecord;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Download(#[from] DownloadError),

    #[error("Composition failed for {product}: {source}")]
    Composition {
        product: PathBuf,
        #[source]
        source: CompositionError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ClientError {
    fn io(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The composition pipeline - fetch, compose, write
pub struct CompositionPipeline {
    fetcher: Arc<dyn LogoFetcher>,
    compositor: Arc<dyn Compositor>,
    staging_dir: PathBuf,
    output_dir: PathBuf,
    quality: QualityTier,
}

impl CompositionPipeline {
    pub fn new(
        fetcher: Arc<dyn LogoFetcher>,
        compositor: Arc<dyn Compositor>,
        staging_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            fetcher,
            compositor,
            staging_dir: staging_dir.into(),
            output_dir: output_dir.into(),
            quality: QualityTier::default(),
        }
    }

    pub fn with_quality(mut self, quality: QualityTier) -> Self {
        self.quality = quality;
        self
    }

    /// Create the staging and output directories.
    pub async fn prepare(&self) -> Result<(), ClientError> {
        for dir in [&self.staging_dir, &self.output_dir] {
            tokio::fs::create_dir_all(dir).await.map_err(ClientError::io(dir))?;
        }
        Ok(())
    }

    /// Compose the client's logo onto every product, in catalog order.
    pub async fn process_client(
        &self,
        client: &ClientRecord,
        slug: &str,
        catalog: &AssetCatalog,
    ) -> Result<Vec<GeneratedArtifact>, ClientError> {
        let staging_path = self.staging_dir.join(logo_staging_name(slug));
        let logo = StagedLogo::acquire(self.fetcher.as_ref(), &client.logo_url, staging_path).await?;

        let result = self.compose_all(client, slug, catalog, logo.path()).await;
        logo.release().await;
        result
    }

    async fn compose_all(
        &self,
        client: &ClientRecord,
        slug: &str,
        catalog: &AssetCatalog,
        logo_path: &Path,
    ) -> Result<Vec<GeneratedArtifact>, ClientError> {
        let overlay = ImagePart::read(logo_path)
            .await
            .map_err(ClientError::io(logo_path))?;

        let mut artifacts = Vec::with_capacity(catalog.products().len());

        for (offset, product) in catalog.products().iter().enumerate() {
            let index = offset + 1;
            let mask = catalog.mask_for(product);

            let base = ImagePart::read(product).await.map_err(ClientError::io(product))?;
            let mask_part = match mask {
                Some(path) => Some(ImagePart::read(path).await.map_err(ClientError::io(path))?),
                None => None,
            };

            let request = CompositionRequest::new(base, overlay.clone(), mask_part, self.quality);
            let bytes = self
                .compositor
                .compose(&request)
                .await
                .map_err(|source| ClientError::Composition {
                    product: product.clone(),
                    source,
                })?;

            let path = self
                .output_dir
                .join(artifact_file_name(slug, &stem(product), index));
            tokio::fs::write(&path, &bytes)
                .await
                .map_err(ClientError::io(&path))?;

            tracing::info!(
                client = %client.name,
                product = %product.display(),
                masked = mask.is_some(),
                path = %path.display(),
                "Generated image",
            );

            artifacts.push(GeneratedArtifact {
                client: client.name.clone(),
                index,
                product: product.clone(),
                mask: mask.map(Path::to_path_buf),
                path,
                size_bytes: bytes.len(),
                sha256: sha256_hex(&bytes),
            });
        }

        Ok(artifacts)
    }
}
