//! Asset Catalog - product, mask and pass-through images
//!
//! Listing order is directory order. The catalog does not sort, so output
//! ordering is filesystem-dependent.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

use crate::config::AssetLayout;

const RASTER_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No product images found in {0}")]
    Empty(PathBuf),

    #[error("Failed to list {dir}: {source}")]
    Read {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Raster files in `dir`, in listing order. A missing directory is empty.
pub fn list_assets(dir: &Path) -> Result<Vec<PathBuf>, CatalogError> {
    let read_err = |source| CatalogError::Read {
        dir: dir.to_path_buf(),
        source,
    };

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![]),
        Err(e) => return Err(read_err(e)),
    };

    let mut assets = vec![];
    for entry in entries {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        if path.is_file() && is_raster(&path) {
            assets.push(path);
        }
    }
    Ok(assets)
}

fn is_raster(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .map_or(false, |e| RASTER_EXTENSIONS.contains(&e.as_str()))
}

/// File name without extension.
pub fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// First mask whose file name contains the product's stem.
///
/// Substring matching is ambiguous: stem `mug` also matches
/// `travel_mug_mask.png`. The earliest candidate wins.
pub fn match_mask<'a>(product: &Path, masks: &'a [PathBuf]) -> Option<&'a Path> {
    let product_stem = stem(product);
    if product_stem.is_empty() {
        return None;
    }

    masks
        .iter()
        .find(|mask| {
            mask.file_name()
                .map_or(false, |n| n.to_string_lossy().contains(product_stem.as_str()))
        })
        .map(PathBuf::as_path)
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct AssetCatalog {
    products: Vec<PathBuf>,
    masks: Vec<PathBuf>,
    passthrough: Vec<PathBuf>,
}

impl AssetCatalog {
    /// Scan the three asset directories. No product images is fatal.
    pub fn load(layout: &AssetLayout) -> Result<Self, CatalogError> {
        let products = list_assets(&layout.products_dir)?;
        if products.is_empty() {
            return Err(CatalogError::Empty(layout.products_dir.clone()));
        }

        let catalog = Self {
            products,
            masks: list_assets(&layout.masks_dir)?,
            passthrough: list_assets(&layout.passthrough_dir)?,
        };

        tracing::info!(
            products = catalog.products.len(),
            masks = catalog.masks.len(),
            passthrough = catalog.passthrough.len(),
            "Asset catalog loaded",
        );
        Ok(catalog)
    }

    pub fn products(&self) -> &[PathBuf] {
        &self.products
    }

    pub fn passthrough(&self) -> &[PathBuf] {
        &self.passthrough
    }

    pub fn mask_for(&self, product: &Path) -> Option<&Path> {
        match_mask(product, &self.masks)
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }
}
