//! Artifact naming - slugs, staging names, output file names
//!
//! Output names embed the client slug and a 1-based product index, so
//! they never collide across clients or across products of one client.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};

const FALLBACK_SLUG: &str = "client";

/// Filesystem-safe slug for a client name.
///
/// Each whitespace character becomes `_` on its own, so names that differ
/// only in spacing keep distinct slugs.
pub fn client_slug(name: &str) -> String {
    let slug: String = name
        .trim()
        .chars()
        .map(|c| match c {
            c if c.is_whitespace() => '_',
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c if c.is_control() => '-',
            c => c,
        })
        .collect();

    if slug.is_empty() || slug.chars().all(|c| c == '.') {
        FALLBACK_SLUG.to_string()
    } else {
        slug
    }
}

/// Hands out one slug per client for a single run.
///
/// A slug already handed out gets `-2`, `-3`, ... appended. Slugs are
/// compared case-insensitively, since `Acme` and `ACME` name the same file
/// on case-insensitive filesystems.
#[derive(Debug, Default)]
pub struct SlugRegistry {
    issued: HashMap<String, usize>,
}

impl SlugRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&mut self, name: &str) -> String {
        let base = client_slug(name);
        let key = base.to_lowercase();
        let Some(&last) = self.issued.get(&key) else {
            self.issued.insert(key, 1);
            return base;
        };

        let mut n = last;
        loop {
            n += 1;
            let candidate = format!("{base}-{n}");
            let candidate_key = candidate.to_lowercase();
            if !self.issued.contains_key(&candidate_key) {
                self.issued.insert(key, n);
                self.issued.insert(candidate_key, 1);
                return candidate;
            }
        }
    }
}

/// File name under which a client's logo is staged.
pub fn logo_staging_name(slug: &str) -> String {
    format!("{slug}_logo.png")
}

/// `<slug>_<product-stem>_<index>.png`
pub fn artifact_file_name(slug: &str, product_stem: &str, index: usize) -> String {
    format!("{}_{}_{}.png", slug, client_slug(product_stem), index)
}

/// Compute SHA-256 of bytes, return hex string
pub fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// One composed image, written to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedArtifact {
    pub client: String,
    pub index: usize,
    pub product: PathBuf,
    pub mask: Option<PathBuf>,
    pub path: PathBuf,
    pub size_bytes: usize,
    pub sha256: String,
}

pub(crate) fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
