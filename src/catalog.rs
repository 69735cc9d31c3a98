//! Built-in trait catalog.
//!
//! The catalog is a TOML-defined list of traits bundled into the binary
//! (`data/catalog/default-traits.toml`). Additional catalog files can be
//! discovered from a directory; entries there replace bundled ones with the
//! same id. Every catalog trait is marked `isDefault` and is never writable.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use miette::Diagnostic;
use serde::Deserialize;
use thiserror::Error;

use crate::evaluate;
use crate::model::Trait;

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error, Diagnostic)]
pub enum CatalogError {
    #[error("failed to parse catalog \"{origin}\": {message}")]
    #[diagnostic(
        code(rootara::catalog::parse),
        help("Check the catalog TOML syntax. Each entry lives under a `[[traits]]` table.")
    )]
    Parse { origin: String, message: String },

    #[error("failed to read catalog file: {path}")]
    #[diagnostic(code(rootara::catalog::io), help("Ensure the file exists and is readable."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("catalog \"{origin}\" contains a trait without an id")]
    #[diagnostic(
        code(rootara::catalog::missing_id),
        help("Built-in traits need a fixed `id` so they can be referenced.")
    )]
    MissingId { origin: String },
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Where a catalog entry came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSource {
    /// Bundled into the binary via `include_str!`.
    Bundled,
    /// Loaded from an external file.
    External(PathBuf),
}

// ── TOML deserialization helpers ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CatalogToml {
    #[serde(default)]
    catalog: Option<CatalogMeta>,
    #[serde(default)]
    traits: Vec<Trait>,
}

#[derive(Debug, Deserialize)]
struct CatalogMeta {
    #[allow(dead_code)]
    version: String,
}

const DEFAULT_TRAITS_TOML: &str = include_str!("../data/catalog/default-traits.toml");

fn parse_catalog_toml(toml_str: &str, origin: &str) -> CatalogResult<Vec<Trait>> {
    let parsed: CatalogToml = toml::from_str(toml_str).map_err(|e| CatalogError::Parse {
        origin: origin.into(),
        message: e.to_string(),
    })?;
    if parsed.catalog.is_none() {
        tracing::debug!(origin, "catalog file has no [catalog] header");
    }

    let mut traits = parsed.traits;
    for t in &mut traits {
        if t.id.trim().is_empty() {
            return Err(CatalogError::MissingId {
                origin: origin.into(),
            });
        }
        t.is_default = true;
        t.normalize_references();
        t.align_genotypes();
        evaluate::apply(t);
    }
    Ok(traits)
}

// ── Catalog ─────────────────────────────────────────────────────────────

/// Read-only set of built-in traits, in catalog order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    traits: Vec<Trait>,
    sources: Vec<CatalogSource>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// An empty catalog, for tests and for running with user traits only.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The catalog bundled into the binary.
    pub fn bundled() -> Self {
        let mut catalog = Self::empty();
        match parse_catalog_toml(DEFAULT_TRAITS_TOML, "bundled") {
            Ok(traits) => {
                for t in traits {
                    catalog.upsert(t, CatalogSource::Bundled);
                }
            }
            Err(e) => tracing::warn!("Failed to parse bundled catalog: {e}"),
        }
        catalog
    }

    /// Build a catalog from TOML text.
    pub fn from_toml(toml_str: &str) -> CatalogResult<Self> {
        let mut catalog = Self::empty();
        for t in parse_catalog_toml(toml_str, "inline")? {
            catalog.upsert(t, CatalogSource::Bundled);
        }
        Ok(catalog)
    }

    /// Bundled catalog plus every `*.toml` file found in `dir`.
    ///
    /// Unreadable or invalid files are logged and skipped.
    pub fn discover(dir: &Path) -> Self {
        let mut catalog = Self::bundled();

        let Ok(entries) = std::fs::read_dir(dir) else {
            return catalog;
        };
        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "toml"))
            .collect();
        files.sort();

        for path in files {
            match load_file(&path) {
                Ok(traits) => {
                    for t in traits {
                        catalog.upsert(t, CatalogSource::External(path.clone()));
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), "Failed to load catalog file: {e}");
                }
            }
        }
        catalog
    }

    fn upsert(&mut self, t: Trait, source: CatalogSource) {
        match self.index.get(&t.id) {
            Some(&i) => {
                self.traits[i] = t;
                self.sources[i] = source;
            }
            None => {
                self.index.insert(t.id.clone(), self.traits.len());
                self.traits.push(t);
                self.sources.push(source);
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&Trait> {
        self.index.get(id).map(|&i| &self.traits[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn source(&self, id: &str) -> Option<&CatalogSource> {
        self.index.get(id).map(|&i| &self.sources[i])
    }

    pub fn traits(&self) -> &[Trait] {
        &self.traits
    }

    pub fn len(&self) -> usize {
        self.traits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.traits.is_empty()
    }
}

fn load_file(path: &Path) -> CatalogResult<Vec<Trait>> {
    let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_catalog_toml(&content, &path.display().to_string())
}
