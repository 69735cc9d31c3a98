//! Rich diagnostic error types for rootara-traits.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains so users know exactly what
//! went wrong and how to fix it. Formula evaluation itself never errors; only
//! validation, storage and I/O paths do.

use miette::Diagnostic;
use thiserror::Error;

use crate::backend::BackendError;
use crate::catalog::CatalogError;
use crate::config::ConfigError;
use crate::formula::FormulaError;
use crate::interchange::InterchangeError;

/// Top-level error type.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text, source spans) through to the user.
#[derive(Debug, Error, Diagnostic)]
pub enum TraitsError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Formula(#[from] FormulaError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Interchange(#[from] InterchangeError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Store errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("I/O error: {source}")]
    #[diagnostic(
        code(rootara::store::io),
        help(
            "A filesystem operation failed. Check that the data directory exists, \
             has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        #[source]
        source: std::io::Error,
    },

    #[error("redb transaction error: {message}")]
    #[diagnostic(
        code(rootara::store::redb),
        help(
            "The embedded database encountered a transaction error. \
             This may indicate corruption; try again with a fresh data directory \
             after exporting your traits."
        )
    )]
    Redb { message: String },

    #[error("serialization error: {message}")]
    #[diagnostic(
        code(rootara::store::serde),
        help(
            "Failed to serialize or deserialize a stored trait. \
             This usually means the stored format changed between versions. \
             Export and re-import your traits."
        )
    )]
    Serialization { message: String },

    #[error("trait not found: \"{id}\"")]
    #[diagnostic(
        code(rootara::store::not_found),
        help("List available traits with `rootara-traits list`.")
    )]
    NotFound { id: String },

    #[error("a trait with id \"{id}\" already exists")]
    #[diagnostic(
        code(rootara::store::duplicate),
        help("Trait ids must be unique across built-in and user traits. Leave the id empty to have one generated.")
    )]
    Duplicate { id: String },

    #[error("trait \"{id}\" is built in and cannot be removed")]
    #[diagnostic(
        code(rootara::store::built_in),
        help("Only user-created traits can be deleted.")
    )]
    BuiltIn { id: String },

    #[error("invalid trait \"{id}\": {reason}")]
    #[diagnostic(
        code(rootara::store::invalid_trait),
        help(
            "A trait needs a name, a description, at least one rsid, a formula, \
             and at least one score threshold."
        )
    )]
    InvalidTrait { id: String, reason: String },

    #[error("invalid formula for trait \"{id}\"")]
    #[diagnostic(code(rootara::store::invalid_formula))]
    InvalidFormula {
        id: String,
        #[source]
        #[diagnostic_source]
        source: FormulaError,
    },

    #[error("import element {index} rejected: {source}")]
    #[diagnostic(
        code(rootara::store::invalid_import),
        help("Nothing was imported. Fix the element (counted from 0) and import the file again.")
    )]
    InvalidImport {
        index: usize,
        #[source]
        source: Box<StoreError>,
    },
}

/// Result type for the top level.
pub type TraitsResult<T> = std::result::Result<T, TraitsError>;
