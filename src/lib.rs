// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # rootara-traits
//!
//! Trait interpretation for consumer genetic reports: a small formula
//! language scores a user's genotypes, and a threshold table turns the score
//! into a label such as "Fast Metabolizer" or "Lactose Intolerant".
//!
//! ## Architecture
//!
//! - **Formula language** (`formula`): closed `SCORE(...)` / `IF(...)` grammar, parsed and evaluated without runtime code construction
//! - **Result derivation** (`thresholds`, `evaluate`): score-to-label mapping with boolean and numeric tiers
//! - **Repository** (`catalog`, `store`): bundled built-in traits unioned with user traits in memory (DashMap) or on disk (redb)
//! - **Interchange** (`interchange`): validated JSON import and export of user traits
//! - **Genotype sources** (`backend`): static tables or the genomics backend over HTTP
//!
//! ## Library usage
//!
//! ```no_run
//! use rootara_traits::catalog::Catalog;
//! use rootara_traits::store::TraitRepository;
//!
//! let repo = TraitRepository::memory_only(Catalog::bundled());
//! for t in repo.list_all().unwrap() {
//!     println!("{}: {}", t.id, t.result_current);
//! }
//! ```

pub mod backend;
pub mod catalog;
pub mod config;
pub mod error;
pub mod evaluate;
pub mod formula;
pub mod genotype;
pub mod interchange;
pub mod model;
pub mod store;
pub mod thresholds;
