//! Trait storage.
//!
//! Two user-trait backends implement [`TraitStore`]:
//!
//! - [`MemStore`]: concurrent hashmap (DashMap), lost on exit
//! - [`DurableStore`]: ACID transactions on disk (redb)
//!
//! [`TraitRepository`] unions the read-only built-in [`Catalog`] with one
//! of these stores. Built-ins are listed first and can never be written.

pub mod durable;
pub mod mem;

use std::collections::HashSet;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::catalog::Catalog;
use crate::config::RootaraPaths;
use crate::error::StoreError;
use crate::evaluate;
use crate::genotype::is_valid_rsid;
use crate::model::{Language, Trait, TraitCategory};

pub use durable::DurableStore;
pub use mem::MemStore;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Backend holding user-authored traits keyed by id.
///
/// Stored traits are immutable: writes only ever add new ids.
pub trait TraitStore: Send + Sync {
    /// Every stored trait, in no particular order.
    fn list(&self) -> StoreResult<Vec<Trait>>;

    fn get(&self, id: &str) -> StoreResult<Option<Trait>>;

    /// Store `record` unless its id is taken. Returns whether it was stored.
    ///
    /// The check and the write are one atomic step.
    fn insert_new(&self, record: &Trait) -> StoreResult<bool>;

    /// Store every record or none of them.
    ///
    /// Fails with [`StoreError::Duplicate`] if any id is already stored or
    /// repeats within `records`.
    fn insert_batch(&self, records: &[Trait]) -> StoreResult<()>;

    /// Returns whether the id existed.
    fn remove(&self, id: &str) -> StoreResult<bool>;

    fn contains(&self, id: &str) -> StoreResult<bool> {
        Ok(self.get(id)?.is_some())
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.list()?.len())
    }
}

// ---------------------------------------------------------------------------
// Queries and reports
// ---------------------------------------------------------------------------

/// Filter for [`TraitRepository::query`].
#[derive(Debug, Clone, Default)]
pub struct TraitQuery {
    pub category: Option<TraitCategory>,
    /// Case-insensitive substring of the name in `language`.
    pub search: Option<String>,
    pub language: Language,
}

impl TraitQuery {
    pub fn matches(&self, t: &Trait) -> bool {
        self.category.is_none_or(|c| c == t.category)
            && self
                .search
                .as_deref()
                .is_none_or(|q| t.matches_search(q, self.language))
    }
}

/// Outcome of [`TraitRepository::import`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Ids of the stored traits, in input order.
    pub imported: Vec<String>,
    /// `(requested id, assigned id)` for traits whose id was already taken.
    pub renamed: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// Built-in catalog plus a writable user store.
pub struct TraitRepository {
    catalog: Catalog,
    user: Box<dyn TraitStore>,
}

impl TraitRepository {
    pub fn new(catalog: Catalog, user: Box<dyn TraitStore>) -> Self {
        Self { catalog, user }
    }

    /// User traits live in memory only.
    pub fn memory_only(catalog: Catalog) -> Self {
        Self::new(catalog, Box::new(MemStore::new()))
    }

    /// User traits persist in a redb database under `data_dir`.
    pub fn with_persistence(catalog: Catalog, data_dir: &Path) -> StoreResult<Self> {
        let durable = DurableStore::open(data_dir)?;
        Ok(Self::new(catalog, Box::new(durable)))
    }

    /// Bundled plus discovered catalog, with user traits on disk when
    /// `persistent` is set.
    pub fn open(paths: &RootaraPaths, persistent: bool) -> StoreResult<Self> {
        let catalog = Catalog::discover(&paths.catalog_dir());
        if persistent {
            Self::with_persistence(catalog, &paths.store_dir())
        } else {
            Ok(Self::memory_only(catalog))
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Built-in traits in catalog order, then user traits by creation time.
    pub fn list_all(&self) -> StoreResult<Vec<Trait>> {
        let mut all = self.catalog.traits().to_vec();
        all.extend(self.user_traits()?);
        Ok(all)
    }

    /// User traits sorted by `createdAt`, then id.
    pub fn user_traits(&self) -> StoreResult<Vec<Trait>> {
        let mut traits = self.user.list()?;
        traits.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(traits)
    }

    /// Look up a trait by id. Built-ins take precedence.
    pub fn get(&self, id: &str) -> StoreResult<Trait> {
        if let Some(t) = self.catalog.get(id) {
            return Ok(t.clone());
        }
        self.user.get(id)?.ok_or_else(|| StoreError::NotFound { id: id.into() })
    }

    pub fn contains(&self, id: &str) -> StoreResult<bool> {
        Ok(self.catalog.contains(id) || self.user.contains(id)?)
    }

    pub fn query(&self, query: &TraitQuery) -> StoreResult<Vec<Trait>> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|t| query.matches(t))
            .collect())
    }

    /// Validate and store a user trait, returning the stored record.
    ///
    /// An empty id is replaced by a generated one; an explicit id already
    /// in use is rejected. The result fields are derived before storing.
    pub fn add(&self, record: Trait) -> StoreResult<Trait> {
        let record = self.prepare(record)?;
        if self.catalog.contains(&record.id) || !self.user.insert_new(&record)? {
            return Err(StoreError::Duplicate { id: record.id });
        }
        tracing::info!(id = %record.id, result = %record.result_current, "added trait");
        Ok(record)
    }

    /// Delete a user trait, returning it.
    pub fn remove(&self, id: &str) -> StoreResult<Trait> {
        if self.catalog.contains(id) {
            return Err(StoreError::BuiltIn { id: id.into() });
        }
        let existing = self
            .user
            .get(id)?
            .ok_or_else(|| StoreError::NotFound { id: id.into() })?;
        self.user.remove(id)?;
        tracing::info!(id, "removed trait");
        Ok(existing)
    }

    /// Store a batch of traits.
    ///
    /// Every trait is validated before anything is written, so one invalid
    /// entry rejects the whole batch. Ids that collide with existing traits
    /// (or with each other) are replaced by fresh ones.
    pub fn import(&self, traits: Vec<Trait>) -> StoreResult<ImportReport> {
        let mut report = ImportReport::default();
        let mut taken: HashSet<String> = HashSet::new();
        let mut prepared = Vec::with_capacity(traits.len());

        for (index, record) in traits.into_iter().enumerate() {
            let requested = record.id.trim().to_string();
            let mut record = self.prepare(record).map_err(|e| StoreError::InvalidImport {
                index,
                source: Box::new(e),
            })?;
            let collides = !requested.is_empty()
                && (taken.contains(&requested) || self.contains(&requested)?);
            if collides {
                record.id = generate_id();
            }
            while taken.contains(&record.id) || self.contains(&record.id)? {
                record.id = generate_id();
            }
            if collides {
                report.renamed.push((requested, record.id.clone()));
            }
            taken.insert(record.id.clone());
            prepared.push(record);
        }

        self.user.insert_batch(&prepared)?;
        report.imported = prepared.into_iter().map(|t| t.id).collect();
        tracing::info!(
            imported = report.imported.len(),
            renamed = report.renamed.len(),
            "imported traits"
        );
        Ok(report)
    }

    /// Fill defaults, validate and evaluate a user trait.
    fn prepare(&self, mut record: Trait) -> StoreResult<Trait> {
        record.id = record.id.trim().to_string();
        if record.id.is_empty() {
            record.id = generate_id();
        }
        validate(&record)?;
        evaluate::check_formula(&record).map_err(|source| StoreError::InvalidFormula {
            id: record.id.clone(),
            source,
        })?;

        record.is_default = false;
        if record.created_at.trim().is_empty() {
            record.created_at = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        }
        record.normalize_references();
        record.align_genotypes();
        evaluate::apply(&mut record);
        Ok(record)
    }
}

impl std::fmt::Debug for TraitRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraitRepository")
            .field("built_in", &self.catalog.len())
            .finish()
    }
}

/// Fresh user trait id: `user-<unix millis>-<random hex>`.
pub fn generate_id() -> String {
    format!(
        "user-{}-{:08x}",
        Utc::now().timestamp_millis(),
        rand::random::<u32>()
    )
}

/// Required fields of a user-created trait.
pub fn validate(record: &Trait) -> StoreResult<()> {
    let invalid = |reason: &str| StoreError::InvalidTrait {
        id: record.id.clone(),
        reason: reason.into(),
    };
    if record.name.is_blank() {
        return Err(invalid("name is required"));
    }
    if record.description.is_blank() {
        return Err(invalid("description is required"));
    }
    if record.rsids.iter().all(|r| r.trim().is_empty()) {
        return Err(invalid("at least one rsid is required"));
    }
    if let Some(bad) = record.rsids.iter().find(|r| !is_valid_rsid(r.trim())) {
        return Err(invalid(&format!(
            "\"{bad}\" is not a variant id (expected rs<digits> or i<digits>)"
        )));
    }
    if record.formula.trim().is_empty() {
        return Err(invalid("formula is required"));
    }
    if record.score_thresholds.is_empty() {
        return Err(invalid("at least one score threshold is required"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LocalizedText;
    use crate::thresholds::ScoreThresholds;

    fn user_trait(name: &str) -> Trait {
        Trait::draft(LocalizedText::new(name, name), TraitCategory::Lifestyle)
            .with_description(LocalizedText::uniform("custom"))
            .with_variant("rs1801260", "CT", "CC")
            .with_formula("SCORE(rs1801260:TT=4,CT=2,CC=0)")
            .with_thresholds(ScoreThresholds::new().with("Evening", 4).with("Morning", 0))
    }

    fn repo() -> TraitRepository {
        TraitRepository::memory_only(Catalog::bundled())
    }

    #[test]
    fn add_assigns_id_and_derives_result() {
        let repo = repo();
        let stored = repo.add(user_trait("Sleep")).unwrap();
        assert!(stored.id.starts_with("user-"));
        assert!(!stored.is_default);
        assert!(!stored.created_at.is_empty());
        assert_eq!(stored.result_current, "Morning");
        assert_eq!(repo.get(&stored.id).unwrap(), stored);
    }

    #[test]
    fn built_ins_are_listed_first() {
        let repo = repo();
        let stored = repo.add(user_trait("Sleep")).unwrap();
        let all = repo.list_all().unwrap();
        assert_eq!(all.len(), repo.catalog().len() + 1);
        assert!(all[..repo.catalog().len()].iter().all(|t| t.is_default));
        assert_eq!(all.last().unwrap().id, stored.id);
    }

    #[test]
    fn built_ins_cannot_be_removed() {
        let repo = repo();
        assert!(matches!(repo.remove("eye-color"), Err(StoreError::BuiltIn { .. })));
        assert!(repo.get("eye-color").is_ok());
    }

    #[test]
    fn remove_unknown_is_not_found() {
        assert!(matches!(repo().remove("user-0-0"), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn remove_deletes_user_trait() {
        let repo = repo();
        let stored = repo.add(user_trait("Sleep")).unwrap();
        let removed = repo.remove(&stored.id).unwrap();
        assert_eq!(removed.id, stored.id);
        assert!(matches!(repo.get(&stored.id), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let repo = repo();
        let mut t = user_trait("Sleep");
        t.id = "eye-color".into();
        assert!(matches!(repo.add(t), Err(StoreError::Duplicate { .. })));

        let mut t = user_trait("Sleep");
        t.id = "mine".into();
        repo.add(t.clone()).unwrap();
        assert!(matches!(repo.add(t), Err(StoreError::Duplicate { .. })));
    }

    #[test]
    fn incomplete_traits_are_rejected() {
        let repo = repo();
        let mut t = user_trait("Sleep");
        t.description = LocalizedText::default();
        assert!(matches!(repo.add(t), Err(StoreError::InvalidTrait { .. })));

        let t = user_trait("Sleep").with_thresholds(ScoreThresholds::new());
        assert!(matches!(repo.add(t), Err(StoreError::InvalidTrait { .. })));

        let t = user_trait("Sleep").with_formula("SCORE(rs1801260 TT=4)");
        assert!(matches!(repo.add(t), Err(StoreError::InvalidFormula { .. })));
    }

    #[test]
    fn query_filters_by_category_and_name() {
        let repo = repo();
        repo.add(user_trait("Night Owl")).unwrap();

        let lifestyle = repo
            .query(&TraitQuery {
                category: Some(TraitCategory::Lifestyle),
                ..Default::default()
            })
            .unwrap();
        assert!(lifestyle.iter().all(|t| t.category == TraitCategory::Lifestyle));
        assert!(lifestyle.iter().any(|t| t.name.en == "Night Owl"));

        let hits = repo
            .query(&TraitQuery {
                search: Some("EYE".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "eye-color");

        let zh = repo
            .query(&TraitQuery {
                search: Some("咖啡".into()),
                language: Language::ZhCn,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(zh[0].id, "caffeine-metabolism");
    }

    #[test]
    fn import_renames_colliding_ids() {
        let repo = repo();
        let mut a = user_trait("A");
        a.id = "eye-color".into();
        let mut b = user_trait("B");
        b.id = "custom-1".into();
        let mut c = user_trait("C");
        c.id = "custom-1".into();

        let report = repo.import(vec![a, b, c]).unwrap();
        assert_eq!(report.imported.len(), 3);
        assert_eq!(report.imported[1], "custom-1");
        assert_eq!(report.renamed.len(), 2);
        assert_eq!(report.renamed[0].0, "eye-color");
        assert_eq!(repo.user_traits().unwrap().len(), 3);
    }

    #[test]
    fn import_is_all_or_nothing() {
        let repo = repo();
        let bad = user_trait("Bad").with_formula("");
        assert!(repo.import(vec![user_trait("Good"), bad]).is_err());
        assert!(repo.user_traits().unwrap().is_empty());
    }

    #[test]
    fn import_error_names_the_element() {
        let repo = repo();
        let mut bad = user_trait("Bad").with_formula("");
        bad.id = "my-bad-trait".into();
        let err = repo.import(vec![user_trait("Good"), bad]).unwrap_err();
        match err {
            StoreError::InvalidImport { index, source } => {
                assert_eq!(index, 1);
                assert!(matches!(*source, StoreError::InvalidTrait { ref id, .. } if id == "my-bad-trait"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn malformed_rsids_are_rejected() {
        let repo = repo();
        let mut t = user_trait("Sleep");
        t.rsids = vec!["rs1801260".into(), "chr1:12345".into()];
        match repo.add(t) {
            Err(StoreError::InvalidTrait { reason, .. }) => assert!(reason.contains("chr1:12345")),
            other => panic!("unexpected result: {other:?}"),
        }

        let mut t = user_trait("Chip");
        t.rsids = vec!["i3001920".into()];
        t.formula = "SCORE(i3001920:CT=2)".into();
        assert!(repo.add(t).is_ok());
    }

    #[test]
    fn concurrent_adds_with_one_id_store_it_once() {
        use std::sync::{Arc, Barrier};
        let repo = Arc::new(repo());
        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let repo = Arc::clone(&repo);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    let mut t = user_trait(&format!("Racer {i}"));
                    t.id = "same-id".into();
                    barrier.wait();
                    repo.add(t)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let winners: Vec<&Trait> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, StoreError::Duplicate { .. })));
        assert_eq!(repo.get("same-id").unwrap().name, winners[0].name);
    }

    #[test]
    fn imported_built_in_flag_is_cleared() {
        let repo = repo();
        let mut t = user_trait("Copy");
        t.is_default = true;
        let report = repo.import(vec![t]).unwrap();
        assert!(!repo.get(&report.imported[0]).unwrap().is_default);
    }
}
