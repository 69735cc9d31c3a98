//! Genotype lookup over a trait's aligned `rsids` / `yourGenotypes` arrays.

use std::sync::LazyLock;

use regex::Regex;

use crate::model::Trait;

/// Placeholder written when the backend has no call for a variant.
pub const MISSING_GENOTYPE: &str = "--";

static RE_RSID: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(rs|i)\d+$").unwrap());

/// Whether a genotype string represents "no call".
pub fn is_missing(genotype: &str) -> bool {
    let g = genotype.trim();
    g.is_empty() || g == MISSING_GENOTYPE
}

/// Whether `rsid` looks like a dbSNP (`rs123`) or chip-internal (`i123`) id.
pub fn is_valid_rsid(rsid: &str) -> bool {
    RE_RSID.is_match(rsid)
}

/// Read-only view pairing variant ids with recorded genotypes.
///
/// Position `i` of `rsids` belongs to position `i` of `genotypes`. When an
/// rsid is listed twice the first occurrence wins.
#[derive(Debug, Clone, Copy)]
pub struct GenotypeTable<'a> {
    rsids: &'a [String],
    genotypes: &'a [String],
}

impl<'a> GenotypeTable<'a> {
    pub fn new(rsids: &'a [String], genotypes: &'a [String]) -> Self {
        Self { rsids, genotypes }
    }

    pub fn from_trait(t: &'a Trait) -> Self {
        Self::new(&t.rsids, &t.your_genotypes)
    }

    /// Position of `rsid` in the variant list.
    pub fn position(&self, rsid: &str) -> Option<usize> {
        self.rsids.iter().position(|r| r == rsid)
    }

    /// The recorded genotype for `rsid`, or `None` when the rsid is unknown,
    /// the genotype array is too short, or the call is missing.
    pub fn lookup(&self, rsid: &str) -> Option<&'a str> {
        let idx = self.position(rsid)?;
        let genotype = self.genotypes.get(idx)?;
        (!is_missing(genotype)).then_some(genotype.as_str())
    }

    /// Number of variants with a usable call.
    pub fn called(&self) -> usize {
        self.rsids
            .iter()
            .enumerate()
            .filter(|(i, _)| self.genotypes.get(*i).is_some_and(|g| !is_missing(g)))
            .count()
    }
}
