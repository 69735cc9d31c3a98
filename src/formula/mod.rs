//! The trait formula language.
//!
//! Two functions make up the language:
//!
//! - `SCORE(rs1:AA=5,AG=2; rs2:CC=1)` sums, per rule group, the points of the
//!   rule whose genotype matches the user's call at that rsid.
//! - `IF(rs1=AA, <then>, <else>)` selects a branch on an exact genotype match;
//!   each branch is an integer or a nested `SCORE(...)`.
//!
//! Formulas are user-authored free text, so evaluation is total: anything
//! that does not parse scores 0 and unresolved references contribute 0.
//! [`Formula::parse_strict`] exists for validating a formula before it is
//! stored.

pub mod error;
pub mod eval;
pub mod parser;

use std::fmt;

pub use error::{FormulaError, FormulaResult};
pub use parser::ParseMode;

use crate::genotype::GenotypeTable;

/// A parsed formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    Score(ScoreExpr),
    If(IfExpr),
}

/// `SCORE(group; group; ...)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreExpr {
    pub groups: Vec<RuleGroup>,
}

/// `rsid:GENOTYPE=points,GENOTYPE=points`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleGroup {
    pub rsid: String,
    pub rules: Vec<GenotypeRule>,
}

/// `GENOTYPE=points`. Genotypes compare by exact string equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenotypeRule {
    pub genotype: String,
    pub points: i64,
}

/// `IF(condition, then, else)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IfExpr {
    pub condition: Condition,
    pub then_branch: Branch,
    pub else_branch: Branch,
}

/// `rsid=GENOTYPE`. An empty genotype never matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub rsid: String,
    pub genotype: String,
}

impl Condition {
    /// A condition that cannot hold, substituted for unparseable ones.
    pub fn never() -> Self {
        Self {
            rsid: String::new(),
            genotype: String::new(),
        }
    }
}

/// One arm of an `IF`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Branch {
    Score(ScoreExpr),
    Literal(i64),
}

impl Formula {
    /// Parse leniently: malformed groups, rules and literals contribute 0.
    pub fn parse(src: &str) -> FormulaResult<Self> {
        parser::Parser::new(src, ParseMode::Lenient).parse()
    }

    /// Parse strictly: any structural fault is an error.
    pub fn parse_strict(src: &str) -> FormulaResult<Self> {
        parser::Parser::new(src, ParseMode::Strict).parse()
    }

    /// Every rsid the formula refers to, in order of first appearance.
    pub fn referenced_rsids(&self) -> Vec<&str> {
        let mut all: Vec<&str> = Vec::new();
        match self {
            Formula::Score(s) => all.extend(s.rsids()),
            Formula::If(expr) => {
                all.push(&expr.condition.rsid);
                for branch in [&expr.then_branch, &expr.else_branch] {
                    if let Branch::Score(s) = branch {
                        all.extend(s.rsids());
                    }
                }
            }
        }

        let mut out: Vec<&str> = Vec::new();
        for rsid in all {
            if !rsid.is_empty() && !out.contains(&rsid) {
                out.push(rsid);
            }
        }
        out
    }
}

impl ScoreExpr {
    pub fn rsids(&self) -> impl Iterator<Item = &str> {
        self.groups.iter().map(|g| g.rsid.as_str())
    }
}

/// Score a formula against aligned rsid / genotype arrays.
///
/// Never fails: a formula that does not parse scores 0.
pub fn evaluate(formula: &str, rsids: &[String], genotypes: &[String]) -> i64 {
    match Formula::parse(formula) {
        Ok(parsed) => parsed.evaluate(&GenotypeTable::new(rsids, genotypes)),
        Err(e) => {
            tracing::debug!(formula, error = %e, "formula did not parse, scoring 0");
            0
        }
    }
}

// ---------------------------------------------------------------------------
// Canonical rendering
// ---------------------------------------------------------------------------

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Formula::Score(s) => s.fmt(f),
            Formula::If(expr) => write!(
                f,
                "IF({}={}, {}, {})",
                expr.condition.rsid, expr.condition.genotype, expr.then_branch, expr.else_branch
            ),
        }
    }
}

impl fmt::Display for ScoreExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SCORE(")?;
        for (i, group) in self.groups.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}:", group.rsid)?;
            for (j, rule) in group.rules.iter().enumerate() {
                if j > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}={}", rule.genotype, rule.points)?;
            }
        }
        f.write_str(")")
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Branch::Score(s) => s.fmt(f),
            Branch::Literal(v) => write!(f, "{v}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_rendering_normalizes_spacing() {
        let f = Formula::parse_strict("SCORE( rs1 : AA = 5 ,AG=2 ;rs2:CC=1 )").unwrap();
        assert_eq!(f.to_string(), "SCORE(rs1:AA=5,AG=2; rs2:CC=1)");

        let f = Formula::parse_strict("IF(rs1=AA,SCORE(rs2:CC=3,CT=1),0)").unwrap();
        assert_eq!(f.to_string(), "IF(rs1=AA, SCORE(rs2:CC=3,CT=1), 0)");
        assert_eq!(Formula::parse_strict(&f.to_string()).unwrap(), f);
    }

    #[test]
    fn referenced_rsids_are_deduplicated() {
        let f = Formula::parse_strict("IF(rs1=AA, SCORE(rs2:CC=3; rs1:AA=1), SCORE(rs3:GG=1))")
            .unwrap();
        assert_eq!(f.referenced_rsids(), vec!["rs1", "rs2", "rs3"]);
    }
}
