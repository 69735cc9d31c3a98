//! Evaluation of parsed formulas against a genotype table.
//!
//! Unknown rsids, missing calls and unmatched genotypes all contribute 0.
//! Sums saturate instead of overflowing.

use crate::genotype::GenotypeTable;

use super::{Branch, Condition, Formula, IfExpr, RuleGroup, ScoreExpr};

impl Formula {
    pub fn evaluate(&self, genotypes: &GenotypeTable<'_>) -> i64 {
        match self {
            Formula::Score(score) => score.evaluate(genotypes),
            Formula::If(expr) => expr.evaluate(genotypes),
        }
    }
}

impl ScoreExpr {
    pub fn evaluate(&self, genotypes: &GenotypeTable<'_>) -> i64 {
        self.groups
            .iter()
            .map(|group| group.evaluate(genotypes))
            .fold(0, i64::saturating_add)
    }
}

impl RuleGroup {
    /// Points of the first rule matching the call at this group's rsid.
    pub fn evaluate(&self, genotypes: &GenotypeTable<'_>) -> i64 {
        let Some(called) = genotypes.lookup(&self.rsid) else {
            return 0;
        };
        self.rules
            .iter()
            .find(|rule| rule.genotype == called)
            .map_or(0, |rule| rule.points)
    }
}

impl Condition {
    /// Exact, case-sensitive match. `AG` and `GA` are different genotypes.
    pub fn holds(&self, genotypes: &GenotypeTable<'_>) -> bool {
        !self.genotype.is_empty() && genotypes.lookup(&self.rsid) == Some(self.genotype.as_str())
    }
}

impl IfExpr {
    pub fn evaluate(&self, genotypes: &GenotypeTable<'_>) -> i64 {
        if self.condition.holds(genotypes) {
            self.then_branch.evaluate(genotypes)
        } else {
            self.else_branch.evaluate(genotypes)
        }
    }
}

impl Branch {
    pub fn evaluate(&self, genotypes: &GenotypeTable<'_>) -> i64 {
        match self {
            Branch::Score(score) => score.evaluate(genotypes),
            Branch::Literal(value) => *value,
        }
    }
}
