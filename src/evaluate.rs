//! Trait-level evaluation: score the formula, derive the label, and write
//! the cached `result` fields back onto the record.

use serde::Serialize;

use crate::formula::{self, Formula, FormulaResult};
use crate::genotype::GenotypeTable;
use crate::model::{LocalizedText, Trait};

/// Outcome of evaluating one trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraitEvaluation {
    pub id: String,
    pub score: i64,
    /// Empty when the trait has no thresholds.
    pub label: String,
    /// Variants with a usable genotype call.
    pub called_variants: usize,
}

/// Score and label a trait without modifying it.
pub fn evaluate_trait(t: &Trait) -> TraitEvaluation {
    let score = formula::evaluate(&t.formula, &t.rsids, &t.your_genotypes);
    let label = t.score_thresholds.derive(score).unwrap_or_default().to_string();
    TraitEvaluation {
        id: t.id.clone(),
        score,
        label,
        called_variants: GenotypeTable::from_trait(t).called(),
    }
}

/// Evaluate and overwrite `result` / `result_current`.
pub fn apply(t: &mut Trait) -> TraitEvaluation {
    let evaluation = evaluate_trait(t);
    t.result = LocalizedText::uniform(evaluation.label.clone());
    t.result_current = evaluation.label.clone();
    evaluation
}

/// Evaluate every trait in place.
pub fn apply_all(traits: &mut [Trait]) -> Vec<TraitEvaluation> {
    traits.iter_mut().map(apply).collect()
}

/// Strictly validate a trait's formula.
///
/// Rsids referenced by the formula but absent from the trait are logged;
/// they would always contribute 0.
pub fn check_formula(t: &Trait) -> FormulaResult<Formula> {
    let parsed = Formula::parse_strict(&t.formula)?;
    for rsid in parsed.referenced_rsids() {
        if !t.rsids.iter().any(|r| r == rsid) {
            tracing::warn!(trait_id = %t.id, rsid, "formula references an rsid the trait does not list");
        }
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TraitCategory;
    use crate::thresholds::ScoreThresholds;

    fn eye_color(yours: &str) -> Trait {
        Trait::draft(LocalizedText::new("Eye Color", "眼睛颜色"), TraitCategory::Appearance)
            .with_variant("rs12913832", yours, "GG")
            .with_formula("SCORE(rs12913832:GG=10,AG=5,AA=0)")
            .with_thresholds(
                ScoreThresholds::new()
                    .with("Blue", 10)
                    .with("Green", 5)
                    .with("Brown", 0),
            )
    }

    #[test]
    fn apply_writes_result_fields() {
        let mut t = eye_color("AG");
        let eval = apply(&mut t);
        assert_eq!(eval.score, 5);
        assert_eq!(eval.label, "Green");
        assert_eq!(eval.called_variants, 1);
        assert_eq!(t.result.en, "Green");
        assert_eq!(t.result.zh_cn, "Green");
        assert_eq!(t.result_current, "Green");
    }

    #[test]
    fn stale_result_is_rederived() {
        let mut t = eye_color("GG");
        t.result = LocalizedText::uniform("Brown");
        t.result_current = "Brown".into();
        apply(&mut t);
        assert_eq!(t.result_current, "Blue");
    }

    #[test]
    fn no_thresholds_means_empty_label() {
        let mut t = eye_color("GG").with_thresholds(ScoreThresholds::new());
        let eval = apply(&mut t);
        assert_eq!(eval.score, 10);
        assert!(eval.label.is_empty());
        assert!(t.result.en.is_empty() && t.result.zh_cn.is_empty());
    }

    #[test]
    fn missing_genotype_scores_default_tier() {
        let eval = evaluate_trait(&eye_color("--"));
        assert_eq!(eval.score, 0);
        assert_eq!(eval.label, "Brown");
        assert_eq!(eval.called_variants, 0);
    }

    #[test]
    fn check_formula_accepts_valid_and_rejects_broken() {
        assert!(check_formula(&eye_color("AG")).is_ok());
        let broken = eye_color("AG").with_formula("SCORE(rs12913832 GG=10)");
        assert!(check_formula(&broken).is_err());
    }
}
