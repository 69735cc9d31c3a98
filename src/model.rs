//! Trait records: the unit of genetic interpretation.
//!
//! A [`Trait`] pairs a list of variants (`rsids`) with the user's genotype at
//! each position, a scoring formula, and a threshold table that maps the score
//! onto a label. JSON field names follow the documents served by the genomics
//! backend (`camelCase`, localized text keyed by `en` / `zh-CN`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::thresholds::ScoreThresholds;

// ---------------------------------------------------------------------------
// Language & localized text
// ---------------------------------------------------------------------------

/// Display language for localized fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    En,
    #[serde(rename = "zh-CN")]
    ZhCn,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::ZhCn => "zh-CN",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "en-us" | "english" => Ok(Language::En),
            "zh" | "zh-cn" | "chinese" => Ok(Language::ZhCn),
            other => Err(format!("unsupported language \"{other}\" (expected en or zh-CN)")),
        }
    }
}

/// Text with an English and a Simplified Chinese rendering.
///
/// User-created traits may carry only a `default` entry; lookups fall back
/// to it, then to English.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    #[serde(default)]
    pub en: String,
    #[serde(rename = "zh-CN", default)]
    pub zh_cn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

impl LocalizedText {
    pub fn new(en: impl Into<String>, zh_cn: impl Into<String>) -> Self {
        Self {
            en: en.into(),
            zh_cn: zh_cn.into(),
            default: None,
        }
    }

    /// The same text in every language. Result labels are stored this way.
    pub fn uniform(text: impl Into<String>) -> Self {
        let text = text.into();
        Self::new(text.clone(), text)
    }

    /// Text for `language`, falling back to `default` and then English.
    pub fn get(&self, language: Language) -> &str {
        let primary = match language {
            Language::En => &self.en,
            Language::ZhCn => &self.zh_cn,
        };
        if !primary.is_empty() {
            return primary;
        }
        match &self.default {
            Some(d) if !d.is_empty() => d,
            _ => &self.en,
        }
    }

    /// True when no language (nor the fallback) has any text.
    pub fn is_blank(&self) -> bool {
        self.en.trim().is_empty()
            && self.zh_cn.trim().is_empty()
            && self.default.as_deref().is_none_or(|d| d.trim().is_empty())
    }
}

// ---------------------------------------------------------------------------
// Category & confidence
// ---------------------------------------------------------------------------

/// Grouping used by trait listings and filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraitCategory {
    #[default]
    Appearance,
    Internal,
    Nutrition,
    Risk,
    Lifestyle,
}

impl TraitCategory {
    pub const ALL: [TraitCategory; 5] = [
        TraitCategory::Appearance,
        TraitCategory::Internal,
        TraitCategory::Nutrition,
        TraitCategory::Risk,
        TraitCategory::Lifestyle,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            TraitCategory::Appearance => "appearance",
            TraitCategory::Internal => "internal",
            TraitCategory::Nutrition => "nutrition",
            TraitCategory::Risk => "risk",
            TraitCategory::Lifestyle => "lifestyle",
        }
    }

    /// Human-readable category name.
    pub fn display_name(self, language: Language) -> &'static str {
        match (self, language) {
            (TraitCategory::Appearance, Language::En) => "Appearance",
            (TraitCategory::Appearance, Language::ZhCn) => "外观",
            (TraitCategory::Internal, Language::En) => "Internal",
            (TraitCategory::Internal, Language::ZhCn) => "内在",
            (TraitCategory::Nutrition, Language::En) => "Nutrition",
            (TraitCategory::Nutrition, Language::ZhCn) => "营养",
            (TraitCategory::Risk, Language::En) => "Risk",
            (TraitCategory::Risk, Language::ZhCn) => "风险",
            (TraitCategory::Lifestyle, Language::En) => "Lifestyle",
            (TraitCategory::Lifestyle, Language::ZhCn) => "生活",
        }
    }
}

impl fmt::Display for TraitCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TraitCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| {
                format!(
                    "unknown category \"{s}\" (expected one of: appearance, internal, nutrition, risk, lifestyle)"
                )
            })
    }
}

/// How well-established the variant/trait association is.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    #[default]
    Medium,
    Low,
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

fn default_icon() -> String {
    "AlertCircle".into()
}

/// A named genetic interpretation computed from one or more variants.
///
/// `your_genotypes` and `reference_genotypes` are positionally aligned with
/// `rsids`. `result` and `result_current` are caches of the evaluated label
/// and are rewritten by [`crate::evaluate::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trait {
    #[serde(default)]
    pub id: String,
    pub name: LocalizedText,
    #[serde(default)]
    pub result: LocalizedText,
    #[serde(
        rename = "result_current",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub result_current: String,
    #[serde(default)]
    pub description: LocalizedText,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default)]
    pub confidence: Confidence,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub category: TraitCategory,
    #[serde(default)]
    pub rsids: Vec<String>,
    #[serde(default)]
    pub reference_genotypes: Vec<String>,
    #[serde(default)]
    pub your_genotypes: Vec<String>,
    #[serde(default)]
    pub formula: String,
    #[serde(default)]
    pub score_thresholds: ScoreThresholds,
    /// PubMed identifiers backing the association.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reference: Vec<String>,
}

impl Trait {
    /// Start a user-authored trait with the given display name.
    ///
    /// The id is left empty; the repository assigns one on insert.
    pub fn draft(name: LocalizedText, category: TraitCategory) -> Self {
        Self {
            id: String::new(),
            name,
            result: LocalizedText::default(),
            result_current: String::new(),
            description: LocalizedText::default(),
            icon: default_icon(),
            confidence: Confidence::default(),
            is_default: false,
            created_at: String::new(),
            category,
            rsids: Vec::new(),
            reference_genotypes: Vec::new(),
            your_genotypes: Vec::new(),
            formula: String::new(),
            score_thresholds: ScoreThresholds::default(),
            reference: Vec::new(),
        }
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = formula.into();
        self
    }

    pub fn with_thresholds(mut self, thresholds: ScoreThresholds) -> Self {
        self.score_thresholds = thresholds;
        self
    }

    pub fn with_description(mut self, description: LocalizedText) -> Self {
        self.description = description;
        self
    }

    /// Append a variant with the user's and the reference genotype.
    pub fn with_variant(
        mut self,
        rsid: impl Into<String>,
        yours: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        self.rsids.push(rsid.into());
        self.your_genotypes.push(yours.into());
        self.reference_genotypes.push(reference.into());
        self
    }

    /// Pad or truncate the genotype arrays so they line up with `rsids`.
    ///
    /// Padding uses the empty string, which the evaluator treats as missing.
    pub fn align_genotypes(&mut self) {
        let n = self.rsids.len();
        self.your_genotypes.resize(n, String::new());
        self.reference_genotypes.resize(n, String::new());
    }

    /// Split comma-joined reference entries ("123,456") into separate ids.
    pub fn normalize_references(&mut self) {
        self.reference = self
            .reference
            .iter()
            .flat_map(|r| r.split(','))
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from)
            .collect();
    }

    /// Case-insensitive substring match on the name in `language`.
    pub fn matches_search(&self, query: &str, language: Language) -> bool {
        let query = query.trim().to_lowercase();
        query.is_empty() || self.name.get(language).to_lowercase().contains(&query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn localized_text_fallbacks() {
        let text = LocalizedText {
            en: String::new(),
            zh_cn: String::new(),
            default: Some("Custom".into()),
        };
        assert_eq!(text.get(Language::En), "Custom");
        assert_eq!(text.get(Language::ZhCn), "Custom");

        let text = LocalizedText::new("Eye Color", "");
        assert_eq!(text.get(Language::ZhCn), "Eye Color");
        assert!(!text.is_blank());
        assert!(LocalizedText::default().is_blank());
    }

    #[test]
    fn trait_json_uses_backend_field_names() {
        let json = r#"{
            "id": "t1",
            "name": {"en": "Eye Color", "zh-CN": "眼睛颜色"},
            "description": {"en": "d", "zh-CN": "d"},
            "category": "appearance",
            "confidence": "high",
            "isDefault": true,
            "rsids": ["rs12913832"],
            "referenceGenotypes": ["GG"],
            "yourGenotypes": ["AG"],
            "formula": "SCORE(rs12913832:GG=10,AG=5)",
            "scoreThresholds": {"Blue": 10, "Brown": 0}
        }"#;
        let t: Trait = serde_json::from_str(json).unwrap();
        assert_eq!(t.name.get(Language::ZhCn), "眼睛颜色");
        assert!(t.is_default);
        assert_eq!(t.your_genotypes, vec!["AG"]);
        assert_eq!(t.icon, "AlertCircle");
        assert_eq!(t.score_thresholds.len(), 2);

        let back = serde_json::to_value(&t).unwrap();
        assert!(back.get("yourGenotypes").is_some());
        assert!(back.get("scoreThresholds").is_some());
        assert!(back.get("result_current").is_none());
    }

    #[test]
    fn category_round_trips_through_str() {
        for c in TraitCategory::ALL {
            assert_eq!(c.as_str().parse::<TraitCategory>().unwrap(), c);
        }
        assert!("sleep".parse::<TraitCategory>().is_err());
        assert_eq!(TraitCategory::Risk.display_name(Language::ZhCn), "风险");
    }

    #[test]
    fn align_pads_missing_genotypes() {
        let mut t = Trait::draft(LocalizedText::uniform("x"), TraitCategory::Risk);
        t.rsids = vec!["rs1".into(), "rs2".into()];
        t.your_genotypes = vec!["AA".into()];
        t.align_genotypes();
        assert_eq!(t.your_genotypes, vec!["AA".to_string(), String::new()]);
        assert_eq!(t.reference_genotypes.len(), 2);
    }

    #[test]
    fn references_are_split_on_commas() {
        let mut t = Trait::draft(LocalizedText::uniform("x"), TraitCategory::Risk);
        t.reference = vec!["12345678, 98765432".into(), "11111111".into(), " ".into()];
        t.normalize_references();
        assert_eq!(t.reference, vec!["12345678", "98765432", "11111111"]);
    }

    #[test]
    fn search_is_case_insensitive() {
        let t = Trait::draft(LocalizedText::new("Eye Color", "眼睛颜色"), TraitCategory::Appearance);
        assert!(t.matches_search("eye", Language::En));
        assert!(t.matches_search("颜色", Language::ZhCn));
        assert!(!t.matches_search("hair", Language::En));
        assert!(t.matches_search("  ", Language::En));
    }
}
