//! JSON import and export of user traits.
//!
//! An interchange file is a JSON array of trait documents. Import checks the
//! shape of every element before anything is accepted; export writes only
//! user-created traits.

use std::path::Path;

use chrono::NaiveDate;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

use crate::error::TraitsResult;
use crate::model::Trait;
use crate::store::{ImportReport, TraitRepository};

#[derive(Debug, Error, Diagnostic)]
pub enum InterchangeError {
    #[error("import is not valid JSON: {message}")]
    #[diagnostic(
        code(rootara::interchange::json),
        help("The file must contain a JSON array of trait objects, as written by `rootara-traits export`.")
    )]
    InvalidJson { message: String },

    #[error("import must be a JSON array of traits, found {found}")]
    #[diagnostic(
        code(rootara::interchange::not_an_array),
        help("Wrap single traits in `[ ... ]`.")
    )]
    NotAnArray { found: &'static str },

    #[error("trait #{index}: field \"{field}\" must be {expected}")]
    #[diagnostic(
        code(rootara::interchange::invalid_element),
        help(
            "Each trait needs object `name`, `description` and `scoreThresholds`, \
             string `category` and `formula`, and array `rsids`, `referenceGenotypes` \
             and `yourGenotypes`."
        )
    )]
    InvalidElement {
        index: usize,
        field: &'static str,
        expected: &'static str,
    },

    #[error("trait #{index} could not be decoded: {message}")]
    #[diagnostic(code(rootara::interchange::decode))]
    Decode { index: usize, message: String },

    #[error("there are no custom traits to export")]
    #[diagnostic(
        code(rootara::interchange::nothing_to_export),
        help("Built-in traits are never exported. Create or import a trait first.")
    )]
    NothingToExport,

    #[error("failed to encode export: {message}")]
    #[diagnostic(code(rootara::interchange::encode))]
    Encode { message: String },

    #[error("interchange file I/O failed: {path}")]
    #[diagnostic(code(rootara::interchange::io), help("Check the path and its permissions."))]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

pub type InterchangeResult<T> = std::result::Result<T, InterchangeError>;

#[derive(Clone, Copy)]
enum Shape {
    Object,
    Str,
    Array,
}

impl Shape {
    fn accepts(self, v: &Value) -> bool {
        match self {
            Shape::Object => v.is_object(),
            Shape::Str => v.is_string(),
            Shape::Array => v.is_array(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Shape::Object => "an object",
            Shape::Str => "a string",
            Shape::Array => "an array",
        }
    }
}

/// Fields every imported element must carry, with their JSON shape.
const REQUIRED_FIELDS: [(&str, Shape); 8] = [
    ("name", Shape::Object),
    ("description", Shape::Object),
    ("category", Shape::Str),
    ("rsids", Shape::Array),
    ("referenceGenotypes", Shape::Array),
    ("yourGenotypes", Shape::Array),
    ("formula", Shape::Str),
    ("scoreThresholds", Shape::Object),
];

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Parse and shape-check an interchange document.
///
/// Any malformed element rejects the whole document.
pub fn parse_import(json: &str) -> InterchangeResult<Vec<Trait>> {
    let root: Value = serde_json::from_str(json).map_err(|e| InterchangeError::InvalidJson {
        message: e.to_string(),
    })?;
    let Value::Array(elements) = root else {
        return Err(InterchangeError::NotAnArray {
            found: json_kind(&root),
        });
    };

    for (index, element) in elements.iter().enumerate() {
        if !element.is_object() {
            return Err(InterchangeError::InvalidElement {
                index,
                field: "(element)",
                expected: "an object",
            });
        }
        for (field, shape) in REQUIRED_FIELDS {
            if !element.get(field).is_some_and(|v| shape.accepts(v)) {
                return Err(InterchangeError::InvalidElement {
                    index,
                    field,
                    expected: shape.describe(),
                });
            }
        }
    }

    elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| {
            serde_json::from_value(element).map_err(|e| InterchangeError::Decode {
                index,
                message: e.to_string(),
            })
        })
        .collect()
}

/// Read and parse an interchange file.
pub fn read_import(path: &Path) -> InterchangeResult<Vec<Trait>> {
    let content = std::fs::read_to_string(path).map_err(|source| InterchangeError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_import(&content)
}

/// Pretty-printed JSON array of the user traits in `traits`.
pub fn export_user_traits(traits: &[Trait]) -> InterchangeResult<String> {
    let user: Vec<&Trait> = traits.iter().filter(|t| !t.is_default).collect();
    if user.is_empty() {
        return Err(InterchangeError::NothingToExport);
    }
    serde_json::to_string_pretty(&user).map_err(|e| InterchangeError::Encode {
        message: e.to_string(),
    })
}

/// Parse `json` and import its traits into `repo` as one batch.
pub fn import_into(repo: &TraitRepository, json: &str) -> TraitsResult<ImportReport> {
    let traits = parse_import(json)?;
    Ok(repo.import(traits)?)
}

/// Read an interchange file and import it into `repo`.
pub fn import_file(repo: &TraitRepository, path: &Path) -> TraitsResult<ImportReport> {
    let traits = read_import(path)?;
    let report = repo.import(traits)?;
    tracing::info!(path = %path.display(), imported = report.imported.len(), "imported file");
    Ok(report)
}

/// The export document for the user traits held by `repo`.
pub fn export_from(repo: &TraitRepository) -> TraitsResult<String> {
    Ok(export_user_traits(&repo.user_traits()?)?)
}

/// Conventional export file name for the given day.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("traits-export-{}.json", date.format("%Y-%m-%d"))
}

/// Write an export document to `path`.
pub fn write_export(path: &Path, document: &str) -> InterchangeResult<()> {
    std::fs::write(path, document).map_err(|source| InterchangeError::Io {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocalizedText, TraitCategory};
    use crate::thresholds::ScoreThresholds;

    const VALID: &str = r#"[{
        "id": "user-1",
        "name": {"en": "Sleep", "zh-CN": "睡眠"},
        "description": {"en": "d", "zh-CN": "d"},
        "category": "lifestyle",
        "rsids": ["rs1801260"],
        "referenceGenotypes": ["CC"],
        "yourGenotypes": ["CT"],
        "formula": "SCORE(rs1801260:CT=2)",
        "scoreThresholds": {"Evening": 2, "Morning": 0}
    }]"#;

    #[test]
    fn valid_document_parses() {
        let traits = parse_import(VALID).unwrap();
        assert_eq!(traits.len(), 1);
        assert_eq!(traits[0].category, TraitCategory::Lifestyle);
        assert_eq!(traits[0].score_thresholds.len(), 2);
    }

    #[test]
    fn non_array_is_rejected() {
        assert!(matches!(
            parse_import(r#"{"name": {}}"#),
            Err(InterchangeError::NotAnArray { found: "an object" })
        ));
        assert!(matches!(
            parse_import("not json"),
            Err(InterchangeError::InvalidJson { .. })
        ));
    }

    #[test]
    fn one_bad_element_rejects_the_import() {
        let mut docs: Vec<Value> = serde_json::from_str(VALID).unwrap();
        let mut bad = docs[0].clone();
        bad["rsids"] = Value::String("rs1801260".into());
        docs.push(bad);
        let json = serde_json::to_string(&docs).unwrap();
        match parse_import(&json) {
            Err(InterchangeError::InvalidElement { index, field, .. }) => {
                assert_eq!(index, 1);
                assert_eq!(field, "rsids");
            }
            other => panic!("expected InvalidElement, got {other:?}"),
        }
    }

    #[test]
    fn missing_field_is_reported() {
        let mut docs: Vec<Value> = serde_json::from_str(VALID).unwrap();
        docs[0].as_object_mut().unwrap().remove("scoreThresholds");
        let json = serde_json::to_string(&docs).unwrap();
        assert!(matches!(
            parse_import(&json),
            Err(InterchangeError::InvalidElement { field: "scoreThresholds", .. })
        ));
    }

    #[test]
    fn export_excludes_built_ins() {
        let mut built_in = Trait::draft(LocalizedText::uniform("B"), TraitCategory::Risk);
        built_in.is_default = true;
        let user = Trait::draft(LocalizedText::uniform("U"), TraitCategory::Risk)
            .with_thresholds(ScoreThresholds::new().with("Yes", true));

        let doc = export_user_traits(&[built_in.clone(), user]).unwrap();
        assert!(doc.starts_with("[\n  {"));
        let back: Vec<Value> = serde_json::from_str(&doc).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0]["name"]["en"], "U");

        assert!(matches!(
            export_user_traits(&[built_in]),
            Err(InterchangeError::NothingToExport)
        ));
    }

    #[test]
    fn export_import_export_is_stable() {
        let repo = TraitRepository::memory_only(crate::catalog::Catalog::empty());
        import_into(&repo, VALID).unwrap();
        let first = export_from(&repo).unwrap();
        assert!(first.contains(r#""Evening": 2,"#));

        let copy = TraitRepository::memory_only(crate::catalog::Catalog::empty());
        import_into(&copy, &first).unwrap();
        assert_eq!(export_from(&copy).unwrap(), first);
    }

    #[test]
    fn import_errors_pass_through_the_top_level_type() {
        let repo = TraitRepository::memory_only(crate::catalog::Catalog::empty());
        assert!(matches!(
            import_into(&repo, "{}"),
            Err(crate::error::TraitsError::Interchange(InterchangeError::NotAnArray { .. }))
        ));
        assert!(matches!(
            export_from(&repo),
            Err(crate::error::TraitsError::Interchange(InterchangeError::NothingToExport))
        ));
        let missing = std::path::Path::new("/nonexistent/traits.json");
        assert!(matches!(
            import_file(&repo, missing),
            Err(crate::error::TraitsError::Interchange(InterchangeError::Io { .. }))
        ));
    }

    #[test]
    fn export_file_name_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(export_file_name(date), "traits-export-2024-03-09.json");
    }
}
