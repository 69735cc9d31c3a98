//! Genotype sources.
//!
//! Traits carry the user's genotype at each rsid, materialized from a
//! report. [`BackendClient`] asks the genomics backend for them over HTTP;
//! [`StaticGenotypes`] serves a fixed table for demos and tests.

use std::collections::HashMap;
use std::time::Duration;

use miette::Diagnostic;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::config::BackendConfig;
use crate::evaluate::{self, TraitEvaluation};
use crate::genotype::MISSING_GENOTYPE;
use crate::model::Trait;

#[derive(Debug, Error, Diagnostic)]
pub enum BackendError {
    #[error("genomics backend is not reachable at {url}: {message}")]
    #[diagnostic(
        code(rootara::backend::unavailable),
        help("Check ROOTARA_BACKEND_URL (or `backend.base_url` in config.toml) and that the backend is running.")
    )]
    Unavailable { url: String, message: String },

    #[error("genomics backend returned HTTP {status}: {body}")]
    #[diagnostic(
        code(rootara::backend::status),
        help("A 401/403 usually means the API key is wrong; set ROOTARA_BACKEND_API_KEY.")
    )]
    Status { status: u16, body: String },

    #[error("failed to parse backend response: {message}")]
    #[diagnostic(
        code(rootara::backend::parse),
        help("The backend returned an unexpected response format.")
    )]
    Parse { message: String },

    #[error("a report id is required to fetch genotypes")]
    #[diagnostic(code(rootara::backend::missing_report))]
    MissingReport,
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Reference and user genotype at one rsid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenotypeCall {
    pub reference: String,
    pub user: String,
}

impl GenotypeCall {
    pub fn new(reference: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            user: user.into(),
        }
    }

    /// Placeholder for an rsid the source could not resolve.
    pub fn missing() -> Self {
        Self::new(MISSING_GENOTYPE, MISSING_GENOTYPE)
    }
}

/// Something that can resolve rsids to genotype calls for a report.
pub trait GenotypeSource {
    /// Calls for the requested rsids. Unresolvable rsids may be absent
    /// from the map.
    fn fetch(&self, rsids: &[String], report_id: &str)
    -> BackendResult<HashMap<String, GenotypeCall>>;
}

/// Fill a trait's genotype arrays from `source` and re-evaluate it.
///
/// A failing source degrades every position to `--` rather than erroring.
pub fn resolve_genotypes(
    t: &mut Trait,
    source: &dyn GenotypeSource,
    report_id: &str,
) -> TraitEvaluation {
    let calls = match source.fetch(&t.rsids, report_id) {
        Ok(calls) => calls,
        Err(e) => {
            tracing::warn!(trait_id = %t.id, report_id, error = %e, "genotype fetch failed");
            HashMap::new()
        }
    };

    let (reference, yours): (Vec<String>, Vec<String>) = t
        .rsids
        .iter()
        .map(|rsid| {
            let call = calls.get(rsid).cloned().unwrap_or_else(GenotypeCall::missing);
            (call.reference, call.user)
        })
        .unzip();
    t.reference_genotypes = reference;
    t.your_genotypes = yours;
    evaluate::apply(t)
}

// ---------------------------------------------------------------------------
// Static table
// ---------------------------------------------------------------------------

/// A fixed rsid -> call table that ignores the report id.
#[derive(Debug, Clone, Default)]
pub struct StaticGenotypes {
    calls: HashMap<String, GenotypeCall>,
}

impl StaticGenotypes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, rsid: impl Into<String>, reference: &str, user: &str) -> Self {
        self.calls.insert(rsid.into(), GenotypeCall::new(reference, user));
        self
    }

    /// Demo table covering the variants of the built-in catalog.
    pub fn demo() -> Self {
        [
            ("rs12913832", "GG", "AG"),
            ("rs1800407", "CC", "CT"),
            ("rs16891982", "CC", "CC"),
            ("rs1393350", "GG", "AG"),
            ("rs4778138", "GG", "AG"),
            ("rs683", "CC", "CT"),
            ("rs3827760", "AA", "AG"),
            ("rs11803731", "GG", "AG"),
            ("rs713598", "CC", "CG"),
            ("rs1726866", "AA", "AG"),
            ("rs10246939", "TT", "CT"),
            ("rs762551", "AA", "AC"),
            ("rs2472297", "CC", "CT"),
            ("rs4988235", "TT", "CT"),
            ("rs182549", "TT", "CT"),
            ("rs671", "GG", "GG"),
            ("rs1229984", "CC", "CC"),
            ("rs73598374", "CC", "CT"),
            ("rs5751876", "TT", "TC"),
            ("rs1801260", "CC", "CC"),
            ("rs228697", "GG", "GG"),
            ("rs6265", "GG", "AG"),
            ("rs17070145", "CC", "CT"),
            ("rs9854612", "TT", "CT"),
            ("rs4148254", "GG", "GA"),
        ]
        .into_iter()
        .fold(Self::new(), |table, (rsid, reference, user)| {
            table.with(rsid, reference, user)
        })
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }
}

impl GenotypeSource for StaticGenotypes {
    fn fetch(
        &self,
        rsids: &[String],
        _report_id: &str,
    ) -> BackendResult<HashMap<String, GenotypeCall>> {
        Ok(rsids
            .iter()
            .filter_map(|r| self.calls.get(r).map(|c| (r.clone(), c.clone())))
            .collect())
    }
}

// ---------------------------------------------------------------------------
// HTTP client
// ---------------------------------------------------------------------------

/// One entry of the `/variant/rsid` response.
#[derive(Debug, Deserialize)]
struct VariantEntry {
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default)]
    genotype: Option<String>,
}

/// Map a `/variant/rsid` response body onto calls for `rsids`.
///
/// The reference genotype is the reference allele doubled. Entries with a
/// null allele or genotype are unresolvable and map to `--`.
pub fn parse_variant_response(
    rsids: &[String],
    body: &Value,
) -> BackendResult<HashMap<String, GenotypeCall>> {
    let Some(map) = body.as_object() else {
        return Err(BackendError::Parse {
            message: "expected a JSON object keyed by rsid".into(),
        });
    };

    let mut out = HashMap::with_capacity(rsids.len());
    for rsid in rsids {
        let call = map
            .get(rsid)
            .and_then(|v| serde_json::from_value::<VariantEntry>(v.clone()).ok())
            .and_then(|entry| match (entry.reference, entry.genotype) {
                (Some(r), Some(g)) => Some(GenotypeCall::new(format!("{r}{r}"), g)),
                _ => None,
            })
            .unwrap_or_else(GenotypeCall::missing);
        out.insert(rsid.clone(), call);
    }
    Ok(out)
}

/// Synchronous client for the genomics backend.
pub struct BackendClient {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build();
        if config.api_key.is_empty() {
            tracing::warn!("no backend API key configured; requests will likely be rejected");
        }
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl GenotypeSource for BackendClient {
    fn fetch(
        &self,
        rsids: &[String],
        report_id: &str,
    ) -> BackendResult<HashMap<String, GenotypeCall>> {
        if report_id.trim().is_empty() {
            return Err(BackendError::MissingReport);
        }
        if rsids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/variant/rsid", self.base_url);
        let body = serde_json::json!({
            "rsid": rsids,
            "report_id": report_id,
        });
        tracing::debug!(%url, report_id, count = rsids.len(), "fetching genotypes");

        let resp = match self
            .agent
            .post(&url)
            .set("accept", "application/json")
            .set("x-api-key", &self.api_key)
            .send_json(body)
        {
            Ok(resp) => resp,
            Err(ureq::Error::Status(status, resp)) => {
                return Err(BackendError::Status {
                    status,
                    body: resp.into_string().unwrap_or_default(),
                });
            }
            Err(ureq::Error::Transport(t)) => {
                return Err(BackendError::Unavailable {
                    url,
                    message: t.to_string(),
                });
            }
        };

        let json: Value = resp.into_json().map_err(|e| BackendError::Parse {
            message: e.to_string(),
        })?;
        parse_variant_response(rsids, &json)
    }
}

impl std::fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LocalizedText, TraitCategory};
    use crate::thresholds::ScoreThresholds;

    fn rsids(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn response_mapping_doubles_reference_allele() {
        let body = serde_json::json!({
            "rs1": {"ref": "G", "genotype": "AG"},
            "rs2": {"ref": null, "genotype": "CC"},
            "rs3": {"ref": "T", "genotype": null},
        });
        let calls = parse_variant_response(&rsids(&["rs1", "rs2", "rs3", "rs4"]), &body).unwrap();
        assert_eq!(calls["rs1"], GenotypeCall::new("GG", "AG"));
        assert_eq!(calls["rs2"], GenotypeCall::missing());
        assert_eq!(calls["rs3"], GenotypeCall::missing());
        assert_eq!(calls["rs4"], GenotypeCall::missing());
    }

    #[test]
    fn non_object_response_is_an_error() {
        let body = serde_json::json!(["rs1"]);
        assert!(matches!(
            parse_variant_response(&rsids(&["rs1"]), &body),
            Err(BackendError::Parse { .. })
        ));
    }

    struct Failing;

    impl GenotypeSource for Failing {
        fn fetch(&self, _: &[String], _: &str) -> BackendResult<HashMap<String, GenotypeCall>> {
            Err(BackendError::Unavailable {
                url: "http://backend".into(),
                message: "connection refused".into(),
            })
        }
    }

    fn eye_color() -> Trait {
        let mut t = Trait::draft(LocalizedText::uniform("Eye"), TraitCategory::Appearance)
            .with_formula("SCORE(rs12913832:GG=10,AG=5,AA=0)")
            .with_thresholds(ScoreThresholds::new().with("Blue", 10).with("Brown", 0));
        t.rsids = rsids(&["rs12913832", "rs0"]);
        t
    }

    #[test]
    fn resolve_fills_arrays_and_evaluates() {
        let mut t = eye_color();
        let eval = resolve_genotypes(&mut t, &StaticGenotypes::demo(), "report-1");
        assert_eq!(t.your_genotypes, vec!["AG", "--"]);
        assert_eq!(t.reference_genotypes, vec!["GG", "--"]);
        assert_eq!(eval.score, 5);
        assert_eq!(t.result_current, "Brown");
    }

    #[test]
    fn failing_source_degrades_to_missing() {
        let mut t = eye_color();
        let eval = resolve_genotypes(&mut t, &Failing, "report-1");
        assert_eq!(t.your_genotypes, vec!["--", "--"]);
        assert_eq!(eval.score, 0);
        assert_eq!(eval.called_variants, 0);
    }

    #[test]
    fn client_requires_report_id() {
        let client = BackendClient::new(&BackendConfig::default());
        assert!(matches!(
            client.fetch(&rsids(&["rs1"]), " "),
            Err(BackendError::MissingReport)
        ));
        assert!(client.fetch(&[], "r").unwrap().is_empty());
    }
}
