//! Score thresholds and result derivation.
//!
//! A threshold table maps result labels to either a minimum score or a
//! boolean flag. A `true` flag overrides scoring entirely; numeric entries
//! are tiers checked from the highest threshold down.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize, Serializer};

/// A single threshold value.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    /// Override flag: a `true` entry is the result regardless of score.
    Flag(bool),
    /// Minimum score required for the label.
    Score(f64),
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Flag(b) => write!(f, "{b}"),
            Threshold::Score(v) => write!(f, "{v}"),
        }
    }
}

/// Whole-number scores are written as integers (`10`, not `10.0`).
impl Serialize for Threshold {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Threshold::Flag(b) => serializer.serialize_bool(b),
            Threshold::Score(v) if v.fract() == 0.0 && v.abs() < i64::MAX as f64 => {
                serializer.serialize_i64(v as i64)
            }
            Threshold::Score(v) => serializer.serialize_f64(v),
        }
    }
}

impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "true" => Ok(Threshold::Flag(true)),
            "false" => Ok(Threshold::Flag(false)),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Threshold::Score)
                .ok_or_else(|| format!("threshold \"{other}\" is neither a number nor true/false")),
        }
    }
}

impl From<bool> for Threshold {
    fn from(b: bool) -> Self {
        Threshold::Flag(b)
    }
}

impl From<f64> for Threshold {
    fn from(v: f64) -> Self {
        Threshold::Score(v)
    }
}

impl From<i32> for Threshold {
    fn from(v: i32) -> Self {
        Threshold::Score(f64::from(v))
    }
}

impl From<i64> for Threshold {
    fn from(v: i64) -> Self {
        Threshold::Score(v as f64)
    }
}

/// Label -> threshold table of a trait.
///
/// Stored as a sorted map so serialization and derivation never depend on
/// the order entries were inserted in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreThresholds(BTreeMap<String, Threshold>);

impl ScoreThresholds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, label: impl Into<String>, threshold: impl Into<Threshold>) {
        self.0.insert(label.into(), threshold.into());
    }

    pub fn with(mut self, label: impl Into<String>, threshold: impl Into<Threshold>) -> Self {
        self.insert(label, threshold);
        self
    }

    pub fn get(&self, label: &str) -> Option<Threshold> {
        self.0.get(label).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Threshold)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Numeric tiers ordered from the highest threshold down.
    pub fn tiers(&self) -> Vec<(&str, f64)> {
        let mut tiers: Vec<(&str, f64)> = self
            .iter()
            .filter_map(|(label, t)| match t {
                Threshold::Score(v) => Some((label, v)),
                Threshold::Flag(_) => None,
            })
            .collect();
        tiers.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        tiers
    }

    /// Map `score` onto a label. See [`derive_result`].
    pub fn derive(&self, score: i64) -> Option<&str> {
        derive_result(score, self)
    }
}

impl<K: Into<String>, T: Into<Threshold>> FromIterator<(K, T)> for ScoreThresholds {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, t)| (k.into(), t.into()))
                .collect(),
        )
    }
}

/// Derive the result label for `score`.
///
/// 1. Any `true` flag wins (the first by label order if several are set).
/// 2. Otherwise the highest numeric tier whose threshold is `<= score`.
/// 3. Otherwise the lowest numeric tier.
/// 4. With only `false` flags, the first flag by label order.
///
/// Returns `None` only for an empty table.
pub fn derive_result(score: i64, thresholds: &ScoreThresholds) -> Option<&str> {
    if let Some((label, _)) = thresholds
        .iter()
        .find(|(_, t)| matches!(t, Threshold::Flag(true)))
    {
        return Some(label);
    }

    let tiers = thresholds.tiers();
    let score = score as f64;
    if let Some((label, _)) = tiers.iter().find(|(_, min)| score >= *min) {
        return Some(*label);
    }
    if let Some((label, _)) = tiers.last() {
        return Some(*label);
    }

    thresholds
        .iter()
        .find(|(_, t)| matches!(t, Threshold::Flag(false)))
        .map(|(label, _)| label)
}
