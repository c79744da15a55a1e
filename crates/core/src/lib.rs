//! Shared types and the analyzer seam for `safe-aur`.
//!
//! Everything that crosses a component boundary lives here: the severity
//! ordinal, risk verdict shapes, the enriched package context handed to the
//! analysis capability, and the `Analyzer` trait itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Ordinal severity scale shared by findings and aggregate verdicts.
///
/// The wire form is the uppercase label (`"MINIMAL"`, `"CRITICAL"`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Minimal,
    Low,
    Moderate,
    High,
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Minimal => "MINIMAL",
            Self::Low => "LOW",
            Self::Moderate => "MODERATE",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Total parse over free-text labels produced by the analysis capability.
    ///
    /// Accepts the canonical labels plus the legacy aliases `SAFE` and
    /// `MEDIUM`. Anything unrecognized maps to `Moderate`: an unknown label
    /// must never read as "all clear", so the default sits in the middle of
    /// the scale rather than at `Minimal`.
    pub fn parse_label(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "MINIMAL" | "SAFE" => Self::Minimal,
            "LOW" => Self::Low,
            "MODERATE" | "MEDIUM" => Self::Moderate,
            "HIGH" => Self::High,
            "CRITICAL" => Self::Critical,
            _ => Self::Moderate,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Analyzer-suggested course of action. Advisory only; the decision gate
/// works from the severity ordinal, not from this field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Proceed,
    Review,
    Block,
}

impl Recommendation {
    /// Total parse; unknown labels become `Review`.
    pub fn parse_label(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PROCEED" => Self::Proceed,
            "BLOCK" => Self::Block,
            _ => Self::Review,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Proceed => "PROCEED",
            Self::Review => "REVIEW",
            Self::Block => "BLOCK",
        }
    }
}

/// One concrete issue reported by the analysis capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub category: String,
    pub severity: Severity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Structured output of one security analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskVerdict {
    pub package_name: String,
    pub overall_severity: Severity,
    pub findings: Vec<Finding>,
    pub summary: String,
    pub recommendation: Recommendation,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributing_factors: Vec<String>,
    /// 0.0 (chaotic) to 1.0 (fully predictable).
    #[serde(default)]
    pub predictability_score: f64,
    pub producer: String,
    pub produced_at: DateTime<Utc>,
}

impl RiskVerdict {
    pub fn max_finding_severity(&self) -> Option<Severity> {
        self.findings.iter().map(|finding| finding.severity).max()
    }

    /// Enforces the aggregation invariant: the overall severity may escalate
    /// above the worst finding but never under-report it.
    pub fn ensure_floor(&mut self) {
        if let Some(floor) = self.max_finding_severity() {
            if self.overall_severity < floor {
                self.overall_severity = floor;
            }
        }
    }
}

/// Discrete reputation estimate derived from repository metadata.
///
/// Independent of content-based risk findings; never policy-gating on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrustLevel {
    VeryLow,
    Low,
    Medium,
    High,
    VeryHigh,
}

impl TrustLevel {
    pub fn label(self) -> &'static str {
        match self {
            Self::VeryLow => "VERY_LOW",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::VeryHigh => "VERY_HIGH",
        }
    }
}

impl std::fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Enriched package context handed to the analysis capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageContext {
    pub name: String,
    pub version: String,
    pub maintainer: String,
    /// Full build-recipe text (PKGBUILD).
    pub pkgbuild: String,
    /// Content identifier the verdict will be cached under.
    pub identifier: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub make_depends: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub opt_depends: Vec<String>,
    /// Auxiliary files shipped next to the recipe (install scripts, patches).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub additional_files: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_submitted: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    /// One-line advisory trust summary, when repository metadata was available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_summary: Option<String>,
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The capability responded, but not with a parseable verdict. Never
    /// coerced into a default severity.
    #[error("analysis for '{package}' returned no structured verdict: {detail}")]
    NoStructuredVerdict { package: String, detail: String },
    /// The external capability itself failed (spawn, exit status, transport).
    #[error("analysis capability failed for '{package}': {message}")]
    Capability { package: String, message: String },
}

/// The external analysis capability, behind a seam so cache and gate logic
/// test against a deterministic in-memory fake.
#[async_trait]
pub trait Analyzer: Send + Sync {
    fn name(&self) -> &'static str;
    async fn analyze(&self, context: &PackageContext) -> Result<RiskVerdict, AnalysisError>;
}
