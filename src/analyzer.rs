//! Adapter for the external AI analysis capability.
//!
//! The capability is an external CLI producing natural-language output with
//! one embedded JSON object. We ask for strict JSON, but recover the object
//! from between the first `{` and the last `}` because providers routinely
//! wrap it in prose. Anything without a parseable verdict is a hard
//! `NoStructuredVerdict` failure, never coerced into a default severity.

use std::process::Stdio;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use safe_aur_core::{
    AnalysisError, Analyzer, Finding, PackageContext, Recommendation, RiskVerdict, Severity,
};

/// Analyzer shelling out to a local `claude`-style CLI.
pub struct ClaudeCliAnalyzer {
    command: String,
}

impl ClaudeCliAnalyzer {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl Analyzer for ClaudeCliAnalyzer {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn analyze(&self, context: &PackageContext) -> Result<RiskVerdict, AnalysisError> {
        let prompt = build_prompt(context);

        let mut child = Command::new(&self.command)
            .arg("-p")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| AnalysisError::Capability {
                package: context.name.clone(),
                message: format!("failed to spawn '{}': {err}", self.command),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(prompt.as_bytes())
                .await
                .map_err(|err| AnalysisError::Capability {
                    package: context.name.clone(),
                    message: format!("failed to write prompt: {err}"),
                })?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| AnalysisError::Capability {
                package: context.name.clone(),
                message: format!("analysis process failed: {err}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AnalysisError::Capability {
                package: context.name.clone(),
                message: format!(
                    "analysis command exited with {}: {}",
                    output.status,
                    stderr.trim()
                ),
            });
        }

        let response = String::from_utf8_lossy(&output.stdout);
        parse_verdict(self.name(), &context.name, &response)
    }
}

/// Assembles the analysis prompt from the enriched context.
fn build_prompt(context: &PackageContext) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are a security analyst reviewing an Arch Linux build recipe (PKGBUILD) \
         before installation. Assess how predictable and safe this package build is.\n\n",
    );
    prompt.push_str(&format!(
        "Package: {} v{} (maintainer: {})\n",
        context.name, context.version, context.maintainer
    ));
    if let Some(votes) = context.votes {
        prompt.push_str(&format!(
            "AUR community signal: {votes} votes, popularity {:.3}\n",
            context.popularity.unwrap_or_default()
        ));
    }
    if let Some(trust) = &context.trust_summary {
        prompt.push_str(&format!("Repository trust estimate: {trust}\n"));
    }
    if !context.dependencies.is_empty() {
        prompt.push_str(&format!(
            "Runtime dependencies: {}\n",
            context.dependencies.join(", ")
        ));
    }
    if !context.make_depends.is_empty() {
        prompt.push_str(&format!(
            "Build dependencies: {}\n",
            context.make_depends.join(", ")
        ));
    }
    prompt.push_str("\nPKGBUILD:\n```\n");
    prompt.push_str(&context.pkgbuild);
    prompt.push_str("\n```\n");
    for (name, content) in &context.additional_files {
        prompt.push_str(&format!("\nAdditional file `{name}`:\n```\n{content}\n```\n"));
    }
    prompt.push_str(
        "\nRespond with a single JSON object and nothing else:\n\
         {\n\
         \"overall_entropy\": \"MINIMAL|LOW|MODERATE|HIGH|CRITICAL\",\n\
         \"findings\": [{\"type\": \"...\", \"entropy\": \"MINIMAL|LOW|MODERATE|HIGH|CRITICAL\", \
         \"description\": \"...\", \"line_number\": 0, \"context\": \"...\", \
         \"suggestion\": \"...\", \"entropy_notes\": \"...\"}],\n\
         \"summary\": \"...\",\n\
         \"recommendation\": \"PROCEED|REVIEW|BLOCK\",\n\
         \"entropy_factors\": [\"...\"],\n\
         \"predictability_score\": 0.0\n\
         }\n",
    );
    prompt
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    overall_entropy: Option<String>,
    overall_level: Option<String>,
    findings: Option<Vec<RawFinding>>,
    summary: Option<String>,
    recommendation: Option<String>,
    #[serde(default)]
    entropy_factors: Vec<String>,
    #[serde(default)]
    predictability_score: f64,
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    #[serde(rename = "type", default)]
    category: String,
    entropy: Option<String>,
    severity: Option<String>,
    #[serde(default)]
    description: String,
    line_number: Option<u32>,
    context: Option<String>,
    suggestion: Option<String>,
    entropy_notes: Option<String>,
}

/// Extracts the JSON object embedded in a free-text response.
pub fn extract_json_object(response: &str) -> Option<&str> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&response[start..=end])
}

/// Parses a provider response into a verdict, enforcing the severity floor.
pub fn parse_verdict(
    producer: &str,
    package: &str,
    response: &str,
) -> Result<RiskVerdict, AnalysisError> {
    let no_verdict = |detail: String| AnalysisError::NoStructuredVerdict {
        package: package.to_string(),
        detail,
    };

    let json = extract_json_object(response)
        .ok_or_else(|| no_verdict("response contains no JSON object".to_string()))?;
    let raw: RawVerdict = serde_json::from_str(json)
        .map_err(|err| no_verdict(format!("embedded JSON does not parse: {err}")))?;

    let overall_label = raw
        .overall_entropy
        .or(raw.overall_level)
        .ok_or_else(|| no_verdict("missing overall_entropy/overall_level".to_string()))?;
    let summary = raw
        .summary
        .ok_or_else(|| no_verdict("missing summary".to_string()))?;
    let recommendation = raw
        .recommendation
        .ok_or_else(|| no_verdict("missing recommendation".to_string()))?;
    let findings = raw
        .findings
        .ok_or_else(|| no_verdict("missing findings".to_string()))?;

    let findings = findings
        .into_iter()
        .map(|finding| {
            let label = finding
                .entropy
                .or(finding.severity)
                .unwrap_or_default();
            Finding {
                category: finding.category,
                severity: Severity::parse_label(&label),
                description: finding.description,
                line_number: finding.line_number.filter(|line| *line > 0),
                excerpt: finding.context.filter(|text| !text.is_empty()),
                suggestion: finding.suggestion.filter(|text| !text.is_empty()),
                notes: finding.entropy_notes.filter(|text| !text.is_empty()),
            }
        })
        .collect();

    let mut verdict = RiskVerdict {
        package_name: package.to_string(),
        overall_severity: Severity::parse_label(&overall_label),
        findings,
        summary,
        recommendation: Recommendation::parse_label(&recommendation),
        contributing_factors: raw.entropy_factors,
        predictability_score: raw.predictability_score.clamp(0.0, 1.0),
        producer: producer.to_string(),
        produced_at: Utc::now(),
    };
    verdict.ensure_floor();
    Ok(verdict)
}
