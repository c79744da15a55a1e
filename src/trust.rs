//! Reputation scoring from repository metadata.
//!
//! The score is a weighted additive/subtractive model over observable git
//! history, independent of the AI-produced verdict. It is advisory context
//! for the analysis capability and never gates a decision by itself: trust
//! signals are noisy proxies, and a content-based risk finding must not be
//! silently overridden by them.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::process::Command;

use safe_aur_core::{Severity, TrustLevel};

use crate::resolver::aur_git_url;

/// Neutral starting point on the [0,1] scale.
const BASELINE_SCORE: f64 = 0.5;
/// Positive factor weights are halved before they are added.
const FACTOR_SCALE: f64 = 0.5;

/// Observable repository history for one package. Never persisted in the
/// cache: reputation changes independently of recipe content, so it is
/// re-derived fresh on every cache miss.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryMetadata {
    pub package_name: String,
    pub first_commit: Option<DateTime<Utc>>,
    pub last_commit: Option<DateTime<Utc>>,
    pub commit_count: u64,
    pub maintainer: String,
    pub contributors: Vec<String>,
    /// Derived age since the first commit.
    pub age: Duration,
    /// Derived commits per month.
    pub commit_frequency: f64,
}

/// Placeholder maintainer-reputation estimate.
///
/// A real reputation database would populate this from maintainer history
/// across packages; until then the signal is neutral.
#[derive(Debug, Clone, Serialize)]
pub struct MaintainerSignal {
    pub username: String,
    pub account_age: Duration,
    pub reputation_score: f64,
}

impl MaintainerSignal {
    pub fn placeholder(username: &str) -> Self {
        Self {
            username: username.to_string(),
            account_age: Duration::days(365),
            reputation_score: 0.5,
        }
    }
}

/// A positive trust indicator with its additive weight.
#[derive(Debug, Clone, Serialize)]
pub struct TrustFactor {
    pub kind: &'static str,
    pub description: String,
    pub weight: f64,
}

/// A negative trust indicator with its subtractive impact.
#[derive(Debug, Clone, Serialize)]
pub struct RiskIndicator {
    pub kind: &'static str,
    pub severity: Severity,
    pub description: String,
    pub impact: f64,
}

/// Itemized trust analysis, mirroring the verdict shape so both render
/// uniformly.
#[derive(Debug, Clone, Serialize)]
pub struct TrustReport {
    pub package_name: String,
    pub level: TrustLevel,
    pub score: f64,
    pub factors: Vec<TrustFactor>,
    pub indicators: Vec<RiskIndicator>,
    pub analyzed_at: DateTime<Utc>,
}

impl TrustReport {
    /// One-line summary fed into the analyzer's context.
    pub fn summary_line(&self) -> String {
        format!(
            "{} (score {:.2}; {} positive factors, {} risk indicators)",
            self.level,
            self.score,
            self.factors.len(),
            self.indicators.len()
        )
    }
}

/// Computes the trust report for one repository snapshot. Purely functional.
pub fn score_trust(repo: &RepositoryMetadata, maintainer: &MaintainerSignal) -> TrustReport {
    let factors = positive_factors(repo, maintainer);
    let indicators = risk_indicators(repo, maintainer);

    let mut score = BASELINE_SCORE;
    for factor in &factors {
        score += factor.weight * FACTOR_SCALE;
    }
    for indicator in &indicators {
        score -= indicator.impact;
    }
    let score = score.clamp(0.0, 1.0);

    TrustReport {
        package_name: repo.package_name.clone(),
        level: level_from_score(score),
        score,
        factors,
        indicators,
        analyzed_at: Utc::now(),
    }
}

fn positive_factors(repo: &RepositoryMetadata, maintainer: &MaintainerSignal) -> Vec<TrustFactor> {
    let mut factors = Vec::new();

    if repo.age > Duration::days(365) {
        factors.push(TrustFactor {
            kind: "repository_age",
            description: format!(
                "Repository has existed for {:.1} years",
                repo.age.num_days() as f64 / 365.0
            ),
            weight: 0.3,
        });
    }

    if repo.commit_frequency > 1.0 && repo.commit_frequency < 20.0 {
        factors.push(TrustFactor {
            kind: "commit_frequency",
            description: format!(
                "Regular update pattern ({:.1} commits/month)",
                repo.commit_frequency
            ),
            weight: 0.2,
        });
    }

    if repo.contributors.len() > 1 {
        factors.push(TrustFactor {
            kind: "multiple_contributors",
            description: format!("Multiple contributors ({})", repo.contributors.len()),
            weight: 0.15,
        });
    }

    if maintainer.reputation_score > 0.7 {
        factors.push(TrustFactor {
            kind: "maintainer_reputation",
            description: format!(
                "High maintainer reputation ({:.2})",
                maintainer.reputation_score
            ),
            weight: 0.25,
        });
    }

    let recently_active = repo
        .last_commit
        .is_some_and(|last| last >= Utc::now() - Duration::days(180));
    if repo.age > Duration::days(180) && recently_active {
        factors.push(TrustFactor {
            kind: "long_term_maintenance",
            description: "Package has been maintained long-term with recent activity".to_string(),
            weight: 0.2,
        });
    }

    factors
}

fn risk_indicators(repo: &RepositoryMetadata, maintainer: &MaintainerSignal) -> Vec<RiskIndicator> {
    let mut indicators = Vec::new();

    if repo.age < Duration::days(7) {
        indicators.push(RiskIndicator {
            kind: "very_new_repository",
            severity: Severity::High,
            description: format!(
                "Repository created only {:.1} days ago",
                repo.age.num_hours() as f64 / 24.0
            ),
            impact: 0.4,
        });
    } else if repo.age < Duration::days(30) {
        indicators.push(RiskIndicator {
            kind: "new_repository",
            severity: Severity::Moderate,
            description: format!(
                "Repository created {:.1} days ago",
                repo.age.num_hours() as f64 / 24.0
            ),
            impact: 0.2,
        });
    }

    // A single commit is the classic typosquat/drop-in shape.
    if repo.commit_count == 1 {
        indicators.push(RiskIndicator {
            kind: "single_commit",
            severity: Severity::Moderate,
            description: "Package has only one commit".to_string(),
            impact: 0.3,
        });
    }

    if let Some(last) = repo.last_commit {
        if last < Utc::now() - Duration::days(365 * 2) {
            indicators.push(RiskIndicator {
                kind: "abandoned_package",
                severity: Severity::Low,
                description: format!(
                    "No updates for {:.1} years",
                    (Utc::now() - last).num_days() as f64 / 365.0
                ),
                impact: 0.15,
            });
        }
    }

    if maintainer.reputation_score < 0.3 && maintainer.account_age < Duration::days(90) {
        indicators.push(RiskIndicator {
            kind: "new_low_reputation_maintainer",
            severity: Severity::Moderate,
            description: "New maintainer with low reputation score".to_string(),
            impact: 0.25,
        });
    }

    if repo.commit_frequency > 50.0 {
        indicators.push(RiskIndicator {
            kind: "excessive_commits",
            severity: Severity::Low,
            description: format!(
                "Unusually high commit frequency ({:.1}/month)",
                repo.commit_frequency
            ),
            impact: 0.1,
        });
    }

    indicators
}

fn level_from_score(score: f64) -> TrustLevel {
    if score < 0.2 {
        TrustLevel::VeryLow
    } else if score < 0.4 {
        TrustLevel::Low
    } else if score < 0.6 {
        TrustLevel::Medium
    } else if score < 0.8 {
        TrustLevel::High
    } else {
        TrustLevel::VeryHigh
    }
}

/// Derives the age/cadence fields from raw history facts.
pub fn derive_metadata(
    package: &str,
    maintainer: String,
    first_commit: Option<DateTime<Utc>>,
    last_commit: Option<DateTime<Utc>>,
    commit_count: u64,
    contributors: Vec<String>,
    now: DateTime<Utc>,
) -> RepositoryMetadata {
    let age = first_commit.map_or_else(Duration::zero, |first| now - first);
    let commit_frequency = if age.num_hours() > 0 {
        let months = age.num_hours() as f64 / (24.0 * 30.0);
        commit_count as f64 / months
    } else {
        0.0
    };

    RepositoryMetadata {
        package_name: package.to_string(),
        first_commit,
        last_commit,
        commit_count,
        maintainer,
        contributors,
        age,
        commit_frequency,
    }
}

#[derive(Debug, Error)]
pub enum InspectError {
    #[error("failed to clone repository for '{package}': {message}")]
    CloneFailed { package: String, message: String },
    #[error("git invocation failed for '{package}': {source}")]
    Command {
        package: String,
        #[source]
        source: std::io::Error,
    },
}

/// Collects repository metadata for a package.
#[async_trait]
pub trait RepositoryInspector: Send + Sync {
    async fn inspect(&self, package: &str) -> Result<RepositoryMetadata, InspectError>;
}

/// Inspector that clones the AUR repository into a temp directory and reads
/// its history with plain git commands.
pub struct GitRepositoryInspector;

impl GitRepositoryInspector {
    pub fn new() -> Self {
        Self
    }

    async fn git_stdout(
        package: &str,
        workdir: &PathBuf,
        args: &[&str],
    ) -> Result<String, InspectError> {
        let output = Command::new("git")
            .arg("-C")
            .arg(workdir)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| InspectError::Command {
                package: package.to_string(),
                source,
            })?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for GitRepositoryInspector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RepositoryInspector for GitRepositoryInspector {
    async fn inspect(&self, package: &str) -> Result<RepositoryMetadata, InspectError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|since| since.as_nanos())
            .unwrap_or_default();
        let workdir = std::env::temp_dir().join(format!("safe-aur-trust-{package}-{nanos}"));

        let clone = Command::new("git")
            .args(["clone", "--quiet", &aur_git_url(package)])
            .arg(&workdir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| InspectError::Command {
                package: package.to_string(),
                source,
            })?;
        if !clone.status.success() {
            let _ = std::fs::remove_dir_all(&workdir);
            return Err(InspectError::CloneFailed {
                package: package.to_string(),
                message: String::from_utf8_lossy(&clone.stderr).trim().to_string(),
            });
        }

        let first_raw =
            Self::git_stdout(package, &workdir, &["log", "--reverse", "--format=%ct"]).await?;
        let last_raw =
            Self::git_stdout(package, &workdir, &["log", "--format=%ct", "--max-count=1"]).await?;
        let count_raw =
            Self::git_stdout(package, &workdir, &["rev-list", "--count", "HEAD"]).await?;
        let authors_raw =
            Self::git_stdout(package, &workdir, &["log", "--format=%an", "--all"]).await?;

        let pkgbuild = std::fs::read_to_string(workdir.join("PKGBUILD")).unwrap_or_default();
        let maintainer = parse_maintainer_line(&pkgbuild).unwrap_or_default();

        let _ = std::fs::remove_dir_all(&workdir);

        let first_commit = parse_commit_timestamp(&first_raw);
        let last_commit = parse_commit_timestamp(&last_raw);
        let commit_count = count_raw.trim().parse::<u64>().unwrap_or(0);
        let contributors = unique_authors(&authors_raw);

        Ok(derive_metadata(
            package,
            maintainer,
            first_commit,
            last_commit,
            commit_count,
            contributors,
            Utc::now(),
        ))
    }
}

/// Parses the first `%ct` epoch-seconds line of git log output.
pub fn parse_commit_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let seconds = raw.lines().next()?.trim().parse::<i64>().ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}

/// Extracts the maintainer name from a `# Maintainer:` PKGBUILD comment.
pub fn parse_maintainer_line(pkgbuild: &str) -> Option<String> {
    for line in pkgbuild.lines() {
        let trimmed = line.trim_start();
        if !trimmed.starts_with('#') {
            continue;
        }
        let comment = trimmed.trim_start_matches('#').trim_start();
        for prefix in ["Maintainer:", "maintainer:"] {
            if let Some(rest) = comment.strip_prefix(prefix) {
                let name = rest.trim();
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }
    }
    None
}

fn unique_authors(raw: &str) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    for line in raw.lines() {
        let author = line.trim();
        if !author.is_empty() {
            seen.insert(author.to_string());
        }
    }
    seen.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(age_days: i64, commit_count: u64, frequency: f64) -> RepositoryMetadata {
        let now = Utc::now();
        RepositoryMetadata {
            package_name: "demo".to_string(),
            first_commit: Some(now - Duration::days(age_days)),
            last_commit: Some(now - Duration::days(3)),
            commit_count,
            maintainer: "someone".to_string(),
            contributors: vec!["someone".to_string()],
            age: Duration::days(age_days),
            commit_frequency: frequency,
        }
    }

    #[test]
    fn neutral_repository_scores_medium() {
        // Aged out of the new-repo indicators, but with nothing positive.
        let repo = metadata(90, 5, 0.5);
        let report = score_trust(&repo, &MaintainerSignal::placeholder("someone"));
        assert_eq!(report.level, TrustLevel::Medium);
        assert!((report.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn increasing_repository_age_never_decreases_the_score() {
        let signal = MaintainerSignal::placeholder("someone");
        let young = score_trust(&metadata(5, 10, 5.0), &signal);
        let old = score_trust(&metadata(400, 10, 5.0), &signal);
        assert!(old.score >= young.score);
    }

    #[test]
    fn very_new_repository_is_a_high_severity_indicator() {
        let repo = metadata(2, 10, 5.0);
        let report = score_trust(&repo, &MaintainerSignal::placeholder("someone"));
        let indicator = report
            .indicators
            .iter()
            .find(|indicator| indicator.kind == "very_new_repository")
            .expect("very new repository indicator");
        assert_eq!(indicator.severity, Severity::High);
        assert!((indicator.impact - 0.4).abs() < 1e-9);
    }

    #[test]
    fn single_commit_flags_possible_typosquat() {
        let repo = metadata(90, 1, 0.3);
        let report = score_trust(&repo, &MaintainerSignal::placeholder("someone"));
        assert!(
            report
                .indicators
                .iter()
                .any(|indicator| indicator.kind == "single_commit")
        );
    }

    #[test]
    fn abandoned_repository_is_a_low_severity_indicator() {
        let now = Utc::now();
        let mut repo = metadata(365 * 4, 40, 0.8);
        repo.last_commit = Some(now - Duration::days(365 * 3));
        let report = score_trust(&repo, &MaintainerSignal::placeholder("someone"));
        let indicator = report
            .indicators
            .iter()
            .find(|indicator| indicator.kind == "abandoned_package")
            .expect("abandoned indicator");
        assert_eq!(indicator.severity, Severity::Low);
    }

    #[test]
    fn excessive_commit_frequency_is_flagged() {
        let repo = metadata(90, 200, 70.0);
        let report = score_trust(&repo, &MaintainerSignal::placeholder("someone"));
        assert!(
            report
                .indicators
                .iter()
                .any(|indicator| indicator.kind == "excessive_commits")
        );
    }

    #[test]
    fn well_maintained_old_repository_scores_very_high() {
        let mut repo = metadata(365 * 3, 120, 4.0);
        repo.contributors = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut signal = MaintainerSignal::placeholder("a");
        signal.reputation_score = 0.9;

        let report = score_trust(&repo, &signal);
        // All five positive factors: (0.3+0.2+0.15+0.25+0.2)*0.5 on top of 0.5.
        assert_eq!(report.level, TrustLevel::VeryHigh);
        assert_eq!(report.factors.len(), 5);
        assert!((report.score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped_at_the_bottom() {
        let mut repo = metadata(2, 1, 70.0);
        repo.contributors = vec!["x".to_string()];
        let mut signal = MaintainerSignal::placeholder("x");
        signal.reputation_score = 0.1;
        signal.account_age = Duration::days(10);

        let report = score_trust(&repo, &signal);
        assert!(report.score >= 0.0);
        assert_eq!(report.level, TrustLevel::VeryLow);
    }

    #[test]
    fn new_maintainer_with_low_reputation_is_flagged() {
        let repo = metadata(90, 5, 0.5);
        let mut signal = MaintainerSignal::placeholder("newbie");
        signal.reputation_score = 0.2;
        signal.account_age = Duration::days(30);

        let report = score_trust(&repo, &signal);
        assert!(
            report
                .indicators
                .iter()
                .any(|indicator| indicator.kind == "new_low_reputation_maintainer")
        );
    }

    #[test]
    fn derive_metadata_computes_age_and_cadence() {
        let now = Utc::now();
        let first = now - Duration::days(360);
        let derived = derive_metadata(
            "demo",
            "m".to_string(),
            Some(first),
            Some(now - Duration::days(1)),
            60,
            vec!["m".to_string()],
            now,
        );
        assert_eq!(derived.age.num_days(), 360);
        // 360 days is 12 months of 30 days: 60 commits over 12 months.
        assert!((derived.commit_frequency - 5.0).abs() < 0.1);
    }

    #[test]
    fn derive_metadata_without_history_has_zero_age() {
        let derived = derive_metadata(
            "demo",
            String::new(),
            None,
            None,
            0,
            Vec::new(),
            Utc::now(),
        );
        assert_eq!(derived.age, Duration::zero());
        assert_eq!(derived.commit_frequency, 0.0);
    }

    #[test]
    fn parse_commit_timestamp_reads_the_first_line() {
        let parsed = parse_commit_timestamp("1700000000\n1800000000\n").expect("timestamp");
        assert_eq!(parsed.timestamp(), 1_700_000_000);
        assert!(parse_commit_timestamp("").is_none());
        assert!(parse_commit_timestamp("not-a-number\n").is_none());
    }

    #[test]
    fn parse_maintainer_line_reads_pkgbuild_comments() {
        let pkgbuild = "# Maintainer: Jane Doe <jane@example.org>\npkgname=demo\n";
        assert_eq!(
            parse_maintainer_line(pkgbuild).as_deref(),
            Some("Jane Doe <jane@example.org>")
        );
        assert!(parse_maintainer_line("pkgname=demo\n").is_none());
    }

    #[test]
    fn trust_report_summary_line_mentions_level_and_counts() {
        let repo = metadata(400, 10, 5.0);
        let report = score_trust(&repo, &MaintainerSignal::placeholder("someone"));
        let line = report.summary_line();
        assert!(line.contains(report.level.label()));
        assert!(line.contains("positive factors"));
    }
}
