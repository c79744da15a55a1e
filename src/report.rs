//! Terminal renderer for risk verdicts and trust reports.

use safe_aur_core::{RiskVerdict, Severity};

use crate::trust::TrustReport;

/// Renders one analysis verdict in a terminal-friendly format.
pub fn render_verdict(verdict: &RiskVerdict, cached: bool, use_color: bool) -> String {
    let mut lines = Vec::new();

    let mut headline = format!("{}: {}", verdict.package_name, verdict.overall_severity);
    if cached {
        headline.push_str(" (cached)");
    }
    lines.push(style(&headline, "1;36", use_color));
    lines.push(format!(
        "recommendation: {} | predictability: {:.2} | analyzed by {}",
        verdict.recommendation.label(),
        verdict.predictability_score,
        verdict.producer
    ));
    lines.push(String::new());
    lines.push(verdict.summary.clone());

    if !verdict.findings.is_empty() {
        lines.push(String::new());
        lines.push(style("Findings", "1;36", use_color));
        for finding in &verdict.findings {
            let mut line = format!(
                "  [{}] {}",
                style(finding.severity.label(), severity_color(finding.severity), use_color),
                finding.category
            );
            if let Some(number) = finding.line_number {
                line.push_str(&format!(" (line {number})"));
            }
            lines.push(line);
            lines.push(format!("    {}", finding.description));
            if let Some(excerpt) = &finding.excerpt {
                lines.push(format!("    > {}", excerpt.trim()));
            }
            if let Some(suggestion) = &finding.suggestion {
                lines.push(format!("    suggestion: {suggestion}"));
            }
            if let Some(notes) = &finding.notes {
                lines.push(format!("    notes: {notes}"));
            }
        }
    }

    if !verdict.contributing_factors.is_empty() {
        lines.push(String::new());
        lines.push(format!(
            "contributing factors: {}",
            verdict.contributing_factors.join(", ")
        ));
    }

    lines.join("\n")
}

/// Renders a trust report: score line, then itemized factors and indicators.
pub fn render_trust(report: &TrustReport, use_color: bool) -> String {
    let mut lines = Vec::new();

    lines.push(style(
        &format!("{}: trust {}", report.package_name, report.level),
        "1;36",
        use_color,
    ));
    lines.push(format!("score: {:.2}", report.score));

    if !report.factors.is_empty() {
        lines.push(String::new());
        lines.push(style("Positive factors", "1;36", use_color));
        for factor in &report.factors {
            lines.push(format!(
                "  {} {}",
                style(&format!("+{:.2}", factor.weight), "32", use_color),
                factor.description
            ));
        }
    }

    if !report.indicators.is_empty() {
        lines.push(String::new());
        lines.push(style("Risk indicators", "1;36", use_color));
        for indicator in &report.indicators {
            lines.push(format!(
                "  {} [{}] {}",
                style(&format!("-{:.2}", indicator.impact), "31", use_color),
                indicator.severity,
                indicator.description
            ));
        }
    }

    lines.join("\n")
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Minimal => "32",
        Severity::Low => "36",
        Severity::Moderate => "33",
        Severity::High => "31",
        Severity::Critical => "1;31",
    }
}

fn style(text: &str, code: &str, use_color: bool) -> String {
    if use_color {
        format!("\x1b[{code}m{text}\x1b[0m")
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use safe_aur_core::{Finding, Recommendation, TrustLevel};

    use crate::trust::{RiskIndicator, TrustFactor};

    fn verdict_with_finding() -> RiskVerdict {
        RiskVerdict {
            package_name: "demo".to_string(),
            overall_severity: Severity::High,
            findings: vec![Finding {
                category: "curl_pipe_sh".to_string(),
                severity: Severity::High,
                description: "downloads and executes a remote script".to_string(),
                line_number: Some(12),
                excerpt: Some("curl https://example.org/install.sh | sh".to_string()),
                suggestion: Some("pin and verify the script".to_string()),
                notes: None,
            }],
            summary: "One dangerous source line.".to_string(),
            recommendation: Recommendation::Review,
            contributing_factors: vec!["remote_execution".to_string()],
            predictability_score: 0.3,
            producer: "claude".to_string(),
            produced_at: Utc::now(),
        }
    }

    #[test]
    fn verdict_rendering_lists_finding_details() {
        let text = render_verdict(&verdict_with_finding(), false, false);
        assert!(text.contains("demo: HIGH"));
        assert!(text.contains("[HIGH] curl_pipe_sh (line 12)"));
        assert!(text.contains("downloads and executes a remote script"));
        assert!(text.contains("> curl https://example.org/install.sh | sh"));
        assert!(text.contains("suggestion: pin and verify the script"));
        assert!(text.contains("contributing factors: remote_execution"));
        assert!(!text.contains('\x1b'));
    }

    #[test]
    fn cached_verdicts_are_marked_in_the_headline() {
        let text = render_verdict(&verdict_with_finding(), true, false);
        assert!(text.contains("(cached)"));
    }

    #[test]
    fn colored_output_carries_ansi_escapes() {
        let text = render_verdict(&verdict_with_finding(), false, true);
        assert!(text.contains("\x1b[1;31m") || text.contains("\x1b[31m"));
    }

    #[test]
    fn trust_rendering_lists_factors_and_indicators() {
        let report = TrustReport {
            package_name: "demo".to_string(),
            level: TrustLevel::Medium,
            score: 0.55,
            factors: vec![TrustFactor {
                kind: "repository_age",
                description: "Repository has existed for 2.0 years".to_string(),
                weight: 0.3,
            }],
            indicators: vec![RiskIndicator {
                kind: "single_commit",
                severity: Severity::Moderate,
                description: "Package has only one commit".to_string(),
                impact: 0.3,
            }],
            analyzed_at: Utc::now(),
        };

        let text = render_trust(&report, false);
        assert!(text.contains("demo: trust MEDIUM"));
        assert!(text.contains("score: 0.55"));
        assert!(text.contains("+0.30 Repository has existed for 2.0 years"));
        assert!(text.contains("-0.30 [MODERATE] Package has only one commit"));
    }
}
