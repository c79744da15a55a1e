//! Threshold-based decision gate.
//!
//! A small state machine from verdict severity to PROCEED / WARN / BLOCK
//! under user-configured thresholds. Comparisons are inclusive and Block is
//! checked before Warn, so a severity at or above both thresholds always
//! blocks, never merely warns.

use safe_aur_core::{Finding, RiskVerdict, Severity};

/// User-owned policy thresholds; read-only to the gate.
#[derive(Debug, Clone, Copy)]
pub struct PolicyThresholds {
    pub block_at: Severity,
    pub warn_at: Severity,
    pub auto_proceed_on_warn: bool,
}

/// Raw classification of a severity against the thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Proceed,
    Warned,
    Blocked,
}

/// Final gate outcome after any required user confirmation.
#[derive(Debug, Clone, PartialEq)]
pub enum GateDecision {
    Proceed { warned: bool },
    Cancelled,
    Blocked {
        severity: Severity,
        findings: Vec<Finding>,
    },
}

pub fn classify(severity: Severity, thresholds: &PolicyThresholds) -> GateState {
    if severity >= thresholds.block_at {
        GateState::Blocked
    } else if severity >= thresholds.warn_at {
        GateState::Warned
    } else {
        GateState::Proceed
    }
}

/// Seam for the warn-then-confirm interaction, so gate logic tests without a
/// terminal.
pub trait Confirmation {
    /// Returns true only for an explicit yes.
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Production confirmation reading one line from stdin (yes/anything-else).
pub struct StdinConfirmation;

impl Confirmation for StdinConfirmation {
    fn confirm(&mut self, prompt: &str) -> bool {
        use std::io::Write;

        print!("{prompt} [y/N]: ");
        let _ = std::io::stdout().flush();

        let mut response = String::new();
        if std::io::stdin().read_line(&mut response).is_err() {
            return false;
        }
        matches!(response.trim(), "y" | "Y")
    }
}

/// Drives the gate for one verdict. Blocked decisions carry the triggering
/// findings so callers can enumerate them, not just the severity label.
pub fn resolve(
    verdict: &RiskVerdict,
    thresholds: &PolicyThresholds,
    confirm: &mut dyn Confirmation,
) -> GateDecision {
    match classify(verdict.overall_severity, thresholds) {
        GateState::Blocked => GateDecision::Blocked {
            severity: verdict.overall_severity,
            findings: verdict.findings.clone(),
        },
        GateState::Warned => {
            if thresholds.auto_proceed_on_warn {
                return GateDecision::Proceed { warned: true };
            }
            let prompt = format!(
                "Security concerns detected for {} ({} severity). Continue with installation?",
                verdict.package_name, verdict.overall_severity
            );
            if confirm.confirm(&prompt) {
                GateDecision::Proceed { warned: true }
            } else {
                GateDecision::Cancelled
            }
        }
        GateState::Proceed => GateDecision::Proceed { warned: false },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use safe_aur_core::Recommendation;

    const ALL_SEVERITIES: [Severity; 5] = [
        Severity::Minimal,
        Severity::Low,
        Severity::Moderate,
        Severity::High,
        Severity::Critical,
    ];

    /// Scripted confirmation: pops answers in order, panics when asked more
    /// than expected.
    struct ScriptedConfirmation {
        answers: Vec<bool>,
        asked: usize,
    }

    impl ScriptedConfirmation {
        fn answering(answers: &[bool]) -> Self {
            Self {
                answers: answers.to_vec(),
                asked: 0,
            }
        }

        fn never_asked() -> Self {
            Self::answering(&[])
        }
    }

    impl Confirmation for ScriptedConfirmation {
        fn confirm(&mut self, _prompt: &str) -> bool {
            let answer = *self
                .answers
                .get(self.asked)
                .expect("gate asked for confirmation more often than scripted");
            self.asked += 1;
            answer
        }
    }

    fn thresholds(block_at: Severity, warn_at: Severity, auto: bool) -> PolicyThresholds {
        PolicyThresholds {
            block_at,
            warn_at,
            auto_proceed_on_warn: auto,
        }
    }

    fn verdict(package: &str, severity: Severity, findings: Vec<Finding>) -> RiskVerdict {
        RiskVerdict {
            package_name: package.to_string(),
            overall_severity: severity,
            findings,
            summary: String::new(),
            recommendation: Recommendation::Review,
            contributing_factors: Vec::new(),
            predictability_score: 0.5,
            producer: "test".to_string(),
            produced_at: Utc::now(),
        }
    }

    #[test]
    fn severity_at_or_above_block_always_blocks_regardless_of_warn() {
        for warn_at in ALL_SEVERITIES {
            let policy = thresholds(Severity::Moderate, warn_at, false);
            for severity in ALL_SEVERITIES {
                if severity >= Severity::Moderate {
                    assert_eq!(
                        classify(severity, &policy),
                        GateState::Blocked,
                        "severity {severity} with warn_at {warn_at} must block"
                    );
                }
            }
        }
    }

    #[test]
    fn equal_warn_and_block_thresholds_block() {
        let policy = thresholds(Severity::High, Severity::High, false);
        assert_eq!(classify(Severity::High, &policy), GateState::Blocked);
        assert_eq!(classify(Severity::Moderate, &policy), GateState::Proceed);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let policy = thresholds(Severity::Critical, Severity::Moderate, false);
        assert_eq!(classify(Severity::Critical, &policy), GateState::Blocked);
        assert_eq!(classify(Severity::Moderate, &policy), GateState::Warned);
        assert_eq!(classify(Severity::High, &policy), GateState::Warned);
        assert_eq!(classify(Severity::Low, &policy), GateState::Proceed);
    }

    #[test]
    fn below_warn_proceeds_without_confirmation() {
        let policy = thresholds(Severity::Critical, Severity::Moderate, false);
        let verdict = verdict("quiet", Severity::Minimal, Vec::new());
        let mut confirm = ScriptedConfirmation::never_asked();
        assert_eq!(
            resolve(&verdict, &policy, &mut confirm),
            GateDecision::Proceed { warned: false }
        );
    }

    #[test]
    fn warned_verdict_with_declined_confirmation_is_cancelled() {
        let policy = thresholds(Severity::Critical, Severity::Moderate, false);
        let verdict = verdict("risky", Severity::High, Vec::new());
        let mut confirm = ScriptedConfirmation::answering(&[false]);
        assert_eq!(resolve(&verdict, &policy, &mut confirm), GateDecision::Cancelled);
    }

    #[test]
    fn warned_verdict_with_accepted_confirmation_proceeds() {
        let policy = thresholds(Severity::Critical, Severity::Moderate, false);
        let verdict = verdict("risky", Severity::High, Vec::new());
        let mut confirm = ScriptedConfirmation::answering(&[true]);
        assert_eq!(
            resolve(&verdict, &policy, &mut confirm),
            GateDecision::Proceed { warned: true }
        );
    }

    #[test]
    fn auto_proceed_skips_the_confirmation_prompt() {
        let policy = thresholds(Severity::Critical, Severity::Moderate, true);
        let verdict = verdict("risky", Severity::High, Vec::new());
        let mut confirm = ScriptedConfirmation::never_asked();
        assert_eq!(
            resolve(&verdict, &policy, &mut confirm),
            GateDecision::Proceed { warned: true }
        );
    }

    #[test]
    fn blocked_decision_carries_the_triggering_findings() {
        let policy = thresholds(Severity::High, Severity::Moderate, false);
        let finding = Finding {
            category: "curl_pipe_sh".to_string(),
            severity: Severity::High,
            description: "downloads and executes a remote script".to_string(),
            line_number: Some(12),
            excerpt: None,
            suggestion: None,
            notes: None,
        };
        let verdict = verdict("danger", Severity::High, vec![finding.clone()]);
        let mut confirm = ScriptedConfirmation::never_asked();

        match resolve(&verdict, &policy, &mut confirm) {
            GateDecision::Blocked { severity, findings } => {
                assert_eq!(severity, Severity::High);
                assert_eq!(findings, vec![finding]);
            }
            other => panic!("expected blocked decision, got {other:?}"),
        }
    }
}
