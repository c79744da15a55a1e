//! Content-identifier resolution for AUR build recipes.
//!
//! A package's recipe state is named by the head commit of its AUR git
//! repository. `git ls-remote` gives us that identifier without cloning
//! anything. When the package is not hosted there (official repos), the
//! caller may substitute [`fallback_identifier`]; this module only signals
//! the failure.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

/// Hard timeout on the remote head query.
pub const RESOLVE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("could not reach the AUR git repository for '{package}': {message}")]
    Unreachable { package: String, message: String },
    #[error("timed out after {seconds}s resolving the head identifier for '{package}'")]
    Timeout { package: String, seconds: u64 },
    #[error("no head reference found for '{package}'")]
    NotFound { package: String },
    #[error("invalid identifier format for '{package}': '{raw}' is not 40 hex characters")]
    InvalidIdentifierFormat { package: String, raw: String },
}

/// Resolves a stable content identifier for a named package.
///
/// Stateless; safe to call concurrently for different package names.
#[async_trait]
pub trait VersionResolver: Send + Sync {
    async fn resolve(&self, package: &str) -> Result<String, ResolveError>;
}

pub fn aur_git_url(package: &str) -> String {
    format!("https://aur.archlinux.org/{package}.git")
}

/// True iff `candidate` is exactly 40 hex characters (case-insensitive).
pub fn validate_identifier(candidate: &str) -> bool {
    candidate.len() == 40 && candidate.chars().all(|ch| ch.is_ascii_hexdigit())
}

/// Synthetic identifier for packages without a versioned AUR source.
///
/// Not content-derived: two recipe bodies sharing a declared version collide
/// under this key, so callers treat it as a lower-confidence cache key.
pub fn fallback_identifier(package: &str, version: &str) -> String {
    format!("fallback-{package}-{version}")
}

/// Extracts and validates the head identifier from `git ls-remote` output
/// (`<hash>\tHEAD`).
pub fn parse_ls_remote_head(package: &str, output: &str) -> Result<String, ResolveError> {
    let first_line = output.lines().next().unwrap_or("").trim();
    let Some(identifier) = first_line.split_whitespace().next() else {
        return Err(ResolveError::NotFound {
            package: package.to_string(),
        });
    };

    if !validate_identifier(identifier) {
        return Err(ResolveError::InvalidIdentifierFormat {
            package: package.to_string(),
            raw: identifier.to_string(),
        });
    }

    Ok(identifier.to_string())
}

/// Production resolver querying the AUR over `git ls-remote`.
pub struct GitResolver {
    timeout: Duration,
}

impl GitResolver {
    pub fn new() -> Self {
        Self {
            timeout: RESOLVE_TIMEOUT,
        }
    }
}

impl Default for GitResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VersionResolver for GitResolver {
    async fn resolve(&self, package: &str) -> Result<String, ResolveError> {
        let url = aur_git_url(package);
        let query = Command::new("git")
            .args(["ls-remote", &url, "HEAD"])
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, query)
            .await
            .map_err(|_| ResolveError::Timeout {
                package: package.to_string(),
                seconds: self.timeout.as_secs(),
            })?
            .map_err(|err| ResolveError::Unreachable {
                package: package.to_string(),
                message: err.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Unreachable {
                package: package.to_string(),
                message: stderr.trim().to_string(),
            });
        }

        parse_ls_remote_head(package, &String::from_utf8_lossy(&output.stdout))
    }
}
