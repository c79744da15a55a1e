//! AUR RPC metadata client.
//!
//! Fetches community metadata (votes, popularity, maintainer, dependency
//! arrays) used to enrich the analysis context. Enrichment is best-effort:
//! packages from the official repositories are simply not in the AUR, so a
//! not-found here must not fail the pipeline.

use std::env;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

use safe_aur_core::PackageContext;

const RPC_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = concat!("safe-aur/", env!("CARGO_PKG_VERSION"), " (security analysis tool)");

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("package '{package}' was not found in the AUR")]
    NotFound { package: String },
    #[error("AUR RPC request failed: {message}")]
    Transport { message: String },
    #[error("AUR RPC returned invalid data: {message}")]
    InvalidResponse { message: String },
}

/// One package's AUR RPC v5 info record.
#[derive(Debug, Clone, Deserialize)]
pub struct AurPackageInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Maintainer")]
    pub maintainer: Option<String>,
    #[serde(rename = "NumVotes", default)]
    pub num_votes: u32,
    #[serde(rename = "Popularity", default)]
    pub popularity: f64,
    #[serde(rename = "FirstSubmitted", default)]
    pub first_submitted: i64,
    #[serde(rename = "LastModified", default)]
    pub last_modified: i64,
    #[serde(rename = "OutOfDate")]
    pub out_of_date: Option<i64>,
    #[serde(rename = "Depends", default)]
    pub depends: Vec<String>,
    #[serde(rename = "MakeDepends", default)]
    pub make_depends: Vec<String>,
    #[serde(rename = "OptDepends", default)]
    pub opt_depends: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AurRpcResponse {
    #[serde(default)]
    resultcount: usize,
    #[serde(default)]
    results: Vec<AurPackageInfo>,
}

/// Source of community package metadata.
#[async_trait]
pub trait PackageMetadataSource: Send + Sync {
    async fn fetch(&self, package: &str) -> Result<AurPackageInfo, MetadataError>;
}

/// Source of raw build-recipe text.
#[async_trait]
pub trait RecipeSource: Send + Sync {
    async fn fetch_recipe(&self, package: &str) -> Result<String, MetadataError>;
}

/// Production client for the AUR RPC v5 endpoint.
#[derive(Clone)]
pub struct AurRpcClient {
    http: Client,
    base_url: String,
}

impl AurRpcClient {
    pub fn new() -> Self {
        let base_url = env::var("SAFE_AUR_RPC_BASE_URL")
            .unwrap_or_else(|_| "https://aur.archlinux.org".to_string());
        Self::with_base_url(base_url)
    }

    pub fn with_base_url(base_url: String) -> Self {
        // The builder only fails when the TLS backend cannot initialize.
        let http = Client::builder()
            .timeout(RPC_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("HTTP client construction from static settings");
        Self { http, base_url }
    }
}

impl Default for AurRpcClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PackageMetadataSource for AurRpcClient {
    async fn fetch(&self, package: &str) -> Result<AurPackageInfo, MetadataError> {
        let url = format!(
            "{}/rpc/v5/info/{}",
            self.base_url.trim_end_matches('/'),
            package
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| MetadataError::Transport {
                message: format!("unable to query AUR RPC at {url}: {err}"),
            })?;

        if !response.status().is_success() {
            return Err(MetadataError::Transport {
                message: format!("AUR RPC returned status {}", response.status()),
            });
        }

        let body: AurRpcResponse =
            response
                .json()
                .await
                .map_err(|err| MetadataError::InvalidResponse {
                    message: format!("failed to parse AUR RPC response JSON: {err}"),
                })?;

        if body.resultcount == 0 || body.results.is_empty() {
            return Err(MetadataError::NotFound {
                package: package.to_string(),
            });
        }

        Ok(body.results.into_iter().next().expect("non-empty results"))
    }
}

#[async_trait]
impl RecipeSource for AurRpcClient {
    async fn fetch_recipe(&self, package: &str) -> Result<String, MetadataError> {
        let url = format!(
            "{}/cgit/aur.git/plain/PKGBUILD?h={}",
            self.base_url.trim_end_matches('/'),
            package
        );

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|err| MetadataError::Transport {
                message: format!("unable to fetch build recipe at {url}: {err}"),
            })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(MetadataError::NotFound {
                package: package.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(MetadataError::Transport {
                message: format!("recipe endpoint returned status {}", response.status()),
            });
        }

        response.text().await.map_err(|err| MetadataError::InvalidResponse {
            message: format!("failed to read build recipe body: {err}"),
        })
    }
}

/// Folds RPC metadata into the analysis context.
pub fn enrich_context(info: &AurPackageInfo, context: &mut PackageContext) {
    if context.version.is_empty() {
        context.version = info.version.clone();
    }
    if context.maintainer.is_empty() {
        context.maintainer = info.maintainer.clone().unwrap_or_default();
    }
    context.votes = Some(info.num_votes);
    context.popularity = Some(info.popularity);
    context.first_submitted = format_epoch_day(info.first_submitted);
    context.last_updated = format_epoch_day(info.last_modified);
    context.dependencies = info.depends.clone();
    context.make_depends = info.make_depends.clone();
    context.opt_depends = info.opt_depends.clone();
}

fn format_epoch_day(seconds: i64) -> Option<String> {
    if seconds <= 0 {
        return None;
    }
    Utc.timestamp_opt(seconds, 0)
        .single()
        .map(|ts| ts.format("%Y-%m-%d").to_string())
}
