//! Evaluation pipeline: resolve, cache, enrich, score, analyze, persist.
//!
//! Collaborators sit behind trait objects so tests swap in deterministic
//! fakes. Degraded modes (metadata unavailable, fallback identifier, cache
//! I/O failure) are logged and survived; only a cancelled run, an unusable
//! identifier, or a failed analysis abort the attempt.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context as _;
use thiserror::Error;
use tokio::sync::watch;

use safe_aur_core::{AnalysisError, Analyzer, PackageContext, RiskVerdict};

use crate::analyzer::ClaudeCliAnalyzer;
use crate::aur::{enrich_context, AurRpcClient, PackageMetadataSource, RecipeSource};
use crate::cache::{validation_digest, AnalysisCache, CacheError};
use crate::config::SafeAurConfig;
use crate::resolver::{fallback_identifier, GitResolver, ResolveError, VersionResolver};
use crate::trust::{
    score_trust, GitRepositoryInspector, MaintainerSignal, RepositoryInspector, TrustReport,
};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("evaluation of '{package}' was cancelled")]
    Cancelled { package: String },
    #[error("could not resolve a usable identifier for '{package}'")]
    Resolution {
        package: String,
        #[source]
        source: ResolveError,
    },
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// Outcome of one pipeline run for a single package.
#[derive(Debug)]
pub struct Evaluation {
    pub verdict: RiskVerdict,
    pub identifier: String,
    /// True when the verdict was served from the cache without invoking the
    /// analyzer. Cached runs carry no trust report.
    pub cached: bool,
    pub trust: Option<TrustReport>,
}

pub struct SafeAurService {
    config: Arc<SafeAurConfig>,
    cache: Option<AnalysisCache>,
    /// Set after a cache I/O failure; caching stays off for the rest of the
    /// run rather than failing the evaluation.
    cache_degraded: AtomicBool,
    resolver: Arc<dyn VersionResolver>,
    metadata: Arc<dyn PackageMetadataSource>,
    recipes: Arc<dyn RecipeSource>,
    inspector: Arc<dyn RepositoryInspector>,
    analyzer: Arc<dyn Analyzer>,
}

impl SafeAurService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<SafeAurConfig>,
        cache: Option<AnalysisCache>,
        resolver: Arc<dyn VersionResolver>,
        metadata: Arc<dyn PackageMetadataSource>,
        recipes: Arc<dyn RecipeSource>,
        inspector: Arc<dyn RepositoryInspector>,
        analyzer: Arc<dyn Analyzer>,
    ) -> Self {
        Self {
            config,
            cache,
            cache_degraded: AtomicBool::new(false),
            resolver,
            metadata,
            recipes,
            inspector,
            analyzer,
        }
    }

    /// Wires up the production collaborators from loaded configuration.
    pub fn from_config(config: SafeAurConfig) -> anyhow::Result<Self> {
        let cache = if config.cache.enabled {
            Some(AnalysisCache::open().context("failed to open the analysis cache")?)
        } else {
            None
        };
        let rpc = Arc::new(AurRpcClient::new());
        let analyzer = Arc::new(ClaudeCliAnalyzer::new(config.provider.command.clone()));
        Ok(Self::new(
            Arc::new(config),
            cache,
            Arc::new(GitResolver::new()),
            rpc.clone(),
            rpc,
            Arc::new(GitRepositoryInspector::new()),
            analyzer,
        ))
    }

    /// Runs the full pipeline for one package.
    ///
    /// `cancel` is a stop flag; flipping it to true aborts the evaluation at
    /// the next await point with [`PipelineError::Cancelled`].
    pub async fn evaluate(
        &self,
        package: &str,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<Evaluation, PipelineError> {
        let mut context = PackageContext {
            name: package.to_string(),
            ..PackageContext::default()
        };

        match race(package, &mut cancel, self.metadata.fetch(package)).await? {
            Ok(info) => enrich_context(&info, &mut context),
            Err(err) => {
                tracing::warn!("AUR metadata unavailable for '{package}': {err}");
            }
        }

        let identifier = match race(package, &mut cancel, self.resolver.resolve(package)).await? {
            Ok(identifier) => identifier,
            Err(source @ ResolveError::InvalidIdentifierFormat { .. }) => {
                return Err(PipelineError::Resolution {
                    package: package.to_string(),
                    source,
                });
            }
            Err(err) => {
                let version = if context.version.is_empty() {
                    "unknown"
                } else {
                    context.version.as_str()
                };
                let fallback = fallback_identifier(package, version);
                tracing::warn!(
                    "identifier resolution failed for '{package}' ({err}); \
                     caching under degraded key '{fallback}'"
                );
                fallback
            }
        };
        context.identifier = identifier.clone();

        if let Some(verdict) = self.cache_lookup(package, &identifier) {
            tracing::debug!(
                "cache hit for '{package}' [{}]",
                validation_digest(package, &identifier)
            );
            return Ok(Evaluation {
                verdict,
                identifier,
                cached: true,
                trust: None,
            });
        }

        match race(package, &mut cancel, self.recipes.fetch_recipe(package)).await? {
            Ok(recipe) => context.pkgbuild = recipe,
            Err(err) => {
                tracing::warn!("build recipe unavailable for '{package}': {err}");
            }
        }

        let trust = match race(package, &mut cancel, self.inspector.inspect(package)).await? {
            Ok(repo) => {
                if context.maintainer.is_empty() {
                    context.maintainer = repo.maintainer.clone();
                }
                let signal = MaintainerSignal::placeholder(&repo.maintainer);
                let report = score_trust(&repo, &signal);
                context.trust_summary = Some(report.summary_line());
                Some(report)
            }
            Err(err) => {
                tracing::warn!("repository trust analysis unavailable for '{package}': {err}");
                None
            }
        };

        let mut verdict = race(package, &mut cancel, self.analyzer.analyze(&context)).await??;
        verdict.ensure_floor();

        self.cache_insert(package, &identifier, &verdict);

        Ok(Evaluation {
            verdict,
            identifier,
            cached: false,
            trust,
        })
    }

    fn cache_lookup(&self, package: &str, identifier: &str) -> Option<RiskVerdict> {
        let cache = self.usable_cache()?;
        match cache.lookup(package, identifier) {
            Ok(hit) => hit,
            Err(err @ CacheError::Io { .. }) => {
                self.degrade_cache(&err);
                None
            }
            Err(err) => {
                // Corruption and malformed records read as a miss; the file
                // stays on disk for inspection.
                tracing::warn!("ignoring unusable cache record for '{package}': {err}");
                None
            }
        }
    }

    fn cache_insert(&self, package: &str, identifier: &str, verdict: &RiskVerdict) {
        let Some(cache) = self.usable_cache() else {
            return;
        };
        match cache.insert(package, identifier, verdict) {
            Ok(()) => {}
            Err(err @ CacheError::Io { .. }) => self.degrade_cache(&err),
            Err(err) => {
                tracing::warn!("failed to persist verdict for '{package}': {err}");
            }
        }
    }

    fn usable_cache(&self) -> Option<&AnalysisCache> {
        if self.cache_degraded.load(Ordering::Relaxed) {
            return None;
        }
        self.cache.as_ref()
    }

    fn degrade_cache(&self, err: &CacheError) {
        tracing::warn!("cache unavailable, disabling caching for this run: {err}");
        self.cache_degraded.store(true, Ordering::Relaxed);
    }
}

/// Races `work` against the stop flag.
///
/// A dropped sender means cancellation can no longer arrive; that branch
/// stays pending and the work runs to completion.
async fn race<F, T>(
    package: &str,
    cancel: &mut watch::Receiver<bool>,
    work: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = T>,
{
    let stopped = async {
        if cancel.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        result = work => Ok(result),
        _ = stopped => Err(PipelineError::Cancelled {
            package: package.to_string(),
        }),
    }
}

#[cfg(test)]
#[path = "tests/service.rs"]
mod tests;
