//! Directory-backed, content-addressable cache of risk verdicts.
//!
//! One subdirectory per sanitized package name, one JSON record per content
//! identifier. That layout makes "all cached versions of package X" a cheap
//! directory listing instead of a full-corpus scan.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use safe_aur_core::RiskVerdict;

/// On-disk record format version.
pub const CACHE_FORMAT_VERSION: &str = "1.0";

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failure at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(
        "cache corruption at {path}: record names identifier '{found}' but was looked up as '{expected}'"
    )]
    Corruption {
        path: String,
        expected: String,
        found: String,
    },
    #[error("cache record at {path} is not valid JSON: {message}")]
    Malformed { path: String, message: String },
}

/// Metadata stored alongside every cached verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub commit_hash: String,
    pub package_name: String,
    pub cached_at: DateTime<Utc>,
    pub cache_version: String,
    pub producer_version: String,
}

/// One persisted cache record: metadata plus the verdict itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub cache_metadata: CacheMetadata,
    pub analysis: RiskVerdict,
}

/// Aggregate statistics over the whole cache, computed by a full scan.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub total_packages: usize,
    pub total_records: usize,
    pub total_bytes: u64,
    pub oldest_entry: Option<DateTime<Utc>>,
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Content-addressable verdict store rooted at `<data-dir>/cache`.
pub struct AnalysisCache {
    root: PathBuf,
    producer_version: String,
}

impl AnalysisCache {
    /// Opens the default on-disk cache, creating its directory if needed.
    pub fn open() -> Result<Self, CacheError> {
        Self::with_root(data_dir().join("cache"))
    }

    /// Opens a cache rooted at an explicit directory.
    pub fn with_root(root: PathBuf) -> Result<Self, CacheError> {
        fs::create_dir_all(&root).map_err(|source| CacheError::Io {
            path: root.display().to_string(),
            source,
        })?;
        Ok(Self {
            root,
            producer_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Looks up a verdict under the exact (package, identifier) key.
    ///
    /// An absent record is `Ok(None)`, never an error. A present record whose
    /// embedded identifier disagrees with the requested one is surfaced as
    /// [`CacheError::Corruption`]; the file is left in place for inspection.
    pub fn lookup(&self, package: &str, identifier: &str) -> Result<Option<RiskVerdict>, CacheError> {
        let path = self.record_path(package, identifier);
        if !path.is_file() {
            return Ok(None);
        }

        let data = fs::read_to_string(&path).map_err(|source| CacheError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let record: CacheRecord =
            serde_json::from_str(&data).map_err(|err| CacheError::Malformed {
                path: path.display().to_string(),
                message: err.to_string(),
            })?;

        if record.cache_metadata.commit_hash != identifier {
            return Err(CacheError::Corruption {
                path: path.display().to_string(),
                expected: identifier.to_string(),
                found: record.cache_metadata.commit_hash,
            });
        }

        Ok(Some(record.analysis))
    }

    /// Writes one verdict record, creating the package partition if absent.
    ///
    /// Callers are expected to have observed a miss first; a duplicate insert
    /// under a cross-process race is last-writer-wins for an identical key.
    pub fn insert(
        &self,
        package: &str,
        identifier: &str,
        verdict: &RiskVerdict,
    ) -> Result<(), CacheError> {
        let partition = self.partition_path(package);
        fs::create_dir_all(&partition).map_err(|source| CacheError::Io {
            path: partition.display().to_string(),
            source,
        })?;

        let record = CacheRecord {
            cache_metadata: CacheMetadata {
                commit_hash: identifier.to_string(),
                package_name: package.to_string(),
                cached_at: Utc::now(),
                cache_version: CACHE_FORMAT_VERSION.to_string(),
                producer_version: self.producer_version.clone(),
            },
            analysis: verdict.clone(),
        };

        let path = self.record_path(package, identifier);
        let data = serde_json::to_string_pretty(&record).map_err(|err| CacheError::Malformed {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        fs::write(&path, data).map_err(|source| CacheError::Io {
            path: path.display().to_string(),
            source,
        })
    }

    /// Lists all cached content identifiers for a package, lexicographically.
    ///
    /// Lexicographic, not recency, order; callers needing recency must read
    /// each record's `cached_at`.
    pub fn list_identifiers(&self, package: &str) -> Result<Vec<String>, CacheError> {
        let partition = self.partition_path(package);
        let entries = match fs::read_dir(&partition) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(CacheError::Io {
                    path: partition.display().to_string(),
                    source,
                });
            }
        };

        let mut identifiers = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| CacheError::Io {
                path: partition.display().to_string(),
                source,
            })?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if entry.path().is_dir() {
                continue;
            }
            if let Some(identifier) = name.strip_suffix(".json") {
                identifiers.push(identifier.to_string());
            }
        }

        identifiers.sort();
        Ok(identifiers)
    }

    /// Removes every record older than `max_age` (by file modification time)
    /// and returns the number removed. A zero `max_age` clears everything.
    pub fn prune(&self, max_age: Duration) -> Result<usize, CacheError> {
        let cutoff = SystemTime::now()
            .checked_sub(max_age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let mut removed = 0usize;

        for path in self.record_files()? {
            let modified = match fs::metadata(&path).and_then(|meta| meta.modified()) {
                Ok(modified) => modified,
                Err(err) => {
                    tracing::warn!("skipping unreadable cache record {}: {err}", path.display());
                    continue;
                }
            };

            if modified < cutoff {
                match fs::remove_file(&path) {
                    Ok(()) => removed += 1,
                    Err(err) => {
                        tracing::warn!(
                            "failed to remove expired cache record {}: {err}",
                            path.display()
                        );
                    }
                }
            }
        }

        Ok(removed)
    }

    /// Full-scan statistics. O(n) in record count; fine for a local cache.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut packages = std::collections::BTreeSet::new();
        let mut total_records = 0usize;
        let mut total_bytes = 0u64;
        let mut oldest: Option<SystemTime> = None;
        let mut newest: Option<SystemTime> = None;

        for path in self.record_files()? {
            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            total_records += 1;
            total_bytes += meta.len();

            if let Ok(modified) = meta.modified() {
                oldest = Some(oldest.map_or(modified, |current| current.min(modified)));
                newest = Some(newest.map_or(modified, |current| current.max(modified)));
            }

            if let Some(package) = path.parent().and_then(Path::file_name) {
                packages.insert(package.to_string_lossy().into_owned());
            }
        }

        Ok(CacheStats {
            total_packages: packages.len(),
            total_records,
            total_bytes,
            oldest_entry: oldest.map(DateTime::<Utc>::from),
            newest_entry: newest.map(DateTime::<Utc>::from),
        })
    }

    fn record_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let partitions = fs::read_dir(&self.root).map_err(|source| CacheError::Io {
            path: self.root.display().to_string(),
            source,
        })?;

        let mut files = Vec::new();
        for partition in partitions.flatten() {
            let partition_path = partition.path();
            if !partition_path.is_dir() {
                continue;
            }
            let Ok(entries) = fs::read_dir(&partition_path) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
                    files.push(path);
                }
            }
        }
        Ok(files)
    }

    fn partition_path(&self, package: &str) -> PathBuf {
        self.root.join(sanitize_package_name(package))
    }

    fn record_path(&self, package: &str, identifier: &str) -> PathBuf {
        self.partition_path(package).join(format!("{identifier}.json"))
    }
}

/// Replaces path-unsafe characters in a package name with underscores.
/// Idempotent.
pub fn sanitize_package_name(package: &str) -> String {
    package
        .chars()
        .map(|ch| match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | ' ' => '_',
            other => other,
        })
        .collect()
}

/// Short digest over the (package, identifier) pair, usable as an extra
/// validation token in logs and reports.
pub fn validation_digest(package: &str, identifier: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(package.as_bytes());
    hasher.update(b":");
    hasher.update(identifier.as_bytes());
    let digest = hasher.finalize();
    let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    hex[..16].to_string()
}

/// XDG-style data directory for safe-aur state.
pub fn data_dir() -> PathBuf {
    if let Some(explicit) = env::var_os("SAFE_AUR_DATA_DIR") {
        return PathBuf::from(explicit);
    }

    if let Some(xdg_data) = env::var_os("XDG_DATA_HOME") {
        return PathBuf::from(xdg_data).join("safe-aur");
    }

    env::var_os("HOME")
        .map(PathBuf::from)
        .map(|home| home.join(".local").join("share").join("safe-aur"))
        .unwrap_or_else(|| PathBuf::from(".safe-aur"))
}
