use chrono::NaiveDate;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, warn};

use crate::github::rate_limit::RateLimitSnapshot;
use crate::github::types::PullRequestRecord;
use crate::stats::AllPrCounts;

/// Bumped whenever the CacheEntry shape changes. Entries written under any
/// other version are inert and get purged, never migrated.
pub const SCHEMA_VERSION: &str = "3";

const NAMESPACE_PREFIX: &str = "agent-stats-cache-";
const TTL: Duration = Duration::from_secs(5 * 60);

/// One cached fetch: the primary slice's records plus the count and
/// rate-limit snapshots taken alongside them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub schema_version: String,
    pub data: Vec<PullRequestRecord>,
    /// Write time, epoch milliseconds
    pub timestamp: u64,
    pub rate_limit_info: Option<RateLimitSnapshot>,
    pub all_pr_counts: Option<AllPrCounts>,
}

impl CacheEntry {
    pub fn new(
        data: Vec<PullRequestRecord>,
        rate_limit_info: Option<RateLimitSnapshot>,
        all_pr_counts: Option<AllPrCounts>,
    ) -> Self {
        CacheEntry {
            schema_version: SCHEMA_VERSION.to_string(),
            data,
            timestamp: now_millis(),
            rate_limit_info,
            all_pr_counts,
        }
    }
}

/// Identity of one cached query. Auth presence is part of the key: a
/// token-bearing request must never be satisfied by a tokenless entry,
/// and vice versa.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKey {
    owner: String,
    repo: String,
    from: NaiveDate,
    to: NaiveDate,
    authenticated: bool,
}

impl CacheKey {
    /// Owner/repo are trimmed and lowercased so whitespace or case variants
    /// of the same repository collide on the same entry.
    pub fn new(owner: &str, repo: &str, from: NaiveDate, to: NaiveDate, authenticated: bool) -> Self {
        CacheKey {
            owner: owner.trim().to_ascii_lowercase(),
            repo: repo.trim().to_ascii_lowercase(),
            from,
            to,
            authenticated,
        }
    }

    /// Components are joined with '@', which cannot occur in GitHub owner
    /// or repository names; a '-' separator would let ("acme-web", "app")
    /// and ("acme", "web-app") share a file.
    fn file_name(&self) -> String {
        format!(
            "{NAMESPACE_PREFIX}v{SCHEMA_VERSION}-{}@{}@{}@{}@{}.json",
            self.owner,
            self.repo,
            self.from,
            self.to,
            if self.authenticated { "auth" } else { "anon" },
        )
    }
}

/// File-backed store, one JSON file per key under a namespace prefix.
/// Write failures degrade to "uncached"; they are never surfaced.
#[derive(Debug)]
pub struct CacheStore {
    dir: PathBuf,
}

impl CacheStore {
    pub fn new(dir: PathBuf) -> Self {
        CacheStore { dir }
    }

    /// Per-user cache directory. None when no home directory can be
    /// resolved, which simply leaves every request uncached.
    pub fn open_default() -> Option<Self> {
        let dirs = ProjectDirs::from("", "", "agent-stats")?;
        Some(CacheStore::new(dirs.cache_dir().to_path_buf()))
    }

    /// A hit requires a schema-version match and freshness within the TTL.
    /// Expired, version-mismatched, or unparsable entries are misses and are
    /// physically removed on the way out.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.dir.join(key.file_name());
        let bytes = fs::read(&path).ok()?;

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(path = %path.display(), %err, "evicting unparsable cache entry");
                remove_quietly(&path);
                return None;
            }
        };

        if entry.schema_version != SCHEMA_VERSION {
            debug!(path = %path.display(), version = %entry.schema_version, "evicting stale-version entry");
            remove_quietly(&path);
            return None;
        }
        if now_millis().saturating_sub(entry.timestamp) >= TTL.as_millis() as u64 {
            debug!(path = %path.display(), "evicting expired entry");
            remove_quietly(&path);
            return None;
        }
        Some(entry)
    }

    /// Unconditional overwrite. A reader sees either the old complete entry
    /// or the new one; the write is a single call.
    pub fn put(&self, key: &CacheKey, entry: &CacheEntry) {
        if let Err(err) = self.try_put(key, entry) {
            warn!(%err, "cache write failed; this request stays uncached");
        }
    }

    fn try_put(&self, key: &CacheKey, entry: &CacheEntry) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let bytes = serde_json::to_vec(entry).map_err(std::io::Error::other)?;
        fs::write(self.dir.join(key.file_name()), bytes)
    }

    /// Delete every entry under the namespace prefix whose embedded version
    /// token differs from the running version, regardless of TTL. Invoked
    /// once at coordinator start.
    pub fn sweep_stale_versions(&self) {
        let current_prefix = format!("{NAMESPACE_PREFIX}v{SCHEMA_VERSION}-");
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name.starts_with(NAMESPACE_PREFIX) && !name.starts_with(&current_prefix) {
                debug!(file = name, "sweeping stale-version cache entry");
                remove_quietly(&entry.path());
            }
        }
    }
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        debug!(path = %path.display(), %err, "failed to remove cache file");
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
