use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, instrument, warn};

use crate::cache::{CacheEntry, CacheKey, CacheStore};
use crate::github::fetch::{fetch_count, fetch_slice, CountResult};
use crate::github::{build_query, EngineError, QuerySlice, SearchTransport};
use crate::stats::{self, AllPrCounts, RepoStats, StatsWarning};

/// Engine phases reported to the rendering layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    FetchingPrimary,
    FetchingCounts,
    FetchingComparison,
    Cached,
    Done,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::FetchingPrimary => write!(f, "fetching agent PRs"),
            Phase::FetchingCounts => write!(f, "fetching repository counts"),
            Phase::FetchingComparison => write!(f, "fetching comparison sample"),
            Phase::Cached => write!(f, "served from cache"),
            Phase::Done => write!(f, "done"),
        }
    }
}

/// Callback surface consumed by the rendering layer. The engine pushes
/// phase changes and per-page progress; nothing flows back in.
pub trait ProgressSink: Send + Sync {
    fn phase(&self, _phase: Phase) {}
    fn pages(&self, _fetched: u64, _total: u64) {}
}

/// Sink that ignores everything.
#[derive(Debug, Default)]
#[allow(dead_code)] // used by tests and callers that don't render progress
pub struct NoopProgress;

impl ProgressSink for NoopProgress {}

/// One user-initiated search.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub owner: String,
    pub repo: String,
    /// Login whose PRs the statistics are about
    pub agent_login: String,
    pub from: chrono::NaiveDate,
    pub to: chrono::NaiveDate,
    /// Also fetch the all-merged sample for an agent-vs-others comparison
    pub compare: bool,
    /// Skip cache reads for this request; the result is still written back
    pub bypass_cache_read: bool,
}

/// Sequences the fetch phases for one search and owns the generation
/// counter. Minting a new generation is the only cancellation primitive:
/// in-flight work from an older generation runs to completion but its
/// result is discarded at the next suspension boundary, never rendered and
/// never written to the cache.
///
/// Fixed contract: a cache miss issues exactly four upstream search calls —
/// one primary agent-authored slice plus the total/merged/open counts. The
/// closed count is always derived, never fetched. The comparison phase, when
/// requested, adds one more slice.
pub struct Coordinator<T: SearchTransport> {
    transport: T,
    cache: Option<CacheStore>,
    authenticated: bool,
    generation: AtomicU64,
}

impl<T: SearchTransport> Coordinator<T> {
    pub fn new(transport: T, cache: Option<CacheStore>, authenticated: bool) -> Self {
        if let Some(cache) = &cache {
            cache.sweep_stale_versions();
        }
        Coordinator {
            transport,
            cache,
            authenticated,
            generation: AtomicU64::new(0),
        }
    }

    fn check_generation(&self, generation: u64) -> Result<(), EngineError> {
        if self.generation.load(Ordering::SeqCst) == generation {
            Ok(())
        } else {
            Err(EngineError::Superseded)
        }
    }

    /// Run one search end to end and hand back the results object.
    #[instrument(skip(self, progress), fields(owner = %request.owner, repo = %request.repo, agent = %request.agent_login))]
    pub async fn search(
        &self,
        request: &SearchRequest,
        progress: &dyn ProgressSink,
    ) -> Result<RepoStats, EngineError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let key = CacheKey::new(
            &request.owner,
            &request.repo,
            request.from,
            request.to,
            self.authenticated,
        );

        if !request.bypass_cache_read {
            if let Some(entry) = self.cache.as_ref().and_then(|c| c.get(&key)) {
                debug!("cache hit; zero network calls");
                progress.phase(Phase::Cached);
                let mut result = stats::aggregate(entry.data, entry.all_pr_counts);
                result.rate_limit = entry.rate_limit_info;
                result.from_cache = true;
                // cached entries never carry a comparison sample
                if request.compare {
                    result.warnings.push(StatsWarning::ComparisonSkippedCached);
                }
                progress.phase(Phase::Done);
                return Ok(result);
            }
        }

        // Primary slice: the agent's own PRs. A failure here is fatal, and
        // truncation would make every displayed count wrong, so it is
        // refused outright instead of rendered.
        progress.phase(Phase::FetchingPrimary);
        let query = |slice| {
            build_query(&request.owner, &request.repo, request.from, request.to, slice)
        };
        let primary = fetch_slice(
            &self.transport,
            &query(QuerySlice::AgentAuthored {
                login: &request.agent_login,
            }),
            progress,
        )
        .await?;
        self.check_generation(generation)?;
        if primary.truncated {
            return Err(EngineError::ResultsTruncated {
                total_count: primary.total_count,
            });
        }

        let mut warnings = Vec::new();
        let mut incomplete = primary.incomplete;
        let mut rate_limit = primary.rate_limit.clone();

        // Count slices are independent: they resolve in any order and each
        // failure degrades only its own figure to unknown.
        progress.phase(Phase::FetchingCounts);
        let total_query = query(QuerySlice::AllTotal);
        let merged_query = query(QuerySlice::AllMerged);
        let open_query = query(QuerySlice::AllOpen);
        let (total_res, merged_res, open_res) = tokio::join!(
            fetch_count(&self.transport, &total_query),
            fetch_count(&self.transport, &merged_query),
            fetch_count(&self.transport, &open_query),
        );
        self.check_generation(generation)?;

        let mut unpack = |slice: &'static str,
                          result: Result<CountResult, EngineError>|
         -> Option<u64> {
            match result {
                Ok(count) => {
                    incomplete |= count.incomplete;
                    rate_limit = Some(count.rate_limit);
                    Some(count.total_count)
                }
                Err(err) => {
                    warn!(slice, %err, "count slice failed; ratio degrades to unknown");
                    warnings.push(StatsWarning::CountUnavailable { slice });
                    None
                }
            }
        };
        let all_counts = AllPrCounts {
            total: unpack("total", total_res),
            merged: unpack("merged", merged_res),
            open: unpack("open", open_res),
        };

        // Optional comparison: paginate the all-merged slice under the same
        // ceiling. Failures degrade, they never abort the search.
        let mut comparison = None;
        if request.compare {
            progress.phase(Phase::FetchingComparison);
            match fetch_slice(&self.transport, &query(QuerySlice::AllMerged), progress).await {
                Ok(sample) => {
                    self.check_generation(generation)?;
                    // the displayed population always comes from the
                    // authoritative count, not the fetched sample size
                    let authoritative = all_counts.merged.unwrap_or(sample.total_count);
                    let agent_merged = stats::count_statuses(&primary.items).merged;
                    if sample.truncated {
                        warnings.push(StatsWarning::ComparisonTruncated {
                            total_count: sample.total_count,
                        });
                    }
                    incomplete |= sample.incomplete;
                    if sample.rate_limit.is_some() {
                        rate_limit = sample.rate_limit;
                    }
                    comparison = Some(stats::comparison_stats(
                        &sample.items,
                        &request.agent_login,
                        authoritative,
                        agent_merged,
                    ));
                }
                Err(err) => {
                    warn!(%err, "comparison slice failed");
                    warnings.push(StatsWarning::ComparisonUnavailable);
                }
            }
        }

        if incomplete {
            warnings.push(StatsWarning::ResultsIncomplete);
        }

        // Only the current generation may write the shared cache.
        self.check_generation(generation)?;
        if let Some(cache) = &self.cache {
            cache.put(
                &key,
                &CacheEntry::new(
                    primary.items.clone(),
                    rate_limit.clone(),
                    Some(all_counts.clone()),
                ),
            );
        }

        let mut result = stats::aggregate(primary.items, Some(all_counts));
        result.comparison = comparison;
        result.rate_limit = rate_limit;
        result.warnings = warnings;
        progress.phase(Phase::Done);
        Ok(result)
    }
}
