use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::github::rate_limit::RateLimitSnapshot;
use crate::github::types::{PrStatus, PullRequestRecord};

/// Repo-wide counts from the three count slices. Each figure degrades to
/// None independently when its fetch failed; closed is never fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllPrCounts {
    pub total: Option<u64>,
    pub merged: Option<u64>,
    pub open: Option<u64>,
}

impl AllPrCounts {
    /// Derived, never fetched. Clamped at zero; upstream counts are not
    /// guaranteed to be mutually consistent.
    pub fn closed(&self) -> Option<u64> {
        Some(
            self.total?
                .saturating_sub(self.merged?)
                .saturating_sub(self.open?),
        )
    }
}

/// Partition of the agent's PRs by derived status.
/// merged + open + closed_not_merged always equals total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: u64,
    pub merged: u64,
    pub open: u64,
    pub closed_not_merged: u64,
}

pub fn count_statuses(items: &[PullRequestRecord]) -> StatusCounts {
    let mut counts = StatusCounts {
        total: items.len() as u64,
        merged: 0,
        open: 0,
        closed_not_merged: 0,
    };
    for item in items {
        match item.status() {
            PrStatus::Merged => counts.merged += 1,
            PrStatus::Open => counts.open += 1,
            PrStatus::ClosedNotMerged => counts.closed_not_merged += 1,
        }
    }
    counts
}

/// Whole-percent merge rate; 0% on an empty set.
pub fn merge_rate_percent(merged: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    (merged as f64 * 100.0 / total as f64).round() as u8
}

/// Fixed histogram boundaries in hours. Stable for any dataset, so
/// re-aggregating identical input always yields identical buckets.
const HISTOGRAM_BOUNDS: [(&str, f64, f64); 6] = [
    ("<1h", 0.0, 1.0),
    ("1-6h", 1.0, 6.0),
    ("6-24h", 6.0, 24.0),
    ("1-3d", 24.0, 72.0),
    ("3-7d", 72.0, 168.0),
    (">7d", 168.0, f64::INFINITY),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistogramBucket {
    pub label: &'static str,
    pub count: u64,
}

/// Created-to-merged turnaround over merged PRs only.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseTimeStats {
    pub average_hours: f64,
    pub median_hours: f64,
    pub fastest_hours: f64,
    pub slowest_hours: f64,
    pub histogram: Vec<HistogramBucket>,
}

pub fn hours_between(created: DateTime<Utc>, merged: DateTime<Utc>) -> f64 {
    (merged - created).num_seconds() as f64 / 3600.0
}

/// Compute response-time stats over the merged records in `items`.
/// None when nothing merged.
pub fn response_time_stats(items: &[PullRequestRecord]) -> Option<ResponseTimeStats> {
    stats_over(items.iter())
}

fn stats_over<'a>(
    items: impl Iterator<Item = &'a PullRequestRecord>,
) -> Option<ResponseTimeStats> {
    let mut hours: Vec<f64> = items
        .filter_map(|pr| pr.merged_at.map(|m| hours_between(pr.created_at, m)))
        .collect();
    if hours.is_empty() {
        return None;
    }
    hours.sort_by(f64::total_cmp);

    let average_hours = hours.iter().sum::<f64>() / hours.len() as f64;
    let mid = hours.len() / 2;
    let median_hours = if hours.len() % 2 == 0 {
        (hours[mid - 1] + hours[mid]) / 2.0
    } else {
        hours[mid]
    };

    let histogram = HISTOGRAM_BOUNDS
        .iter()
        .map(|&(label, lo, hi)| HistogramBucket {
            label,
            count: hours.iter().filter(|&&h| h >= lo && h < hi).count() as u64,
        })
        .collect();

    Some(ResponseTimeStats {
        average_hours,
        median_hours,
        fastest_hours: hours[0],
        slowest_hours: hours[hours.len() - 1],
        histogram,
    })
}

/// Display contract for durations: under a day in hours, otherwise in days,
/// one decimal place either way.
pub fn format_hours(hours: f64) -> String {
    if hours < 24.0 {
        format!("{:.1}h", hours)
    } else {
        format!("{:.1} days", hours / 24.0)
    }
}

/// Agent-vs-others response time comparison over the all-merged sample.
#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonStats {
    pub agent: Option<ResponseTimeStats>,
    pub others: Option<ResponseTimeStats>,
    /// Displayed figure: authoritative all-merged count minus the agent's
    /// merged count, never the raw fetched sample length.
    pub others_count: u64,
    /// How many non-agent records the statistical moments were computed from
    pub others_sample_size: u64,
    /// The fetched sample is smaller than the authoritative count
    pub is_partial: bool,
}

/// Partition the all-merged sample by author identity and derive both sets
/// of moments. `authoritative_merged` comes from the count phase;
/// `agent_merged` from the primary slice.
pub fn comparison_stats(
    sample: &[PullRequestRecord],
    agent_login: &str,
    authoritative_merged: u64,
    agent_merged: u64,
) -> ComparisonStats {
    let merged_sample: Vec<&PullRequestRecord> = sample
        .iter()
        .filter(|pr| pr.merged_at.is_some())
        .collect();
    let merged_sample_size = merged_sample.len() as u64;
    let (agent_sample, others_sample): (Vec<&PullRequestRecord>, Vec<&PullRequestRecord>) =
        merged_sample
            .into_iter()
            .partition(|pr| pr.is_authored_by(agent_login));

    ComparisonStats {
        agent: stats_over(agent_sample.into_iter()),
        others_sample_size: others_sample.len() as u64,
        others: stats_over(others_sample.into_iter()),
        others_count: authoritative_merged.saturating_sub(agent_merged),
        is_partial: merged_sample_size < authoritative_merged,
    }
}

/// Non-fatal conditions attached to a result instead of replacing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatsWarning {
    /// The search service could not fully compute a result set in time
    ResultsIncomplete,
    /// The comparison sample hit the paging ceiling
    ComparisonTruncated { total_count: u64 },
    /// One count slice failed; that ratio is unknown
    CountUnavailable { slice: &'static str },
    /// The comparison fetch failed entirely
    ComparisonUnavailable,
    /// Cached entries carry no comparison sample; the request asked for one
    ComparisonSkippedCached,
}

impl std::fmt::Display for StatsWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsWarning::ResultsIncomplete => write!(
                f,
                "the search service reported an incomplete result set; figures may be unreliable"
            ),
            StatsWarning::ComparisonTruncated { total_count } => write!(
                f,
                "comparison sample capped by the paging ceiling ({total_count} matches exist); \
                 response-time moments use the retrieved sample only"
            ),
            StatsWarning::CountUnavailable { slice } => write!(
                f,
                "the {slice} count could not be fetched; that ratio is shown as unknown"
            ),
            StatsWarning::ComparisonUnavailable => {
                write!(f, "the agent-vs-others comparison could not be fetched")
            }
            StatsWarning::ComparisonSkippedCached => write!(
                f,
                "comparison skipped: this result came from the cache; rerun with --no-cache \
                 to fetch one"
            ),
        }
    }
}

/// The results object handed to the rendering layer.
#[derive(Debug, Clone)]
pub struct RepoStats {
    pub items: Vec<PullRequestRecord>,
    pub counts: StatusCounts,
    pub merge_rate_percent: u8,
    pub all_counts: Option<AllPrCounts>,
    pub response_times: Option<ResponseTimeStats>,
    pub comparison: Option<ComparisonStats>,
    pub rate_limit: Option<RateLimitSnapshot>,
    pub from_cache: bool,
    pub warnings: Vec<StatsWarning>,
}

/// Pure reduction of the primary slice plus optional repo-wide counts into
/// the results object. The coordinator fills in comparison, rate limit,
/// cache provenance, and warnings.
pub fn aggregate(items: Vec<PullRequestRecord>, all_counts: Option<AllPrCounts>) -> RepoStats {
    let counts = count_statuses(&items);
    let response_times = response_time_stats(&items);
    RepoStats {
        merge_rate_percent: merge_rate_percent(counts.merged, counts.total),
        counts,
        all_counts,
        response_times,
        comparison: None,
        rate_limit: None,
        from_cache: false,
        warnings: Vec::new(),
        items,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::types::PrState;
    use chrono::{Duration, TimeZone};

    fn pr(id: u64, state: PrState, merged_hours: Option<i64>) -> PullRequestRecord {
        let created = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        PullRequestRecord {
            id,
            number: id as i64,
            title: Some(format!("PR {id}")),
            author_login: Some("copilot".to_string()),
            state,
            created_at: created,
            merged_at: merged_hours.map(|h| created + Duration::hours(h)),
            url: None,
        }
    }

    #[test]
    fn test_status_counts_partition_the_total() {
        let items = vec![
            pr(1, PrState::Closed, Some(2)),
            pr(2, PrState::Open, None),
            pr(3, PrState::Closed, None),
            pr(4, PrState::Open, Some(5)), // inconsistent payload: merged wins
            pr(5, PrState::Open, None),
        ];
        let counts = count_statuses(&items);
        assert_eq!(counts.total, 5);
        assert_eq!(counts.merged, 2);
        assert_eq!(counts.open, 2);
        assert_eq!(counts.closed_not_merged, 1);
        assert_eq!(
            counts.merged + counts.open + counts.closed_not_merged,
            counts.total
        );
    }

    #[test]
    fn test_merge_rate_edges() {
        assert_eq!(merge_rate_percent(0, 0), 0);
        assert_eq!(merge_rate_percent(0, 7), 0);
        assert_eq!(merge_rate_percent(1, 3), 33);
        assert_eq!(merge_rate_percent(2, 3), 67);
        assert_eq!(merge_rate_percent(3, 3), 100);
        // monotone in merged for fixed total
        assert!(merge_rate_percent(4, 10) >= merge_rate_percent(3, 10));
    }

    #[test]
    fn test_closed_count_is_derived_and_clamped() {
        let counts = AllPrCounts {
            total: Some(40),
            merged: Some(25),
            open: Some(10),
        };
        assert_eq!(counts.closed(), Some(5));

        // upstream inconsistency clamps at zero instead of underflowing
        let bad = AllPrCounts {
            total: Some(10),
            merged: Some(9),
            open: Some(9),
        };
        assert_eq!(bad.closed(), Some(0));

        let unknown = AllPrCounts {
            total: Some(40),
            merged: None,
            open: Some(10),
        };
        assert_eq!(unknown.closed(), None);
    }

    #[test]
    fn test_response_time_example() {
        // merged at T+2h, T+12h, T+24h
        let items = vec![
            pr(1, PrState::Closed, Some(2)),
            pr(2, PrState::Closed, Some(12)),
            pr(3, PrState::Closed, Some(24)),
        ];
        let stats = response_time_stats(&items).unwrap();
        assert!((stats.average_hours - 38.0 / 3.0).abs() < 1e-9);
        assert_eq!(stats.median_hours, 12.0);
        assert_eq!(stats.fastest_hours, 2.0);
        assert_eq!(stats.slowest_hours, 24.0);
        assert_eq!(format_hours(stats.slowest_hours), "1.0 days");
        assert_eq!(format_hours(stats.fastest_hours), "2.0h");
    }

    #[test]
    fn test_median_even_count_averages_middles() {
        let items = vec![
            pr(1, PrState::Closed, Some(2)),
            pr(2, PrState::Closed, Some(4)),
            pr(3, PrState::Closed, Some(10)),
            pr(4, PrState::Closed, Some(20)),
        ];
        let stats = response_time_stats(&items).unwrap();
        assert_eq!(stats.median_hours, 7.0);
    }

    #[test]
    fn test_response_times_skip_unmerged() {
        let items = vec![pr(1, PrState::Open, None), pr(2, PrState::Closed, None)];
        assert!(response_time_stats(&items).is_none());
    }

    #[test]
    fn test_histogram_is_deterministic() {
        let items = vec![
            pr(1, PrState::Closed, Some(0)),   // <1h
            pr(2, PrState::Closed, Some(3)),   // 1-6h
            pr(3, PrState::Closed, Some(12)),  // 6-24h
            pr(4, PrState::Closed, Some(48)),  // 1-3d
            pr(5, PrState::Closed, Some(100)), // 3-7d
            pr(6, PrState::Closed, Some(400)), // >7d
        ];
        let a = response_time_stats(&items).unwrap();
        let b = response_time_stats(&items).unwrap();
        assert_eq!(a.histogram, b.histogram);
        assert!(a.histogram.iter().all(|bucket| bucket.count == 1));
        assert_eq!(a.histogram.len(), 6);
    }

    #[test]
    fn test_comparison_underfetch_example() {
        // authoritative allMerged = 1500, agent merged = 1, ceiling hit at
        // 1000 sample records (1 agent + 999 others)
        let mut sample = vec![pr(0, PrState::Closed, Some(2))];
        for id in 1..1000u64 {
            let mut other = pr(id, PrState::Closed, Some(6));
            other.author_login = Some(format!("human{id}"));
            sample.push(other);
        }
        let cmp = comparison_stats(&sample, "copilot", 1500, 1);
        assert_eq!(cmp.others_count, 1499);
        assert_eq!(cmp.others_sample_size, 999);
        assert!(cmp.is_partial);
        assert!(cmp.agent.is_some());
        assert!(cmp.others.is_some());
    }

    #[test]
    fn test_comparison_complete_sample() {
        let mut sample = vec![pr(0, PrState::Closed, Some(2))];
        let mut other = pr(1, PrState::Closed, Some(8));
        other.author_login = Some("alice".to_string());
        sample.push(other);

        let cmp = comparison_stats(&sample, "copilot", 2, 1);
        assert_eq!(cmp.others_count, 1);
        assert!(!cmp.is_partial);
    }

    #[test]
    fn test_aggregate_builds_results_object() {
        let items = vec![
            pr(1, PrState::Closed, Some(2)),
            pr(2, PrState::Open, None),
        ];
        let stats = aggregate(items, None);
        assert_eq!(stats.counts.total, 2);
        assert_eq!(stats.merge_rate_percent, 50);
        assert!(stats.response_times.is_some());
        assert!(!stats.from_cache);
        assert!(stats.warnings.is_empty());
    }
}
