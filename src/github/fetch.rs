use async_trait::async_trait;
use tracing::debug;

use super::rate_limit::RateLimitSnapshot;
use super::types::{PullRequestRecord, SearchPage};
use super::EngineError;
use crate::coordinator::ProgressSink;

/// Hard service limits for one query: at most 100 records per page and 10
/// pages, so at most 1000 records are ever retrievable for a single slice.
pub const PER_PAGE: u32 = 100;
pub const MAX_PAGES: u32 = 10;
pub const MAX_RECORDS: u64 = PER_PAGE as u64 * MAX_PAGES as u64;

/// One page as it came off the wire, with the rate-limit headers that
/// accompanied it.
#[derive(Debug, Clone)]
pub struct PageResponse {
    pub page: SearchPage,
    pub rate_limit: RateLimitSnapshot,
}

/// Transport seam between the engine and the HTTP layer. The production
/// implementation is `GitHubClient`; tests supply scripted responses.
#[async_trait]
pub trait SearchTransport: Send + Sync {
    async fn search_page(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PageResponse, EngineError>;
}

/// All pages of one logical query slice, accumulated in arrival order.
#[derive(Debug, Clone)]
pub struct SliceResult {
    pub items: Vec<PullRequestRecord>,
    /// The service's count of the whole result set
    pub total_count: u64,
    /// More matches exist than the paging ceiling can retrieve
    pub truncated: bool,
    /// Upstream reported an incomplete result set on at least one page
    pub incomplete: bool,
    /// Snapshot from the last page fetched
    pub rate_limit: Option<RateLimitSnapshot>,
}

/// Just the authoritative count of a slice, from a single minimal request.
#[derive(Debug, Clone)]
pub struct CountResult {
    pub total_count: u64,
    pub incomplete: bool,
    pub rate_limit: RateLimitSnapshot,
}

/// Retrieve every reachable page of one slice.
///
/// The `incomplete` flag taints the result but does not abort retrieval.
/// Quota exhaustion with pages still outstanding is an error for the whole
/// slice; a partial, silently-short result must never look complete.
pub async fn fetch_slice(
    transport: &dyn SearchTransport,
    query: &str,
    progress: &dyn ProgressSink,
) -> Result<SliceResult, EngineError> {
    let first = transport.search_page(query, 1, PER_PAGE).await?;

    let total_count = first.page.total_count;
    let truncated = total_count > MAX_RECORDS;
    let reachable = total_count.min(MAX_RECORDS);
    let mut incomplete = first.page.incomplete;
    let mut items = first.page.items;
    let mut rate_limit = first.rate_limit;
    progress.pages(items.len() as u64, reachable);

    let mut page = 1u32;
    while (items.len() as u64) < reachable && page < MAX_PAGES {
        if rate_limit.is_exhausted() {
            debug!(fetched = items.len(), reachable, "quota exhausted mid-slice");
            return Err(EngineError::RateLimited {
                reset_at: rate_limit.reset_at,
            });
        }

        page += 1;
        let response = transport.search_page(query, page, PER_PAGE).await?;
        incomplete |= response.page.incomplete;
        rate_limit = response.rate_limit;

        if response.page.items.is_empty() {
            // the service returned fewer records than total_count promised
            debug!(page, fetched = items.len(), "empty page before count was reached");
            break;
        }
        items.extend(response.page.items);
        progress.pages((items.len() as u64).min(reachable), reachable);
    }

    debug!(
        fetched = items.len(),
        total_count, truncated, incomplete, "slice complete"
    );
    Ok(SliceResult {
        items,
        total_count,
        truncated,
        incomplete,
        rate_limit: Some(rate_limit),
    })
}

/// Fetch only a slice's authoritative `total_count`, using the smallest
/// page the service allows.
pub async fn fetch_count(
    transport: &dyn SearchTransport,
    query: &str,
) -> Result<CountResult, EngineError> {
    let response = transport.search_page(query, 1, 1).await?;
    Ok(CountResult {
        total_count: response.page.total_count,
        incomplete: response.page.incomplete,
        rate_limit: response.rate_limit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::NoopProgress;
    use chrono::{TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn record(id: u64) -> PullRequestRecord {
        PullRequestRecord {
            id,
            number: id as i64,
            title: Some(format!("PR {id}")),
            author_login: Some("copilot".to_string()),
            state: crate::github::types::PrState::Open,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
            merged_at: None,
            url: None,
        }
    }

    fn page(total_count: u64, incomplete: bool, ids: std::ops::Range<u64>) -> PageResponse {
        PageResponse {
            page: SearchPage {
                total_count,
                incomplete,
                items: ids.map(record).collect(),
            },
            rate_limit: snapshot(25, 30),
        }
    }

    fn snapshot(remaining: u64, limit: u64) -> RateLimitSnapshot {
        let headers: HashMap<String, String> = [
            ("x-ratelimit-remaining".to_string(), remaining.to_string()),
            ("x-ratelimit-limit".to_string(), limit.to_string()),
        ]
        .into_iter()
        .collect();
        RateLimitSnapshot::from_headers(&headers)
    }

    /// Pops one scripted response per call, in order.
    struct ScriptedTransport {
        responses: Mutex<Vec<Result<PageResponse, EngineError>>>,
        calls: AtomicU32,
    }

    impl ScriptedTransport {
        fn new(mut responses: Vec<Result<PageResponse, EngineError>>) -> Self {
            responses.reverse();
            ScriptedTransport {
                responses: Mutex::new(responses),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SearchTransport for ScriptedTransport {
        async fn search_page(
            &self,
            _query: &str,
            _page: u32,
            _per_page: u32,
        ) -> Result<PageResponse, EngineError> {
            let _ = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .lock()
                .unwrap()
                .pop()
                .expect("transport called more times than scripted")
        }
    }

    #[tokio::test]
    async fn test_single_page_slice() {
        let transport = ScriptedTransport::new(vec![Ok(page(3, false, 0..3))]);
        let slice = fetch_slice(&transport, "q", &NoopProgress).await.unwrap();
        assert_eq!(slice.items.len(), 3);
        assert_eq!(slice.total_count, 3);
        assert!(!slice.truncated);
        assert!(!slice.incomplete);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_pagination_ceiling_at_ten_pages() {
        // 1500 matches: the fetcher must stop at 10 pages / 1000 records
        // and mark the slice truncated.
        let responses = (0..10u64)
            .map(|p| Ok(page(1500, false, p * 100..(p + 1) * 100)))
            .collect();
        let transport = ScriptedTransport::new(responses);
        let slice = fetch_slice(&transport, "q", &NoopProgress).await.unwrap();
        assert_eq!(transport.calls(), 10);
        assert_eq!(slice.items.len(), 1000);
        assert!(slice.truncated);
        assert_eq!(slice.total_count, 1500);
    }

    #[tokio::test]
    async fn test_incomplete_taints_but_does_not_abort() {
        let transport = ScriptedTransport::new(vec![
            Ok(page(250, false, 0..100)),
            Ok(page(250, true, 100..200)),
            Ok(page(250, false, 200..250)),
        ]);
        let slice = fetch_slice(&transport, "q", &NoopProgress).await.unwrap();
        assert_eq!(transport.calls(), 3);
        assert_eq!(slice.items.len(), 250);
        assert!(slice.incomplete);
    }

    #[tokio::test]
    async fn test_quota_exhaustion_mid_slice_is_an_error() {
        let mut exhausted = page(300, false, 0..100);
        exhausted.rate_limit = snapshot(0, 30);
        let transport = ScriptedTransport::new(vec![Ok(exhausted)]);
        let err = fetch_slice(&transport, "q", &NoopProgress).await.unwrap_err();
        assert!(matches!(err, EngineError::RateLimited { .. }));
        // no further pages were attempted
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_page_failure_aborts_slice() {
        let transport = ScriptedTransport::new(vec![
            Ok(page(300, false, 0..100)),
            Err(EngineError::UpstreamError { status: 502 }),
        ]);
        let err = fetch_slice(&transport, "q", &NoopProgress).await.unwrap_err();
        assert!(matches!(err, EngineError::UpstreamError { status: 502 }));
    }

    #[tokio::test]
    async fn test_stops_early_on_empty_page() {
        // total_count promised 250 but the service ran dry after 100.
        let transport = ScriptedTransport::new(vec![
            Ok(page(250, false, 0..100)),
            Ok(page(250, false, 0..0)),
        ]);
        let slice = fetch_slice(&transport, "q", &NoopProgress).await.unwrap();
        assert_eq!(slice.items.len(), 100);
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_fetch_count_uses_one_minimal_request() {
        let transport = ScriptedTransport::new(vec![Ok(page(40, false, 0..1))]);
        let count = fetch_count(&transport, "q").await.unwrap();
        assert_eq!(count.total_count, 40);
        assert_eq!(transport.calls(), 1);
    }
}
