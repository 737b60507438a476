pub mod fetch;
pub mod query;
pub mod rate_limit;
pub mod types;

pub use fetch::{PageResponse, SearchTransport, MAX_RECORDS};
pub use query::{build_query, QuerySlice};
pub use rate_limit::RateLimitSnapshot;
use types::RawSearchPage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, instrument};

const SEARCH_URL: &str = "https://api.github.com/search/issues";
const USER_AGENT: &str = "agent-stats";

/// Engine-wide error taxonomy. Every variant's message names the condition
/// and, where actionable, a remedy; raw transport detail stays out of it.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("repository not found; check the OWNER/REPO spelling")]
    NotFound,

    #[error("authentication failed; the token was rejected, use a different token")]
    AuthFailed,

    #[error("rate limited by the search API{}", reset_hint(.reset_at))]
    RateLimited { reset_at: Option<DateTime<Utc>> },

    #[error("access forbidden; the token may lack permission for this repository")]
    Forbidden,

    #[error("the search service rejected the query; the repository may not be searchable")]
    ValidationRejected,

    #[error("the search service failed upstream (HTTP {status}); try again later")]
    UpstreamError { status: u16 },

    #[error("network failure talking to the search service: {0}")]
    NetworkFailure(#[from] reqwest::Error),

    #[error(
        "the agent-authored result set has {total_count} matches, more than the {} the search API can page through; narrow the date range",
        MAX_RECORDS
    )]
    ResultsTruncated { total_count: u64 },

    #[error("superseded by a newer search")]
    Superseded,
}

fn reset_hint(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(t) => format!("; quota resets at {}", t.format("%Y-%m-%d %H:%M:%S UTC")),
        None => "; wait a minute and retry".to_string(),
    }
}

/// Map a non-success HTTP status to the taxonomy. 403 is ambiguous upstream:
/// it means rate-limited only when the quota headers say zero remains.
pub fn classify_status(status: u16, rate_limit: &RateLimitSnapshot) -> EngineError {
    match status {
        401 => EngineError::AuthFailed,
        403 if rate_limit.is_exhausted() => EngineError::RateLimited {
            reset_at: rate_limit.reset_at,
        },
        403 => EngineError::Forbidden,
        404 => EngineError::NotFound,
        422 => EngineError::ValidationRejected,
        status => EngineError::UpstreamError { status },
    }
}

/// Owner/repo pair, whitespace-trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub repo: String,
}

/// Parse an "owner/repo" argument. Rejects anything that is not exactly two
/// non-empty segments of GitHub-legal name characters.
pub fn parse_repo_ref(input: &str) -> Result<RepoRef, EngineError> {
    let trimmed = input.trim();
    let invalid = || EngineError::InvalidInput(format!("expected OWNER/REPO, got \"{input}\""));

    let (owner, repo) = trimmed.split_once('/').ok_or_else(invalid)?;
    let owner = owner.trim();
    let repo = repo.trim();

    let legal = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    };
    if !legal(owner) || !legal(repo) {
        return Err(invalid());
    }

    Ok(RepoRef {
        owner: owner.to_string(),
        repo: repo.to_string(),
    })
}

/// Production transport: the GitHub search endpoint over reqwest.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    http: reqwest::Client,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(token: Option<String>) -> Self {
        GitHubClient {
            http: reqwest::Client::new(),
            token,
        }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }
}

#[async_trait]
impl SearchTransport for GitHubClient {
    #[instrument(skip(self, query))]
    async fn search_page(
        &self,
        query: &str,
        page: u32,
        per_page: u32,
    ) -> Result<PageResponse, EngineError> {
        let mut request = self
            .http
            .get(SEARCH_URL)
            .query(&[
                ("q", query.to_string()),
                ("page", page.to_string()),
                ("per_page", per_page.to_string()),
            ])
            .header("User-Agent", USER_AGENT)
            .header("Accept", "application/vnd.github+json");
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let rate_limit = RateLimitSnapshot::from_headers(&header_map(response.headers()));

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "search request failed");
            return Err(classify_status(status.as_u16(), &rate_limit));
        }

        let raw: RawSearchPage = response.json().await?;
        debug!(
            total_count = raw.total_count,
            items = raw.items.len(),
            incomplete = raw.incomplete_results,
            "received search page"
        );
        Ok(PageResponse {
            page: raw.into(),
            rate_limit,
        })
    }
}

fn header_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_snapshot() -> RateLimitSnapshot {
        RateLimitSnapshot::from_headers(&HashMap::new())
    }

    fn exhausted_snapshot() -> RateLimitSnapshot {
        let headers: HashMap<String, String> = [
            ("x-ratelimit-remaining".to_string(), "0".to_string()),
            ("x-ratelimit-limit".to_string(), "30".to_string()),
            ("x-ratelimit-reset".to_string(), "1700000000".to_string()),
        ]
        .into_iter()
        .collect();
        RateLimitSnapshot::from_headers(&headers)
    }

    #[test]
    fn test_parse_valid_repo_ref() {
        let r = parse_repo_ref("rust-lang/cargo").unwrap();
        assert_eq!(r.owner, "rust-lang");
        assert_eq!(r.repo, "cargo");

        // leading/trailing whitespace is normalized away
        let r = parse_repo_ref("  org/repo.name  ").unwrap();
        assert_eq!(r.owner, "org");
        assert_eq!(r.repo, "repo.name");
    }

    #[test]
    fn test_parse_invalid_repo_ref() {
        assert!(parse_repo_ref("no-slash").is_err());
        assert!(parse_repo_ref("/repo").is_err());
        assert!(parse_repo_ref("owner/").is_err());
        assert!(parse_repo_ref("a/b/c").is_err());
        assert!(parse_repo_ref("ow ner/repo").is_err());
    }

    #[test]
    fn test_classify_status_basic() {
        assert!(matches!(
            classify_status(401, &empty_snapshot()),
            EngineError::AuthFailed
        ));
        assert!(matches!(
            classify_status(404, &empty_snapshot()),
            EngineError::NotFound
        ));
        assert!(matches!(
            classify_status(422, &empty_snapshot()),
            EngineError::ValidationRejected
        ));
        assert!(matches!(
            classify_status(503, &empty_snapshot()),
            EngineError::UpstreamError { status: 503 }
        ));
    }

    #[test]
    fn test_classify_403_depends_on_remaining_quota() {
        assert!(matches!(
            classify_status(403, &exhausted_snapshot()),
            EngineError::RateLimited { reset_at: Some(_) }
        ));
        // 403 with quota left is a permission problem, not a rate limit
        assert!(matches!(
            classify_status(403, &empty_snapshot()),
            EngineError::Forbidden
        ));
    }

    #[test]
    fn test_error_messages_carry_remedies() {
        let err = EngineError::ResultsTruncated { total_count: 1500 };
        let msg = err.to_string();
        assert!(msg.contains("1500"));
        assert!(msg.contains("narrow the date range"));

        let err = EngineError::RateLimited { reset_at: None };
        assert!(err.to_string().contains("retry"));
    }
}
