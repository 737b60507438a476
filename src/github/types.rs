use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Nominal open/closed state reported by the search service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
}

/// One pull request as returned by the search API.
/// Immutable after deserialization; the aggregation pass consumes records as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    /// Stable identity
    pub id: u64,
    /// Display identity. May be zero or negative in a malformed payload;
    /// `display_number()` hides it, it is never treated as absent.
    pub number: i64,
    /// PR title, may be missing upstream
    pub title: Option<String>,
    /// Author's login, nullable upstream (deleted accounts)
    pub author_login: Option<String>,
    /// Nominal state as reported
    pub state: PrState,
    /// Creation timestamp, always present
    pub created_at: DateTime<Utc>,
    /// Merge timestamp; non-null means merged regardless of `state`
    pub merged_at: Option<DateTime<Utc>>,
    /// Web URL, validated before display
    pub url: Option<String>,
}

/// Derived lifecycle status. A non-null `merged_at` always wins, even when
/// the nominal state still says open (the upstream payload can be
/// inconsistent about this).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrStatus {
    Merged,
    ClosedNotMerged,
    Open,
}

impl PullRequestRecord {
    pub fn status(&self) -> PrStatus {
        if self.merged_at.is_some() {
            PrStatus::Merged
        } else if self.state == PrState::Closed {
            PrStatus::ClosedNotMerged
        } else {
            PrStatus::Open
        }
    }

    /// PR number for display, or None when the payload carried a
    /// non-positive number.
    pub fn display_number(&self) -> Option<i64> {
        (self.number > 0).then_some(self.number)
    }

    /// Web URL for display, only if it is a well-formed https github.com link.
    pub fn display_url(&self) -> Option<&str> {
        let raw = self.url.as_deref()?;
        let parsed = reqwest::Url::parse(raw).ok()?;
        (parsed.scheme() == "https" && parsed.host_str() == Some("github.com")).then_some(raw)
    }

    /// Login comparison is case-insensitive, matching how GitHub treats logins.
    pub fn is_authored_by(&self, login: &str) -> bool {
        self.author_login
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case(login))
    }
}

/// One deserialized page: the service's count of the whole result set
/// (not `items.len()`) plus this page's records.
#[derive(Debug, Clone)]
pub struct SearchPage {
    pub total_count: u64,
    /// Upstream could not finish computing the result set in time;
    /// counts derived from this page are unreliable.
    pub incomplete: bool,
    pub items: Vec<PullRequestRecord>,
}

/// Wire shape of one search response page. Every field the service may omit
/// is optional here; nothing downstream of this boundary touches raw JSON.
#[derive(Debug, Deserialize)]
pub struct RawSearchPage {
    pub total_count: u64,
    #[serde(default)]
    pub incomplete_results: bool,
    #[serde(default)]
    pub items: Vec<RawSearchItem>,
}

#[derive(Debug, Deserialize)]
pub struct RawSearchItem {
    pub id: u64,
    pub number: i64,
    pub title: Option<String>,
    pub state: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user: Option<RawUser>,
    pub html_url: Option<String>,
    pub pull_request: Option<RawPullRequestInfo>,
}

#[derive(Debug, Deserialize)]
pub struct RawUser {
    pub login: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawPullRequestInfo {
    pub merged_at: Option<DateTime<Utc>>,
}

impl From<RawSearchItem> for PullRequestRecord {
    fn from(raw: RawSearchItem) -> Self {
        let state = match raw.state.as_deref() {
            Some("closed") => PrState::Closed,
            _ => PrState::Open,
        };
        PullRequestRecord {
            id: raw.id,
            number: raw.number,
            title: raw.title,
            author_login: raw.user.and_then(|u| u.login),
            state,
            created_at: raw.created_at,
            merged_at: raw.pull_request.and_then(|p| p.merged_at),
            url: raw.html_url,
        }
    }
}

impl From<RawSearchPage> for SearchPage {
    fn from(raw: RawSearchPage) -> Self {
        SearchPage {
            total_count: raw.total_count,
            incomplete: raw.incomplete_results,
            items: raw.items.into_iter().map(Into::into).collect(),
        }
    }
}
