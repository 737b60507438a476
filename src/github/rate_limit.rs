use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Quota ceiling the search API applies to tokenless requests.
pub const UNAUTHENTICATED_SEARCH_LIMIT: u64 = 10;

/// How much quota headroom is left in the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBand {
    /// At most 10% of the quota remains
    Low,
    /// Less than 50% remains
    Warning,
    Normal,
    /// Headers were missing or unparsable; never treated as Low
    Unknown,
}

impl std::fmt::Display for RateLimitBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RateLimitBand::Low => write!(f, "low"),
            RateLimitBand::Warning => write!(f, "warning"),
            RateLimitBand::Normal => write!(f, "normal"),
            RateLimitBand::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which quota tier the service applied. 10 and 30 per minute are the two
/// known ceilings for the search endpoint; 10 means no token was used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthTier {
    Unauthenticated,
    Authenticated,
    Unknown,
}

/// Rate-limit metadata parsed from one response's headers. Any missing or
/// non-numeric field degrades to None; parsing never fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitSnapshot {
    pub limit: Option<u64>,
    pub remaining: Option<u64>,
    pub reset_at: Option<DateTime<Utc>>,
    pub used: Option<u64>,
    pub resource: Option<String>,
}

impl RateLimitSnapshot {
    /// Parse the X-RateLimit-* headers from a lowercased header map.
    pub fn from_headers(headers: &HashMap<String, String>) -> Self {
        let numeric = |name: &str| headers.get(name).and_then(|v| v.trim().parse::<u64>().ok());
        let reset_at = numeric("x-ratelimit-reset")
            .and_then(|secs| Utc.timestamp_opt(secs as i64, 0).single());
        RateLimitSnapshot {
            limit: numeric("x-ratelimit-limit"),
            remaining: numeric("x-ratelimit-remaining"),
            reset_at,
            used: numeric("x-ratelimit-used"),
            resource: headers.get("x-ratelimit-resource").cloned(),
        }
    }

    pub fn band(&self) -> RateLimitBand {
        match (self.remaining, self.limit) {
            (Some(remaining), Some(limit)) if limit > 0 => {
                let ratio = remaining as f64 / limit as f64;
                if ratio <= 0.1 {
                    RateLimitBand::Low
                } else if ratio < 0.5 {
                    RateLimitBand::Warning
                } else {
                    RateLimitBand::Normal
                }
            }
            _ => RateLimitBand::Unknown,
        }
    }

    pub fn auth_tier(&self) -> AuthTier {
        match self.limit {
            Some(UNAUTHENTICATED_SEARCH_LIMIT) => AuthTier::Unauthenticated,
            Some(_) => AuthTier::Authenticated,
            None => AuthTier::Unknown,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining == Some(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn snapshot(remaining: u64, limit: u64) -> RateLimitSnapshot {
        RateLimitSnapshot::from_headers(&headers(&[
            ("x-ratelimit-remaining", &remaining.to_string()),
            ("x-ratelimit-limit", &limit.to_string()),
        ]))
    }

    #[test]
    fn test_band_thresholds() {
        assert_eq!(snapshot(500, 5000).band(), RateLimitBand::Low);
        assert_eq!(snapshot(1500, 5000).band(), RateLimitBand::Warning);
        assert_eq!(snapshot(4990, 5000).band(), RateLimitBand::Normal);
    }

    #[test]
    fn test_band_boundaries_are_inclusive_low_exclusive_warning() {
        // exactly a tenth left is Low, one past it is Warning
        assert_eq!(snapshot(3, 30).band(), RateLimitBand::Low);
        assert_eq!(snapshot(4, 30).band(), RateLimitBand::Warning);
        // exactly half left is Normal
        assert_eq!(snapshot(15, 30).band(), RateLimitBand::Normal);
        assert_eq!(snapshot(14, 30).band(), RateLimitBand::Warning);
    }

    #[test]
    fn test_missing_headers_are_unknown_not_low() {
        let snap = RateLimitSnapshot::from_headers(&headers(&[]));
        assert_eq!(snap.band(), RateLimitBand::Unknown);
        assert_eq!(snap.auth_tier(), AuthTier::Unknown);
        assert!(!snap.is_exhausted());
    }

    #[test]
    fn test_non_numeric_fields_degrade_to_none() {
        let snap = RateLimitSnapshot::from_headers(&headers(&[
            ("x-ratelimit-limit", "banana"),
            ("x-ratelimit-remaining", "12"),
            ("x-ratelimit-reset", "not-a-timestamp"),
        ]));
        assert_eq!(snap.limit, None);
        assert_eq!(snap.remaining, Some(12));
        assert_eq!(snap.reset_at, None);
        assert_eq!(snap.band(), RateLimitBand::Unknown);
    }

    #[test]
    fn test_auth_tier_from_limit() {
        assert_eq!(snapshot(9, 10).auth_tier(), AuthTier::Unauthenticated);
        assert_eq!(snapshot(29, 30).auth_tier(), AuthTier::Authenticated);
        assert_eq!(snapshot(4000, 5000).auth_tier(), AuthTier::Authenticated);
    }

    #[test]
    fn test_reset_parses_epoch_seconds() {
        let snap = RateLimitSnapshot::from_headers(&headers(&[(
            "x-ratelimit-reset",
            "1700000000",
        )]));
        assert_eq!(
            snap.reset_at,
            Utc.timestamp_opt(1_700_000_000, 0).single()
        );
    }

    #[test]
    fn test_exhausted() {
        assert!(snapshot(0, 30).is_exhausted());
        assert!(!snapshot(1, 30).is_exhausted());
    }
}
