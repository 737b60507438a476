use chrono::NaiveDate;

/// One independently fetched subset of the search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuerySlice<'a> {
    /// PRs authored by the agent under analysis
    AgentAuthored { login: &'a str },
    /// Everything in the repo within the window
    AllTotal,
    AllMerged,
    AllOpen,
    /// Exists in the grammar but is never issued by the coordinator;
    /// closed counts are always derived from the other three.
    #[allow(dead_code)]
    AllClosed,
}

/// Compose the search query string for one slice. Pure string assembly;
/// owner/repo shape and date ordering are validated before this is reached.
pub fn build_query(
    owner: &str,
    repo: &str,
    from: NaiveDate,
    to: NaiveDate,
    slice: QuerySlice<'_>,
) -> String {
    let base = format!(
        "repo:{}/{} is:pr created:{}..{}",
        owner,
        repo,
        from.format("%Y-%m-%d"),
        to.format("%Y-%m-%d"),
    );
    match slice {
        QuerySlice::AgentAuthored { login } => format!("{base} author:{login}"),
        QuerySlice::AllTotal => base,
        QuerySlice::AllMerged => format!("{base} is:merged"),
        QuerySlice::AllOpen => format!("{base} is:open"),
        QuerySlice::AllClosed => format!("{base} is:closed is:unmerged"),
    }
}
