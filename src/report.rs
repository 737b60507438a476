use chrono::NaiveDate;
use colored::Colorize;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::coordinator::SearchRequest;
use crate::github::rate_limit::{AuthTier, RateLimitBand, RateLimitSnapshot};
use crate::stats::{format_hours, ComparisonStats, RepoStats, ResponseTimeStats};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("Failed to write report file: {0}")]
    FileWrite(#[from] std::io::Error),
}

/// Results object plus the request context it answers.
#[derive(Debug)]
pub struct Report {
    pub repo_label: String,
    pub agent_login: String,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub stats: RepoStats,
}

pub fn build(stats: RepoStats, request: &SearchRequest) -> Report {
    Report {
        repo_label: format!("{}/{}", request.owner, request.repo),
        agent_login: request.agent_login.clone(),
        from: request.from,
        to: request.to,
        stats,
    }
}

/// Output the report to terminal (default) or to a markdown file.
#[instrument(skip(report), fields(repo = %report.repo_label))]
pub fn output(report: &Report, output_path: Option<&Path>) -> Result<(), ReportError> {
    match output_path {
        None => {
            debug!("writing report to terminal");
            print_terminal_report(report);
            Ok(())
        }
        Some(path) => {
            debug!(path = %path.display(), "writing report to file");
            write_markdown_report(report, path)
        }
    }
}

/// Ratio line per category. An unknown denominator is shown as an explicit
/// placeholder, never a fabricated zero or percentage.
fn ratio(agent: u64, all: Option<u64>) -> String {
    match all {
        Some(all) => format!("{agent} of {all}"),
        None => format!("{agent} of ? (repo-wide count unknown)"),
    }
}

fn print_terminal_report(report: &Report) {
    let stats = &report.stats;
    println!();
    println!(
        "{} for {} ({}..{})",
        "Agent PR report".bold(),
        report.repo_label,
        report.from,
        report.to
    );
    println!(
        "Agent: {} | {} PRs in window{}",
        report.agent_login,
        stats.counts.total,
        if stats.from_cache { " | from cache" } else { "" }
    );
    println!();

    let (all_total, all_merged, all_open, all_closed) = match &stats.all_counts {
        Some(all) => (all.total, all.merged, all.open, all.closed()),
        None => (None, None, None, None),
    };
    println!("═══ Counts ═══");
    println!("  Total:  {}", ratio(stats.counts.total, all_total));
    println!("  Merged: {}", ratio(stats.counts.merged, all_merged));
    println!("  Open:   {}", ratio(stats.counts.open, all_open));
    println!(
        "  Closed (not merged): {}",
        ratio(stats.counts.closed_not_merged, all_closed)
    );
    println!(
        "  Merge rate: {}",
        format!("{}%", stats.merge_rate_percent).bold()
    );
    println!();

    if let Some(times) = &stats.response_times {
        println!("═══ Response times (merged PRs) ═══");
        print!("{}", response_time_block(times, "  "));
        println!();
    }

    if let Some(cmp) = &stats.comparison {
        println!("═══ Agent vs. other authors ═══");
        println!(
            "  {} agent-merged vs {} other merged PRs{}",
            stats.counts.merged,
            cmp.others_count,
            if cmp.is_partial {
                format!(" (times from a sample of {})", cmp.others_sample_size)
            } else {
                String::new()
            }
        );
        if let Some(agent) = &cmp.agent {
            println!(
                "  agent:  median {} | average {}",
                format_hours(agent.median_hours),
                format_hours(agent.average_hours)
            );
        }
        if let Some(others) = &cmp.others {
            println!(
                "  others: median {} | average {}",
                format_hours(others.median_hours),
                format_hours(others.average_hours)
            );
        }
        println!();
    }

    if !stats.items.is_empty() {
        println!("═══ Recent agent PRs ═══");
        for item in stats.items.iter().take(MAX_LISTED_PRS) {
            println!("  {}", pr_line(item));
        }
        if stats.items.len() > MAX_LISTED_PRS {
            println!("  … and {} more", stats.items.len() - MAX_LISTED_PRS);
        }
        println!();
    }

    for warning in &stats.warnings {
        println!("{} {}", "⚠".yellow().bold(), warning);
    }
    if !stats.warnings.is_empty() {
        println!();
    }

    if let Some(rate_limit) = &stats.rate_limit {
        println!("{}", rate_limit_line(rate_limit));
    }
    println!();
}

const MAX_LISTED_PRS: usize = 10;

/// One listing line. The number is hidden when the payload carried a
/// non-positive one, and the URL only appears if it validated.
fn pr_line(item: &crate::github::types::PullRequestRecord) -> String {
    let number = item
        .display_number()
        .map(|n| format!("#{n} "))
        .unwrap_or_default();
    let title = item.title.as_deref().unwrap_or("(untitled)");
    let status = match item.status() {
        crate::github::types::PrStatus::Merged => "merged",
        crate::github::types::PrStatus::ClosedNotMerged => "closed",
        crate::github::types::PrStatus::Open => "open",
    };
    let url = item
        .display_url()
        .map(|u| format!(" {u}"))
        .unwrap_or_default();
    format!("{number}{title} [{status}]{url}")
}

fn response_time_block(times: &ResponseTimeStats, indent: &str) -> String {
    let mut block = format!(
        "{indent}average {} | median {} | fastest {} | slowest {}\n",
        format_hours(times.average_hours),
        format_hours(times.median_hours),
        format_hours(times.fastest_hours),
        format_hours(times.slowest_hours),
    );
    let max = times.histogram.iter().map(|b| b.count).max().unwrap_or(0);
    if max > 0 {
        for bucket in &times.histogram {
            let bar_len = (bucket.count * 24 / max) as usize;
            block.push_str(&format!(
                "{indent}{:>6} {:<24} {}\n",
                bucket.label,
                "█".repeat(bar_len),
                bucket.count
            ));
        }
    }
    block
}

fn rate_limit_line(snapshot: &RateLimitSnapshot) -> String {
    let quota = match (snapshot.remaining, snapshot.limit) {
        (Some(remaining), Some(limit)) => format!("{remaining}/{limit} remaining"),
        _ => "quota unknown".to_string(),
    };
    let band = match snapshot.band() {
        RateLimitBand::Low => "low".red().bold().to_string(),
        RateLimitBand::Warning => "warning".yellow().to_string(),
        RateLimitBand::Normal => "normal".green().to_string(),
        RateLimitBand::Unknown => "unknown".to_string(),
    };
    let tier = match snapshot.auth_tier() {
        AuthTier::Unauthenticated => ", unauthenticated",
        AuthTier::Authenticated => ", authenticated",
        AuthTier::Unknown => "",
    };
    let reset = snapshot
        .reset_at
        .map(|t| format!(", resets at {}", t.format("%H:%M:%S UTC")))
        .unwrap_or_default();
    format!("Rate limit: {quota} ({band}{tier}){reset}")
}

fn write_markdown_report(report: &Report, path: &Path) -> Result<(), ReportError> {
    let stats = &report.stats;
    let mut md = String::new();
    md.push_str(&format!(
        "# Agent PR report for {} ({}..{})\n\n",
        report.repo_label, report.from, report.to
    ));
    md.push_str(&format!(
        "**Agent:** {} | **PRs in window:** {}{}\n\n",
        report.agent_login,
        stats.counts.total,
        if stats.from_cache { " | _from cache_" } else { "" }
    ));

    let (all_total, all_merged, all_open, all_closed) = match &stats.all_counts {
        Some(all) => (all.total, all.merged, all.open, all.closed()),
        None => (None, None, None, None),
    };
    md.push_str("## Counts\n\n");
    md.push_str(&format!("- Total: {}\n", ratio(stats.counts.total, all_total)));
    md.push_str(&format!("- Merged: {}\n", ratio(stats.counts.merged, all_merged)));
    md.push_str(&format!("- Open: {}\n", ratio(stats.counts.open, all_open)));
    md.push_str(&format!(
        "- Closed (not merged): {}\n",
        ratio(stats.counts.closed_not_merged, all_closed)
    ));
    md.push_str(&format!("- Merge rate: **{}%**\n\n", stats.merge_rate_percent));

    if let Some(times) = &stats.response_times {
        md.push_str("## Response times (merged PRs)\n\n");
        md.push_str(&format!(
            "average {} | median {} | fastest {} | slowest {}\n\n",
            format_hours(times.average_hours),
            format_hours(times.median_hours),
            format_hours(times.fastest_hours),
            format_hours(times.slowest_hours),
        ));
        md.push_str("| Bucket | Count |\n|---|---|\n");
        for bucket in &times.histogram {
            md.push_str(&format!("| {} | {} |\n", bucket.label, bucket.count));
        }
        md.push('\n');
    }

    if let Some(cmp) = &stats.comparison {
        md.push_str("## Agent vs. other authors\n\n");
        md.push_str(&format!(
            "{} agent-merged vs {} other merged PRs{}\n\n",
            stats.counts.merged,
            cmp.others_count,
            if cmp.is_partial {
                format!(" (times from a sample of {})", cmp.others_sample_size)
            } else {
                String::new()
            }
        ));
        md.push_str(&comparison_markdown(cmp));
    }

    if !stats.items.is_empty() {
        md.push_str("## Recent agent PRs\n\n");
        for item in stats.items.iter().take(MAX_LISTED_PRS) {
            md.push_str(&format!("- {}\n", pr_line(item)));
        }
        if stats.items.len() > MAX_LISTED_PRS {
            md.push_str(&format!(
                "- … and {} more\n",
                stats.items.len() - MAX_LISTED_PRS
            ));
        }
        md.push('\n');
    }

    if !stats.warnings.is_empty() {
        md.push_str("## Warnings\n\n");
        for warning in &stats.warnings {
            md.push_str(&format!("- {warning}\n"));
        }
        md.push('\n');
    }

    if let Some(rate_limit) = &stats.rate_limit {
        md.push_str(&format!(
            "_{}_\n",
            strip_ansi(&rate_limit_line(rate_limit))
        ));
    }

    std::fs::write(path, md)?;
    Ok(())
}

fn comparison_markdown(cmp: &ComparisonStats) -> String {
    let mut md = String::new();
    let row = |who: &str, times: &Option<ResponseTimeStats>| match times {
        Some(t) => format!(
            "| {who} | {} | {} |\n",
            format_hours(t.median_hours),
            format_hours(t.average_hours)
        ),
        None => format!("| {who} | - | - |\n"),
    };
    md.push_str("| Author set | Median | Average |\n|---|---|---|\n");
    md.push_str(&row("agent", &cmp.agent));
    md.push_str(&row("others", &cmp.others));
    md.push('\n');
    md
}

/// colored leaves escape codes in the string; the markdown file should not
/// carry them.
fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}
