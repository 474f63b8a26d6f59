//! Terminal rendering of the review-request list.
//!
//! The table stands in for the original dropdown menu: grouped by
//! repository by default, one line per review request, with a humanized
//! age. Errors render as a single headline line, the way the menu shows a
//! single error item.

use std::io::Write;

use anyhow::Result;
use chrono::Utc;
use chrono_humanize::HumanTime;
use revq::{OutputMode, Profile, QueryResult, ReviewRequest, group_by_repo};

const FALLBACK_WIDTH: usize = 120;
const MIN_TITLE_WIDTH: usize = 16;

fn terminal_width() -> usize {
    terminal_size::terminal_size()
        .map(|(w, _)| w.0 as usize)
        .unwrap_or(FALLBACK_WIDTH)
}

/// Truncates to `max` characters, ellipsis included. UTF-8 safe.
fn truncate_title(title: &str, max: usize) -> String {
    if title.chars().count() <= max {
        return title.to_string();
    }
    let cut: String = title.chars().take(max.saturating_sub(1)).collect();
    format!("{cut}…")
}

fn format_row(request: &ReviewRequest, show_age: bool, title_width: usize) -> String {
    let title = truncate_title(&request.title, title_width);
    let mut row = format!(
        "#{number} [{state}] {title}  {author}",
        number = request.number,
        state = request.state,
        title = title,
        author = request.author.display_format(),
    );
    if show_age {
        // Staleness (time since last activity) is what tells a reviewer
        // which requests are going cold.
        let age = HumanTime::from(-request.staleness(Utc::now()));
        row.push_str(&format!(", {age}"));
    }
    row
}

fn render_normal(
    result: &QueryResult,
    profile: &Profile,
    flat: bool,
    out: &mut impl Write,
) -> Result<()> {
    let count = result.requests.len();
    if count == result.total_fetched {
        writeln!(out, "{count} review requests [{}]", profile.name)?;
    } else {
        writeln!(
            out,
            "{count} of {} review requests [{}]",
            result.total_fetched, profile.name
        )?;
    }

    if result.requests.is_empty() {
        writeln!(out, "nothing awaiting your review")?;
        return Ok(());
    }

    let width = terminal_width();
    let show_age = profile.display.show_age;

    if profile.display.group_by_repo && !flat {
        let title_width = width.saturating_sub(40).max(MIN_TITLE_WIDTH);
        for (repo, members) in group_by_repo(&result.requests) {
            writeln!(out)?;
            writeln!(out, "{repo}")?;
            for request in members {
                writeln!(out, "  {}", format_row(request, show_age, title_width))?;
            }
        }
    } else {
        let title_width = width.saturating_sub(60).max(MIN_TITLE_WIDTH);
        writeln!(out)?;
        for request in &result.requests {
            writeln!(
                out,
                "{repo}{row}",
                repo = request.repo,
                row = format_row(request, show_age, title_width)
            )?;
        }
    }
    Ok(())
}

fn render_quiet(result: &QueryResult, out: &mut impl Write) -> Result<()> {
    for request in &result.requests {
        writeln!(out, "{}#{}", request.repo, request.number)?;
    }
    Ok(())
}

fn render_json(result: &QueryResult, out: &mut impl Write) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, &result.requests)?;
    writeln!(out)?;
    Ok(())
}

/// Writes one refresh result in the requested mode.
pub fn render_results(
    result: &QueryResult,
    profile: &Profile,
    mode: OutputMode,
    flat: bool,
    out: &mut impl Write,
) -> Result<()> {
    match mode {
        OutputMode::Normal => render_normal(result, profile, flat, out),
        OutputMode::Quiet => render_quiet(result, out),
        OutputMode::Json => render_json(result, out),
    }
}

/// Writes the saved profile list, marking the active one.
pub fn render_profile_list(
    profiles: &[Profile],
    active: &str,
    out: &mut impl Write,
) -> Result<()> {
    for profile in profiles {
        let marker = if profile.name == active { "*" } else { " " };
        let statuses: Vec<&str> = profile
            .filters
            .statuses
            .iter()
            .map(|s| s.as_str())
            .collect();
        writeln!(
            out,
            "{marker} {name}  (statuses: {statuses})",
            name = profile.name,
            statuses = statuses.join(", "),
        )?;
    }
    Ok(())
}
