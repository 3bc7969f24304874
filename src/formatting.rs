//! Human-readable and JSON rendering of command output. Follows the
//! four-mode contract (default/json/quiet/verbose) and TTY-aware color
//! handling, grounded on the sibling CLI example's `io::stdout().is_terminal()`
//! gate composed with the `NO_COLOR`/`FORCE_COLOR` environment convention.

use chrono::{DateTime, Utc};
use is_terminal::IsTerminal;
use std::io;

use crate::search::SearchResult;
use crate::stats::Stats;
use crate::storage::SessionRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Default,
    Json,
    Quiet,
    Verbose,
}

impl OutputMode {
    pub fn from_flags(json: bool, quiet: bool, verbose: bool) -> Self {
        if json {
            OutputMode::Json
        } else if quiet {
            OutputMode::Quiet
        } else if verbose {
            OutputMode::Verbose
        } else {
            OutputMode::Default
        }
    }
}

/// Decides whether ANSI color should be emitted: `FORCE_COLOR` wins over
/// `NO_COLOR`, which wins over TTY detection.
pub fn color_enabled() -> bool {
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    io::stdout().is_terminal()
}

/// Renders an ISO-8601 timestamp as `"2 days ago (YYYY-MM-DD HH:MM)"` for
/// default-mode display. Falls back to the raw string if it isn't
/// parseable RFC-3339 (session data from an unexpected source, say).
fn render_relative_timestamp(timestamp: &str) -> String {
    let Ok(parsed) = DateTime::parse_from_rfc3339(timestamp) else {
        return timestamp.to_string();
    };
    let ts = parsed.with_timezone(&Utc);
    let relative = describe_age(Utc::now().signed_duration_since(ts));
    format!("{relative} ({})", ts.format("%Y-%m-%d %H:%M"))
}

fn describe_age(duration: chrono::Duration) -> String {
    let seconds = duration.num_seconds().max(0);
    if seconds < 60 {
        return "just now".to_string();
    }
    let minutes = seconds / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = hours / 24;
    if days == 1 {
        "1 day ago".to_string()
    } else {
        format!("{days} days ago")
    }
}

const BOLD_CYAN: &str = "\x1b[1;36m";
const RESET: &str = "\x1b[0m";

/// Replaces `<mark>…</mark>` with bold-cyan ANSI escapes when `color` is
/// true, or strips the markers entirely otherwise.
pub fn render_snippet(snippet: &str, color: bool) -> String {
    if color {
        snippet.replace("<mark>", BOLD_CYAN).replace("</mark>", RESET)
    } else {
        snippet.replace("<mark>", "").replace("</mark>", "")
    }
}

pub fn render_search_results(results: &[SearchResult], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json_pretty(&results.iter().map(SearchResultJson::from).collect::<Vec<_>>()),
        OutputMode::Quiet => format!("Results: {}\n", results.len()),
        OutputMode::Verbose => {
            let mut out = String::new();
            for r in results {
                out.push_str(&format!(
                    "[{}] session={} score={:.3}\n{}\n\n",
                    r.timestamp, r.session_id, r.score, r.snippet
                ));
            }
            out.push_str(&format!("{} result(s)\n", results.len()));
            out
        }
        OutputMode::Default => {
            let color = color_enabled();
            let mut out = String::new();
            for r in results {
                out.push_str(&format!(
                    "{}  session {}  (score {:.2})\n",
                    render_relative_timestamp(&r.timestamp), r.session_id, r.score
                ));
                out.push_str(&render_snippet(&r.snippet, color));
                out.push_str("\n\n");
            }
            out.push_str(&format!("{} result(s)\n", results.len()));
            out
        }
    }
}

pub fn render_session_list(sessions: &[SessionRow], mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json_pretty(sessions),
        OutputMode::Quiet => format!("Sessions: {}\n", sessions.len()),
        _ => {
            let mut out = String::new();
            for s in sessions {
                out.push_str(&format!(
                    "{}  {}  {} ({} messages)\n",
                    render_relative_timestamp(&s.start_time), s.project_name, s.id, s.message_count
                ));
                if mode == OutputMode::Verbose {
                    if let Some(summary) = &s.summary {
                        out.push_str(&format!("    {summary}\n"));
                    }
                }
            }
            out.push_str(&format!("{} session(s)\n", sessions.len()));
            out
        }
    }
}

pub fn render_stats(stats: &Stats, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => serde_json_pretty(stats),
        OutputMode::Quiet => format!(
            "Sessions: {}\nMessages: {}\nToolUses: {}\n",
            stats.total_sessions, stats.total_messages, stats.total_tool_uses
        ),
        _ => {
            let mut out = String::new();
            out.push_str(&format!("Sessions:   {}\n", stats.total_sessions));
            out.push_str(&format!("Messages:   {}\n", stats.total_messages));
            out.push_str(&format!("Tool uses:  {}\n", stats.total_tool_uses));
            if let (Some(first), Some(last)) = (&stats.first_session_start, &stats.last_session_start) {
                out.push_str(&format!("Span:       {first} .. {last}\n"));
            }
            out.push_str("\nTop projects:\n");
            for p in &stats.top_projects {
                out.push_str(&format!(
                    "  {:<30} {:>5} sessions  {:>6} messages\n",
                    p.project_name, p.session_count, p.message_count
                ));
            }
            out
        }
    }
}

#[derive(serde::Serialize)]
struct SearchResultJson {
    session_id: String,
    message_id: String,
    snippet: String,
    score: f64,
    timestamp: String,
}

impl From<&SearchResult> for SearchResultJson {
    fn from(r: &SearchResult) -> Self {
        SearchResultJson {
            session_id: r.session_id.clone(),
            message_id: r.message_id.clone(),
            snippet: r.snippet.clone(),
            score: r.score,
            timestamp: r.timestamp.clone(),
        }
    }
}

fn serde_json_pretty<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_from_flags_prioritizes_json() {
        assert_eq!(OutputMode::from_flags(true, true, true), OutputMode::Json);
        assert_eq!(OutputMode::from_flags(false, true, false), OutputMode::Quiet);
        assert_eq!(OutputMode::from_flags(false, false, true), OutputMode::Verbose);
        assert_eq!(OutputMode::from_flags(false, false, false), OutputMode::Default);
    }

    #[test]
    fn render_snippet_strips_markers_without_color() {
        assert_eq!(render_snippet("a <mark>b</mark> c", false), "a b c");
    }

    #[test]
    fn render_snippet_colors_markers() {
        let rendered = render_snippet("<mark>hi</mark>", true);
        assert!(rendered.contains("hi"));
        assert!(rendered.contains('\x1b'));
    }

    #[test]
    fn quiet_stats_are_self_labelling() {
        let stats = Stats { total_sessions: 948, total_messages: 68083, ..Default::default() };
        let rendered = render_stats(&stats, OutputMode::Quiet);
        assert!(rendered.contains("Sessions: 948"));
        assert!(rendered.contains("Messages: 68083"));
    }

    #[test]
    fn relative_timestamp_pairs_age_with_absolute_form() {
        let rendered = render_relative_timestamp("2000-01-01T00:00:00Z");
        assert!(rendered.ends_with("(2000-01-01 00:00)"));
        assert!(rendered.contains("days ago"));
    }

    #[test]
    fn relative_timestamp_falls_back_to_raw_on_parse_failure() {
        assert_eq!(render_relative_timestamp("not-a-timestamp"), "not-a-timestamp");
    }

    #[test]
    fn search_results_default_mode_uses_relative_timestamps() {
        let results = vec![SearchResult {
            session_id: "s1".to_string(),
            message_id: "m1".to_string(),
            snippet: "hi".to_string(),
            score: 1.0,
            timestamp: "2000-01-01T00:00:00Z".to_string(),
        }];
        let rendered = render_search_results(&results, OutputMode::Default);
        assert!(rendered.contains("days ago"));
    }
}
