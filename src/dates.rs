//! Parses the date expressions accepted by `--since`/`--before`, plus
//! `--days N` resolution to a `since` bound. Accepts ISO-8601 and a small
//! set of natural-language forms.

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate, Utc};

const ACCEPTED_FORMS: &str = "an ISO-8601 date/datetime, 'today', 'yesterday', 'N days ago', or 'N weeks ago'";

/// Parses a date expression into an ISO-8601 date string comparable against
/// the lexical timestamps stored in `messages.timestamp`/`sessions.start_time`.
pub fn parse_date_expr(input: &str) -> Result<String> {
    let trimmed = input.trim();

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_hms_opt(0, 0, 0).unwrap().format("%Y-%m-%dT%H:%M:%SZ").to_string());
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.to_rfc3339());
    }

    let lower = trimmed.to_lowercase();
    let today = Utc::now().date_naive();

    if lower == "today" {
        return Ok(start_of_day(today));
    }
    if lower == "yesterday" {
        return Ok(start_of_day(today - Duration::days(1)));
    }
    if let Some(days) = parse_relative(&lower, "days ago") {
        return Ok(start_of_day(today - Duration::days(days)));
    }
    if let Some(weeks) = parse_relative(&lower, "weeks ago") {
        return Ok(start_of_day(today - Duration::weeks(weeks)));
    }

    bail!("invalid date '{input}': expected {ACCEPTED_FORMS}")
}

/// Resolves `--days N` to a `since` bound: `start_of_today - (N-1) days`.
pub fn days_to_since(n: i64) -> String {
    let today = Utc::now().date_naive();
    start_of_day(today - Duration::days(n.saturating_sub(1).max(0)))
}

fn start_of_day(date: NaiveDate) -> String {
    date.and_hms_opt(0, 0, 0).unwrap().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn parse_relative(input: &str, suffix: &str) -> Option<i64> {
    let n_str = input.strip_suffix(suffix)?.trim();
    n_str.parse::<i64>().ok()
}
