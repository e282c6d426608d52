//! Library overview and display helpers shared by the CLI.
//!
//! `bookrag stats` prints totals for books, pages, characters, conversation
//! turns and summaries, followed by the largest books.

use std::path::Path;

use crate::catalog::LibraryStats;

/// Print a library overview.
pub fn print_stats(stats: &LibraryStats, db_path: &Path) {
    let db_size = std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0);

    println!("Book Library — Stats");
    println!("====================");
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Books:       {}", stats.books);
    println!("  Pages:       {}", stats.pages);
    println!("  Characters:  {}", stats.total_chars);
    println!("  Questions:   {}", stats.chat_turns);
    println!("  Summaries:   {}", stats.summaries);

    if !stats.largest.is_empty() {
        println!();
        println!("  Largest books:");
        println!(
            "  {:>5}  {:<36} {:>6} {:>10}   {}",
            "ID", "TITLE", "PAGES", "CHARS", "LAST ACCESS"
        );
        println!("  {}", "-".repeat(76));
        for b in &stats.largest {
            println!(
                "  {:>5}  {:<36} {:>6} {:>10}   {}",
                b.id,
                truncate(&b.title, 36),
                b.pages,
                b.total_chars,
                format_ts_relative(b.last_accessed)
            );
        }
    }
    println!();
}

/// Cut `s` to at most `max` characters, marking the cut with `…`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

/// Format a byte count as a human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
pub fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;

    if delta < 0 {
        format_ts_iso(ts)
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        plural(delta / 60, "min")
    } else if delta < 86400 {
        plural(delta / 3600, "hour")
    } else if delta < 86400 * 30 {
        plural(delta / 86400, "day")
    } else {
        format_ts_iso(ts)
    }
}

fn plural(n: i64, unit: &str) -> String {
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
