//! Terminal rendering: the live trial table, best result summary, process banner and
//! snapshot comparison table. Everything returns a `String`; printing is up to the caller.

use std::{fmt::Write, time::Duration};

use colored::{ColoredString, Colorize};
use rand::seq::SliceRandom;
use tabled::{settings::Style, Table, Tabled};

use crate::{
    bench::TrialResult,
    compare::{DiffRow, Verdict},
    process::ProcessSnapshot,
    scheduler::TrialReport,
};

/// Compact duration with one decimal: `1.2s`, `12.5ms`, `850.0µs`, `30.0ns`.
pub fn format_duration(d: Duration) -> String {
    let nanos = d.as_nanos() as f64;
    if d >= Duration::from_secs(1) {
        format!("{:.1}s", d.as_secs_f64())
    } else if d >= Duration::from_millis(1) {
        format!("{:.1}ms", nanos / 1e6)
    } else if d >= Duration::from_micros(1) {
        format!("{:.1}µs", nanos / 1e3)
    } else {
        format!("{nanos:.1}ns")
    }
}

/// Decimal (SI) byte size: `512 B`, `1.5 kB`, `12 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];
    if bytes < 1000 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1000.0 && unit < UNITS.len() - 1 {
        value /= 1000.0;
        unit += 1;
    }
    if value < 10.0 {
        format!("{value:.1} {}", UNITS[unit])
    } else {
        format!("{value:.0} {}", UNITS[unit])
    }
}

fn latency_cell(latency: Option<Duration>) -> String {
    latency.map(format_duration).unwrap_or_else(|| "-".to_string())
}

// ============================================================================
// Trial table
// ============================================================================

const TABLE_TOP: &str =
    "┌────┬────────┬────────────┬────────┬────────┬────────┬─────────┬─────────┬─────┬────┬────────┐";
const TABLE_MID: &str =
    "├────┼────────┼────────────┼────────┼────────┼────────┼─────────┼─────────┼─────┼────┼────────┤";
const TABLE_BOTTOM: &str =
    "└────┴────────┴────────────┴────────┴────────┴────────┴─────────┴─────────┴─────┴────┴────────┘";

pub fn trial_table_header() -> String {
    let titles = format!(
        "│{:>4}│{:>8}│{:>12}│{:>8}│{:>8}│{:>8}│{:>9}│{:>9}│{:>5}│{:>4}│{:>8}│",
        "conn", "rps", "latency", "good", "bad", "err", "body req", "body resp", "cpu", "thr", "mem"
    );
    format!(
        "\n{}\n{}\n{}",
        TABLE_TOP.bright_black(),
        titles.bright_black(),
        TABLE_MID.bright_black()
    )
}

pub fn trial_table_row(report: &TrialReport) -> String {
    let result = &report.result;
    let stats = &result.stats;
    let process = report.process.unwrap_or_default();
    format!(
        "│{:>4}│{}│{}│{:>8}│{:>8}│{:>8}│{:>9}│{:>9}│{}│{:>4}│{:>8}│",
        result.params.concurrency,
        format!("{:>8}", result.rps.round() as u64).green(),
        format!("{:>12}", latency_cell(result.mean_latency())).red(),
        stats.success,
        stats.non_success,
        stats.errors,
        format_bytes(stats.request_bytes),
        format_bytes(stats.response_bytes),
        format!("{:>5.2}", process.cpu_per_sec.unwrap_or(0.0)).yellow(),
        process.thread_count,
        format_bytes(process.resident_memory_bytes),
    )
}

pub fn trial_table_footer() -> String {
    TABLE_BOTTOM.bright_black().to_string()
}

const BEST_ICONS: [&str; 8] = ["✨", "🌟", "💫", "⚡️", "🚀", "🔥", "🏅", "💎"];

pub fn best_summary(best: &TrialResult) -> String {
    let icon = BEST_ICONS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or("✨");
    let mut out = format!(
        "\n{icon} {} {} connections | {} | {}{}\n",
        "Best result:".yellow(),
        best.params.concurrency,
        format!("{} RPS", best.rps.round() as u64).green(),
        latency_cell(best.mean_latency()).red(),
        " latency".red(),
    );
    if let Some(lat) = best.latency {
        for (label, value) in [
            ("min", lat.min),
            ("p50", lat.p50),
            ("p90", lat.p90),
            ("p99", lat.p99),
            ("p999", lat.p999),
            ("max", lat.max),
        ] {
            let _ = writeln!(out, "{label}={}", format_duration(value));
        }
    }
    out
}

pub fn process_banner(name: &str, snapshot: &ProcessSnapshot) -> String {
    format!(
        "\n{} {name}\n{} {:.2}s | {} {} | {} {} | {} {}\n",
        "⚙️  Process:".cyan(),
        "   CPU:".bright_black(),
        snapshot.cpu_time_secs,
        "Threads:".bright_black(),
        snapshot.thread_count,
        "Mem:".bright_black(),
        format_bytes(snapshot.resident_memory_bytes),
        "Disk:".bright_black(),
        format_bytes(snapshot.binary_size_bytes),
    )
}

// ============================================================================
// Comparison table
// ============================================================================

fn verdict_color(value: &str, verdict: Option<Verdict>) -> ColoredString {
    match verdict {
        Some(Verdict::Improved) => value.green(),
        Some(Verdict::Regressed) => value.red(),
        _ => value.normal(),
    }
}

#[derive(Tabled)]
struct CompareLine {
    field: &'static str,
    base: String,
    next: String,
    abs_diff: String,
    pct_diff: String,
}

impl From<&DiffRow> for CompareLine {
    fn from(row: &DiffRow) -> Self {
        // changed cells carry the verdict color
        let paint = |value: String| verdict_color(&value, row.verdict).to_string();
        Self {
            field: row.field,
            base: row.baseline.clone(),
            next: paint(row.candidate.clone()),
            abs_diff: paint(row.absolute()),
            pct_diff: paint(row.percent()),
        }
    }
}

pub fn compare_table(rows: &[DiffRow]) -> String {
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows.iter().map(CompareLine::from))
        .with(Style::rounded())
        .to_string()
}
