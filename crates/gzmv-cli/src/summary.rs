//! 📊 The end-of-run scoreboard. Printed whether the run went great or went sideways,
//! because "it failed" is more useful with "after moving 199 of 200 objects" attached.

use std::time::Duration;

use comfy_table::{Cell, CellAlignment, Table, presets::NOTHING};
use gzmv::RunSummary;

// -- 📏 one mebibyte. not a megabyte. the hill remains occupied.
const MIB: u64 = 1024 * 1024;

/// 📦 Bytes in whatever unit keeps the number readable.
fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{bytes} bytes")
    }
}

/// 🔢 "1000000" → "1,000,000". You're welcome, eyes.
fn format_number(n: usize) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS for the migrations that needed a pizza break.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{hours:02}:{minutes:02}:{seconds:02}")
    } else {
        format!("{minutes:02}:{seconds:02}")
    }
}

/// 🍽️ Two columns, labels left, numbers right, no borders.
pub(crate) fn render(summary: &RunSummary, elapsed: Duration) -> Table {
    let ratio = if summary.bytes_read == 0 {
        "n/a".to_string()
    } else {
        format!(
            "{:.1}%",
            summary.bytes_written as f64 * 100.0 / summary.bytes_read as f64
        )
    };
    let listed = if summary.listing_failed {
        format!("{} (listing incomplete)", format_number(summary.listed))
    } else {
        format_number(summary.listed)
    };

    let rows = [
        ("listed", listed),
        ("pages", format_number(summary.pages)),
        ("succeeded", format_number(summary.succeeded)),
        ("failed", format_number(summary.failed)),
        ("deleted", format_number(summary.deleted)),
        ("read", format_bytes(summary.bytes_read)),
        ("written", format_bytes(summary.bytes_written)),
        ("compressed size", ratio),
        ("errors", format_number(summary.failures)),
        ("elapsed", format_duration(elapsed)),
    ];

    let mut table = Table::new();
    table.load_preset(NOTHING);
    for (label, value) in rows {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
