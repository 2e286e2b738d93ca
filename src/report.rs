use crate::cleaner::ReclaimReport;
use crate::duration::format_duration;
use crate::lifecycle::Listing;
use crate::types::Entry;
use chrono::TimeDelta;
use colored::Colorize;
use comfy_table::{Cell, Color, Table};
use std::fmt::Write;

pub fn print_created(entry: &Entry) {
    let lifetime = entry.expires_at.signed_duration_since(entry.created_at);
    println!("Created folder {}", entry.path.display().to_string().green());
    println!(
        "This folder will expire in {}.\n",
        format_duration(lifetime).cyan()
    );
    println!("cd {}", entry.path.display());
}

pub fn print_listing(listings: &[Listing]) {
    if listings.is_empty() {
        println!("No active temporary folders.");
        return;
    }

    println!(
        "{}",
        format!("Active temporary folders ({}):", listings.len()).cyan()
    );

    let mut table = Table::new();
    table.load_preset(comfy_table::presets::UTF8_HORIZONTAL_ONLY);
    table.set_header(vec!["#", "Path", "Expires In", "Deadtime", "Size", "Status"]);

    for (i, row) in listings.iter().enumerate() {
        let (status, color) = if row.missing {
            ("missing", Color::Red)
        } else if row.expired {
            ("expired", Color::Yellow)
        } else {
            ("active", Color::Green)
        };

        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(row.entry.path.display()),
            Cell::new(row.remaining_text()).fg(if row.remaining < TimeDelta::zero() {
                Color::Yellow
            } else {
                Color::White
            }),
            Cell::new(&row.entry.deadtime),
            Cell::new(human_bytes::human_bytes(row.size as f64)),
            Cell::new(status).fg(color),
        ]);
    }

    println!("{table}");
}

/// `verb` is the past tense shown in the summary, e.g. "Cleaned" or "Deleted".
pub fn print_reclaim(report: &ReclaimReport, verb: &str, nothing_to_do: &str) {
    print!("{}", render_reclaim(report, verb, nothing_to_do));
}

fn render_reclaim(report: &ReclaimReport, verb: &str, nothing_to_do: &str) -> String {
    let mut out = String::new();

    for path in &report.recovered {
        let _ = writeln!(out, "Removed previously deferred folder {}", path.display());
    }

    for item in &report.cleaned {
        let _ = writeln!(out, "{verb} {} ({})", item.path.display(), item.reason);
    }

    if report.is_empty() {
        let _ = writeln!(out, "{nothing_to_do}");
    } else if report.count() > 0 {
        let _ = writeln!(
            out,
            "\n{} {} folder(s).",
            verb,
            report.count().to_string().green()
        );
    }

    if report.skipped > 0 {
        let _ = writeln!(out, "{} folder(s) still active.", report.skipped);
    }

    if !report.deferred.is_empty() {
        let _ = writeln!(out, "\n{}", "Marked for deletion later (in use):".yellow());
        for path in &report.deferred {
            let _ = writeln!(out, "  - {}", path.display());
        }
    }

    if !report.errors.is_empty() {
        let _ = writeln!(out, "\n{}", "Errors encountered:".red());
        for msg in &report.errors {
            let _ = writeln!(out, "  - {msg}");
        }
    }

    out
}
