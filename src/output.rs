//! CLI output formatting for every deploy stage.
//!
//! # Output Format
//!
//! ## Export
//!
//! ```text
//! products → static/data/products.json (42 documents)
//! categories → static/data/categories.json (6 documents)
//! Exported 2 collections
//! ```
//!
//! ## Convert
//!
//! ```text
//! 001 mug-red.webp
//!     Source: mugs/mug-red.JPG
//!     quality 85, 117 KB
//! 002 poster.webp
//!     Source: poster.jpeg
//!     quality 5, 240 KB (over budget)
//! 003 broken.webp
//!     Source: broken.jpg
//!     Error: failed to decode broken.jpg: ...
//! Converted 2 of 3 images: 1 cached, 1 encoded (2 total), 1 failed
//! ```
//!
//! ## Publish
//!
//! ```text
//! Uploaded
//!     /index.html (1 KB)
//! Failed
//!     upload of public/app.js to /app.js failed: ...
//! Skipped
//!     /blocked/x.css
//! Created 1 directory, uploaded 1 of 3 files (1 KB)
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::convert::ConversionReport;
use crate::fixtures::ExportedCollection;
use crate::publish::{MirrorReport, RemoteEntry, UploadStatus};
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Whole KiB, rounded down.
fn format_size(bytes: u64) -> String {
    format!("{} KB", bytes / 1024)
}

fn plural(count: usize, singular: &str, plural: &str) -> String {
    if count == 1 {
        format!("{count} {singular}")
    } else {
        format!("{count} {plural}")
    }
}

/// `path` relative to `root` when it is inside it.
fn display_relative(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Export
// ============================================================================

pub fn format_export_report(exported: &[ExportedCollection], working_copy: &Path) -> Vec<String> {
    let mut lines: Vec<String> = exported
        .iter()
        .map(|c| {
            format!(
                "{} \u{2192} {} ({})",
                c.collection,
                display_relative(&c.path, working_copy),
                plural(c.documents, "document", "documents")
            )
        })
        .collect();
    lines.push(format!(
        "Exported {}",
        plural(exported.len(), "collection", "collections")
    ));
    lines
}

pub fn print_export_report(exported: &[ExportedCollection], working_copy: &Path) {
    print_lines(format_export_report(exported, working_copy));
}

// ============================================================================
// Convert
// ============================================================================

/// One entry per task: output name, source, then the chosen quality or error.
pub fn format_conversion_report(report: &ConversionReport, source_root: &Path) -> Vec<String> {
    let mut lines = Vec::new();
    for (pos, outcome) in report.outcomes.iter().enumerate() {
        let task = &outcome.task;
        let name = task
            .destination_path
            .file_name()
            .map(|f| f.to_string_lossy().into_owned())
            .unwrap_or_default();
        lines.push(format!("{} {}", format_index(pos + 1), name));
        lines.push(format!(
            "{}Source: {}",
            indent(1),
            display_relative(&task.source_path, source_root)
        ));
        match &outcome.result {
            Ok(converted) => {
                let mut detail = format!(
                    "{}quality {}, {}",
                    indent(1),
                    converted.quality,
                    format_size(converted.size_bytes)
                );
                if !converted.within_budget {
                    detail.push_str(" (over budget)");
                }
                lines.push(detail);
            }
            Err(e) => lines.push(format!("{}Error: {}", indent(1), e)),
        }
    }

    let converted = report.converted().count();
    let failed = report.failures().count();
    let mut summary = format!(
        "Converted {} of {}: {}",
        converted,
        plural(report.outcomes.len(), "image", "images"),
        report.cache
    );
    if failed > 0 {
        summary.push_str(&format!(", {failed} failed"));
    }
    lines.push(summary);
    lines
}

pub fn print_conversion_report(report: &ConversionReport, source_root: &Path) {
    print_lines(format_conversion_report(report, source_root));
}

// ============================================================================
// Publish
// ============================================================================

pub fn format_mirror_report(report: &MirrorReport) -> Vec<String> {
    let mut lines = Vec::new();

    let uploaded: Vec<String> = report
        .files
        .iter()
        .filter_map(|f| match f.status {
            UploadStatus::Uploaded { bytes } => Some(format!(
                "{}{} ({})",
                indent(1),
                f.remote_path,
                format_size(bytes)
            )),
            _ => None,
        })
        .collect();
    if !uploaded.is_empty() {
        lines.push("Uploaded".to_string());
        lines.extend(uploaded);
    }

    if !report.failures.is_empty() {
        lines.push("Failed".to_string());
        lines.extend(
            report
                .failures
                .iter()
                .map(|failure| format!("{}{}", indent(1), failure)),
        );
    }

    let skipped: Vec<String> = report
        .files
        .iter()
        .filter(|f| f.status == UploadStatus::Skipped)
        .map(|f| format!("{}{}", indent(1), f.remote_path))
        .collect();
    if !skipped.is_empty() {
        lines.push("Skipped".to_string());
        lines.extend(skipped);
    }

    let mut summary = String::new();
    if !report.created_dirs.is_empty() {
        summary.push_str(&format!(
            "Created {}, uploaded",
            plural(report.created_dirs.len(), "directory", "directories")
        ));
    } else {
        summary.push_str("Uploaded");
    }
    summary.push_str(&format!(
        " {} of {} ({})",
        report.uploaded().count(),
        plural(report.files.len(), "file", "files"),
        format_size(report.uploaded_bytes())
    ));
    lines.push(summary);
    lines
}

pub fn print_mirror_report(report: &MirrorReport) {
    print_lines(format_mirror_report(report));
}

// ============================================================================
// Remote listing
// ============================================================================

/// Directories get a trailing `/`; order is as listed.
pub fn format_remote_listing(entries: &[RemoteEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| {
            if e.is_directory {
                format!("{}/", e.name)
            } else {
                e.name.clone()
            }
        })
        .collect()
}

pub fn print_remote_listing(entries: &[RemoteEntry]) {
    print_lines(format_remote_listing(entries));
}
