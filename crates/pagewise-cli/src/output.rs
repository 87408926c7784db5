//! Output renderers and formatting helpers for CLI commands.

use anyhow::anyhow;
use clap::ValueEnum;
use pagewise_core::{BulkDeleteReport, ResourceCollection, to_csv};
use serde_json::json;

use crate::backend::Record;
use crate::client::{CliError, CliResult};
use crate::profiles::ResourceProfile;

/// Output format for commands that render rows.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

/// One synchronized page plus the state needed to describe it.
pub(crate) struct PageView<'a> {
    pub(crate) profile: &'a ResourceProfile,
    pub(crate) collection: &'a ResourceCollection<Record>,
    pub(crate) page: u32,
    pub(crate) query: &'a str,
}

pub(crate) fn render_page(view: &PageView<'_>, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => {
            let document = json!({
                "resource": view.profile.name,
                "items": view.collection.items,
                "page": view.page,
                "totalPages": view.collection.total_pages,
                "totalCount": view.collection.total_count,
                "query": view.query,
            });
            serde_json::to_string_pretty(&document)
                .map_err(|err| CliError::failure(anyhow!("failed to format JSON: {err}")))
        }
        OutputFormat::Csv => render_csv(view),
        OutputFormat::Table => Ok(render_table(view)),
    }
}

fn render_csv(view: &PageView<'_>) -> CliResult<String> {
    to_csv(&view.collection.items, &view.profile.export_columns())
        .map_err(|err| CliError::failure(anyhow::Error::new(err).context("CSV export failed")))
}

fn render_table(view: &PageView<'_>) -> String {
    let headers = view.profile.columns;
    let rows: Vec<Vec<String>> = view
        .collection
        .items
        .iter()
        .map(|record| headers.iter().map(|field| record.field_text(field)).collect())
        .collect();
    let widths: Vec<usize> = headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            rows.iter()
                .map(|row| row[index].chars().count())
                .chain(std::iter::once(header.len()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 3);
    lines.push(format_row(
        headers.iter().map(|header| header.to_uppercase()),
        &widths,
    ));
    for row in &rows {
        lines.push(format_row(row.iter().cloned(), &widths));
    }
    lines.push(format!(
        "page {}/{} ({} total)",
        view.page, view.collection.total_pages, view.collection.total_count
    ));
    lines.push(format!(
        "query: {}",
        if view.query.is_empty() {
            "(defaults)"
        } else {
            view.query
        }
    ));
    lines.join("\n")
}

fn format_row(cells: impl Iterator<Item = String>, widths: &[usize]) -> String {
    cells
        .zip(widths)
        .map(|(cell, width)| format!("{cell:<width$}"))
        .collect::<Vec<_>>()
        .join("  ")
        .trim_end()
        .to_string()
}

pub(crate) fn render_report(report: &BulkDeleteReport<String>) -> String {
    let mut lines = Vec::new();
    if !report.deleted.is_empty() {
        lines.push(format!("deleted: {}", report.deleted.join(", ")));
    }
    for failure in &report.failed {
        lines.push(format!("failed: {} ({})", failure.id, failure.error));
    }
    lines.join("\n")
}
