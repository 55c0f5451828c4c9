use std::fmt::Write as _;

use relview_core::catalog::CatalogBackend;
use relview_core::controller::SelectionController;
use relview_core::notifier::Notifier;
use relview_core::relation::{RelationDescriptor, RelationRef};
use relview_core::rows::{PagingState, Record, RowBackend};
use serde_json::Value;

pub fn render_view<B, N>(controller: &SelectionController<B, N>) -> String
where
    B: CatalogBackend + RowBackend + 'static,
    N: Notifier,
{
    let Some(selection) = controller.selection() else {
        return "No relation selected.".to_string();
    };

    let page = controller.row_page();
    let header = render_header(
        &selection.reference(),
        controller.paging(),
        page.total_count,
        controller.is_loading_rows(),
    );
    format!("{header}\n{}", render_table(controller.columns(), &page.rows))
}

#[must_use]
pub fn render_header(
    relation: &RelationRef,
    paging: &PagingState,
    total_count: u64,
    loading: bool,
) -> String {
    let page_count = paging.page_count(total_count).max(1);
    let mut header = format!(
        "{relation} page {}/{page_count} ({total_count} rows)",
        paging.page_index + 1
    );
    if let Some(column) = &paging.sort_by {
        let _ = write!(
            header,
            ", sorted by {column} {}",
            paging.sort_direction.as_str()
        );
    }
    if loading {
        header.push_str(" [loading]");
    }
    header
}

#[must_use]
pub fn render_relations(title: &str, relations: &[RelationDescriptor]) -> String {
    let mut out = format!("{title} ({}):", relations.len());
    if relations.is_empty() {
        out.push_str("\n  (none)");
    }
    for relation in relations {
        let _ = write!(out, "\n  {}", relation.id);
        if !relation.columns.is_empty() {
            let _ = write!(out, " ({})", relation.columns.join(", "));
        }
    }
    out
}

struct Cell {
    text: String,
    numeric: bool,
}

fn cell(value: Option<&Value>) -> Cell {
    match value {
        None | Some(Value::Null) => Cell {
            text: String::new(),
            numeric: false,
        },
        Some(Value::String(text)) => Cell {
            text: text.clone(),
            numeric: false,
        },
        Some(Value::Number(number)) => Cell {
            text: number.to_string(),
            numeric: true,
        },
        Some(other) => Cell {
            text: other.to_string(),
            numeric: false,
        },
    }
}

/// Plain text table. Numbers are right-aligned, everything else left-aligned.
#[must_use]
pub fn render_table(columns: &[String], rows: &[Record]) -> String {
    if columns.is_empty() {
        return "(no columns)".to_string();
    }

    let cells: Vec<Vec<Cell>> = rows
        .iter()
        .map(|row| columns.iter().map(|column| cell(row.get(column))).collect())
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            cells
                .iter()
                .map(|row| row[index].text.chars().count())
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(cells.len() + 3);
    lines.push(
        columns
            .iter()
            .zip(&widths)
            .map(|(column, width)| format!("{column:<width$}"))
            .collect::<Vec<_>>()
            .join(" | "),
    );
    lines.push(
        widths
            .iter()
            .map(|width| "-".repeat(*width))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &cells {
        lines.push(
            row.iter()
                .zip(&widths)
                .map(|(cell, width)| {
                    if cell.numeric {
                        format!("{:>width$}", cell.text)
                    } else {
                        format!("{:<width$}", cell.text)
                    }
                })
                .collect::<Vec<_>>()
                .join(" | "),
        );
    }
    if cells.is_empty() {
        lines.push("(no rows)".to_string());
    }

    lines
        .iter()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}
