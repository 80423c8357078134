//! Export options and the built-in tabular document renderer.
//!
//! The renderer is a pure function of `(rows, columns, view state, options)`.
//! It resolves which columns to emit (visible, exportable, in the view's column
//! order) and stringifies the cells; turning a [`TableDocument`] into PDF bytes
//! is left to whatever consumes it.

use serde::{Deserialize, Serialize};

use crate::column::ColumnDef;
use crate::traits::ExportRenderer;
use crate::types::Row;
use crate::view_state::ViewState;

/// Page sizes accepted in [`ExportOptions::page_size`].
pub const SUPPORTED_PAGE_SIZES: &[&str] = &["A3", "A4", "A5", "Letter", "Legal", "Tabloid"];

/// Page orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Portrait,
    Landscape,
}

/// Options for an export render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportOptions {
    pub title: Option<String>,
    pub orientation: Orientation,
    /// Paper size name, one of [`SUPPORTED_PAGE_SIZES`].
    pub page_size: String,
    pub custom_header: Option<String>,
    pub custom_footer: Option<String>,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            title: None,
            orientation: Orientation::Portrait,
            page_size: "A4".to_string(),
            custom_header: None,
            custom_footer: None,
        }
    }
}

impl ExportOptions {
    /// Whether `page_size` names a supported paper size (case-insensitive).
    #[must_use]
    pub fn has_supported_page_size(&self) -> bool {
        SUPPORTED_PAGE_SIZES
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&self.page_size))
    }
}

/// Layout-ready table document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDocument {
    pub title: Option<String>,
    pub orientation: Orientation,
    pub page_size: String,
    pub header: Option<String>,
    pub footer: Option<String>,
    /// Column headers in output order.
    pub columns: Vec<String>,
    /// Stringified cells, one inner vector per row, aligned with `columns`.
    pub rows: Vec<Vec<String>>,
}

/// Renders rows into a [`TableDocument`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TableDocumentRenderer;

impl TableDocumentRenderer {
    /// Columns to export: exportable and visible, ordered by the view's
    /// `column_order` with unlisted columns appended in definition order.
    #[must_use]
    pub fn export_columns<'a>(columns: &'a [ColumnDef], view: &ViewState) -> Vec<&'a ColumnDef> {
        let mut ordered: Vec<&ColumnDef> = view
            .column_order
            .iter()
            .filter_map(|id| columns.iter().find(|c| &c.id == id))
            .collect();
        for column in columns {
            if !ordered.iter().any(|c| c.id == column.id) {
                ordered.push(column);
            }
        }
        ordered.retain(|c| c.exportable && view.is_column_visible(&c.id));
        ordered
    }
}

impl ExportRenderer for TableDocumentRenderer {
    type Document = TableDocument;

    fn render(
        &self,
        rows: &[Row],
        columns: &[ColumnDef],
        view: &ViewState,
        options: &ExportOptions,
    ) -> anyhow::Result<TableDocument> {
        let selected = Self::export_columns(columns, view);
        let body = rows
            .iter()
            .map(|row| {
                selected
                    .iter()
                    .map(|c| {
                        row.get(&c.id)
                            .map(|v| v.as_text().into_owned())
                            .unwrap_or_default()
                    })
                    .collect()
            })
            .collect();

        Ok(TableDocument {
            title: options.title.clone(),
            orientation: options.orientation,
            page_size: options.page_size.clone(),
            header: options.custom_header.clone(),
            footer: options.custom_footer.clone(),
            columns: selected.iter().map(|c| c.header.clone()).collect(),
            rows: body,
        })
    }
}
