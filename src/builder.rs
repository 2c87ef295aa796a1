//! Consolidation of acquired spreadsheets into one table per job entry.

use crate::error::CrawlerError;
use crate::error::Result;
use crate::error::ResultMessage;
use crate::job::SheetSelector;
use crate::job::TableSpec;
use crate::spreadsheet::open_spreadsheet;
use crate::spreadsheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use std::collections::BTreeMap;
use tracing::debug;
use tracing::info;

/// Cell texts standing for a missing value.
const NULL_MARKERS: [&str; 2] = ["nan", "None"];

/// Rows of text named by the `structure` of a table.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResolvedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ResolvedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    /// Every row as a `column -> value` map.
    pub fn records(&self) -> impl Iterator<Item = BTreeMap<&str, &str>> + '_ {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter().map(String::as_str))
                .collect()
        })
    }

    /// Values of column `name`, top to bottom.
    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index].as_str()).collect())
    }
}

/// Drops the first row whose `index_col` cell is blank and every row after it.
///
/// A table without blank index cells is returned as is, and so is a table that
/// would lose all of its rows.
pub fn truncate_at_blank(table: ResolvedTable, index_col: &str) -> Result<ResolvedTable> {
    let index = table.column_index(index_col).ok_or_else(|| CrawlerError::Selector {
        table: table.columns.join(", "),
        message: format!("index column '{index_col}' is not part of the structure"),
    })?;
    match table.rows.iter().position(|row| row[index].is_empty()) {
        Some(0) => {
            debug!("Column '{index_col}' is blank in the first row, truncation skipped");
            Ok(table)
        }
        Some(blank) => {
            debug!("Truncating at row {blank} of {}", table.len());
            let mut table = table;
            table.rows.truncate(blank);
            Ok(table)
        }
        None => Ok(table),
    }
}

/// Reads the acquired spreadsheets of a table and applies the cleanup rules.
#[derive(Clone, Copy, Debug, Default)]
pub struct TableBuilder;

impl TableBuilder {
    #[tracing::instrument(skip(self, spec))]
    pub fn build(&self, name: &str, spec: &TableSpec) -> Result<ResolvedTable> {
        spec.validate_paths(name)?;
        let width = spec.structure.len();

        let mut rows: Vec<Vec<String>> = Vec::new();
        for (path, selector, skip_row) in spec.sources() {
            let mut spreadsheet = open_spreadsheet(path).with_prefix(&path.display().to_string())?;
            let sheets = read_selected(spreadsheet.as_mut(), selector)?;
            for sheet in sheets {
                let name = sheet.name.clone();
                let mut data: Vec<Vec<String>> = sheet.into_rows().into_iter().skip(skip_row).collect();
                if data.is_empty() {
                    debug!("'{name}' of {} has no rows after row {skip_row}", path.display());
                    continue;
                }
                if matches!(selector, SheetSelector::All) {
                    data.iter_mut().for_each(|row| row.truncate(width));
                }
                let actual = data.iter().map(Vec::len).max().unwrap_or(0);
                if actual != width {
                    debug!("'{name}' of {} has {actual} columns", path.display());
                    return Err(CrawlerError::StructureMismatch { expected: width, actual });
                }
                debug!("Appending '{name}' of {} from row {skip_row}", path.display());
                rows.extend(data);
            }
        }

        if rows.is_empty() {
            return Err(CrawlerError::StructureMismatch { expected: width, actual: 0 });
        }
        for cell in rows.iter_mut().flatten() {
            if NULL_MARKERS.contains(&cell.as_str()) {
                cell.clear();
            }
        }

        let table = ResolvedTable {
            columns: spec.structure.clone(),
            rows,
        };
        let table = truncate_at_blank(table, &spec.index_col).map_err(|error| match error {
            CrawlerError::Selector { message, .. } => CrawlerError::Selector {
                table: name.to_owned(),
                message,
            },
            error => error,
        })?;
        info!("{name}: {} rows resolved", table.len());
        Ok(table)
    }
}

fn read_selected(spreadsheet: &mut dyn Spreadsheet, selector: &SheetSelector) -> Result<Vec<Sheet>> {
    let workbook = spreadsheet.name();
    let not_found = || SpreadsheetError::SheetNotFoundError(workbook.clone(), selector.to_string());
    match selector {
        SheetSelector::All => spreadsheet.read_all_sheets(),
        SheetSelector::Index(index) => {
            if *index >= spreadsheet.sheet_names().len() {
                return Err(not_found().into());
            }
            Ok(vec![spreadsheet.read_sheet(*index)?])
        }
        SheetSelector::Name(name) => {
            let index = spreadsheet.sheet_index(name).ok_or_else(not_found)?;
            Ok(vec![spreadsheet.read_sheet(index)?])
        }
    }
}
