//! Readers turning `.xls` and `.xlsx` workbooks into text grids.

mod cell;
mod excel;
mod reference;
mod sheet;
pub(crate) mod xls;
mod xlsx;

pub use sheet::Sheet;

use crate::error::CrawlerError;
use crate::error::Result;
use std::path::Path;
use thiserror::Error;
use xls::XlsSpreadsheet;
use xlsx::XlsxSpreadsheet;

#[derive(Error, Debug)]
pub enum SpreadsheetError {
    #[error("Spreadsheet '{0}' is password protected")]
    PasswordProtectedError(String),

    #[error("Spreadsheet '{0}' contains no sheets")]
    EmptyError(String),

    #[error("Missing workbook part '{0}'")]
    FileError(String),

    #[error("No sheet {1} in spreadsheet '{0}'")]
    SheetNotFoundError(String, String),
}

/// A workbook opened for reading.
pub trait Spreadsheet {
    /// File the workbook was opened from.
    fn name(&self) -> String;

    /// Worksheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Reads the worksheet at `index` (workbook order) into a text grid.
    fn read_sheet(&mut self, index: usize) -> Result<Sheet>;

    fn sheet_index(&self, name: &str) -> Option<usize> {
        self.sheet_names().iter().position(|sheet| sheet == name)
    }

    fn read_all_sheets(&mut self) -> Result<Vec<Sheet>> {
        (0..self.sheet_names().len())
            .map(|index| self.read_sheet(index))
            .collect()
    }
}

/// Opens a workbook, picking the reader from the file extension.
pub fn open_spreadsheet(path: &Path) -> Result<Box<dyn Spreadsheet>> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase());
    match extension.as_deref() {
        Some("xls") => Ok(Box::new(XlsSpreadsheet::open(path)?)),
        Some("xlsx") | Some("xlsm") => Ok(Box::new(XlsxSpreadsheet::open(path)?)),
        _ => Err(CrawlerError::UnrecognizedFormat(path.display().to_string())),
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Minimal `.xlsx` writer for tests.

    use std::io::Write;
    use std::path::Path;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn escape(text: &str) -> String {
        text.replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
    }

    fn column_name(col: usize) -> String {
        super::reference::index_to_reference(0, col).trim_end_matches('1').to_owned()
    }

    fn worksheet(rows: &[Vec<&str>]) -> String {
        let mut xml = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (row, values) in rows.iter().enumerate() {
            xml.push_str(&format!(r#"<row r="{}">"#, row + 1));
            for (col, value) in values.iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                let reference = format!("{}{}", column_name(col), row + 1);
                if value.parse::<f64>().is_ok() {
                    xml.push_str(&format!(r#"<c r="{reference}"><v>{value}</v></c>"#));
                } else {
                    xml.push_str(&format!(
                        r#"<c r="{reference}" t="inlineStr"><is><t>{}</t></is></c>"#,
                        escape(value)
                    ));
                }
            }
            xml.push_str("</row>");
        }
        xml.push_str("</sheetData></worksheet>");
        xml
    }

    /// Serializes `sheets` as an `.xlsx` workbook. Numeric-looking values become number cells.
    pub(crate) fn xlsx_bytes(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();

        let mut workbook = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships"><sheets>"#,
        );
        let mut relationships = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for (index, (name, _)) in sheets.iter().enumerate() {
            let id = index + 1;
            workbook.push_str(&format!(
                r#"<sheet name="{}" sheetId="{id}" r:id="rId{id}"/>"#,
                escape(name)
            ));
            relationships.push_str(&format!(
                r#"<Relationship Id="rId{id}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/worksheet" Target="worksheets/sheet{id}.xml"/>"#
            ));
        }
        workbook.push_str("</sheets></workbook>");
        relationships.push_str("</Relationships>");

        let mut files = vec![
            ("xl/workbook.xml".to_owned(), workbook),
            ("xl/_rels/workbook.xml.rels".to_owned(), relationships),
        ];
        for (index, (_, rows)) in sheets.iter().enumerate() {
            files.push((format!("xl/worksheets/sheet{}.xml", index + 1), worksheet(rows)));
        }
        for (name, content) in files {
            writer.start_file(name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    pub(crate) fn write_xlsx(path: &Path, sheets: &[(&str, Vec<Vec<&str>>)]) {
        std::fs::write(path, xlsx_bytes(sheets)).unwrap();
    }
}
