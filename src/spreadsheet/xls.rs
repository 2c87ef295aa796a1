use crate::error::Result;
use crate::error::ResultMessage;
use crate::error::ResultOptionChain;
use crate::helpers::biff8::Biff8Reader;
use crate::helpers::cfb::Cfb;
use crate::match_biff8_record;
use crate::spreadsheet::cell::render;
use crate::spreadsheet::cell::to_error_value;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::excel::load_number_formats;
use crate::spreadsheet::sheet::Sheet;
use crate::spreadsheet::Spreadsheet;
use crate::spreadsheet::SpreadsheetError;
use either::Either;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

// BIFF8 record types
const FORMULA: u16 = 6;
const EOF: u16 = 10;
const DATE1904: u16 = 34;
const FILE_PASS: u16 = 47;
const CODE_PAGE: u16 = 66;
const BOUND_SHEET8: u16 = 133;
const MUL_RK: u16 = 189;
const XF: u16 = 224;
const SST: u16 = 252;
const LABEL_SST: u16 = 253;
const NUMBER: u16 = 515;
const LABEL: u16 = 516;
const BOOL_ERR: u16 = 517;
const STRING: u16 = 519;
const RK: u16 = 638;
const FORMAT: u16 = 1054;
const BOF: u16 = 2057;

/// Code page 1200 marks UTF-16 workbooks; their compressed strings stay Windows-1252.
const CODE_PAGE_UTF16: u16 = 1200;
const SHEET_TYPE_WORKSHEET: u8 = 0;

#[derive(Error, Debug)]
pub enum XlsError {
    #[error("Invalid code page '{0}'")]
    CodePageError(u16),

    #[error("Invalid formula value '{0:#018x}'")]
    FormulaValueError(u64),
}

/// Cell type, or an XF index to resolve through the number formats.
type CellKind = Either<CellType, usize>;

/// Excel 97-2003 workbook (`.xls`).
pub(crate) struct XlsSpreadsheet {
    name: String,
    reader: Biff8Reader,
    shared_strings: Vec<String>,
    number_formats: Vec<CellType>,
    /// Worksheet names and BOF offsets in the workbook stream.
    sheets: Vec<(String, usize)>,
}

impl XlsSpreadsheet {
    /// Reads the workbook globals: code page, formats, shared strings and sheet offsets.
    pub(crate) fn open(path: &Path) -> Result<XlsSpreadsheet> {
        let name = path.display().to_string();
        Self::open_globals(path, &name).with_prefix(&name)
    }

    fn open_globals(path: &Path, name: &str) -> Result<XlsSpreadsheet> {
        let mut buf_reader = BufReader::new(File::open(path)?);
        let cfb = Cfb::new(&mut buf_reader)?;
        let mut reader = cfb
            .read("Workbook")
            .ok_none_else(|| cfb.read("Book"))?
            .map(Biff8Reader::new)
            .ok_or_else(|| SpreadsheetError::EmptyError(name.to_owned()))?;
        let mut is_1904 = false;
        let mut shared_strings = Vec::new();
        let mut custom_formats: HashMap<String, CellType> = HashMap::new();
        let mut format_indexes: Vec<String> = Vec::new();
        let mut sheets: Vec<(String, usize)> = Vec::new();
        match_biff8_record!(reader => {
            EOF => break,
            FILE_PASS => Err(SpreadsheetError::PasswordProtectedError(name.to_owned()))?,
            DATE1904 => is_1904 = reader.read_u16()? == 1,
            CODE_PAGE => {
                let code_page = reader.read_u16()?;
                if code_page != CODE_PAGE_UTF16 {
                    reader.encoding = codepage::to_encoding(code_page).ok_or(XlsError::CodePageError(code_page))?;
                }
            }
            FORMAT => {
                let id = reader.read_u16()?;
                let format = reader.read_string()?;
                custom_formats.insert(id.to_string(), CellType::parse_custom_number_format(&format, is_1904));
            }
            XF => {
                reader.skip(2)?;
                format_indexes.push(reader.read_u16()?.to_string());
            }
            SST => shared_strings = load_shared_strings(&mut reader)?,
            BOUND_SHEET8 => {
                let pointer = reader.read_usize()?;
                reader.skip(1)?;
                let sheet_type = reader.read_u8()?;
                let sheet_name = reader.read_short_string()?;
                if sheet_type == SHEET_TYPE_WORKSHEET {
                    sheets.push((sheet_name, pointer));
                }
            }
        });
        if sheets.is_empty() {
            Err(SpreadsheetError::EmptyError(name.to_owned()))?
        }

        Ok(XlsSpreadsheet {
            name: name.to_owned(),
            reader,
            shared_strings,
            number_formats: load_number_formats(format_indexes, custom_formats, is_1904),
            sheets,
        })
    }

    fn resolve(&self, kind: CellKind) -> CellType {
        match kind {
            Either::Left(kind) => kind,
            Either::Right(index) => self.number_formats.get(index).copied().unwrap_or(CellType::Number),
        }
    }

    fn read_sheet_records(&mut self, sheet: &mut Sheet, pointer: usize) -> Result<()> {
        self.reader.goto(pointer);
        self.reader.next()?;
        while let Some(tag) = self.reader.next()? {
            match tag {
                BOF | EOF => break,
                MUL_RK => {
                    let row = self.reader.read_u16()? as usize;
                    let col_lower_bound = self.reader.read_u16()? as usize;
                    let col_upper_bound = self.reader.u16_from_end(2)? as usize;
                    for col in col_lower_bound..=col_upper_bound {
                        let index = self.reader.read_u16()? as usize;
                        let value = self.reader.read_rk()?;
                        let kind = self.resolve(Either::Right(index));
                        sheet.set(row, col, render(kind, &value.to_string()));
                    }
                }
                BOOL_ERR | NUMBER | RK | LABEL_SST | LABEL | FORMULA => {
                    let row = self.reader.read_u16()? as usize;
                    let col = self.reader.read_u16()? as usize;
                    let (kind, value) = match tag {
                        BOOL_ERR => read_bool_or_error_cell(&mut self.reader)?,
                        NUMBER => read_number_cell(&mut self.reader)?,
                        RK => read_rk_cell(&mut self.reader)?,
                        LABEL_SST => read_label_sst_cell(&mut self.reader)?,
                        LABEL => read_label_cell(&mut self.reader)?,
                        _ => read_formula_cell(&mut self.reader)?,
                    };
                    let text = match self.resolve(kind) {
                        CellType::SharedString => value
                            .parse::<usize>()
                            .ok()
                            .and_then(|index| self.shared_strings.get(index))
                            .cloned()
                            .unwrap_or_default(),
                        kind => render(kind, &value),
                    };
                    sheet.set(row, col, text);
                }
                _ => (),
            }
        }
        Ok(())
    }
}

impl Spreadsheet for XlsSpreadsheet {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn sheet_names(&self) -> Vec<String> {
        self.sheets.iter().map(|(name, _)| name.to_owned()).collect()
    }

    fn read_sheet(&mut self, index: usize) -> Result<Sheet> {
        let Some((sheet_name, pointer)) = self.sheets.get(index).cloned() else {
            return Err(SpreadsheetError::SheetNotFoundError(self.name.to_owned(), index.to_string()).into());
        };
        let mut sheet = Sheet::new(&sheet_name);
        let prefix = format!("{}[{}]", self.name, sheet_name);
        self.read_sheet_records(&mut sheet, pointer).with_prefix(&prefix)?;
        Ok(sheet)
    }
}

fn load_shared_strings(reader: &mut Biff8Reader) -> Result<Vec<String>> {
    reader.skip(4)?;
    let count = reader.read_usize()?;
    let mut shared_strings: Vec<String> = Vec::with_capacity(count.min(65536));
    for _ in 0..count {
        shared_strings.push(reader.read_rich_string()?);
    }
    Ok(shared_strings)
}

fn read_bool_or_error_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String)> {
    reader.skip(2)?;
    let value = reader.read_u8()?;
    let flag = reader.read_u8()?;
    if flag == 0 {
        Ok((Either::Left(CellType::Boolean), value.to_string()))
    } else {
        Ok((Either::Left(CellType::Error), to_error_value(value).to_owned()))
    }
}

fn read_number_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String)> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_f64()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_rk_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String)> {
    let index = reader.read_u16()? as usize;
    let value = reader.read_rk()?;
    Ok((Either::Right(index), value.to_string()))
}

fn read_label_sst_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String)> {
    reader.skip(2)?;
    let value = reader.read_usize()?;
    Ok((Either::Left(CellType::SharedString), value.to_string()))
}

fn read_label_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String)> {
    reader.skip(2)?;
    let value = reader.read_string()?;
    Ok((Either::Left(CellType::InlineString), value))
}

/// A cached formula result is an f64 unless its top two bytes are 0xFFFF;
/// then the low byte tells string, boolean, error or empty string.
/// String results live in the STRING record that follows.
fn read_formula_cell(reader: &mut Biff8Reader) -> Result<(CellKind, String)> {
    let index = reader.read_u16()? as usize;
    let formula = reader.read_u64()?;
    let is_number = (formula & 0xFFFF_0000_0000_0000) != 0xFFFF_0000_0000_0000;
    if is_number {
        return Ok((Either::Right(index), f64::from_bits(formula).to_string()));
    }
    match formula & 0xFF {
        0 => match reader.next()? {
            Some(STRING) => Ok((Either::Left(CellType::InlineString), reader.read_string()?)),
            _ => Err(XlsError::FormulaValueError(formula))?,
        },
        1 => {
            let value = if (formula >> 16) & 0xFF != 0 { "1" } else { "0" };
            Ok((Either::Left(CellType::Boolean), value.to_owned()))
        }
        2 => {
            let code = ((formula >> 16) & 0xFF) as u8;
            Ok((Either::Left(CellType::Error), to_error_value(code).to_owned()))
        }
        3 => Ok((Either::Left(CellType::InlineString), String::new())),
        _ => Err(XlsError::FormulaValueError(formula))?,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&kind.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    fn cell_header(row: u16, col: u16, xf: u16) -> Vec<u8> {
        [row.to_le_bytes(), col.to_le_bytes(), xf.to_le_bytes()].concat()
    }

    fn spreadsheet(stream: Vec<u8>, number_formats: Vec<CellType>, shared_strings: Vec<String>) -> XlsSpreadsheet {
        XlsSpreadsheet {
            name: "memory.xls".to_owned(),
            reader: Biff8Reader::new(stream),
            shared_strings,
            number_formats,
            sheets: vec![("Sheet1".to_owned(), 0)],
        }
    }

    #[test]
    fn test_read_sheet_records() {
        let mut stream = record(BOF, &[0; 16]);
        // A1: shared string 0
        stream.extend(record(LABEL_SST, &[cell_header(0, 0, 0), 0u32.to_le_bytes().to_vec()].concat()));
        // B1: number 2.5
        stream.extend(record(NUMBER, &[cell_header(0, 1, 0), 2.5f64.to_le_bytes().to_vec()].concat()));
        // A2: inline label "Ok"
        stream.extend(record(LABEL, &[cell_header(1, 0, 0), vec![2, 0, 0, b'O', b'k']].concat()));
        // B2: date serial through XF 1
        stream.extend(record(NUMBER, &[cell_header(1, 1, 1), 44197f64.to_le_bytes().to_vec()].concat()));
        // A3..B3: MULRK 7 and 8
        let mut mul_rk = vec![2, 0, 0, 0];
        for value in [7i32, 8] {
            mul_rk.extend(0u16.to_le_bytes());
            mul_rk.extend((((value << 2) | 0x02) as u32).to_le_bytes());
        }
        mul_rk.extend(1u16.to_le_bytes());
        stream.extend(record(MUL_RK, &mul_rk));
        // C1: boolean TRUE, C2: #DIV/0!
        stream.extend(record(BOOL_ERR, &[cell_header(0, 2, 0), vec![1, 0]].concat()));
        stream.extend(record(BOOL_ERR, &[cell_header(1, 2, 0), vec![0x07, 1]].concat()));
        stream.extend(record(EOF, &[]));

        let mut xls = spreadsheet(
            stream,
            vec![CellType::Number, CellType::Date1900],
            vec!["Region".to_owned()],
        );
        let sheet = xls.read_sheet(0).unwrap();
        assert_eq!(
            sheet.into_rows(),
            vec![
                vec!["Region", "2.5", "True"],
                vec!["Ok", "2021-01-01 00:00:00", "#DIV/0!"],
                vec!["7", "8", ""],
            ]
        );
    }

    #[test]
    fn test_formula_string_result() {
        let mut stream = record(BOF, &[0; 16]);
        let cached = 0xFFFF_0000_0000_0000u64.to_le_bytes();
        stream.extend(record(FORMULA, &[cell_header(0, 0, 0), cached.to_vec(), vec![0; 6]].concat()));
        stream.extend(record(STRING, &[3, 0, 0, b'a', b'b', b'c']));
        stream.extend(record(EOF, &[]));
        let mut xls = spreadsheet(stream, vec![CellType::Number], Vec::new());
        let sheet = xls.read_sheet(0).unwrap();
        assert_eq!(sheet.get(0, 0), "abc");
    }

    #[test]
    fn test_missing_sheet_index() {
        let mut xls = spreadsheet(record(EOF, &[]), Vec::new(), Vec::new());
        assert!(xls.read_sheet(1).is_err());
    }
}
