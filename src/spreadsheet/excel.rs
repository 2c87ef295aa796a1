//! Parts shared by the Office Open XML reader.

use crate::error::Result;
use crate::helpers::cfb::Cfb;
use crate::helpers::xml::XmlNodeHelper;
use crate::helpers::zip::ZipHelper;
use crate::match_xml_events;
use crate::spreadsheet::cell::CellType;
use crate::spreadsheet::SpreadsheetError;
use quick_xml::events::Event;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::io::Seek;
use std::io::SeekFrom;
use std::path::Path;
use zip::ZipArchive;

const TAG_RELATIONSHIP: &[u8] = b"Relationship";

pub(super) type Workbook = ZipArchive<BufReader<File>>;

/// Opens the ZIP container, then lets the caller load sheet list and number formats.
/// Encrypted `.xlsx` files are OLE containers holding an `EncryptedPackage` stream.
pub(super) fn open<W, F>(
    path: &Path,
    load_workbook: W,
    load_number_formats: F,
) -> Result<(Workbook, Vec<CellType>, Vec<(String, String)>)>
where
    W: Fn(&mut Workbook) -> Result<(Vec<(String, String)>, bool)>,
    F: Fn(&mut Workbook, bool) -> Result<Vec<CellType>>,
{
    let name = path.display().to_string();
    let mut reader = BufReader::new(File::open(path)?);
    if is_password_protected(&mut reader) {
        Err(SpreadsheetError::PasswordProtectedError(name.clone()))?;
    }
    reader.seek(SeekFrom::Start(0))?;

    let mut zip = ZipArchive::new(reader)?;
    let (sheets, is_1904) = load_workbook(&mut zip)?;
    if sheets.is_empty() {
        Err(SpreadsheetError::EmptyError(name))?
    }

    let number_formats = load_number_formats(&mut zip, is_1904)?;
    Ok((zip, number_formats, sheets))
}

/// Worksheet relationships: relationship id to ZIP path.
pub(super) fn load_relationships(zip: &mut Workbook, path: &str) -> Result<HashMap<String, String>> {
    let mut reader = zip
        .xml_reader(path)?
        .ok_or_else(|| SpreadsheetError::FileError(path.to_owned()))?;
    let mut relationships: HashMap<String, String> = HashMap::new();
    match_xml_events!(reader => {
        Event::Start(event) if event.local_name().as_ref() == TAG_RELATIONSHIP => {
            let id = event.get_attribute_value("Id")?;
            let kind = event.get_attribute_value("Type")?;
            let target = event.get_attribute_value("Target")?;
            if kind.map(|it| it.ends_with("/worksheet")).unwrap_or(true) {
                if let Some((id, target)) = id.zip(target) {
                    relationships.insert(id.to_string(), to_zip_path(&target));
                }
            }
        }
    });
    Ok(relationships)
}

/// Resolves each cell style's number format id to a rendering type.
pub(super) fn load_number_formats(
    format_indexes: Vec<String>,
    custom_formats: HashMap<String, CellType>,
    is_1904: bool,
) -> Vec<CellType> {
    format_indexes
        .iter()
        .map(|id| {
            custom_formats
                .get(id)
                .copied()
                .or_else(|| CellType::parse_builtin_number_format_id(id, is_1904))
                .unwrap_or(CellType::Number)
        })
        .collect()
}

/// Relationship targets are relative to `xl/` unless absolute.
pub(super) fn to_zip_path(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix('/') {
        stripped.to_owned()
    } else if path.starts_with("xl/") {
        path.to_owned()
    } else {
        format!("xl/{path}")
    }
}

fn is_password_protected(reader: &mut BufReader<File>) -> bool {
    match Cfb::new(reader) {
        Ok(cfb) => cfb.exists("EncryptedPackage"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("worksheets/sheet1.xml", "xl/worksheets/sheet1.xml")]
    #[case("/xl/worksheets/sheet1.xml", "xl/worksheets/sheet1.xml")]
    #[case("xl/worksheets/sheet2.xml", "xl/worksheets/sheet2.xml")]
    fn test_to_zip_path(#[case] target: &str, #[case] expected: &str) {
        assert_eq!(to_zip_path(target), expected);
    }

    #[test]
    fn test_number_formats_prefer_custom() {
        let mut custom = HashMap::new();
        custom.insert("164".to_owned(), CellType::Date1900);
        let formats = load_number_formats(
            vec!["0".to_owned(), "164".to_owned(), "14".to_owned(), "21".to_owned()],
            custom,
            true,
        );
        assert_eq!(
            formats,
            vec![CellType::Number, CellType::Date1900, CellType::Date1904, CellType::Time]
        );
    }
}
