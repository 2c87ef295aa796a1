//! Declarative description of the tables to acquire.
//!
//! A [`JobModel`] maps table names to their [`TableSpec`]. Job files are read and
//! written by [`store`]; the acquisition step fills in `path` and realigns
//! `sheet`/`skip_row` with it.

pub(crate) mod literal;
pub mod store;

use crate::error::CrawlerError;
use crate::error::Result;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::path::PathBuf;

/// Which sheets of a workbook feed the table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SheetSelector {
    /// Every sheet, serialized as `null` / `None`.
    #[default]
    All,
    /// Zero-based position in workbook order.
    Index(usize),
    Name(String),
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::All => write!(f, "None"),
            SheetSelector::Index(index) => write!(f, "{index}"),
            SheetSelector::Name(name) => write!(f, "{name}"),
        }
    }
}

impl Serialize for SheetSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            SheetSelector::All => serializer.serialize_none(),
            SheetSelector::Index(index) => serializer.serialize_u64(*index as u64),
            SheetSelector::Name(name) => serializer.serialize_str(name),
        }
    }
}

impl<'de> Deserialize<'de> for SheetSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Index(usize),
            Name(String),
        }

        Ok(match Option::<Raw>::deserialize(deserializer)? {
            None => SheetSelector::All,
            Some(Raw::Index(index)) => SheetSelector::Index(index),
            Some(Raw::Name(name)) => SheetSelector::Name(name),
        })
    }
}

/// One table of a job: layout, sources and where downloads go.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    /// Output column names, in order.
    pub structure: Vec<String>,
    /// Column whose first blank cell marks the end of the data.
    pub index_col: String,
    pub urls: Vec<String>,
    /// One selector per URL before acquisition, one per spreadsheet after.
    pub sheet: Vec<SheetSelector>,
    /// Leading rows to drop; `None` means none.
    pub skip_row: Vec<Option<usize>>,
    /// Reserved, not applied.
    #[serde(default)]
    pub last_row: Vec<Option<usize>>,
    /// Local spreadsheets, filled by acquisition.
    #[serde(default)]
    pub path: Vec<PathBuf>,
    /// Download directory.
    pub store: PathBuf,
}

impl TableSpec {
    /// Before acquisition every URL needs its own selector pair.
    pub fn validate_sources(&self, table: &str) -> Result<()> {
        if self.urls.len() != self.sheet.len() || self.urls.len() != self.skip_row.len() {
            return Err(CrawlerError::Selector {
                table: table.to_owned(),
                message: format!(
                    "{} urls, {} sheet and {} skip_row entries",
                    self.urls.len(),
                    self.sheet.len(),
                    self.skip_row.len()
                ),
            });
        }
        Ok(())
    }

    /// After acquisition every spreadsheet needs its own selector pair.
    pub fn validate_paths(&self, table: &str) -> Result<()> {
        if self.path.len() != self.sheet.len() || self.path.len() != self.skip_row.len() {
            return Err(CrawlerError::Selector {
                table: table.to_owned(),
                message: format!(
                    "{} paths, {} sheet and {} skip_row entries",
                    self.path.len(),
                    self.sheet.len(),
                    self.skip_row.len()
                ),
            });
        }
        Ok(())
    }

    /// `(path, sheet, rows to skip)` for every acquired spreadsheet.
    pub fn sources(&self) -> impl Iterator<Item = (&Path, &SheetSelector, usize)> + '_ {
        self.path
            .iter()
            .zip(&self.sheet)
            .zip(&self.skip_row)
            .map(|((path, sheet), skip_row)| (path.as_path(), sheet, skip_row.unwrap_or(0)))
    }
}

/// Tables to acquire, keyed and iterated by table name.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobModel {
    tables: BTreeMap<String, TableSpec>,
}

impl JobModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a table, returning the previous spec.
    pub fn insert(&mut self, name: impl Into<String>, spec: TableSpec) -> Option<TableSpec> {
        self.tables.insert(name.into(), spec)
    }

    pub fn get(&self, name: &str) -> Option<&TableSpec> {
        self.tables.get(name)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, TableSpec> {
        self.tables.iter()
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Tables of `other` override those of the same name.
    pub fn merge(&mut self, other: JobModel) {
        self.tables.extend(other.tables);
    }
}

impl IntoIterator for JobModel {
    type Item = (String, TableSpec);
    type IntoIter = btree_map::IntoIter<String, TableSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.into_iter()
    }
}

impl<'a> IntoIterator for &'a JobModel {
    type Item = (&'a String, &'a TableSpec);
    type IntoIter = btree_map::Iter<'a, String, TableSpec>;

    fn into_iter(self) -> Self::IntoIter {
        self.tables.iter()
    }
}

impl FromIterator<(String, TableSpec)> for JobModel {
    fn from_iter<T: IntoIterator<Item = (String, TableSpec)>>(iter: T) -> Self {
        JobModel {
            tables: iter.into_iter().collect(),
        }
    }
}

fn optional(value: &Option<usize>) -> String {
    value.map(|value| value.to_string()).unwrap_or_else(|| "None".to_owned())
}

/// Hierarchy printout of every table and its fields.
impl fmt::Display for JobModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, spec) in &self.tables {
            let fields: [(&str, Vec<String>); 8] = [
                ("structure", spec.structure.clone()),
                ("index_col", vec![spec.index_col.clone()]),
                ("urls", spec.urls.clone()),
                ("sheet", spec.sheet.iter().map(ToString::to_string).collect()),
                ("skip_row", spec.skip_row.iter().map(optional).collect()),
                ("last_row", spec.last_row.iter().map(optional).collect()),
                ("path", spec.path.iter().map(|path| path.display().to_string()).collect()),
                ("store", vec![spec.store.display().to_string()]),
            ];
            writeln!(f, "\ntable: {name}\n|")?;
            let last = fields.len() - 1;
            for (position, (field, items)) in fields.iter().enumerate() {
                writeln!(f, "|--{field}")?;
                for item in items {
                    writeln!(f, "|    |-{item}")?;
                }
                if position != last {
                    writeln!(f, "|")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_spec() -> TableSpec {
        TableSpec {
            structure: vec!["Code".to_owned(), "Name".to_owned()],
            index_col: "Code".to_owned(),
            urls: vec!["http://stat.example/a".to_owned(), "http://stat.example/b".to_owned()],
            sheet: vec![SheetSelector::All, SheetSelector::Name("Лист1".to_owned())],
            skip_row: vec![Some(3), None],
            last_row: vec![None, None],
            path: Vec::new(),
            store: PathBuf::from("data/CODES"),
        }
    }

    #[test]
    fn test_validate_sources() {
        let mut spec = sample_spec();
        assert!(spec.validate_sources("CODES").is_ok());
        spec.skip_row.pop();
        let error = spec.validate_sources("CODES").unwrap_err();
        assert!(matches!(error, CrawlerError::Selector { ref table, .. } if table == "CODES"));
    }

    #[test]
    fn test_validate_paths_and_sources() {
        let mut spec = sample_spec();
        assert!(spec.validate_paths("CODES").is_err());
        spec.path = vec![PathBuf::from("a.xls"), PathBuf::from("b.xlsx")];
        assert!(spec.validate_paths("CODES").is_ok());
        let sources: Vec<_> = spec.sources().collect();
        assert_eq!(sources[0], (Path::new("a.xls"), &SheetSelector::All, 3));
        assert_eq!(sources[1].2, 0);
    }

    #[test]
    fn test_selector_json() {
        let selectors: Vec<SheetSelector> = serde_json::from_str(r#"[null, 2, "Data"]"#).unwrap();
        assert_eq!(
            selectors,
            vec![SheetSelector::All, SheetSelector::Index(2), SheetSelector::Name("Data".to_owned())]
        );
        assert_eq!(serde_json::to_string(&selectors).unwrap(), r#"[null,2,"Data"]"#);
    }

    #[test]
    fn test_merge_overrides_by_name() {
        let mut model: JobModel = [("A".to_owned(), sample_spec())].into_iter().collect();
        let mut replacement = sample_spec();
        replacement.index_col = "Name".to_owned();
        let mut other = JobModel::new();
        other.insert("A", replacement);
        other.insert("B", sample_spec());
        model.merge(other);
        assert_eq!(model.table_names().collect::<Vec<_>>(), vec!["A", "B"]);
        assert_eq!(model.get("A").unwrap().index_col, "Name");
    }

    #[test]
    fn test_display_tree() {
        let mut model = JobModel::new();
        model.insert("CODES", sample_spec());
        let tree = model.to_string();
        assert!(tree.starts_with("\ntable: CODES\n|\n|--structure\n|    |-Code\n|    |-Name\n|\n|--index_col\n"));
        assert!(tree.contains("|--sheet\n|    |-None\n|    |-Лист1\n"));
        assert!(tree.contains("|--skip_row\n|    |-3\n|    |-None\n"));
        assert!(tree.ends_with("|--store\n|    |-data/CODES\n"));
    }
}
