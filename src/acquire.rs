//! Turns the URLs of a job into local spreadsheet paths.

use crate::archive;
use crate::archive::is_spreadsheet;
use crate::archive::ArchiveKind;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::job::JobModel;
use crate::job::TableSpec;
use std::fs;
use std::fs::File;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use tracing::error;
use tracing::info;
use tracing::trace;

/// Downloads every table of a job, expanding archives, one URL at a time.
///
/// Failures are logged per URL and never stop the remaining downloads.
pub struct Acquirer<F: Fetcher> {
    fetcher: F,
}

impl<F: Fetcher> Acquirer<F> {
    pub fn new(fetcher: F) -> Self {
        Acquirer { fetcher }
    }

    /// Returns `model` with `path`, `sheet` and `skip_row` rebuilt for every table,
    /// one entry per local spreadsheet.
    #[tracing::instrument(skip_all, fields(tables = model.len()))]
    pub fn acquire(&self, model: JobModel) -> JobModel {
        model
            .into_iter()
            .map(|(name, spec)| {
                let spec = self.acquire_table(&name, spec);
                (name, spec)
            })
            .collect()
    }

    #[tracing::instrument(skip(self, spec))]
    pub fn acquire_table(&self, name: &str, spec: TableSpec) -> TableSpec {
        if let Err(error) = spec.validate_sources(name) {
            error!("{error}");
        }

        let mut path = Vec::new();
        let mut sheet = Vec::new();
        let mut skip_row = Vec::new();
        for (index, url) in spec.urls.iter().enumerate() {
            let (Some(selector), Some(skip)) = (spec.sheet.get(index), spec.skip_row.get(index)) else {
                error!("{url}: no sheet or skip_row entry, skipped");
                continue;
            };
            match self.acquire_url(url, &spec.store) {
                Ok(files) => {
                    // Every spreadsheet of an archive inherits the selectors of its URL.
                    for file in files {
                        path.push(file);
                        sheet.push(selector.clone());
                        skip_row.push(*skip);
                    }
                }
                Err(error) => error!("{url}: {error}"),
            }
        }

        trace!("{name}: {} spreadsheets acquired", path.len());
        TableSpec {
            path,
            sheet,
            skip_row,
            ..spec
        }
    }

    fn acquire_url(&self, url: &str, store: &Path) -> Result<Vec<PathBuf>> {
        let mut retrieved = self.fetcher.retrieve(url)?;
        info!("Downloading {}", retrieved.file_name);

        fs::create_dir_all(store)?;
        let target = store.join(&retrieved.file_name);
        info!("Saving {}", target.display());
        io::copy(&mut retrieved.body, &mut File::create(&target)?)?;

        if is_spreadsheet(&target) {
            return Ok(vec![target]);
        }
        let kind = ArchiveKind::from_path(&target)?;
        archive::extract(&target, kind, store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::fixtures::StaticFetcher;
    use crate::job::SheetSelector;
    use crate::spreadsheet::fixtures::xlsx_bytes;
    use std::io::Cursor;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn zip_bytes(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn spec(store: &Path, urls: &[&str], sheet: Vec<SheetSelector>, skip_row: Vec<Option<usize>>) -> TableSpec {
        TableSpec {
            structure: vec!["A".to_owned(), "B".to_owned()],
            index_col: "A".to_owned(),
            urls: urls.iter().map(|url| url.to_string()).collect(),
            sheet,
            skip_row,
            store: store.to_path_buf(),
            ..TableSpec::default()
        }
    }

    #[test]
    fn test_archive_expands_selectors() {
        let dir = tempdir().unwrap();
        let book = xlsx_bytes(&[("Sheet1", vec![vec!["1", "x"]])]);
        let fetcher = StaticFetcher::new(&[
            ("http://stat/direct", "direct.xlsx", book.clone()),
            (
                "http://stat/bundle",
                "bundle.zip",
                zip_bytes(&[
                    ("north.xlsx", book.clone()),
                    ("readme.txt", b"notes".to_vec()),
                    ("south.xls", b"legacy".to_vec()),
                ]),
            ),
        ]);
        let table = spec(
            dir.path(),
            &["http://stat/direct", "http://stat/missing", "http://stat/bundle"],
            vec![SheetSelector::All, SheetSelector::Index(0), SheetSelector::Name("Data".to_owned())],
            vec![Some(1), None, Some(4)],
        );

        let acquired = Acquirer::new(fetcher).acquire_table("REGIONS", table);

        assert_eq!(
            acquired.path,
            vec![
                dir.path().join("direct.xlsx"),
                dir.path().join("north.xlsx"),
                dir.path().join("south.xls"),
            ]
        );
        assert_eq!(
            acquired.sheet,
            vec![
                SheetSelector::All,
                SheetSelector::Name("Data".to_owned()),
                SheetSelector::Name("Data".to_owned()),
            ]
        );
        assert_eq!(acquired.skip_row, vec![Some(1), Some(4), Some(4)]);
        assert_eq!(acquired.urls.len(), 3);
        assert!(!dir.path().join("bundle.zip").exists());
        assert!(acquired.validate_paths("REGIONS").is_ok());
    }

    #[test]
    fn test_unrecognized_extension_is_skipped() {
        let dir = tempdir().unwrap();
        let fetcher = StaticFetcher::new(&[
            ("http://stat/csv", "table.csv", b"a,b".to_vec()),
            ("http://stat/xls", "table.xls", b"legacy".to_vec()),
        ]);
        let table = spec(
            dir.path(),
            &["http://stat/csv", "http://stat/xls"],
            vec![SheetSelector::All, SheetSelector::Index(2)],
            vec![None, Some(2)],
        );

        let acquired = Acquirer::new(fetcher).acquire_table("T", table);
        assert_eq!(acquired.path, vec![dir.path().join("table.xls")]);
        assert_eq!(acquired.sheet, vec![SheetSelector::Index(2)]);
        assert_eq!(acquired.skip_row, vec![Some(2)]);
    }

    #[test]
    fn test_missing_selector_entry_is_skipped() {
        let dir = tempdir().unwrap();
        let fetcher = StaticFetcher::new(&[
            ("http://stat/a", "a.xlsx", b"a".to_vec()),
            ("http://stat/b", "b.xlsx", b"b".to_vec()),
        ]);
        let table = spec(dir.path(), &["http://stat/a", "http://stat/b"], vec![SheetSelector::All], vec![None]);

        let acquired = Acquirer::new(fetcher).acquire_table("T", table);
        assert_eq!(acquired.path, vec![dir.path().join("a.xlsx")]);
        assert!(acquired.validate_paths("T").is_ok());
    }

    #[test]
    fn test_acquire_resets_previous_paths() {
        let dir = tempdir().unwrap();
        let fetcher = StaticFetcher::new(&[("http://stat/a", "a.xlsx", b"a".to_vec())]);
        let mut first = spec(&dir.path().join("first"), &["http://stat/a"], vec![SheetSelector::All], vec![None]);
        first.path = vec![PathBuf::from("stale.xlsx")];
        let second = spec(&dir.path().join("second"), &["http://stat/gone"], vec![SheetSelector::All], vec![None]);
        let model: JobModel = [("FIRST".to_owned(), first), ("SECOND".to_owned(), second)]
            .into_iter()
            .collect();

        let acquired = Acquirer::new(fetcher).acquire(model);
        assert_eq!(acquired.len(), 2);
        let first = acquired.get("FIRST").unwrap();
        assert_eq!(first.path, vec![dir.path().join("first").join("a.xlsx")]);
        let second = acquired.get("SECOND").unwrap();
        assert!(second.path.is_empty());
        assert!(second.sheet.is_empty());
        assert!(second.skip_row.is_empty());
    }
}
