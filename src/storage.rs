//! Destination tables for resolved data.

use crate::error::Result;
use duckdb::params_from_iter;
use duckdb::Connection;
use encoding_rs::Encoding;
use std::path::Path;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub trait Storage {
    /// Deletes every row of `table`; a table that does not exist yet is left alone.
    fn purge(&mut self, table: &str) -> Result<()>;

    /// Inserts `rows` ordered as `columns` and returns how many were stored.
    /// Values are passed through `charset` first; rows that cannot be stored are skipped.
    fn bulk_insert(&mut self, table: &str, columns: &[String], rows: &[Vec<String>], charset: &str) -> Result<usize>;

    fn count_rows(&mut self, table: &str) -> Result<usize>;
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Keeps only what `encoding` can represent, unmappable characters become references.
fn reencode(value: &str, encoding: &'static Encoding) -> (String, bool) {
    let (bytes, _, replaced) = encoding.encode(value);
    let (text, _, _) = encoding.decode(&bytes);
    (text.into_owned(), replaced)
}

/// DuckDB database storing every column as VARCHAR.
pub struct DuckDbStorage {
    connection: Connection,
}

impl DuckDbStorage {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(DuckDbStorage {
            connection: Connection::open(path)?,
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(DuckDbStorage {
            connection: Connection::open_in_memory()?,
        })
    }

    fn exists(&self, table: &str) -> Result<bool> {
        let count: i64 = self.connection.query_row(
            "SELECT count(*) FROM information_schema.tables WHERE table_name = ?",
            [table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn create(&self, table: &str, columns: &[String]) -> Result<()> {
        let definitions = columns
            .iter()
            .map(|column| format!("{} VARCHAR", quote_identifier(column)))
            .collect::<Vec<_>>()
            .join(", ");
        self.connection.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} ({definitions})",
            quote_identifier(table)
        ))?;
        Ok(())
    }

    /// Inserts every row in one transaction, nothing is stored on error.
    fn insert_batch(&mut self, sql: &str, batch: &[(usize, Vec<String>)]) -> duckdb::Result<usize> {
        let transaction = self.connection.transaction()?;
        let mut inserted = 0;
        {
            let mut statement = transaction.prepare(sql)?;
            for (_, values) in batch {
                inserted += statement.execute(params_from_iter(values.iter()))?;
            }
        }
        transaction.commit()?;
        Ok(inserted)
    }

    /// Inserts rows one at a time, logging and skipping the ones the database refuses.
    fn insert_rows(&mut self, table: &str, sql: &str, batch: &[(usize, Vec<String>)]) -> Result<usize> {
        let mut statement = self.connection.prepare(sql)?;
        let mut inserted = 0;
        for (index, values) in batch {
            match statement.execute(params_from_iter(values.iter())) {
                Ok(count) => inserted += count,
                Err(error) => warn!("{table}: row {index} skipped: {error}"),
            }
        }
        Ok(inserted)
    }
}

impl Storage for DuckDbStorage {
    fn purge(&mut self, table: &str) -> Result<()> {
        if self.exists(table)? {
            let deleted = self.connection.execute(&format!("DELETE FROM {}", quote_identifier(table)), [])?;
            debug!("{table}: {deleted} rows deleted");
        }
        Ok(())
    }

    #[tracing::instrument(skip(self, columns, rows))]
    fn bulk_insert(&mut self, table: &str, columns: &[String], rows: &[Vec<String>], charset: &str) -> Result<usize> {
        let encoding = Encoding::for_label(charset.as_bytes()).unwrap_or_else(|| {
            warn!("Unknown charset '{charset}', using utf-8");
            encoding_rs::UTF_8
        });
        self.create(table, columns)?;

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            columns.iter().map(|column| quote_identifier(column)).collect::<Vec<_>>().join(", "),
            vec!["?"; columns.len()].join(", ")
        );
        let mut batch: Vec<(usize, Vec<String>)> = Vec::with_capacity(rows.len());
        for (index, row) in rows.iter().enumerate() {
            if row.len() != columns.len() {
                warn!("{table}: row {index} has {} values for {} columns, skipped", row.len(), columns.len());
                continue;
            }
            let values = row
                .iter()
                .map(|value| {
                    let (text, replaced) = reencode(value, encoding);
                    if replaced {
                        debug!("{table}: row {index} has characters outside {}", encoding.name());
                    }
                    text
                })
                .collect();
            batch.push((index, values));
        }

        let inserted = match self.insert_batch(&sql, &batch) {
            Ok(inserted) => inserted,
            Err(error) => {
                // A failed statement aborts the whole DuckDB transaction, so retry row by row.
                debug!("{table}: batch insert failed ({error}), retrying row by row");
                self.insert_rows(table, &sql, &batch)?
            }
        };
        info!("{table}: {inserted} rows inserted");
        Ok(inserted)
    }

    fn count_rows(&mut self, table: &str) -> Result<usize> {
        let count: i64 = self
            .connection
            .query_row(&format!("SELECT count(*) FROM {}", quote_identifier(table)), [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        vec!["Code".to_owned(), "Name \"short\"".to_owned()]
    }

    fn rows(values: &[&[&str]]) -> Vec<Vec<String>> {
        values
            .iter()
            .map(|row| row.iter().map(|value| value.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("OKED"), "\"OKED\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_insert_and_count() {
        let mut storage = DuckDbStorage::open_in_memory().unwrap();
        storage.purge("CODES").unwrap();
        let inserted = storage
            .bulk_insert("CODES", &columns(), &rows(&[&["01", "Сельское хозяйство"], &["02", ""]]), "utf-8")
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(storage.count_rows("CODES").unwrap(), 2);
    }

    #[test]
    fn test_purge_then_reload() {
        let mut storage = DuckDbStorage::open_in_memory().unwrap();
        storage.bulk_insert("CODES", &columns(), &rows(&[&["01", "a"]]), "utf-8").unwrap();
        storage.purge("CODES").unwrap();
        storage.purge("CODES").unwrap();
        assert_eq!(storage.count_rows("CODES").unwrap(), 0);
        storage.bulk_insert("CODES", &columns(), &rows(&[&["02", "b"]]), "utf-8").unwrap();
        assert_eq!(storage.count_rows("CODES").unwrap(), 1);
    }

    #[test]
    fn test_ragged_rows_are_skipped() {
        let mut storage = DuckDbStorage::open_in_memory().unwrap();
        let inserted = storage
            .bulk_insert("CODES", &columns(), &rows(&[&["01", "a"], &["02"], &["03", "c"]]), "utf-8")
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(storage.count_rows("CODES").unwrap(), 2);
    }

    #[test]
    fn test_refused_rows_are_skipped() {
        let mut storage = DuckDbStorage::open_in_memory().unwrap();
        storage
            .connection
            .execute_batch("CREATE TABLE \"CODES\" (\"Code\" INTEGER, \"Name \"\"short\"\"\" VARCHAR)")
            .unwrap();
        let inserted = storage
            .bulk_insert("CODES", &columns(), &rows(&[&["1", "a"], &["x", "b"], &["3", "c"]]), "utf-8")
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(storage.count_rows("CODES").unwrap(), 2);
    }

    #[test]
    fn test_reencode_replaces_unmappable() {
        let (text, replaced) = reencode("Алматы", encoding_rs::WINDOWS_1251);
        assert_eq!(text, "Алматы");
        assert!(!replaced);

        let (text, replaced) = reencode("Ə", encoding_rs::WINDOWS_1251);
        assert_ne!(text, "Ə");
        assert!(replaced);
    }
}
