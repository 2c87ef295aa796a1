//! # Sheet Crawler
//!
//! Batch acquisition of spreadsheets published by statistics offices.
//!
//! A job names, for every destination table, the source URLs, the sheet and the
//! number of leading rows to skip in each downloaded workbook, and the column
//! layout of the result. A run then:
//!
//! - **queues** every job file of a directory ([`job::store::queue_jobs`]),
//! - **acquires** the files, unpacking `.rar` and `.zip` archives ([`acquire::Acquirer`]),
//! - **builds** one text table per job entry from `.xls` and `.xlsx` workbooks,
//!   cutting the data at the first blank index cell ([`builder::TableBuilder`]),
//! - **loads** the table into DuckDB and checks the stored row count ([`pipeline::Pipeline`]).
//!
//! Failures are contained per URL during acquisition and per table afterwards, so
//! one broken source never stops a run.

pub mod acquire;
pub mod archive;
pub mod builder;
pub mod config;
pub mod error;
pub mod fetch;
mod helpers;
pub mod job;
pub mod logging;
pub mod notify;
pub mod pipeline;
pub mod spreadsheet;
pub mod storage;

pub use error::CrawlerError;
pub use error::Result;
pub use job::JobModel;
pub use job::SheetSelector;
pub use job::TableSpec;
