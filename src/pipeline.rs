//! A full run: queue jobs, acquire, build and load every table.

use crate::acquire::Acquirer;
use crate::builder::TableBuilder;
use crate::config::Settings;
use crate::error::CrawlerError;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::job::store::queue_jobs;
use crate::job::TableSpec;
use crate::logging::MessageCounter;
use crate::notify::NotificationSink;
use crate::storage::Storage;
use std::fmt;
use std::time::Duration;
use std::time::Instant;
use tracing::error;
use tracing::info;
use tracing::Level;

/// Outcome of [`Pipeline::run`], rendered as the end-of-run message.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub tables: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
    /// Messages logged during the run, per level.
    pub counts: Vec<(Level, usize)>,
}

/// `H:MM:SS.ffffff`, the fraction omitted when zero.
fn format_elapsed(elapsed: Duration) -> String {
    let seconds = elapsed.as_secs();
    let micros = elapsed.subsec_micros();
    let clock = format!("{}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60);
    if micros == 0 {
        clock
    } else {
        format!("{clock}.{micros:06}")
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Jobs Complete!")?;
        writeln!(f, "{} of {} tables loaded", self.succeeded, self.tables)?;
        for (level, count) in &self.counts {
            writeln!(f, "{level}: {count}")?;
        }
        write!(f, "time elapsed: {}", format_elapsed(self.elapsed))
    }
}

pub struct Pipeline<F: Fetcher, S: Storage> {
    settings: Settings,
    acquirer: Acquirer<F>,
    builder: TableBuilder,
    storage: S,
    notifier: NotificationSink,
    counter: MessageCounter,
}

impl<F: Fetcher, S: Storage> Pipeline<F, S> {
    pub fn new(settings: Settings, fetcher: F, storage: S, notifier: NotificationSink, counter: MessageCounter) -> Self {
        Pipeline {
            settings,
            acquirer: Acquirer::new(fetcher),
            builder: TableBuilder,
            storage,
            notifier,
            counter,
        }
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Processes every queued table in name order. A failing table is logged and
    /// the run moves on; only an unreadable job directory aborts it.
    #[tracing::instrument(skip(self), fields(jobs = %self.settings.jobs_dir.display()))]
    pub fn run(&mut self) -> Result<RunSummary> {
        let started = Instant::now();
        let model = queue_jobs(&self.settings.jobs_dir, self.settings.format)?;
        let model = self.acquirer.acquire(model);

        let mut succeeded = 0;
        let mut failed = 0;
        for (name, spec) in &model {
            match self.load_table(name, spec) {
                Ok(rows) => {
                    info!("{name}: {rows} rows loaded");
                    succeeded += 1;
                }
                Err(error) => {
                    error!("{name}: {error}");
                    failed += 1;
                }
            }
        }

        let summary = RunSummary {
            tables: model.len(),
            succeeded,
            failed,
            elapsed: started.elapsed(),
            counts: self.counter.counts(),
        };
        info!("{summary}");
        self.notifier.send(&summary.to_string());
        Ok(summary)
    }

    fn load_table(&mut self, name: &str, spec: &TableSpec) -> Result<usize> {
        self.storage.purge(name)?;
        let table = self.builder.build(name, spec)?;
        self.storage
            .bulk_insert(name, &table.columns, &table.rows, &self.settings.charset)?;
        let stored = self.storage.count_rows(name)?;
        if stored != table.len() {
            return Err(CrawlerError::RowIntegrity {
                table: name.to_owned(),
                expected: table.len(),
                actual: stored,
            });
        }
        Ok(stored)
    }
}
