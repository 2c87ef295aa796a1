//! Command line driver: runs the crawler over a job directory, or inspects and
//! maintains its job files.

mod cli;

use crate::cli::Command;
use crate::cli::Opts;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use sheet_crawler::fetch::HttpFetcher;
use sheet_crawler::job::store::clear_jobs;
use sheet_crawler::job::store::queue_jobs;
use sheet_crawler::job::store::read_job_model;
use sheet_crawler::job::store::save_job_model;
use sheet_crawler::job::store::JobFormat;
use sheet_crawler::logging::init_logging;
use sheet_crawler::logging::verbosity;
use sheet_crawler::pipeline::Pipeline;
use sheet_crawler::storage::DuckDbStorage;
use tracing::info;
use tracing::trace;

fn main() -> Result<()> {
    let opts = Opts::parse();
    let settings = opts.settings()?;
    let (counter, _guard) = init_logging(verbosity(opts.verbose, opts.quiet), settings.log_file.as_deref())?;
    trace!("Logging initialised.");

    match opts.command.unwrap_or(Command::Run) {
        Command::Run => {
            let fetcher = HttpFetcher::new(settings.timeout())?;
            let storage = DuckDbStorage::open(&settings.database)
                .with_context(|| format!("Opening database {}", settings.database.display()))?;
            let notifier = settings.notification_sink()?;
            let mut pipeline = Pipeline::new(settings, fetcher, storage, notifier, counter);
            let summary = pipeline.run()?;
            if summary.failed > 0 {
                info!("{} tables failed, see the log above", summary.failed);
            }
        }
        Command::Show { file } => {
            let model = match file {
                Some(file) => read_job_model(&file, settings.format)?,
                None => queue_jobs(&settings.jobs_dir, settings.format)?,
            };
            println!("{model}");
        }
        Command::Clear => {
            let removed = clear_jobs(&settings.jobs_dir)?;
            info!("{removed} job files removed from {}", settings.jobs_dir.display());
        }
        Command::Convert { input, output, to } => {
            let model = read_job_model(&input, settings.format)?;
            let format = JobFormat::detect(&output, to)?;
            save_job_model(&model, &output, format)?;
            info!("{} tables written to {}", model.len(), output.display());
        }
    }
    Ok(())
}
