use anyhow::Context;
use anyhow::Result;
use clap::crate_description;
use clap::crate_name;
use clap::crate_version;
use clap::Parser;
use clap::Subcommand;
use sheet_crawler::config::Settings;
use sheet_crawler::job::store::JobFormat;
use std::path::PathBuf;

/// CLI options
#[derive(Parser, Debug)]
#[command(name = crate_name!(), version = crate_version!(), about = crate_description!())]
pub struct Opts {
    /// JSON settings file, overridden by the options below.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,
    /// Directory holding the job files.
    #[arg(short = 'j', long)]
    pub jobs: Option<PathBuf>,
    /// DuckDB database file.
    #[arg(short = 'd', long)]
    pub database: Option<PathBuf>,
    /// Job file format, guessed from the extension by default.
    #[arg(short = 'F', long, value_enum)]
    pub format: Option<JobFormat>,
    /// Character set values are re-encoded with before insertion.
    #[arg(long)]
    pub charset: Option<String>,
    /// Chat webhook receiving the run summary.
    #[arg(long, env = "CRAWLER_WEBHOOK")]
    pub webhook: Option<String>,
    /// Also write the log to this file.
    #[arg(short = 'l', long)]
    pub log_file: Option<PathBuf>,
    /// Download timeout in seconds.
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,
    /// More output, repeat for more.
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
    /// Less output, repeat for less.
    #[arg(short = 'q', long, action = clap::ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Download, build and load every queued table (default).
    Run,
    /// Print the tables of a job file, or of the whole job directory.
    Show {
        file: Option<PathBuf>,
    },
    /// Remove every job file from the job directory.
    Clear,
    /// Rewrite a job file in another format.
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Output format, guessed from the output extension by default.
        #[arg(long, value_enum)]
        to: Option<JobFormat>,
    },
}

impl Opts {
    /// Settings from `--config`, then the command line on top.
    pub fn settings(&self) -> Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::load(path).with_context(|| format!("Loading settings from {}", path.display()))?,
            None => Settings::default(),
        };
        if let Some(jobs) = &self.jobs {
            settings.jobs_dir = jobs.clone();
        }
        if let Some(database) = &self.database {
            settings.database = database.clone();
        }
        if self.format.is_some() {
            settings.format = self.format;
        }
        if let Some(charset) = &self.charset {
            settings.charset = charset.clone();
        }
        if self.webhook.is_some() {
            settings.webhook = self.webhook.clone();
        }
        if self.log_file.is_some() {
            settings.log_file = self.log_file.clone();
        }
        if self.timeout.is_some() {
            settings.timeout = self.timeout;
        }
        Ok(settings)
    }
}
