//! Subscriber setup and per-level message counts for the run summary.

use crate::error::Result;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::Event;
use tracing::Level;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::Context;
use tracing_subscriber::layer::Layer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const LEVELS: [Level; 5] = [Level::ERROR, Level::WARN, Level::INFO, Level::DEBUG, Level::TRACE];

/// Counts the events that pass the filter, by level. Clones share the counts.
#[derive(Clone, Debug, Default)]
pub struct MessageCounter {
    counts: Arc<[AtomicUsize; 5]>,
}

impl MessageCounter {
    fn slot(level: &Level) -> usize {
        LEVELS.iter().position(|known| known == level).unwrap_or(LEVELS.len() - 1)
    }

    pub fn count(&self, level: Level) -> usize {
        self.counts[Self::slot(&level)].load(Ordering::Relaxed)
    }

    /// Levels that saw at least one message, most severe first.
    pub fn counts(&self) -> Vec<(Level, usize)> {
        LEVELS
            .iter()
            .map(|level| (*level, self.count(*level)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for MessageCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.counts[Self::slot(event.metadata().level())].fetch_add(1, Ordering::Relaxed);
    }
}

/// Maps `-v`/`-q` occurrences to a level, `info` being the default.
pub fn verbosity(verbose: u8, quiet: u8) -> LevelFilter {
    match 2 + verbose as i16 - quiet as i16 {
        i16::MIN..=-1 => LevelFilter::OFF,
        0 => LevelFilter::ERROR,
        1 => LevelFilter::WARN,
        2 => LevelFilter::INFO,
        3 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Installs the global subscriber: console output, an optional log file and a
/// [`MessageCounter`]. `RUST_LOG` overrides `level`.
///
/// Keep the returned guard alive until exit, the file writer flushes on drop.
pub fn init_logging(level: LevelFilter, file: Option<&Path>) -> Result<(MessageCounter, Option<WorkerGuard>)> {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let counter = MessageCounter::default();

    let (file_layer, guard) = match file {
        Some(path) => {
            let directory = path.parent().filter(|parent| !parent.as_os_str().is_empty());
            let directory = directory.unwrap_or(Path::new("."));
            fs::create_dir_all(directory)?;
            let name = path.file_name().unwrap_or(path.as_os_str());
            let appender = tracing_appender::rolling::never(directory, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .with(counter.clone())
        .init();
    Ok((counter, guard))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tracing::error;
    use tracing::info;
    use tracing::warn;

    #[test]
    fn test_counter_counts_by_level() {
        let counter = MessageCounter::default();
        let subscriber = tracing_subscriber::registry().with(counter.clone());
        tracing::subscriber::with_default(subscriber, || {
            info!("one");
            warn!("two");
            error!("three");
            error!("four");
        });

        assert_eq!(counter.count(Level::ERROR), 2);
        assert_eq!(counter.count(Level::DEBUG), 0);
        assert_eq!(
            counter.counts(),
            vec![(Level::ERROR, 2), (Level::WARN, 1), (Level::INFO, 1)]
        );
    }

    #[rstest]
    #[case(0, 0, LevelFilter::INFO)]
    #[case(1, 0, LevelFilter::DEBUG)]
    #[case(5, 0, LevelFilter::TRACE)]
    #[case(0, 1, LevelFilter::WARN)]
    #[case(0, 3, LevelFilter::OFF)]
    fn test_verbosity(#[case] verbose: u8, #[case] quiet: u8, #[case] expected: LevelFilter) {
        assert_eq!(verbosity(verbose, quiet), expected);
    }
}
