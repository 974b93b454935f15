//! Log output for an Ultros process.
//!
//! [`UltrosBuilder::build`](crate::UltrosBuilder::build) installs a global
//! `tracing` subscriber from the `[logging]` table of `ultros.toml`:
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "pretty"
//! output = "file"
//! file_path = "logs/ultros.log"
//!
//! [logging.filters]
//! ultros_network_irc = "trace"
//!
//! [logging.span_events]
//! new = true
//! close = true
//! ```
//!
//! `RUST_LOG` replaces the configured level; the per-target filters still
//! apply on top of it. Event firing runs in one span per identifier, so the
//! span events above show each handler list being run.

use std::ffi::OsStr;
use std::path::Path;

use tracing::warn;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogOutput, LoggingConfig, SpanEventConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the subscriber described by `config`, unless one is already
/// installed. Several `Ultros` instances in one process share the first.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = try_init(config);
}

/// Installs the subscriber described by `config`.
///
/// Fails if a global subscriber is already set.
pub fn try_init(config: &LoggingConfig) -> Result<(), TryInitError> {
    let (writer, missing_file) = make_writer(config);

    tracing_subscriber::registry()
        .with(fmt_layer(config, writer))
        .with(build_filter(config))
        .try_init()?;

    if missing_file {
        warn!("Log output is 'file' but no file_path is set; logging to stdout");
    }
    Ok(())
}

fn fmt_layer(config: &LoggingConfig, writer: BoxMakeWriter) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(writer)
        .with_span_events(span_events(&config.span_events))
        .with_thread_ids(config.thread_ids)
        .with_file(config.file_location)
        .with_line_number(config.file_location);

    match config.format {
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().boxed(),
        LogFormat::Full => layer.boxed(),
        #[cfg(feature = "json-log")]
        LogFormat::Json => layer.json().boxed(),
        #[cfg(not(feature = "json-log"))]
        LogFormat::Json => layer.boxed(),
    }
}

/// The writer for `config.output`, and whether a file was asked for
/// without a path.
fn make_writer(config: &LoggingConfig) -> (BoxMakeWriter, bool) {
    match (config.output, &config.file_path) {
        (LogOutput::Stdout, _) => (BoxMakeWriter::new(std::io::stdout), false),
        (LogOutput::Stderr, _) => (BoxMakeWriter::new(std::io::stderr), false),
        (LogOutput::File, Some(path)) => {
            let appender = tracing_appender::rolling::never(
                path.parent().unwrap_or_else(|| Path::new(".")),
                path.file_name().unwrap_or_else(|| OsStr::new("ultros.log")),
            );
            (BoxMakeWriter::new(appender), false)
        }
        (LogOutput::File, None) => (BoxMakeWriter::new(std::io::stdout), true),
    }
}

fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    for directive in directives(config) {
        match directive.parse() {
            Ok(parsed) => filter = filter.add_directive(parsed),
            Err(err) => eprintln!("Ignoring invalid log filter '{directive}': {err}"),
        }
    }
    filter
}

/// `target=level` directives from `config.filters`, sorted by target.
fn directives(config: &LoggingConfig) -> Vec<String> {
    let mut filters: Vec<_> = config.filters.iter().collect();
    filters.sort_unstable_by_key(|(target, _)| target.as_str());
    filters
        .into_iter()
        .map(|(target, level)| format!("{target}={level}"))
        .collect()
}

fn span_events(config: &SpanEventConfig) -> FmtSpan {
    [
        (config.new, FmtSpan::NEW),
        (config.enter, FmtSpan::ENTER),
        (config.exit, FmtSpan::EXIT),
        (config.close, FmtSpan::CLOSE),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(FmtSpan::NONE, |span, (_, flag)| span | flag)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_filters_become_sorted_directives() {
        let config = LoggingConfig {
            level: LogLevel::Warn,
            filters: HashMap::from([
                ("ultros_network_irc".to_owned(), LogLevel::Trace),
                ("ultros_core".to_owned(), LogLevel::Debug),
            ]),
            ..Default::default()
        };

        assert_eq!(
            directives(&config),
            vec!["ultros_core=debug", "ultros_network_irc=trace"]
        );
    }

    #[test]
    fn test_span_event_flags() {
        let lifecycle = SpanEventConfig {
            new: true,
            close: true,
            ..Default::default()
        };
        assert_eq!(span_events(&lifecycle), FmtSpan::NEW | FmtSpan::CLOSE);
        assert_eq!(span_events(&SpanEventConfig::default()), FmtSpan::NONE);
    }

    #[test]
    fn test_file_output_without_path_falls_back() {
        let mut config = LoggingConfig {
            output: LogOutput::File,
            ..Default::default()
        };
        assert!(make_writer(&config).1);

        let dir = tempfile::tempdir().unwrap();
        config.file_path = Some(dir.path().join("ultros.log"));
        assert!(!make_writer(&config).1);
    }
}
