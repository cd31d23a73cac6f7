//! Logging.
//!
//! Diagnostics always go to standard error. Standard output is reserved for the data a command produces, such as the
//! incident stream of `dominos run`.

use std::fmt;

use chrono::Utc;
use tracing::{field, level_filters::LevelFilter, Event, Subscriber};
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt as _,
    registry::LookupSpan,
    util::SubscriberInitExt as _,
    EnvFilter, Layer,
};

const LOG_LEVEL_ENV_VAR: &str = "DOMINOS_LOG_LEVEL";
const LOG_FORMAT_JSON_ENV_VAR: &str = "DOMINOS_LOG_FORMAT_JSON";

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// This function reads the `DOMINOS_LOG_LEVEL` environment variable to determine the log level to use. If the
/// environment variable is not set, `default_level` is used, or `INFO` if that is not set either. Additionally, it
/// reads the `DOMINOS_LOG_FORMAT_JSON` environment variable to determine which output format to use. If it is set to
/// `true` or `1`, the logs will be formatted as JSON. Otherwise, the logs are written in a compact, pipe-separated,
/// human-readable format.
///
/// # Errors
///
/// If the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(default_level: Option<LevelFilter>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let is_json = std::env::var(LOG_FORMAT_JSON_ENV_VAR)
        .map(|s| is_enabled(&s))
        .unwrap_or(false);

    let level_filter = EnvFilter::builder()
        .with_default_directive(default_level.unwrap_or(LevelFilter::INFO).into())
        .with_env_var(LOG_LEVEL_ENV_VAR)
        .from_env_lossy();

    if is_json {
        tracing_subscriber::registry()
            .with(initialize_tracing_json().with_filter(level_filter))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(initialize_tracing_pretty().with_filter(level_filter))
            .try_init()?;
    }

    Ok(())
}

fn is_enabled(raw: &str) -> bool {
    let raw = raw.trim().to_lowercase();
    raw == "true" || raw == "1"
}

fn initialize_tracing_json<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .json()
        .flatten_event(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
}

fn initialize_tracing_pretty<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .event_format(PipeFormatter)
        .with_writer(std::io::stderr)
}

/// Formats events as `<time> | DOMINOS | <level> | (<file>:<line>) | <fields> | <message>`.
///
/// The fields and message sections are left out when the event has none.
struct PipeFormatter;

impl<S, N> FormatEvent<S, N> for PipeFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let metadata = event.metadata();

        write!(
            writer,
            "{} | DOMINOS | {} | ",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            metadata.level()
        )?;

        match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => write!(writer, "({}:{})", file, line)?,
            _ => write!(writer, "(unknown:0)")?,
        }

        let mut fields = EventFields::default();
        event.record(&mut fields);

        if !fields.pairs.is_empty() {
            write!(writer, " | {}", fields.pairs.join(","))?;
        }
        if let Some(message) = fields.message {
            write!(writer, " | {}", message)?;
        }

        writeln!(writer)
    }
}

/// Fields of a single event, rendered to text.
///
/// `message` is kept apart since it is written at the end of the line, after every `key:value` pair.
#[derive(Default)]
struct EventFields {
    pairs: Vec<String>,
    message: Option<String>,
}

impl EventFields {
    fn push(&mut self, field: &field::Field, value: String) {
        if field.name() == "message" {
            self.message = Some(value);
        } else {
            self.pairs.push(format!("{}:{}", field.name(), value));
        }
    }
}

impl field::Visit for EventFields {
    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &field::Field, value: &str) {
        self.push(field, value.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use tracing_subscriber::fmt::MakeWriter;

    use super::*;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[test]
    fn json_flag_parsing() {
        assert!(is_enabled("true"));
        assert!(is_enabled(" TRUE "));
        assert!(is_enabled("1"));
        assert!(!is_enabled("json"));
        assert!(!is_enabled("0"));
        assert!(!is_enabled(""));
    }

    #[test]
    fn pipe_format_puts_message_last() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::Layer::new()
                .event_format(PipeFormatter)
                .with_writer(captured.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(root = "db", blast_radius = 3, "Sending incident.");
        });

        let line = captured.contents();
        assert!(line.contains(" | DOMINOS | INFO | ("), "unexpected line: {}", line);
        assert!(
            line.trim_end().ends_with(" | root:db,blast_radius:3 | Sending incident."),
            "unexpected line: {}",
            line
        );
    }

    #[test]
    fn pipe_format_omits_empty_sections() {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::registry().with(
            tracing_subscriber::fmt::Layer::new()
                .event_format(PipeFormatter)
                .with_writer(captured.clone()),
        );

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!("Simulation was interrupted.");
            tracing::warn!(ticks = 4);
        });

        let contents = captured.contents();
        let lines = contents.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2, "unexpected output: {}", contents);
        assert!(lines[0].ends_with(") | Simulation was interrupted."), "unexpected line: {}", lines[0]);
        assert!(lines[1].ends_with(") | ticks:4"), "unexpected line: {}", lines[1]);
    }
}
