//! Logging configuration and initialization
//!
//! One tracing `fmt` layer per output (console, file), each built the same
//! way so the JSON switch applies to both. File output goes through a
//! non-blocking writer.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*, Registry};

pub use tracing_appender::non_blocking::WorkerGuard as LogGuard;

type BoxedLayer = Box<dyn tracing_subscriber::Layer<Registry> + Send + Sync>;

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Enable console output (default: true)
    pub console_enabled: bool,
    /// Enable file logging (default: false)
    pub file_enabled: bool,
    /// Path for the log file (default: `hair-recolor.log` in the working directory)
    pub file_path: Option<PathBuf>,
    /// Use JSON format for logs (default: false)
    pub json_format: bool,
    /// Default log level filter (default: "info")
    pub default_level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            console_enabled: true,
            file_enabled: false,
            file_path: None,
            json_format: false,
            default_level: "info".to_string(),
        }
    }
}

/// Formatting layer writing to `writer`. Thread names are always on: every
/// session stage runs on its own named thread.
fn layer(writer: BoxMakeWriter, json: bool, ansi: bool) -> BoxedLayer {
    let layer = fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_thread_names(true)
        .with_ansi(ansi);
    if json {
        layer.json().with_file(true).with_line_number(true).boxed()
    } else {
        layer.compact().boxed()
    }
}

/// Initialize the logging system with the given configuration
///
/// Returns a guard that must be kept alive for the duration of the program
/// so file logging is flushed.
///
/// # Environment Variables
///
/// - `HAIR_RECOLOR_LOG`: log level filter (e.g. "debug", "info,hair_recolor::pipeline=trace")
/// - `HAIR_RECOLOR_LOG_FORMAT`: set to "json" for JSON output
pub fn init_logging(config: &LogConfig) -> Result<Option<LogGuard>, Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_env("HAIR_RECOLOR_LOG")
        .or_else(|_| EnvFilter::try_from_env("RUST_LOG"))
        .unwrap_or_else(|_| EnvFilter::new(&config.default_level));
    let json = std::env::var("HAIR_RECOLOR_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(config.json_format);

    let mut layers: Vec<BoxedLayer> = Vec::new();
    let mut guard = None;
    let file_path = config
        .file_enabled
        .then(|| config.file_path.clone().unwrap_or_else(|| PathBuf::from("hair-recolor.log")));

    if let Some(path) = &file_path {
        let (writer, file_guard) = tracing_appender::non_blocking(std::fs::File::create(path)?);
        layers.push(layer(BoxMakeWriter::new(writer), json, false));
        guard = Some(file_guard);
    }
    if config.console_enabled {
        layers.push(layer(BoxMakeWriter::new(std::io::stdout), json, true));
    }

    tracing_subscriber::registry().with(layers).with(env_filter).try_init()?;

    tracing::info!(
        target: "hair_recolor",
        version = env!("CARGO_PKG_VERSION"),
        json_format = json,
        file = ?file_path,
        "Logging initialized"
    );
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn capture(json: bool) -> String {
        let out = Captured::default();
        let writer = out.clone();
        let subscriber = tracing_subscriber::registry().with(layer(BoxMakeWriter::new(move || writer.clone()), json, false));
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(target: "hair_recolor::session", tier = "full", "Session started");
        });
        out.text()
    }

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert!(config.console_enabled);
        assert!(!config.file_enabled);
        assert!(!config.json_format);
        assert_eq!(config.default_level, "info");
    }

    #[test]
    fn test_log_config_partial_json() {
        let config: LogConfig = serde_json::from_str(r#"{"json_format": true}"#).unwrap();
        assert!(config.json_format);
        assert!(config.console_enabled);
    }

    #[test]
    fn test_json_layer_writes_one_object_per_event() {
        let text = capture(true);
        let line: serde_json::Value = serde_json::from_str(text.lines().next().unwrap()).unwrap();
        assert_eq!(line["level"], "INFO");
        assert_eq!(line["target"], "hair_recolor::session");
        assert_eq!(line["fields"]["message"], "Session started");
        assert_eq!(line["fields"]["tier"], "full");
    }

    #[test]
    fn test_plain_layer_without_ansi() {
        let text = capture(false);
        assert!(text.contains("Session started"));
        assert!(text.contains("hair_recolor::session"));
        assert!(!text.contains('\u{1b}'));
        assert!(!text.trim_start().starts_with('{'));
    }
}
