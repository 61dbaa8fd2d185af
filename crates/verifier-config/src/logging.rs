use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};

use serde::{Deserialize, Serialize};
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// A simple level (`info`, `debug`, ...) or full `EnvFilter` directives.
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    #[serde(default = "LoggingConfig::default_stderr")]
    pub stderr: bool,

    /// Appends logs to this file. If it cannot be opened, the other sinks stay active.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Target prefix shared by every verifier crate (`verifier_cache`, ...).
const VERIFIER_TARGETS: &str = "verifier";
/// Verbosity for everything else (HTTP client, thread pools) when a simple
/// level is configured.
const DEPENDENCY_LEVEL: &str = "warn";

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_owned()
    }

    fn default_stderr() -> bool {
        true
    }

    /// `EnvFilter` directives for the configured level.
    ///
    /// A simple level at `info` or finer applies to the verifier crates only;
    /// dependencies stay at `warn`. Coarser levels apply everywhere. Anything
    /// that is not a simple level is used as raw directives.
    pub(crate) fn level_directives(&self) -> String {
        let configured = self.level.trim();
        let level = if configured.is_empty() {
            Self::default_level()
        } else {
            configured.to_ascii_lowercase()
        };
        match level.as_str() {
            "trace" | "debug" | "info" => format!("{DEPENDENCY_LEVEL},{VERIFIER_TARGETS}={level}"),
            "warn" | "warning" => "warn".to_owned(),
            "error" | "off" => level,
            _ => configured.to_owned(),
        }
    }

    /// The filter for [`init_tracing`]. `RUST_LOG` directives are appended to
    /// the configured ones; if the combination does not parse, `RUST_LOG`
    /// alone is tried, then the configuration alone.
    pub fn env_filter(&self) -> EnvFilter {
        let configured = self.level_directives();
        let mut candidates = Vec::with_capacity(3);
        if let Ok(from_env) = std::env::var("RUST_LOG") {
            let from_env = from_env.trim();
            if !from_env.is_empty() {
                candidates.push(format!("{configured},{from_env}"));
                candidates.push(from_env.to_owned());
            }
        }
        candidates.push(configured);
        candidates
            .into_iter()
            .find_map(|directives| EnvFilter::try_new(directives).ok())
            .unwrap_or_else(|| EnvFilter::new(format!("{DEPENDENCY_LEVEL},{VERIFIER_TARGETS}=info")))
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            json: false,
            stderr: Self::default_stderr(),
            file: None,
        }
    }
}

struct FileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> MakeWriter<'a> for FileMakeWriter {
    type Writer = FileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        FileWriter {
            guard: self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
        }
    }
}

struct FileWriter<'a> {
    guard: std::sync::MutexGuard<'a, std::fs::File>,
}

impl Write for FileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

static TRACING_INIT: Once = Once::new();

/// Installs the global `tracing` subscriber.
///
/// Safe to call more than once; only the first call has an effect. Returns
/// `false` when a subscriber was already installed (by an earlier call or by
/// someone else).
pub fn init_tracing(config: &LoggingConfig) -> bool {
    let mut installed = false;
    TRACING_INIT.call_once(|| {
        let filter = config.env_filter();

        let file = config.file.as_ref().and_then(|path| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .ok()
        });
        let file_open_failed = config.file.is_some() && file.is_none();

        let mut make_writer = BoxMakeWriter::new(io::sink);
        if config.stderr {
            // `TestWriter` goes through the test harness's output capture.
            make_writer = if cfg!(debug_assertions) {
                BoxMakeWriter::new(make_writer.and(tracing_subscriber::fmt::writer::TestWriter::with_stderr))
            } else {
                BoxMakeWriter::new(make_writer.and(io::stderr))
            };
        }
        if let Some(file) = file {
            make_writer = BoxMakeWriter::new(make_writer.and(FileMakeWriter {
                file: Arc::new(Mutex::new(file)),
            }));
        }

        let layer: Box<dyn tracing_subscriber::Layer<_> + Send + Sync> = if config.json {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(make_writer)
                .with_ansi(false)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry().with(filter).with(layer);
        installed = tracing::subscriber::set_global_default(subscriber).is_ok();
        if installed && file_open_failed {
            if let Some(path) = &config.file {
                tracing::warn!(
                    target = "verifier.config",
                    path = %path.display(),
                    "failed to open log file; file logging disabled"
                );
            }
        }
    });
    installed
}
