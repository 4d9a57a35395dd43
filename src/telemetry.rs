//! Structured event sink.
//!
//! Every event is mirrored to `tracing` and, when configured, appended as a
//! JSON line to a size-rotated local file and forwarded to a remote
//! collector.  Sink failures are counted and never surface to callers.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex,
};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::{Map, Value};

use crate::config::{RotationConfig, SinkConfig};

/// Append-only JSON-lines file that rolls over once it holds `max_bytes`.
///
/// A rollover shifts every backup up one generation (`app.log.1` becomes
/// `app.log.2` and so on, dropping whatever falls past `keep`) and moves the
/// live file to `app.log.1`.  With `compress` set, backups are gzipped and
/// carry a `.gz` suffix.  `keep == 0` truncates the live file in place.
pub struct RotatingWriter {
    path: PathBuf,
    file: File,
    written: u64,
    policy: RotationConfig,
}

impl RotatingWriter {
    pub fn open(path: &str, rotation: &RotationConfig) -> io::Result<Self> {
        let path = PathBuf::from(path);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            path,
            file,
            written,
            policy: rotation.clone(),
        })
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        if self.policy.max_bytes.is_some_and(|max| self.written >= max) {
            if let Err(e) = self.roll_over() {
                // Keep appending to the oversized file rather than losing lines.
                tracing::warn!(error = %e, path = %self.path.display(), "log rollover failed");
            }
        }
        writeln!(self.file, "{}", line)?;
        self.written += line.len() as u64 + 1;
        Ok(())
    }

    fn generation(&self, n: usize) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(format!(".{}", n));
        if self.policy.compress {
            name.push(".gz");
        }
        PathBuf::from(name)
    }

    fn roll_over(&mut self) -> io::Result<()> {
        let keep = self.policy.keep;
        if keep > 0 {
            for n in (1..keep).rev() {
                let older = self.generation(n);
                if older.exists() {
                    fs::rename(&older, self.generation(n + 1))?;
                }
            }
            let newest = self.generation(1);
            if self.policy.compress {
                let mut gz = GzEncoder::new(File::create(&newest)?, Compression::default());
                gz.write_all(&fs::read(&self.path)?)?;
                gz.finish()?;
            } else {
                fs::rename(&self.path, &newest)?;
            }
        }
        self.file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

/// Forwards JSON lines to a remote HTTP collector without blocking callers.
#[derive(Clone)]
pub struct RemoteCollector {
    url: String,
    client: reqwest::Client,
}

impl RemoteCollector {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn forward(&self, line: String, errors: Arc<AtomicU64>) {
        // Outside a runtime (plain unit tests) the line is dropped.
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let req = self
            .client
            .post(&self.url)
            .header("content-type", "application/json")
            .body(line);
        handle.spawn(async move {
            let failed = match req.send().await {
                Ok(resp) => !resp.status().is_success(),
                Err(_) => true,
            };
            if failed {
                errors.fetch_add(1, Ordering::Relaxed);
            }
        });
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Logging capability handed to the analyzer and handlers.
#[derive(Clone, Default)]
pub struct TelemetrySink {
    writer: Option<Arc<Mutex<RotatingWriter>>>,
    collector: Option<RemoteCollector>,
    lines_total: Arc<AtomicU64>,
    write_errors_total: Arc<AtomicU64>,
}

impl TelemetrySink {
    pub fn new(writer: Option<RotatingWriter>, collector: Option<RemoteCollector>) -> Self {
        Self {
            writer: writer.map(|w| Arc::new(Mutex::new(w))),
            collector,
            lines_total: Arc::new(AtomicU64::new(0)),
            write_errors_total: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Console-only sink.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Resolve the configured sinks.  A log file that cannot be opened is
    /// reported and skipped.
    pub fn from_config(cfg: &SinkConfig) -> Self {
        let writer = match cfg.log_file.as_deref() {
            Some(path) => match RotatingWriter::open(path, &cfg.rotation) {
                Ok(w) => Some(w),
                Err(e) => {
                    tracing::warn!(path=%path, error=%e, "Failed to open LOG_FILE; file logging disabled");
                    None
                }
            },
            None => None,
        };
        let collector = cfg.collector_url.as_deref().map(RemoteCollector::new);
        Self::new(writer, collector)
    }

    pub fn has_file(&self) -> bool {
        self.writer.is_some()
    }

    pub fn has_collector(&self) -> bool {
        self.collector.is_some()
    }

    pub fn info(&self, event: &str, fields: Value) {
        self.emit(Level::Info, event, fields);
    }

    pub fn warn(&self, event: &str, fields: Value) {
        self.emit(Level::Warn, event, fields);
    }

    pub fn error(&self, event: &str, fields: Value) {
        self.emit(Level::Error, event, fields);
    }

    pub fn emit(&self, level: Level, event: &str, fields: Value) {
        match level {
            Level::Info => tracing::info!(target: "telemetry", event, fields = %fields),
            Level::Warn => tracing::warn!(target: "telemetry", event, fields = %fields),
            Level::Error => tracing::error!(target: "telemetry", event, fields = %fields),
        }
        if self.writer.is_none() && self.collector.is_none() {
            return;
        }

        let mut record = Map::new();
        record.insert(
            "ts".into(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );
        record.insert("level".into(), Value::String(level.as_str().into()));
        record.insert("event".into(), Value::String(event.into()));
        if let Value::Object(extra) = fields {
            record.extend(extra);
        } else if !fields.is_null() {
            record.insert("detail".into(), fields);
        }
        let line = Value::Object(record).to_string();

        if let Some(writer) = &self.writer {
            self.write_file_line(writer, &line);
        }
        if let Some(collector) = &self.collector {
            collector.forward(line, self.write_errors_total.clone());
        }
    }

    pub fn lines_total(&self) -> u64 {
        self.lines_total.load(Ordering::Relaxed)
    }

    pub fn write_errors_total(&self) -> u64 {
        self.write_errors_total.load(Ordering::Relaxed)
    }

    fn write_file_line(&self, writer: &Arc<Mutex<RotatingWriter>>, line: &str) {
        let Ok(mut guard) = writer.lock() else {
            self.write_errors_total.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match guard.write_line(line) {
            Ok(_) => {
                self.lines_total.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::warn!(error=%e, "Failed to write log line");
                self.write_errors_total.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
