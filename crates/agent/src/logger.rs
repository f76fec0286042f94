// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Level-filtered multi-sink logger.
//!
//! Debug levels 0/1/2 map to info/debug/trace filters. Backends come
//! from the `logger` option: stderr, a rotating file, and syslog on
//! unix. Disabled levels cost one filter check, so trace calls in hot
//! loops are near-free.

use std::io::Write;
use std::path::{Path, PathBuf};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Keeps background writers alive for the process lifetime.
pub struct LoggerGuard {
    _file: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Sink selection, resolved from configuration.
#[derive(Debug, Clone, Default)]
pub struct LoggerOptions {
    pub backends: Vec<String>,
    pub logfile: Option<PathBuf>,
    /// Max log file size in MB before rotation; zero disables.
    pub maxsize_mb: u64,
    pub facility: String,
    pub color: bool,
    pub debug: u8,
}

fn level_filter(debug: u8) -> &'static str {
    match debug {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Rotate `logfile` to `.old` when it exceeds the size cap.
fn rotate_if_needed(logfile: &Path, maxsize_mb: u64) {
    if maxsize_mb == 0 {
        return;
    }
    let Ok(metadata) = std::fs::metadata(logfile) else {
        return;
    };
    if metadata.len() >= maxsize_mb * 1024 * 1024 {
        let rotated = logfile.with_extension("old");
        let _ = std::fs::rename(logfile, rotated);
    }
}

/// Install the global subscriber.
///
/// A second call is a no-op (tests and reloads), returning a guard
/// with no writers.
pub fn init(options: &LoggerOptions) -> LoggerGuard {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_filter(options.debug)));

    let wants = |backend: &str| {
        options
            .backends
            .iter()
            .any(|b| b.eq_ignore_ascii_case(backend))
    };

    let stderr_layer = (wants("stderr") || options.backends.is_empty()).then(|| {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(options.color)
    });

    let mut file_guard = None;
    let file_layer = options
        .logfile
        .as_deref()
        .filter(|_| wants("file"))
        .and_then(|logfile| {
            rotate_if_needed(logfile, options.maxsize_mb);
            let directory = logfile.parent().unwrap_or(Path::new("."));
            let filename = logfile.file_name()?;
            let appender = tracing_appender::rolling::never(directory, filename);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            file_guard = Some(guard);
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false),
            )
        });

    let syslog_layer = wants("syslog")
        .then(|| syslog_writer(&options.facility))
        .flatten()
        .map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .without_time()
        });

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .with(syslog_layer)
        .try_init();
    if result.is_err() {
        // Already initialized; keep the existing subscriber
        return LoggerGuard { _file: file_guard };
    }

    LoggerGuard { _file: file_guard }
}

#[cfg(unix)]
fn syslog_facility(name: &str) -> syslog::Facility {
    match name.to_uppercase().as_str() {
        "LOG_DAEMON" => syslog::Facility::LOG_DAEMON,
        "LOG_LOCAL0" => syslog::Facility::LOG_LOCAL0,
        "LOG_LOCAL1" => syslog::Facility::LOG_LOCAL1,
        "LOG_LOCAL2" => syslog::Facility::LOG_LOCAL2,
        "LOG_LOCAL3" => syslog::Facility::LOG_LOCAL3,
        "LOG_LOCAL4" => syslog::Facility::LOG_LOCAL4,
        "LOG_LOCAL5" => syslog::Facility::LOG_LOCAL5,
        "LOG_LOCAL6" => syslog::Facility::LOG_LOCAL6,
        "LOG_LOCAL7" => syslog::Facility::LOG_LOCAL7,
        _ => syslog::Facility::LOG_USER,
    }
}

#[cfg(unix)]
fn syslog_writer(facility: &str) -> Option<SyslogWriter> {
    let formatter = syslog::Formatter3164 {
        facility: syslog_facility(facility),
        hostname: None,
        process: crate::PROVIDER.to_lowercase(),
        pid: std::process::id() as _,
    };
    match syslog::unix(formatter) {
        Ok(mut logger) => {
            let sink: Box<dyn FnMut(String) + Send> = Box::new(move |message: String| {
                let _ = logger.info(message);
            });
            Some(SyslogWriter(std::sync::Arc::new(parking_lot::Mutex::new(sink))))
        }
        Err(e) => {
            eprintln!("can't connect to syslog: {e}");
            None
        }
    }
}

#[cfg(not(unix))]
fn syslog_writer(_facility: &str) -> Option<SyslogWriter> {
    None
}

#[cfg(unix)]
#[derive(Clone)]
struct SyslogWriter(std::sync::Arc<parking_lot::Mutex<Box<dyn FnMut(String) + Send>>>);

#[cfg(not(unix))]
#[derive(Clone)]
struct SyslogWriter;

#[cfg(unix)]
impl Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let message = String::from_utf8_lossy(buf);
        let message = message.trim_end();
        if !message.is_empty() {
            (*self.0.lock())(message.to_string());
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(not(unix))]
impl Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[cfg(unix)]
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[cfg(not(unix))]
impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for SyslogWriter {
    type Writer = SyslogWriter;

    fn make_writer(&'a self) -> Self::Writer {
        SyslogWriter
    }
}

#[cfg(test)]
#[path = "logger_tests.rs"]
mod tests;
