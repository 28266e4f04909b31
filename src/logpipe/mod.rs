//! Asynchronous log pipeline.
//!
//! Any number of producer threads post messages through a cloneable
//! [`LogSink`] without blocking; a single consumer thread (the
//! [`LogServer`]) dequeues them in enqueue order and writes them to the log
//! file, optionally echoing to the console.
//!
//! Draining rides the same FIFO queue as the messages: the coordinator posts
//! a sentinel, so every message enqueued before it is written — in order,
//! exactly once — before the consumer exits. Messages posted concurrently
//! with or after the sentinel may be dropped; nothing before it ever is.

use crate::error::ChassisError;
use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Verbose,
}

#[derive(Debug, Clone)]
pub struct LogMessage {
    pub when: DateTime<Local>,
    pub severity: Severity,
    pub text: String,
}

pub(crate) enum LogEvent {
    Record(LogMessage),
    SetEcho(bool),
    Drain,
}

/// Producer handle onto the log queue. Cheap to clone; posting never blocks.
#[derive(Clone)]
pub struct LogSink {
    tx: Sender<LogEvent>,
    verbose: Arc<AtomicBool>,
    open: Arc<AtomicBool>,
}

impl LogSink {
    pub fn post(&self, severity: Severity, text: impl Into<String>) {
        // Fire-and-forget: after drain the receiver goes away and sends
        // simply drop, per the pipeline's past-the-boundary contract.
        let _ = self.tx.send(LogEvent::Record(LogMessage {
            when: Local::now(),
            severity,
            text: text.into(),
        }));
    }

    pub fn info(&self, text: impl Into<String>) {
        self.post(Severity::Info, text);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.post(Severity::Warning, text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.post(Severity::Error, text);
    }

    /// Posted only when verbose logging is asserted.
    pub fn verbose(&self, text: impl Into<String>) {
        if self.is_verbose() {
            self.post(Severity::Verbose, text);
        }
    }

    pub fn is_verbose(&self) -> bool {
        self.verbose.load(Ordering::Relaxed)
    }

    pub fn set_verbose(&self, on: bool) {
        self.verbose.store(on, Ordering::Relaxed);
    }

    /// Whether the log file behind the pipeline is open.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    /// Flip console echo on the writer. Travels the queue like any message so
    /// it applies in enqueue order.
    pub(crate) fn set_echo(&self, on: bool) {
        let _ = self.tx.send(LogEvent::SetEcho(on));
    }

    pub(crate) fn drain(&self) {
        let _ = self.tx.send(LogEvent::Drain);
    }

    pub(crate) fn mark_closed(&self) {
        self.open.store(false, Ordering::Relaxed);
    }
}

/// Build the queue. Returns the producer sink and the consumer's receiver.
pub(crate) fn log_channel(file_open: bool) -> (LogSink, Receiver<LogEvent>) {
    let (tx, rx) = unbounded();
    (
        LogSink {
            tx,
            verbose: Arc::new(AtomicBool::new(false)),
            open: Arc::new(AtomicBool::new(file_open)),
        },
        rx,
    )
}

/// The file half of the pipeline: owned by the consumer thread after start.
pub struct LogWriter {
    file: Option<BufWriter<File>>,
    echo: bool,
}

impl LogWriter {
    /// Open the log file. The caller treats failure as non-fatal and falls
    /// back to [`LogWriter::closed`].
    pub fn open(path: &Path) -> crate::Result<Self> {
        let file = File::create(path).map_err(|source| ChassisError::LogOpen {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self {
            file: Some(BufWriter::new(file)),
            echo: false,
        })
    }

    /// A writer with no backing file: echo-only or fully silent.
    pub fn closed() -> Self {
        Self {
            file: None,
            echo: false,
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn set_echo(&mut self, on: bool) {
        self.echo = on;
    }

    fn write(&mut self, message: &LogMessage) {
        let line = format!(
            "{} {:<7} {}",
            message.when.format("%Y-%m-%d %H:%M:%S%.3f"),
            message.severity,
            message.text
        );
        if let Some(file) = self.file.as_mut() {
            let _ = writeln!(file, "{line}");
        }
        if self.echo {
            println!("{line}");
        }
    }

    /// Flush and release the file.
    pub fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            let _ = file.flush();
        }
    }
}

/// The single consumer. `run` is the service-thread entry point; it returns
/// the writer so the coordinator can close the file after joining.
pub struct LogServer {
    rx: Receiver<LogEvent>,
    writer: LogWriter,
}

impl LogServer {
    pub(crate) fn new(rx: Receiver<LogEvent>, writer: LogWriter) -> Self {
        Self { rx, writer }
    }

    pub fn run(mut self) -> LogWriter {
        loop {
            match self.rx.recv() {
                Ok(LogEvent::Record(message)) => self.writer.write(&message),
                Ok(LogEvent::SetEcho(on)) => self.writer.set_echo(on),
                // Every producer handle dropping is as final as a drain.
                Ok(LogEvent::Drain) | Err(_) => break,
            }
        }
        if let Some(file) = self.writer.file.as_mut() {
            let _ = file.flush();
        }
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline_to(path: &Path) -> (LogSink, std::thread::JoinHandle<LogWriter>) {
        let writer = LogWriter::open(path).unwrap();
        let (sink, rx) = log_channel(true);
        let server = LogServer::new(rx, writer);
        let handle = std::thread::Builder::new()
            .name("log-server".into())
            .spawn(move || server.run())
            .unwrap();
        (sink, handle)
    }

    #[test]
    fn messages_are_delivered_in_enqueue_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let (sink, handle) = pipeline_to(&path);

        for i in 0..200 {
            sink.info(format!("message {i}"));
        }
        sink.drain();
        let mut writer = handle.join().unwrap();
        writer.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 200);
        for (i, line) in lines.iter().enumerate() {
            assert!(line.ends_with(&format!("message {i}")), "line {i}: {line}");
        }
    }

    #[test]
    fn nothing_enqueued_before_drain_is_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let (sink, handle) = pipeline_to(&path);

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let sink = sink.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        sink.info(format!("producer {p} message {i}"));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }

        // All 200 sends happened before the drain sentinel.
        sink.drain();
        let mut writer = handle.join().unwrap();
        writer.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 200);
        // Per-producer order survives interleaving.
        for p in 0..4 {
            let positions: Vec<usize> = contents
                .lines()
                .enumerate()
                .filter(|(_, line)| line.contains(&format!("producer {p} ")))
                .map(|(index, _)| index)
                .collect();
            assert_eq!(positions.len(), 50);
            assert!(positions.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn failed_file_degrades_without_panicking() {
        let (sink, rx) = log_channel(false);
        let server = LogServer::new(rx, LogWriter::closed());
        let handle = std::thread::spawn(move || server.run());

        assert!(!sink.is_open());
        sink.warn("no file behind this");
        sink.drain();
        let writer = handle.join().unwrap();
        assert!(!writer.is_open());
    }

    #[test]
    fn verbose_posts_are_gated() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let (sink, handle) = pipeline_to(&path);

        sink.verbose("dropped");
        sink.set_verbose(true);
        sink.verbose("kept");
        sink.drain();
        let mut writer = handle.join().unwrap();
        writer.close();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("kept"));
    }
}
