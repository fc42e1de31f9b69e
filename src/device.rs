//! Collaborators on the device side: command sinks, canned stubs, and the
//! firmware update history
//!
//! Each capability has a live and a simulated implementation. Which one is
//! used is decided once when the dispatcher is built; nothing downstream
//! branches on it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::command::{Command, UpdateMethod};
use crate::config::{SinkConfig, SinkKind};

/// Receives device commands, fire-and-forget
///
/// Called from both the frame loop and the voice listener, so implementations
/// must tolerate concurrent `send` calls. Delivery failures are handled (and
/// swallowed) inside the sink.
pub trait DeviceCommandSink: Send + Sync {
    fn send(&self, command: &Command);
}

/// Sink that only records what it was asked to send
#[derive(Debug, Default)]
pub struct SimulatedSink {
    sent: Mutex<Vec<Command>>,
}

impl SimulatedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Command> {
        self.sent.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl DeviceCommandSink for SimulatedSink {
    fn send(&self, command: &Command) {
        info!("[simulated device] {}", command);
        self.sent
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(command.clone());
    }
}

/// Live sink writing one `NAME PAYLOAD` line per command to a device node,
/// pipe, or stdout
pub struct WriterSink {
    out: Mutex<Box<dyn Write + Send>>,
}

impl WriterSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(Box::new(file)))
    }
}

impl DeviceCommandSink for WriterSink {
    fn send(&self, command: &Command) {
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        if let Err(e) = writeln!(out, "{}", command).and_then(|_| out.flush()) {
            warn!("Failed to deliver {}: {}", command, e);
        }
    }
}

/// Pick the sink once, falling back to simulation when the device is missing
pub fn build_sink(config: &SinkConfig) -> Arc<dyn DeviceCommandSink> {
    match config.kind {
        SinkKind::Simulated => Arc::new(SimulatedSink::new()),
        SinkKind::Writer => match &config.path {
            Some(path) => match WriterSink::open(path) {
                Ok(sink) => {
                    info!("Device sink: {}", path.display());
                    Arc::new(sink)
                }
                Err(e) => {
                    warn!(
                        "Device {} unavailable ({}), using simulated sink",
                        path.display(),
                        e
                    );
                    Arc::new(SimulatedSink::new())
                }
            },
            None => Arc::new(WriterSink::new(Box::new(io::stdout()))),
        },
    }
}

/// Zero-argument device queries answered with fixed text
pub trait DeviceStubs: Send + Sync {
    fn battery(&self) -> String;
    fn diagnostics(&self) -> String;
    fn capture(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CannedStubs;

impl DeviceStubs for CannedStubs {
    fn battery(&self) -> String {
        "Battery OK".to_string()
    }

    fn diagnostics(&self) -> String {
        "Diagnostics passed".to_string()
    }

    fn capture(&self) -> String {
        "Photo captured".to_string()
    }
}

/// Append-only record of firmware update attempts
pub trait UpdateLog: Send + Sync {
    fn record(&self, method: UpdateMethod);
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    /// RFC 3339 local time of the attempt
    pub timestamp: String,
    pub method: UpdateMethod,
}

/// Update log stored as JSON lines
#[derive(Debug)]
pub struct JsonlUpdateLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlUpdateLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, record: &UpdateRecord) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }

    /// Read every record back, skipping lines that do not parse
    pub fn read_all(path: &Path) -> io::Result<Vec<UpdateRecord>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping malformed update record: {}", e),
            }
        }
        Ok(records)
    }
}

impl UpdateLog for JsonlUpdateLog {
    fn record(&self, method: UpdateMethod) {
        let record = UpdateRecord {
            timestamp: chrono::Local::now().to_rfc3339(),
            method,
        };
        if let Err(e) = self.append(&record) {
            warn!(
                "Failed to record update in {}: {}",
                self.path.display(),
                e
            );
        }
    }
}

/// In-memory update log for tests and replays
#[derive(Debug, Default)]
pub struct MemoryUpdateLog {
    entries: Mutex<Vec<UpdateMethod>>,
}

impl MemoryUpdateLog {
    pub fn entries(&self) -> Vec<UpdateMethod> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

impl UpdateLog for MemoryUpdateLog {
    fn record(&self, method: UpdateMethod) {
        self.entries
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(method);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulated_sink_records() {
        let sink = SimulatedSink::new();
        sink.send(&Command::new("ZOOM", "IN"));
        sink.send(&Command::new("ZOOM", "OUT"));
        assert_eq!(
            sink.sent(),
            vec![Command::new("ZOOM", "IN"), Command::new("ZOOM", "OUT")]
        );
    }

    #[test]
    fn test_writer_sink_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.txt");
        let sink = WriterSink::open(&path).unwrap();
        sink.send(&Command::new("NIGHT_VISION", "ON"));
        sink.send(&Command::new("RECORD", "START"));
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "NIGHT_VISION ON\nRECORD START\n");
    }

    #[test]
    fn test_build_sink_falls_back_to_simulation() {
        let dir = tempfile::tempdir().unwrap();
        let config = SinkConfig {
            kind: SinkKind::Writer,
            path: Some(dir.path().join("missing").join("dev")),
        };
        // Opening fails because the parent directory does not exist
        let sink = build_sink(&config);
        sink.send(&Command::new("ZOOM", "IN"));
    }

    #[test]
    fn test_jsonl_update_log_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history").join("updates.jsonl");
        let log = JsonlUpdateLog::new(&path);
        log.record(UpdateMethod::Wifi);
        log.record(UpdateMethod::Usb);

        let records = JsonlUpdateLog::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].method, UpdateMethod::Wifi);
        assert_eq!(records[1].method, UpdateMethod::Usb);
        assert!(chrono::DateTime::parse_from_rfc3339(&records[0].timestamp).is_ok());
    }

    #[test]
    fn test_read_missing_history() {
        let dir = tempfile::tempdir().unwrap();
        let records = JsonlUpdateLog::read_all(&dir.path().join("none.jsonl")).unwrap();
        assert!(records.is_empty());
    }
}
