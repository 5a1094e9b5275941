//! A plain-text CSV log with fixed-width row formatting.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::SystemTime;

use crossbeam::channel::{Receiver, Sender, unbounded};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::controller::context::ControllerCtx;

use super::{LogRecord, LogSink, Overflow, csv_header, csv_row_fixed_width};

/// A plain-text CSV log target, which uses a pre-sized file
/// to prevent sudden increases in write latency during file resizing.
///
/// On reaching the end of the configured data size, it can be configured to either
/// * Wrap (and start overwriting the existing data from the beginning),
/// * Start a new file, or
/// * Error
///
/// Each line is fixed-width, so a given trigger can be found by arithmetic
/// on the line length rather than by reading the whole file.
///
/// Writes to disk on a separate thread so that appending never waits on the disk.
#[derive(Serialize, Deserialize, Debug)]
pub struct CsvLogSink {
    /// Size per file
    pub chunk_size_megabytes: usize,

    /// Choice of behavior when the current file is full
    pub overflow_behavior: Overflow,

    #[serde(skip)]
    worker: Option<WorkerHandle>,
}

impl Default for CsvLogSink {
    fn default() -> Self {
        Self::new(100, Overflow::Wrap)
    }
}

impl CsvLogSink {
    pub fn new(chunk_size_megabytes: usize, overflow_behavior: Overflow) -> Self {
        Self {
            chunk_size_megabytes,
            overflow_behavior,
            worker: None,
        }
    }
}

#[typetag::serde]
impl LogSink for CsvLogSink {
    fn open(&mut self, ctx: &ControllerCtx) -> Result<(), String> {
        // Shut down any existing worker
        self.close()?;

        let filepath = ctx.op_dir.join(format!("{}.csv", ctx.op_name));
        let total_size = 1024 * 1_000 * self.chunk_size_megabytes;
        let header = csv_header();
        if total_size <= header.len() {
            return Err(format!(
                "CSV chunk of {} MB cannot hold any rows",
                self.chunk_size_megabytes
            ));
        }

        self.worker = Some(WorkerHandle::new(
            filepath.clone(),
            header,
            total_size,
            self.overflow_behavior,
        )?);
        info!("Logging triggers to {filepath:?}");
        Ok(())
    }

    fn append(
        &mut self,
        timestamp_ns: i64,
        label: &str,
        value_a: f32,
        value_b: f32,
    ) -> Result<(), String> {
        let worker = self
            .worker
            .as_ref()
            .ok_or_else(|| "CSV log must be opened before appending".to_string())?;
        let record = LogRecord {
            timestamp_ns,
            label: label.to_owned(),
            value_a,
            value_b,
        };
        worker
            .tx
            .send((SystemTime::now(), record))
            .map_err(|_| "CSV writer thread has stopped".to_string())
    }

    fn close(&mut self) -> Result<(), String> {
        match self.worker.take() {
            Some(worker) => worker.finish(),
            None => Ok(()),
        }
    }
}

#[derive(Debug)]
struct WorkerHandle {
    tx: Sender<(SystemTime, LogRecord)>,
    thread: JoinHandle<Result<(), String>>,
}

impl WorkerHandle {
    fn new(
        path: PathBuf,
        header: String,
        total_size: usize,
        overflow_behavior: Overflow,
    ) -> Result<Self, String> {
        let (tx, rx) = unbounded();

        // Allocate the first file here so that failures surface at open
        let writer = new_file(&path, &header, total_size)?;
        let header_len = header.len();
        let mut worker = CsvWorker {
            path,
            header,
            total_size,
            overflow_behavior,
            writer,
            shard_number: 0,
            cursor: header_len,
            wrapped: false,
        };

        let thread = thread::Builder::new()
            .name("csv-log".to_string())
            .spawn(move || worker.run(rx))
            .map_err(|e| format!("Failed to spawn CSV writer thread: {e}"))?;

        Ok(Self { tx, thread })
    }

    /// Hang up on the worker and wait for it to flush and truncate its file.
    fn finish(self) -> Result<(), String> {
        drop(self.tx);
        self.thread
            .join()
            .map_err(|_| "CSV writer thread panicked".to_string())?
    }
}

struct CsvWorker {
    path: PathBuf,
    header: String,
    total_size: usize,
    overflow_behavior: Overflow,
    writer: BufWriter<File>,
    shard_number: u64,
    /// Byte offset of the next row in the current file
    cursor: usize,
    wrapped: bool,
}

impl CsvWorker {
    fn run(&mut self, rx: Receiver<(SystemTime, LogRecord)>) -> Result<(), String> {
        // Single-line buffer that keeps the largest line length seen
        let mut stringbuf = String::new();
        let result = rx
            .iter()
            .try_for_each(|(time, record)| self.write_row(&mut stringbuf, time, &record));

        if let Err(e) = &result {
            warn!("CSV writer stopping: {e}");
        }
        self.truncate()?;
        result
    }

    fn write_row(
        &mut self,
        stringbuf: &mut String,
        time: SystemTime,
        record: &LogRecord,
    ) -> Result<(), String> {
        csv_row_fixed_width(stringbuf, time, record);

        // Make sure there is space in the file
        let n_to_write = stringbuf.len();
        if self.cursor + n_to_write > self.total_size {
            match self.overflow_behavior {
                Overflow::Wrap => {
                    self.writer
                        .seek(SeekFrom::Start(self.header.len() as u64))
                        .map_err(|e| format!("Failed to wrap CSV log: {e}"))?;
                    self.cursor = self.header.len();
                    self.wrapped = true;
                }
                Overflow::Error => {
                    return Err(format!(
                        "CSV log {:?} is full with `Error` overflow behavior selected",
                        self.path
                    ));
                }
                Overflow::NewFile => {
                    self.truncate()?;
                    self.shard_number += 1;
                    let stem = self
                        .path
                        .file_stem()
                        .and_then(|s| s.to_str())
                        .ok_or_else(|| format!("Invalid CSV log path {:?}", self.path))?;
                    let path_new = self
                        .path
                        .with_file_name(format!("{stem}_{}.csv", self.shard_number));
                    self.writer = new_file(&path_new, &self.header, self.total_size)?;
                    self.cursor = self.header.len();
                    self.wrapped = false;
                }
            }
        }

        self.writer
            .write_all(stringbuf.as_bytes())
            .map_err(|e| format!("Failed to write CSV log: {e}"))?;
        self.cursor += n_to_write;
        Ok(())
    }

    /// Flush and cut the preallocated file down to what was written.
    /// After a wrap, older rows past the cursor are kept.
    fn truncate(&mut self) -> Result<(), String> {
        self.writer
            .flush()
            .map_err(|e| format!("Failed to flush CSV log: {e}"))?;
        if !self.wrapped {
            self.writer
                .get_mut()
                .set_len(self.cursor as u64)
                .map_err(|e| format!("Failed to truncate CSV log: {e}"))?;
        }
        Ok(())
    }
}

/// Create a new file with a fixed length, and return a buffered writer
fn new_file(path: &Path, header: &str, total_size: usize) -> Result<BufWriter<File>, String> {
    let file = File::create(path).map_err(|e| format!("Failed to create {path:?}: {e}"))?;
    file.set_len(total_size as u64)
        .map_err(|e| format!("Failed to preallocate {path:?}: {e}"))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(header.as_bytes())
        .map_err(|e| format!("Failed to write header to {path:?}: {e}"))?;
    Ok(writer)
}
