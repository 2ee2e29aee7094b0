//! # CSV File Sink
//!
//! Append-only CSV log with a durability barrier on every record.
//!
//! ## Guarantees
//!
//! - **Never rewrites records**: an existing file is continued, its header kept.
//! - **Header once**: written only when the file is new or empty.
//! - **Durable appends**: `append` returns `Ok` only after `sync_data`.
//! - **No torn records**: a failed write is rolled back to the last committed
//!   length, and a partial trailing line left by an earlier crash is cut off
//!   before anything new is written.

use crate::{RecordSink, SinkError, SinkMetadata, SinkState};
use stage_types::{header_line, is_header, parse_record, PositionSample};
use std::fmt::Debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Bytes scanned per step when looking for the last complete line
const TAIL_CHUNK: u64 = 4096;

/// How `open` found the target file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// File was new (or empty) and received a header
    Created,
    /// Existing records were kept and new ones go after them
    Continued,
}

/// Append-mode file handle the sink writes through
pub trait DurableFile: Write + Send + Debug {
    /// Flush written data to stable storage
    fn persist(&mut self) -> io::Result<()>;

    /// Flush data and metadata to stable storage
    fn persist_all(&mut self) -> io::Result<()>;

    /// Cut the file back to `len` bytes
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl DurableFile for File {
    fn persist(&mut self) -> io::Result<()> {
        self.sync_data()
    }

    fn persist_all(&mut self) -> io::Result<()> {
        self.sync_all()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

/// Write `bytes` and sync; on any failure cut the file back to `committed_len`
fn write_durably<F: DurableFile>(file: &mut F, bytes: &[u8], committed_len: u64) -> io::Result<()> {
    let result = file.write_all(bytes).and_then(|_| file.persist());
    if result.is_err() {
        if let Err(e) = file.truncate(committed_len) {
            warn!("Failed to roll back partial record: {}", e);
        }
    }
    result
}

/// Durable CSV sink backed by a single append-mode file
#[derive(Debug)]
pub struct CsvFileSink<F: DurableFile = File> {
    path: PathBuf,
    file: Option<F>,
    mode: OpenMode,
    committed_len: u64,
    records_written: u64,
    records_failed: u64,
    last_error: Option<String>,
}

impl CsvFileSink {
    /// Open `path` for appending, creating parent directories as needed
    ///
    /// A trailing line without a newline can only come from a write that was
    /// never acknowledged, so it is cut off and the file keeps only complete
    /// records.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if path.file_name().is_none() {
            return Err(SinkError::InvalidPath(format!(
                "{} does not name a file",
                path.display()
            )));
        }

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| SinkError::io("create directory", parent, e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| SinkError::io("open", &path, e))?;

        let mut len = file
            .metadata()
            .map_err(|e| SinkError::io("stat", &path, e))?
            .len();

        if len > 0 {
            let complete = complete_prefix_len(&mut file, len)
                .map_err(|e| SinkError::io("read tail", &path, e))?;
            if complete < len {
                warn!(
                    "⚠️ {} ends with an incomplete line ({} bytes); discarding it",
                    path.display(),
                    len - complete
                );
                file.set_len(complete)
                    .and_then(|_| file.sync_all())
                    .map_err(|e| SinkError::io("repair tail", &path, e))?;
                len = complete;
            }
        }

        let mode = if len == 0 {
            let header = format!("{}\n", header_line());
            file.write_all(header.as_bytes())
                .and_then(|_| file.sync_all())
                .map_err(|e| SinkError::io("write header", &path, e))?;
            info!("📝 Created new log file: {}", path.display());
            OpenMode::Created
        } else {
            check_header(&mut file, &path)?;
            info!("📝 Appending to existing log file: {}", path.display());
            OpenMode::Continued
        };

        let committed_len = file
            .metadata()
            .map_err(|e| SinkError::io("stat", &path, e))?
            .len();

        Ok(Self::with_file(path, file, mode, committed_len))
    }
}

impl<F: DurableFile> CsvFileSink<F> {
    fn with_file(path: PathBuf, file: F, mode: OpenMode, committed_len: u64) -> Self {
        Self {
            path,
            file: Some(file),
            mode,
            committed_len,
            records_written: 0,
            records_failed: 0,
            last_error: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    /// Records appended through this handle
    pub fn records_written(&self) -> u64 {
        self.records_written
    }
}

/// Length of the file up to and including its last newline
fn complete_prefix_len(file: &mut File, len: u64) -> io::Result<u64> {
    let mut buf = vec![0u8; TAIL_CHUNK as usize];
    let mut end = len;
    while end > 0 {
        let start = end.saturating_sub(TAIL_CHUNK);
        let chunk = &mut buf[..(end - start) as usize];
        file.seek(SeekFrom::Start(start))?;
        file.read_exact(chunk)?;
        if let Some(i) = chunk.iter().rposition(|b| *b == b'\n') {
            return Ok(start + i as u64 + 1);
        }
        end = start;
    }
    Ok(0)
}

/// Warn when an existing file starts with something other than our header
fn check_header(file: &mut File, path: &Path) -> Result<(), SinkError> {
    let mut first_line = String::new();
    file.seek(SeekFrom::Start(0))
        .and_then(|_| BufReader::new(&*file).take(TAIL_CHUNK).read_line(&mut first_line))
        .map_err(|e| SinkError::io("read header", path, e))?;
    if !is_header(&first_line) {
        warn!(
            "⚠️ {} does not start with the expected header; appending anyway",
            path.display()
        );
    }
    Ok(())
}

impl<F: DurableFile> RecordSink for CsvFileSink<F> {
    fn append(&mut self, sample: &PositionSample) -> Result<(), SinkError> {
        let file = self.file.as_mut().ok_or(SinkError::Closed)?;

        let mut line = sample.to_record();
        line.push('\n');

        match write_durably(file, line.as_bytes(), self.committed_len) {
            Ok(()) => {
                self.committed_len += line.len() as u64;
                self.records_written += 1;
                debug!("Appended record {}", self.records_written);
                Ok(())
            }
            Err(e) => {
                self.records_failed += 1;
                let error = SinkError::io("append", &self.path, e);
                self.last_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    fn close(&mut self) -> Result<(), SinkError> {
        if let Some(mut file) = self.file.take() {
            file.persist_all()
                .map_err(|e| SinkError::io("close", &self.path, e))?;
            info!("Closed log file: {}", self.path.display());
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    fn metadata(&self) -> SinkMetadata {
        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let state = if self.is_closed() {
            SinkState::Closed
        } else {
            SinkState::Open
        };

        SinkMetadata {
            records_written: self.records_written,
            records_failed: self.records_failed,
            last_error: self.last_error.clone(),
            ..SinkMetadata::new(name, "csv-file")
                .with_endpoint(self.path.display().to_string())
                .with_state(state)
        }
    }
}

impl<F: DurableFile> Drop for CsvFileSink<F> {
    fn drop(&mut self) {
        if self.file.is_some() {
            debug!("Log file {} dropped without close", self.path.display());
            let _ = self.close();
        }
    }
}

/// Parsed contents of a log file
#[derive(Debug, Default)]
pub struct LogContents {
    /// Number of header lines found anywhere in the file
    pub header_count: usize,
    /// Well-formed records, in file order
    pub records: Vec<PositionSample>,
    /// 1-based line numbers that were neither a header nor a record
    pub malformed_lines: Vec<usize>,
}

/// Read a log file back for verification
pub fn read_log(path: impl AsRef<Path>) -> Result<LogContents, SinkError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| SinkError::io("open", path, e))?;

    let mut contents = LogContents::default();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| SinkError::io("read", path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        if is_header(&line) {
            contents.header_count += 1;
            continue;
        }
        match parse_record(&line) {
            Ok(sample) => contents.records.push(sample),
            Err(_) => contents.malformed_lines.push(index + 1),
        }
    }

    Ok(contents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::sample_with_x;
    use tempfile::tempdir;

    #[test]
    fn test_new_file_gets_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.csv");

        let mut sink = CsvFileSink::open(&path).unwrap();
        assert_eq!(sink.mode(), OpenMode::Created);
        sink.append(&sample_with_x(1.5)).unwrap();
        sink.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], header_line());
        assert!(lines[1].contains(",1.5,"));
        assert!(text.ends_with('\n'));
    }

    #[test]
    fn test_reopen_continues_without_second_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.csv");

        let mut first = CsvFileSink::open(&path).unwrap();
        first.append(&sample_with_x(1.0)).unwrap();
        first.append(&sample_with_x(2.0)).unwrap();
        first.close().unwrap();

        let mut second = CsvFileSink::open(&path).unwrap();
        assert_eq!(second.mode(), OpenMode::Continued);
        second.append(&sample_with_x(3.0)).unwrap();
        second.close().unwrap();

        let log = read_log(&path).unwrap();
        assert_eq!(log.header_count, 1);
        assert!(log.malformed_lines.is_empty());
        let xs: Vec<f64> = log.records.iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("c").join("positions.csv");

        let mut sink = CsvFileSink::open(&path).unwrap();
        sink.close().unwrap();

        assert!(path.exists());
        assert_eq!(read_log(&path).unwrap().header_count, 1);
    }

    #[test]
    fn test_empty_existing_file_gets_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.csv");
        File::create(&path).unwrap();

        let sink = CsvFileSink::open(&path).unwrap();
        assert_eq!(sink.mode(), OpenMode::Created);
        drop(sink);

        assert_eq!(fs::read_to_string(&path).unwrap(), format!("{}\n", header_line()));
    }

    #[test]
    fn test_torn_tail_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.csv");
        {
            let mut sink = CsvFileSink::open(&path).unwrap();
            sink.append(&sample_with_x(1.0)).unwrap();
            sink.close().unwrap();
        }
        let intact_len = fs::metadata(&path).unwrap().len();

        // Simulate a crash in the middle of a write
        let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(b"1970-01-01T00:00:00.000+00:00,4.2,0").unwrap();
        drop(raw);

        let mut sink = CsvFileSink::open(&path).unwrap();
        assert_eq!(sink.mode(), OpenMode::Continued);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);
        sink.append(&sample_with_x(2.0)).unwrap();
        sink.close().unwrap();

        let log = read_log(&path).unwrap();
        assert_eq!(log.header_count, 1);
        assert!(log.malformed_lines.is_empty());
        let xs: Vec<f64> = log.records.iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![1.0, 2.0]);
    }

    #[test]
    fn test_torn_header_is_rewritten() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.csv");
        fs::write(&path, "timestamp,x,y").unwrap();

        let mut sink = CsvFileSink::open(&path).unwrap();
        assert_eq!(sink.mode(), OpenMode::Created);
        sink.append(&sample_with_x(1.0)).unwrap();
        sink.close().unwrap();

        let log = read_log(&path).unwrap();
        assert_eq!(log.header_count, 1);
        assert!(log.malformed_lines.is_empty());
        assert_eq!(log.records.len(), 1);
    }

    #[test]
    fn test_long_torn_tail_spanning_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.csv");
        {
            let mut sink = CsvFileSink::open(&path).unwrap();
            sink.append(&sample_with_x(1.0)).unwrap();
            sink.close().unwrap();
        }
        let intact_len = fs::metadata(&path).unwrap().len();
        let mut raw = OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(&vec![b'9'; 3 * TAIL_CHUNK as usize]).unwrap();
        drop(raw);

        let sink = CsvFileSink::open(&path).unwrap();
        drop(sink);
        assert_eq!(fs::metadata(&path).unwrap().len(), intact_len);
    }

    #[test]
    fn test_foreign_header_is_kept() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.csv");
        fs::write(&path, "time,a,b\n").unwrap();

        let mut sink = CsvFileSink::open(&path).unwrap();
        assert_eq!(sink.mode(), OpenMode::Continued);
        sink.append(&sample_with_x(7.0)).unwrap();
        sink.close().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("time,a,b\n"));
        assert_eq!(read_log(&path).unwrap().records.len(), 1);
    }

    #[test]
    fn test_close_is_idempotent_and_blocks_appends() {
        let dir = tempdir().unwrap();
        let mut sink = CsvFileSink::open(dir.path().join("positions.csv")).unwrap();

        sink.close().unwrap();
        sink.close().unwrap();
        assert!(sink.is_closed());
        assert!(matches!(sink.append(&sample_with_x(1.0)), Err(SinkError::Closed)));
        assert_eq!(sink.metadata().state, SinkState::Closed);
    }

    #[test]
    fn test_directory_path_rejected() {
        let dir = tempdir().unwrap();
        assert!(CsvFileSink::open(dir.path().join("..")).is_err());
    }

    #[test]
    fn test_metadata_tracks_writes() {
        let dir = tempdir().unwrap();
        let mut sink = CsvFileSink::open(dir.path().join("positions.csv")).unwrap();
        sink.append(&sample_with_x(1.0)).unwrap();

        let metadata = sink.metadata();
        assert_eq!(metadata.name, "positions.csv");
        assert_eq!(metadata.sink_type, "csv-file");
        assert_eq!(metadata.records_written, 1);
        assert_eq!(metadata.state, SinkState::Open);
    }

    /// File wrapper that fails on demand after writing part of the buffer
    #[derive(Debug)]
    struct FlakyFile {
        file: File,
        failures: usize,
        partial_bytes: usize,
        fail_sync: bool,
    }

    impl FlakyFile {
        fn new(file: File) -> Self {
            Self {
                file,
                failures: 0,
                partial_bytes: 0,
                fail_sync: false,
            }
        }
    }

    impl Write for FlakyFile {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.failures > 0 && !self.fail_sync {
                self.failures -= 1;
                let n = self.partial_bytes.min(buf.len());
                self.file.write_all(&buf[..n])?;
                return Err(io::Error::other("device full"));
            }
            self.file.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            self.file.flush()
        }
    }

    impl DurableFile for FlakyFile {
        fn persist(&mut self) -> io::Result<()> {
            if self.failures > 0 && self.fail_sync {
                self.failures -= 1;
                return Err(io::Error::other("device full"));
            }
            self.file.sync_data()
        }

        fn persist_all(&mut self) -> io::Result<()> {
            self.file.sync_all()
        }

        fn truncate(&mut self, len: u64) -> io::Result<()> {
            self.file.set_len(len)
        }
    }

    /// Open `path` through the real sink, then reattach it to a `FlakyFile`
    fn flaky_sink(path: &Path) -> (CsvFileSink<FlakyFile>, u64) {
        let mut sink = CsvFileSink::open(path).unwrap();
        sink.close().unwrap();
        let committed = fs::metadata(path).unwrap().len();
        let raw = OpenOptions::new().append(true).open(path).unwrap();
        let sink = CsvFileSink::with_file(
            path.to_path_buf(),
            FlakyFile::new(raw),
            OpenMode::Continued,
            committed,
        );
        (sink, committed)
    }

    fn flaky(sink: &mut CsvFileSink<FlakyFile>) -> &mut FlakyFile {
        sink.file.as_mut().unwrap()
    }

    #[test]
    fn test_partial_write_is_rolled_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.csv");
        let (mut sink, _) = flaky_sink(&path);

        sink.append(&sample_with_x(1.0)).unwrap();
        let committed = fs::metadata(&path).unwrap().len();
        assert_eq!(sink.committed_len, committed);

        flaky(&mut sink).failures = 1;
        flaky(&mut sink).partial_bytes = 12;
        let result = sink.append(&sample_with_x(2.0));
        assert!(matches!(result, Err(SinkError::Io { operation: "append", .. })));
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);
        assert_eq!(sink.committed_len, committed);

        let metadata = sink.metadata();
        assert_eq!(metadata.records_written, 1);
        assert_eq!(metadata.records_failed, 1);
        assert!(metadata.last_error.unwrap().contains("device full"));
        assert_eq!(metadata.state, SinkState::Open);

        sink.append(&sample_with_x(3.0)).unwrap();
        sink.close().unwrap();

        let log = read_log(&path).unwrap();
        assert_eq!(log.header_count, 1);
        assert!(log.malformed_lines.is_empty());
        let xs: Vec<f64> = log.records.iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![1.0, 3.0]);
    }

    #[test]
    fn test_failed_sync_is_rolled_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("positions.csv");
        let (mut sink, committed) = flaky_sink(&path);

        flaky(&mut sink).fail_sync = true;
        flaky(&mut sink).failures = 1;
        assert!(sink.append(&sample_with_x(1.0)).is_err());
        assert_eq!(fs::metadata(&path).unwrap().len(), committed);
        assert_eq!(sink.metadata().records_failed, 1);

        sink.append(&sample_with_x(2.0)).unwrap();
        sink.close().unwrap();

        let log = read_log(&path).unwrap();
        assert!(log.malformed_lines.is_empty());
        let xs: Vec<f64> = log.records.iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![2.0]);
        assert_eq!(sink.metadata().state, SinkState::Closed);
    }
}
