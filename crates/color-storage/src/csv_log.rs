//! Append-only CSV measurement log.
//!
//! One row per sample, columns `Time,R,G,B,X,Y,Z,L*,a*,b*`. The header is written only
//! when [`DurableLog::configure`] creates the file; reopening an existing file appends
//! after whatever is already there. Every [`DurableLog::append`] flushes before it
//! returns, so a crash loses at most the row being written.

use crate::error::StorageError;
use color_core::ColorSample;
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Column names, in order.
pub const LOG_HEADER: [&str; 10] = ["Time", "R", "G", "B", "X", "Y", "Z", "L*", "a*", "b*"];

/// `chrono` format of the `Time` column (local time, millisecond resolution).
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Formatted on-disk row.
///
/// RGB means keep 3 decimals, everything derived keeps 6.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Formatted local capture time
    pub time: String,
    /// `R,G,B` columns
    pub rgb: [String; 3],
    /// `X,Y,Z` columns
    pub xyz: [String; 3],
    /// `L*,a*,b*` columns
    pub lab: [String; 3],
}

impl LogRecord {
    /// Format a sample.
    #[must_use]
    pub fn from_sample(sample: &ColorSample) -> Self {
        let rgb = sample.rgb();
        let xyz = sample.xyz();
        let lab = sample.lab();
        Self {
            time: sample.timestamp().wall().format(TIME_FORMAT).to_string(),
            rgb: [rgb.r, rgb.g, rgb.b].map(|v| format!("{:.3}", v)),
            xyz: [xyz.x, xyz.y, xyz.z].map(|v| format!("{:.6}", v)),
            lab: [lab.l, lab.a, lab.b].map(|v| format!("{:.6}", v)),
        }
    }

    /// Fields in column order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.time.as_str())
            .chain(self.rgb.iter().map(String::as_str))
            .chain(self.xyz.iter().map(String::as_str))
            .chain(self.lab.iter().map(String::as_str))
    }
}

/// Single-writer CSV log.
///
/// Owned by the acquisition loop. Reconfiguring needs `&mut self`, so it cannot race an
/// in-flight append.
#[derive(Default)]
pub struct DurableLog {
    path: Option<PathBuf>,
    writer: Option<csv::Writer<Box<dyn Write + Send>>>,
    records: u64,
}

impl std::fmt::Debug for DurableLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableLog")
            .field("path", &self.path)
            .field("configured", &self.writer.is_some())
            .field("records", &self.records)
            .finish()
    }
}

impl DurableLog {
    /// Create an unconfigured log. Appends fail until [`configure`](Self::configure).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a log already pointed at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut log = Self::new();
        log.configure(path)?;
        Ok(log)
    }

    /// Point the log at `path`.
    ///
    /// Creates missing parent directories. A file that does not exist yet gets the header
    /// row; an existing file, even an empty one, is appended to as-is. The previous
    /// destination, if any, is flushed and closed first.
    pub fn configure(&mut self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref().to_path_buf();
        self.close();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StorageError::Open {
                path: path.clone(),
                source,
            })?;
        }

        let open_error = |source| StorageError::Open {
            path: path.clone(),
            source,
        };
        let (file, is_new) = match OpenOptions::new().append(true).create_new(true).open(&path) {
            Ok(file) => (file, true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => (
                OpenOptions::new().append(true).open(&path).map_err(open_error)?,
                false,
            ),
            Err(e) => return Err(open_error(e)),
        };

        let mut writer = Self::csv_writer(Box::new(file));
        if is_new {
            writer
                .write_record(LOG_HEADER)
                .map_err(|e| StorageError::write(&path, e))?;
            writer.flush().map_err(|e| StorageError::write(&path, e))?;
        }

        tracing::info!(path = %path.display(), new_file = is_new, "Measurement log configured");
        self.install(path, writer);
        Ok(())
    }

    /// Point the log at an arbitrary writer. `path` only names the destination in errors
    /// and no header is written.
    pub fn configure_writer(&mut self, path: impl Into<PathBuf>, writer: impl Write + Send + 'static) {
        self.close();
        let writer = Self::csv_writer(Box::new(writer));
        self.install(path.into(), writer);
    }

    fn csv_writer(inner: Box<dyn Write + Send>) -> csv::Writer<Box<dyn Write + Send>> {
        csv::WriterBuilder::new().has_headers(false).from_writer(inner)
    }

    fn install(&mut self, path: PathBuf, writer: csv::Writer<Box<dyn Write + Send>>) {
        self.path = Some(path);
        self.writer = Some(writer);
        self.records = 0;
    }

    /// Append one row and flush it.
    pub fn append(&mut self, sample: &ColorSample) -> Result<(), StorageError> {
        let (Some(writer), Some(path)) = (self.writer.as_mut(), self.path.as_deref()) else {
            return Err(StorageError::NotConfigured);
        };
        let record = LogRecord::from_sample(sample);
        writer
            .write_record(record.fields())
            .map_err(|e| StorageError::write(path, e))?;
        writer.flush().map_err(|e| StorageError::write(path, e))?;
        self.records += 1;
        Ok(())
    }

    /// True once a destination is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.writer.is_some()
    }

    /// Active destination.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rows appended since the last `configure`.
    #[must_use]
    pub fn records_written(&self) -> u64 {
        self.records
    }

    /// Flush and release the current destination.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(e) = writer.flush() {
                tracing::warn!(error = %e, "Failed to flush measurement log on close");
            }
        }
        self.path = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_core::{ColorTransform, Rgb, Timestamp};
    use tempfile::TempDir;

    fn sample(v: f64) -> ColorSample {
        ColorSample::from_rgb(Rgb::new(v, v / 2.0, v / 4.0), &ColorTransform::default())
    }

    fn lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_record_precision() {
        let s = sample(100.0);
        let record = LogRecord::from_sample(&s);
        assert_eq!(record.rgb, ["100.000", "50.000", "25.000"]);
        assert_eq!(record.xyz[1], format!("{:.6}", s.xyz().y));
        assert_eq!(record.lab[0], format!("{:.6}", s.lab().l));
        assert_eq!(record.fields().count(), LOG_HEADER.len());
    }

    #[test]
    fn test_time_column_has_millisecond_resolution() {
        let wall = chrono::Local::now();
        let s = ColorSample::captured_at(
            Timestamp::from_parts(std::time::Instant::now(), wall),
            Rgb::new(1.0, 2.0, 3.0),
            &ColorTransform::default(),
        );
        let record = LogRecord::from_sample(&s);
        assert_eq!(record.time, wall.format("%Y-%m-%d %H:%M:%S%.3f").to_string());
        let millis = record.time.rsplit('.').next().unwrap();
        assert_eq!(millis.len(), 3);
    }

    #[test]
    fn test_append_without_configure_fails() {
        let mut log = DurableLog::new();
        assert!(matches!(
            log.append(&sample(1.0)),
            Err(StorageError::NotConfigured)
        ));
    }

    #[test]
    fn test_new_file_gets_one_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("log.csv");

        let mut log = DurableLog::open(&path).unwrap();
        log.append(&sample(10.0)).unwrap();
        log.append(&sample(20.0)).unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "Time,R,G,B,X,Y,Z,L*,a*,b*");
        assert_eq!(lines.iter().filter(|l| l.starts_with("Time")).count(), 1);
        assert_eq!(log.records_written(), 2);
    }

    #[test]
    fn test_reopen_does_not_duplicate_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.csv");

        {
            let mut log = DurableLog::open(&path).unwrap();
            log.append(&sample(1.0)).unwrap();
        }
        let mut log = DurableLog::new();
        log.configure(&path).unwrap();
        log.append(&sample(2.0)).unwrap();
        log.configure(&path).unwrap();
        log.append(&sample(3.0)).unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 4);
        assert_eq!(lines.iter().filter(|l| l.starts_with("Time")).count(), 1);
    }

    #[test]
    fn test_rows_preserve_append_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("order.csv");
        let mut log = DurableLog::open(&path).unwrap();

        for i in 0..50 {
            log.append(&sample(f64::from(i))).unwrap();
        }

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let header: Vec<String> = reader.headers().unwrap().iter().map(String::from).collect();
        assert_eq!(header, LOG_HEADER);
        let reds: Vec<f64> = reader
            .records()
            .map(|r| r.unwrap()[1].parse().unwrap())
            .collect();
        let expected: Vec<f64> = (0..50).map(f64::from).collect();
        assert_eq!(reds, expected);
    }

    #[test]
    fn test_reconfigure_switches_destination() {
        let dir = TempDir::new().unwrap();
        let first = dir.path().join("a.csv");
        let second = dir.path().join("b.csv");

        let mut log = DurableLog::open(&first).unwrap();
        log.append(&sample(1.0)).unwrap();
        log.configure(&second).unwrap();
        log.append(&sample(2.0)).unwrap();

        assert_eq!(log.path(), Some(second.as_path()));
        assert_eq!(lines(&first).len(), 2);
        assert_eq!(lines(&second).len(), 2);
    }

    #[test]
    fn test_unwritable_path_is_a_configuration_error() {
        let dir = TempDir::new().unwrap();
        // a directory cannot be opened as a log file
        let mut log = DurableLog::new();
        let err = log.configure(dir.path()).unwrap_err();
        assert!(matches!(err, StorageError::Open { .. }));
        assert!(!log.is_configured());
    }

    #[test]
    fn test_existing_empty_file_gets_no_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        std::fs::File::create(&path).unwrap();

        let mut log = DurableLog::open(&path).unwrap();
        log.append(&sample(5.0)).unwrap();

        let lines = lines(&path);
        assert_eq!(lines.len(), 1);
        assert!(!lines[0].starts_with("Time"));
    }

    /// Shared buffer whose `n`-th write fails once.
    #[derive(Clone)]
    struct FailingWriter {
        buf: std::sync::Arc<std::sync::Mutex<Vec<u8>>>,
        writes: usize,
        fail_on: usize,
    }

    impl Write for FailingWriter {
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            self.writes += 1;
            if self.writes == self.fail_on {
                return Err(std::io::Error::new(ErrorKind::Other, "disk full"));
            }
            self.buf.lock().unwrap().extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_append_is_reported_and_next_succeeds() {
        let buf = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut log = DurableLog::new();
        log.configure_writer(
            "memory.csv",
            FailingWriter {
                buf: buf.clone(),
                writes: 0,
                fail_on: 2,
            },
        );

        log.append(&sample(1.0)).unwrap();
        let err = log.append(&sample(2.0)).unwrap_err();
        assert!(matches!(err, StorageError::Write { .. }));
        assert!(err.to_string().contains("memory.csv"));
        log.append(&sample(3.0)).unwrap();

        assert_eq!(log.records_written(), 2);
        let text = String::from_utf8(buf.lock().unwrap().clone()).unwrap();
        assert!(text.lines().last().unwrap().contains(",3.000,"));
    }
}
