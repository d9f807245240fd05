//! JSONL telemetry recorder.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bridge::topics;
use crate::bus::Bus;
use crate::config::TelemetryConfig;
use crate::error::{BridgeError, Result};
use crate::msgs::geometry_msgs::TwistStamped;
use crate::msgs::sensor_msgs::{BatteryState, Imu, Range};
use crate::msgs::std_msgs::StringMsg;

const FILE_PREFIX: &str = "telemetry_";
const FILE_EXTENSION: &str = "jsonl";

/// Encoded records waiting for the file writer
const RECORD_QUEUE_SIZE: usize = 256;

/// One line of a telemetry file.
#[derive(Serialize)]
struct TelemetryRecord<'a, T> {
    timestamp: String,
    topic: &'a str,
    message: &'a T,
}

/// Appends telemetry records to size-limited files in one directory.
pub struct TelemetryLogger {
    dir: PathBuf,
    session: String,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    records_in_file: usize,
    file_index: u64,
}

impl std::fmt::Debug for TelemetryLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryLogger")
            .field("dir", &self.dir)
            .field("session", &self.session)
            .field("file_index", &self.file_index)
            .finish_non_exhaustive()
    }
}

impl TelemetryLogger {
    /// Create the log directory if needed. No file is opened until the
    /// first record arrives.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        let dir = PathBuf::from(&config.log_dir);
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            session: Utc::now().format("%Y%m%d_%H%M%S_%6f").to_string(),
            max_records_per_file: config.max_records_per_file.max(1),
            max_files_to_keep: config.max_files_to_keep.max(1),
            writer: None,
            records_in_file: 0,
            file_index: 0,
        })
    }

    /// Directory the files are written to
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append one encoded record, rotating first if the current file is full.
    fn write_line(&mut self, line: &str) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
        }
        self.records_in_file += 1;
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }

        let path = self.dir.join(format!(
            "{}{}_{:06}.{}",
            FILE_PREFIX, self.session, self.file_index, FILE_EXTENSION
        ));
        self.file_index += 1;

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        debug!("Writing telemetry to {}", path.display());
        self.writer = Some(BufWriter::new(file));
        self.records_in_file = 0;

        self.prune()
    }

    /// Delete the oldest telemetry files beyond the retention limit.
    fn prune(&self) -> Result<()> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| is_telemetry_file(path))
            .collect();

        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort_by_cached_key(|path| file_order(path));
        let excess = files.len() - self.max_files_to_keep;
        for path in files.into_iter().take(excess) {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Failed to remove old telemetry file {}: {}", path.display(), e);
            } else {
                debug!("Removed old telemetry file {}", path.display());
            }
        }
        Ok(())
    }
}

/// Session first, then the numeric file index, so index 1000000 sorts
/// after 999999.
fn file_order(path: &Path) -> (String, u64) {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or_default();
    match stem.rsplit_once('_') {
        Some((session, index)) => match index.parse() {
            Ok(index) => (session.to_string(), index),
            Err(_) => (stem.to_string(), 0),
        },
        None => (stem.to_string(), 0),
    }
}

fn encode<T: Serialize>(topic: &str, message: &T) -> Result<String> {
    Ok(serde_json::to_string(&TelemetryRecord {
        timestamp: Utc::now().to_rfc3339(),
        topic,
        message,
    })?)
}

fn is_telemetry_file(path: &Path) -> bool {
    let named = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(FILE_PREFIX));
    let extension = path.extension().and_then(|ext| ext.to_str()) == Some(FILE_EXTENSION);
    named && extension
}

/// Record the scalar telemetry topics until the bus goes away.
///
/// Subscriptions are made before this returns, so nothing published
/// afterwards is missed. Records are encoded on the runtime and written by
/// a blocking task. The task ends with the first write failure.
pub fn spawn_recorder(bus: &Bus, config: &TelemetryConfig) -> Result<JoinHandle<Result<()>>> {
    let mut logger = TelemetryLogger::new(config)?;
    let mut battery = bus.subscribe::<BatteryState>(topics::BATTERY)?;
    let mut imu = bus.subscribe::<Imu>(topics::IMU)?;
    let mut height = bus.subscribe::<Range>(topics::HEIGHT)?;
    let mut velocity = bus.subscribe::<TwistStamped>(topics::VELOCITY)?;
    let mut temperature = bus.subscribe::<StringMsg>(topics::TEMPERATURE)?;

    info!("Recording telemetry to {}", logger.dir().display());

    let (lines, mut pending) = mpsc::channel::<String>(RECORD_QUEUE_SIZE);
    let writer = tokio::task::spawn_blocking(move || {
        while let Some(line) = pending.blocking_recv() {
            logger.write_line(&line)?;
        }
        debug!("Telemetry writer finished");
        Ok::<(), BridgeError>(())
    });

    Ok(tokio::spawn(async move {
        loop {
            let line = tokio::select! {
                Some(msg) = battery.recv() => encode(topics::BATTERY, &msg)?,
                Some(msg) = imu.recv() => encode(topics::IMU, &msg)?,
                Some(msg) = height.recv() => encode(topics::HEIGHT, &msg)?,
                Some(msg) = velocity.recv() => encode(topics::VELOCITY, &msg)?,
                Some(msg) = temperature.recv() => encode(topics::TEMPERATURE, &msg)?,
                else => break,
            };

            // A closed queue means the writer failed; its error is returned below
            if lines.send(line).await.is_err() {
                break;
            }
        }

        drop(lines);
        writer.await.map_err(|e| BridgeError::Io(std::io::Error::other(e)))?
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn config(dir: &Path, max_records: usize, max_files: usize) -> TelemetryConfig {
        TelemetryConfig {
            enabled: true,
            log_dir: dir.to_string_lossy().to_string(),
            max_records_per_file: max_records,
            max_files_to_keep: max_files,
        }
    }

    fn telemetry_files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| is_telemetry_file(path))
            .collect();
        files.sort();
        files
    }

    fn record<T: Serialize>(logger: &mut TelemetryLogger, topic: &str, message: &T) {
        let line = encode(topic, message).unwrap();
        logger.write_line(&line).unwrap();
    }

    fn lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn test_no_file_before_first_record() {
        let dir = tempdir().unwrap();
        let _logger = TelemetryLogger::new(&config(dir.path(), 10, 10)).unwrap();
        assert!(telemetry_files(dir.path()).is_empty());
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let logger = TelemetryLogger::new(&config(&nested, 10, 10)).unwrap();
        assert!(nested.is_dir());
        assert_eq!(logger.dir(), nested.as_path());
    }

    #[test]
    fn test_record_format() {
        let dir = tempdir().unwrap();
        let mut logger = TelemetryLogger::new(&config(dir.path(), 10, 10)).unwrap();
        let battery = BatteryState {
            voltage: 87.0,
            ..BatteryState::default()
        };
        record(&mut logger, topics::BATTERY, &battery);

        let files = telemetry_files(dir.path());
        assert_eq!(files.len(), 1);
        let records = lines(&files[0]);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["topic"], "/tello/battery");
        assert_eq!(records[0]["message"]["voltage"], 87.0);
        assert!(records[0]["timestamp"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn test_rotation_and_retention() {
        let dir = tempdir().unwrap();
        let mut logger = TelemetryLogger::new(&config(dir.path(), 2, 2)).unwrap();
        for i in 0..5 {
            let msg = StringMsg {
                data: i.to_string(),
            };
            record(&mut logger, topics::TEMPERATURE, &msg);
        }

        // Files hold [0, 1], [2, 3], [4]; only the newest two remain
        let files = telemetry_files(dir.path());
        assert_eq!(files.len(), 2);
        let newest: Vec<_> = files
            .iter()
            .flat_map(|path| lines(path))
            .map(|record| record["message"]["data"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(newest, vec!["2", "3", "4"]);
    }

    #[test]
    fn test_other_files_are_left_alone() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        fs::write(dir.path().join("telemetry_old.txt"), "keep me too").unwrap();

        let mut logger = TelemetryLogger::new(&config(dir.path(), 1, 1)).unwrap();
        for _ in 0..3 {
            record(&mut logger, topics::TEMPERATURE, &StringMsg::default());
        }

        assert_eq!(telemetry_files(dir.path()).len(), 1);
        assert!(dir.path().join("notes.txt").exists());
        assert!(dir.path().join("telemetry_old.txt").exists());
    }

    #[test]
    fn test_prune_orders_by_file_index() {
        let dir = tempdir().unwrap();
        for name in [
            "telemetry_20240101_000000_000000_999998.jsonl",
            "telemetry_20240101_000000_000000_999999.jsonl",
            "telemetry_20240101_000000_000000_1000000.jsonl",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }

        let logger = TelemetryLogger::new(&config(dir.path(), 10, 2)).unwrap();
        logger.prune().unwrap();

        let remaining: Vec<_> = telemetry_files(dir.path())
            .iter()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.contains(&"telemetry_20240101_000000_000000_999999.jsonl".to_string()));
        assert!(remaining.contains(&"telemetry_20240101_000000_000000_1000000.jsonl".to_string()));
    }

    #[test]
    fn test_file_order_compares_index_numerically() {
        let older = file_order(Path::new("/logs/telemetry_s_999999.jsonl"));
        let newer = file_order(Path::new("/logs/telemetry_s_1000000.jsonl"));
        assert!(older < newer);

        let earlier_session = file_order(Path::new("/logs/telemetry_a_000005.jsonl"));
        assert!(earlier_session < older);
    }

    #[test]
    fn test_is_telemetry_file() {
        assert!(is_telemetry_file(Path::new("/logs/telemetry_x_000001.jsonl")));
        assert!(!is_telemetry_file(Path::new("/logs/telemetry_x.json")));
        assert!(!is_telemetry_file(Path::new("/logs/other.jsonl")));
    }

    #[tokio::test]
    async fn test_recorder_follows_bus() {
        let dir = tempdir().unwrap();
        let bus = Bus::new();
        let handle = spawn_recorder(&bus, &config(dir.path(), 100, 10)).unwrap();

        let battery = bus.publisher::<BatteryState>(topics::BATTERY, 10).unwrap();
        let height = bus.publisher::<Range>(topics::HEIGHT, 10).unwrap();
        battery.publish(BatteryState {
            voltage: 55.0,
            ..BatteryState::default()
        });
        height.publish(Range {
            range: 1.5,
            ..Range::default()
        });

        let mut records = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if let Some(file) = telemetry_files(dir.path()).first() {
                records = lines(file);
                if records.len() == 2 {
                    break;
                }
            }
        }
        handle.abort();

        let topics: Vec<_> = records
            .iter()
            .map(|record| record["topic"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(records.len(), 2);
        assert!(topics.contains(&"/tello/battery".to_string()));
        assert!(topics.contains(&"/tello/height".to_string()));
    }

    #[tokio::test]
    async fn test_recorder_finishes_when_bus_is_gone() {
        let dir = tempdir().unwrap();
        let bus = Bus::new();
        let handle = spawn_recorder(&bus, &config(dir.path(), 100, 10)).unwrap();

        let temperature = bus.publisher::<StringMsg>(topics::TEMPERATURE, 10).unwrap();
        temperature.publish(StringMsg {
            data: "40.0".to_string(),
        });
        drop(temperature);
        drop(bus);

        handle.await.unwrap().unwrap();
        let files = telemetry_files(dir.path());
        assert_eq!(files.len(), 1);
        assert_eq!(lines(&files[0])[0]["message"]["data"], "40.0");
    }
}
