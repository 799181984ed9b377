use super::{Record, RecordValue, Recorder};
use anyhow::Result;
use chrono::Local;
use log::debug;
use std::{
    collections::BTreeMap,
    fs::{File, OpenOptions},
    path::Path,
};

/// A recorder that appends aggregated records to a CSV file.
///
/// The file is the training-history artifact: an ordered, append-only log of
/// per-episode scalars, written in long format with the columns
/// `step,datetime,metric,value`. Scalars stored between two flushes are
/// averaged per key; string values keep the last stored entry.
pub struct CsvRecorder {
    wtr: csv::Writer<File>,
    storage: Vec<Record>,
}

impl CsvRecorder {
    /// Creates a recorder appending to the file at `path`.
    ///
    /// The header row is written only when the file is created.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let exists = path.as_ref().exists();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut wtr = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if !exists {
            wtr.write_record(&["step", "datetime", "metric", "value"])?;
        }

        Ok(Self {
            wtr,
            storage: Vec::new(),
        })
    }

    fn write_row(&mut self, step: i64, metric: &str, value: &str) {
        let datetime = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        if let Err(e) = self
            .wtr
            .write_record(&[&step.to_string(), &datetime, &metric.to_string(), &value.to_string()])
        {
            debug!("Failed to write a history row: {:?}", e);
        }
    }

    /// Aggregates the stored records: means of scalars, last of strings.
    fn aggregate(&mut self) -> (BTreeMap<String, (f32, usize)>, BTreeMap<String, String>) {
        let mut scalars: BTreeMap<String, (f32, usize)> = BTreeMap::new();
        let mut strings: BTreeMap<String, String> = BTreeMap::new();

        for record in self.storage.drain(..) {
            for (k, v) in record.iter() {
                match v {
                    RecordValue::Scalar(x) => {
                        let e = scalars.entry(k.clone()).or_insert((0.0, 0));
                        e.0 += x;
                        e.1 += 1;
                    }
                    RecordValue::String(s) => {
                        strings.insert(k.clone(), s.clone());
                    }
                    _ => {}
                }
            }
        }

        (scalars, strings)
    }
}

impl Recorder for CsvRecorder {
    fn write(&mut self, record: Record) {
        for (k, v) in record.iter() {
            match v {
                RecordValue::Scalar(x) => {
                    let value = x.to_string();
                    let metric = k.clone();
                    self.write_row(-1, &metric, &value);
                }
                RecordValue::String(s) => {
                    let value = s.clone();
                    let metric = k.clone();
                    self.write_row(-1, &metric, &value);
                }
                _ => {}
            }
        }
        let _ = self.wtr.flush();
    }

    fn store(&mut self, record: Record) {
        self.storage.push(record);
    }

    fn flush(&mut self, step: i64) {
        let (scalars, strings) = self.aggregate();
        for (metric, (sum, n)) in scalars {
            let mean = sum / n as f32;
            self.write_row(step, &metric, &mean.to_string());
        }
        for (metric, value) in strings {
            self.write_row(step, &metric, &value);
        }
        let _ = self.wtr.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use tempdir::TempDir;

    #[test]
    fn test_flush_aggregates_scalars() -> Result<()> {
        let dir = TempDir::new("csv_recorder")?;
        let path = dir.path().join("history.csv");

        let mut recorder = CsvRecorder::new(&path)?;
        recorder.store(Record::from_scalar("episode_return", 1.0));
        recorder.store(Record::from_scalar("episode_return", 3.0));
        recorder.flush(10);
        drop(recorder);

        let content = std::fs::read_to_string(&path)?;
        let mut lines = content.lines();
        assert_eq!(lines.next().unwrap(), "step,datetime,metric,value");
        let row = lines.next().unwrap();
        assert!(row.starts_with("10,"));
        assert!(row.ends_with(",episode_return,2"));

        Ok(())
    }
}
