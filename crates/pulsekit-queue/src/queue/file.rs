//! JSON-lines file queue
//!
//! One record per line. Enqueue appends; pop rewrites the remaining lines
//! into a sibling temporary file and renames it over the queue file, so a
//! crash leaves either the old or the new content.

use super::CncDataQueue;
use pulsekit_core::{ExchangeData, QueueError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Exchange-data queue persisted in a JSON-lines file
#[derive(Debug)]
pub struct FileCncDataQueue {
    path: PathBuf,
    count: usize,
    capacity: Option<usize>,
}

impl FileCncDataQueue {
    /// Open the queue at `path`, creating the file if needed
    ///
    /// Records left by a previous run are kept and counted.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        if !path.exists() {
            File::create(&path)?;
        }
        let count = Self::read_lines(&path)?.len();
        tracing::debug!("Opened file queue {} with {} records", path.display(), count);
        Ok(Self {
            path,
            count,
            capacity: None,
        })
    }

    /// Refuse data beyond `capacity` records
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Path of the queue file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_lines(path: &Path) -> Result<Vec<String>> {
        let reader = BufReader::new(File::open(path)?);
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    fn decode(line_number: usize, line: &str) -> Result<ExchangeData> {
        serde_json::from_str(line).map_err(|e| {
            QueueError::Corrupted {
                line: line_number,
                reason: e.to_string(),
            }
            .into()
        })
    }

    fn rewrite(&self, lines: &[String]) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for line in lines {
                writeln!(writer, "{}", line)?;
            }
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl CncDataQueue for FileCncDataQueue {
    fn enqueue(&mut self, data: ExchangeData) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if self.count >= capacity {
                return Err(QueueError::Full { capacity }.into());
            }
        }
        let line = serde_json::to_string(&data)?;
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        writeln!(file, "{}", line)?;
        self.count += 1;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.count)
    }

    fn peek(&self, n: usize) -> Result<Vec<ExchangeData>> {
        Self::read_lines(&self.path)?
            .iter()
            .take(n)
            .enumerate()
            .map(|(i, line)| Self::decode(i + 1, line))
            .collect()
    }

    fn pop(&mut self, n: usize) -> Result<usize> {
        let lines = Self::read_lines(&self.path)?;
        let removed = n.min(lines.len());
        if removed == 0 {
            return Ok(0);
        }
        self.rewrite(&lines[removed..])?;
        self.count = lines.len() - removed;
        Ok(removed)
    }

    fn clear(&mut self) -> Result<()> {
        File::create(&self.path)?;
        self.count = 0;
        Ok(())
    }
}
