//! In-memory queue

use super::CncDataQueue;
use pulsekit_core::{ExchangeData, QueueError, Result};
use std::collections::VecDeque;

/// Volatile exchange-data queue
///
/// With a capacity, `enqueue` fails with [`QueueError::Full`] once the
/// capacity is reached; without one it grows without limit.
#[derive(Debug, Default)]
pub struct MemoryCncDataQueue {
    records: VecDeque<ExchangeData>,
    capacity: Option<usize>,
}

impl MemoryCncDataQueue {
    /// Create an unbounded queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue refusing data beyond `capacity` records
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity: Some(capacity),
        }
    }

    /// Iterate over the queued records, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &ExchangeData> {
        self.records.iter()
    }
}

impl CncDataQueue for MemoryCncDataQueue {
    fn enqueue(&mut self, data: ExchangeData) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if self.records.len() >= capacity {
                return Err(QueueError::Full { capacity }.into());
            }
        }
        self.records.push_back(data);
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn peek(&self, n: usize) -> Result<Vec<ExchangeData>> {
        Ok(self.records.iter().take(n).cloned().collect())
    }

    fn pop(&mut self, n: usize) -> Result<usize> {
        let count = n.min(self.records.len());
        self.records.drain(..count);
        Ok(count)
    }

    fn clear(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }
}
