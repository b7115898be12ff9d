//! Queue drain
//!
//! Moves committed records from the exchange-data queue to a persistent sink
//! in batches. A batch is removed from the queue only once the sink accepted
//! it, so a failing sink leaves the queue untouched and the batch is retried
//! on the next tick.

use crate::queue::SharedCncDataQueue;
use async_trait::async_trait;
use pulsekit_core::{ExchangeData, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;

/// Destination of drained records
#[async_trait]
pub trait ExchangeDataSink: Send + Sync {
    /// Persist a batch, in order
    async fn persist(&self, batch: &[ExchangeData]) -> Result<()>;
}

/// Periodic mover from a queue to a sink
pub struct QueueDrain<S: ExchangeDataSink> {
    queue: SharedCncDataQueue,
    sink: S,
    batch_size: usize,
    interval: Duration,
}

impl<S: ExchangeDataSink> QueueDrain<S> {
    /// Create a drain with a batch size of 100 and a one second interval
    pub fn new(queue: SharedCncDataQueue, sink: S) -> Self {
        Self {
            queue,
            sink,
            batch_size: 100,
            interval: Duration::from_secs(1),
        }
    }

    /// Set the maximum batch size
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the drain interval
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// The sink records are drained to
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Move one batch, returning the number of records moved
    pub async fn drain_once(&self) -> Result<usize> {
        let batch = self.queue.lock().peek(self.batch_size)?;
        if batch.is_empty() {
            return Ok(0);
        }
        self.sink.persist(&batch).await?;
        let removed = self.queue.lock().pop(batch.len())?;
        tracing::debug!("Drained {} records", removed);
        Ok(removed)
    }

    /// Move batches until the queue is empty
    pub async fn drain_all(&self) -> Result<usize> {
        let mut total = 0;
        loop {
            let moved = self.drain_once().await?;
            if moved == 0 {
                return Ok(total);
            }
            total += moved;
        }
    }

    /// Drain on every interval tick until `shutdown` turns true
    ///
    /// The queue is drained completely before returning.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tracing::info!(
            "Queue drain started (batch {}, every {:?})",
            self.batch_size,
            self.interval
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_all().await {
                        tracing::warn!("Drain failed, retrying next tick: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        let moved = self.drain_all().await?;
        tracing::info!("Queue drain stopped, {} records moved on shutdown", moved);
        Ok(())
    }
}

/// Sink appending records as JSON lines to a file
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    path: PathBuf,
}

impl JsonLinesSink {
    /// Sink writing to `path`, created on the first batch
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the output file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExchangeDataSink for JsonLinesSink {
    async fn persist(&self, batch: &[ExchangeData]) -> Result<()> {
        let mut content = String::new();
        for record in batch {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
