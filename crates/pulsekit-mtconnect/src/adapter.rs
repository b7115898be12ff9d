//! SHDR adapter
//!
//! Owns the data items, the line buffer and the server, and follows the
//! acquisition lifecycle: `start` handles connections and stamps the line,
//! the data items are updated during the cycle, `finish` publishes what
//! changed.

use crate::buffer::ShdrBuffer;
use crate::datum::DeviceDatum;
use crate::error::ShdrResult;
use crate::server::{ClientId, ShdrServer};
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Default SHDR port
pub const DEFAULT_PORT: u16 = 7878;

/// Default heartbeat announced to agents
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_millis(10_000);

/// Data items published over SHDR
#[derive(Debug)]
pub struct Adapter {
    host: String,
    port: u16,
    heartbeat: Duration,
    data: Vec<DeviceDatum>,
    buffer: ShdrBuffer,
    server: Option<ShdrServer>,
    had_clients: bool,
    now: Option<DateTime<Utc>>,
}

impl Default for Adapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter {
    pub fn new() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            heartbeat: DEFAULT_HEARTBEAT,
            data: Vec::new(),
            buffer: ShdrBuffer::new(),
            server: None,
            had_clients: false,
            now: None,
        }
    }

    /// Listen on `port`; 0 picks a free port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat;
        self
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Bound server, once `start` ran
    pub fn server(&self) -> Option<&ShdrServer> {
        self.server.as_ref()
    }

    pub fn client_count(&self) -> usize {
        self.server.as_ref().map_or(0, ShdrServer::client_count)
    }

    /// Register a data item and return its index
    pub fn add_datum(&mut self, datum: DeviceDatum) -> usize {
        tracing::debug!("Adding data item {} ({})", datum.name(), datum.kind());
        self.data.push(datum);
        self.data.len() - 1
    }

    pub fn data(&self) -> &[DeviceDatum] {
        &self.data
    }

    pub fn datum(&self, name: &str) -> Option<&DeviceDatum> {
        self.data.iter().find(|d| d.name() == name)
    }

    pub fn datum_mut(&mut self, index: usize) -> Option<&mut DeviceDatum> {
        self.data.get_mut(index)
    }

    /// Begin a cycle: accept agents, send them the initial data, read their
    /// commands and stamp the line
    pub fn start(&mut self, at: DateTime<Utc>) -> ShdrResult<()> {
        self.now = Some(at);
        if self.server.is_none() {
            self.server = Some(ShdrServer::bind_port(&self.host, self.port, self.heartbeat)?);
        }
        let Some(server) = self.server.as_mut() else {
            return Ok(());
        };

        let new_clients = server.accept_new();
        for id in new_clients {
            self.send_initial_data(id, at);
        }

        let Some(server) = self.server.as_mut() else {
            return Ok(());
        };
        server.read_from_clients();
        if server.client_count() > 0 {
            self.had_clients = true;
            self.buffer.timestamp(at);
        } else if self.had_clients {
            self.had_clients = false;
            tracing::info!("All agents have disconnected");
        }
        Ok(())
    }

    /// End a cycle: publish the changed data items
    ///
    /// Without agents the changes are dropped; a new agent receives the
    /// current values as initial data.
    pub fn finish(&mut self) {
        if self.client_count() > 0 {
            self.send_changed_data();
        } else {
            self.data.iter_mut().for_each(DeviceDatum::mark_published);
        }
        self.buffer.reset();
    }

    /// Mark every data item unavailable and publish it right away
    pub fn unavailable(&mut self) {
        for datum in &mut self.data {
            datum.unavailable();
        }
        self.flush();
    }

    fn flush(&mut self) {
        self.send_changed_data();
        if let Some(now) = self.now {
            self.buffer.timestamp(now);
        }
    }

    fn send_initial_data(&mut self, id: ClientId, at: DateTime<Utc>) {
        let mut buffer = ShdrBuffer::new();
        buffer.timestamp(at);
        for datum in self.data.iter().filter(|d| d.has_initial_value()) {
            buffer.append(datum);
        }
        if let (Some(line), Some(server)) = (buffer.take_line(), self.server.as_mut()) {
            tracing::debug!("Sending initial data to agent {}", id);
            server.send_to(id, &line);
        }
    }

    fn send_changed_data(&mut self) {
        if !self.buffer.is_stamped() {
            let now = self.now.unwrap_or_else(Utc::now);
            self.buffer.timestamp(now);
        }
        for datum in self.data.iter_mut().filter(|d| d.is_changed()) {
            datum.append(&mut self.buffer);
        }
        if let Some(line) = self.buffer.take_line() {
            if let Some(server) = self.server.as_mut() {
                server.send(&line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datum::{DatumKind, DatumValue};

    #[test]
    fn test_defaults() {
        let adapter = Adapter::new();
        assert_eq!(adapter.port(), 7878);
        assert_eq!(adapter.client_count(), 0);
        assert!(adapter.server().is_none());
    }

    #[test]
    fn test_unavailable_without_server_clears_changes() {
        let mut adapter = Adapter::new();
        let index = adapter.add_datum(DeviceDatum::new("Xact", DatumKind::Sample));
        adapter
            .datum_mut(index)
            .unwrap()
            .set(DatumValue::Double(3.0))
            .unwrap();
        adapter.unavailable();

        let x = adapter.datum("Xact").unwrap();
        assert_eq!(x.value(), None);
        assert!(!x.is_changed());
    }
}
