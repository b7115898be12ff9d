//! Polling SHDR server
//!
//! The adapter is driven by the acquisition loop, so the server never blocks:
//! the listener and every client socket are non-blocking and are polled once
//! per cycle. Agents keep the connection alive with `* PING`, answered with
//! `* PONG <heartbeat ms>`.
//!
//! Output an agent cannot take yet is kept in a per-agent backlog and
//! written on the next poll. An agent whose backlog grows past
//! `MAX_BACKLOG` is dropped.

use crate::error::{ShdrError, ShdrResult};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

const READ_CHUNK: usize = 1024;
const MAX_PENDING: usize = 64 * 1024;
const MAX_BACKLOG: usize = 4 * 1024 * 1024;

/// Identifier of a connected agent
pub type ClientId = u64;

#[derive(Debug)]
struct ShdrClient {
    id: ClientId,
    peer: SocketAddr,
    stream: TcpStream,
    pending: String,
    backlog: Vec<u8>,
}

impl ShdrClient {
    /// Append `bytes` to the backlog and write what the socket takes
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.backlog.extend_from_slice(bytes);
        self.flush_backlog()
    }

    fn flush_backlog(&mut self) -> std::io::Result<()> {
        while !self.backlog.is_empty() {
            match self.stream.write(&self.backlog) {
                Ok(0) => return Err(ErrorKind::WriteZero.into()),
                Ok(n) => {
                    self.backlog.drain(..n);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    tracing::trace!("Agent {} busy, {} bytes kept", self.id, self.backlog.len());
                    break;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if self.backlog.len() > MAX_BACKLOG {
            return Err(std::io::Error::new(
                ErrorKind::Other,
                format!("agent stopped reading, {} bytes pending", self.backlog.len()),
            ));
        }
        Ok(())
    }
}

/// Non-blocking TCP server publishing SHDR lines to MTConnect agents
#[derive(Debug)]
pub struct ShdrServer {
    listener: TcpListener,
    clients: Vec<ShdrClient>,
    next_id: ClientId,
    heartbeat: Duration,
}

impl ShdrServer {
    /// Bind on `addr`
    pub fn bind(addr: impl ToSocketAddrs, heartbeat: Duration) -> ShdrResult<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        if let Ok(local) = listener.local_addr() {
            tracing::info!("SHDR server listening on {}", local);
        }
        Ok(Self {
            listener,
            clients: Vec::new(),
            next_id: 1,
            heartbeat,
        })
    }

    /// Bind on `host:port`, reporting the port on failure
    pub fn bind_port(host: &str, port: u16, heartbeat: Duration) -> ShdrResult<Self> {
        Self::bind((host, port), heartbeat).map_err(|e| match e {
            ShdrError::Io(source) => ShdrError::Bind { port, source },
            other => other,
        })
    }

    pub fn local_addr(&self) -> ShdrResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Accept every pending connection and return the new client ids
    pub fn accept_new(&mut self) -> Vec<ClientId> {
        let mut accepted = Vec::new();
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(true) {
                        tracing::warn!("Rejecting agent {}: {}", peer, e);
                        continue;
                    }
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!("Cannot disable Nagle for agent {}: {}", peer, e);
                    }
                    let id = self.next_id;
                    self.next_id += 1;
                    tracing::info!("Agent {} connected from {}", id, peer);
                    self.clients.push(ShdrClient {
                        id,
                        peer,
                        stream,
                        pending: String::new(),
                        backlog: Vec::new(),
                    });
                    accepted.push(id);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Failed to accept agent connection: {}", e);
                    break;
                }
            }
        }
        accepted
    }

    /// Read what agents sent and answer heartbeats
    ///
    /// Also writes pending backlogs and drops closed connections.
    pub fn read_from_clients(&mut self) {
        let heartbeat_ms = self.heartbeat.as_millis();
        self.clients.retain_mut(|client| match poll_client(client, heartbeat_ms) {
            Ok(true) => true,
            Ok(false) => {
                tracing::info!("Agent {} ({}) disconnected", client.id, client.peer);
                false
            }
            Err(e) => {
                tracing::warn!("Dropping agent {} ({}): {}", client.id, client.peer, e);
                false
            }
        });
    }

    /// Bytes waiting for agents that could not take them yet
    pub fn backlog_len(&self) -> usize {
        self.clients.iter().map(|c| c.backlog.len()).sum()
    }

    /// Send `line` to every agent, dropping those that fail
    pub fn send(&mut self, line: &str) {
        self.clients.retain_mut(|client| match client.write(line.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("Dropping agent {} ({}): {}", client.id, client.peer, e);
                false
            }
        });
    }

    /// Send `line` to one agent; returns false if it is gone
    pub fn send_to(&mut self, id: ClientId, line: &str) -> bool {
        let Some(index) = self.clients.iter().position(|c| c.id == id) else {
            return false;
        };
        match self.clients[index].write(line.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                let client = self.clients.remove(index);
                tracing::warn!("Dropping agent {} ({}): {}", client.id, client.peer, e);
                false
            }
        }
    }
}

/// Returns `Ok(false)` when the agent closed the connection
fn poll_client(client: &mut ShdrClient, heartbeat_ms: u128) -> std::io::Result<bool> {
    client.flush_backlog()?;
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match client.stream.read(&mut chunk) {
            Ok(0) => return Ok(false),
            Ok(n) => {
                client.pending.push_str(&String::from_utf8_lossy(&chunk[..n]));
                if client.pending.len() > MAX_PENDING {
                    return Err(std::io::Error::new(
                        ErrorKind::InvalidData,
                        "agent sent an oversized line",
                    ));
                }
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    while let Some(end) = client.pending.find('\n') {
        let line: String = client.pending.drain(..=end).collect();
        let command = line.trim();
        if command.starts_with("* PING") {
            tracing::trace!("PING from agent {}", client.id);
            client.write(format!("* PONG {}\n", heartbeat_ms).as_bytes())?;
        } else if !command.is_empty() {
            tracing::debug!("Ignoring agent {} command: {}", client.id, command);
        }
    }
    Ok(true)
}
