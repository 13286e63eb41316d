use std::io;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{ClientError, Phase};
use crate::frame::{RESPONSE_LEN, Response};

/// Upper bound on bytes accumulated for one reply.
const READ_BUF_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Plaintext line that authorizes the session, sent once per connection.
pub fn handshake_line(device_code: &str) -> String {
    format!("master:{device_code}#")
}

/// Owns at most one TCP session to the relay. A session that failed in any
/// way is dropped, never reused; the next exchange opens a fresh one.
pub struct Connection {
    config: ClientConfig,
    stream: Option<TcpStream>,
    state: watch::Sender<ConnectionState>,
}

impl Connection {
    pub fn new(config: ClientConfig, state: watch::Sender<ConnectionState>) -> Self {
        state.send_replace(ConnectionState::Disconnected);
        Self {
            config,
            stream: None,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub async fn ensure_connected(&mut self) -> Result<(), ClientError> {
        if self.stream.is_some() {
            return Ok(());
        }
        self.state.send_replace(ConnectionState::Connecting);
        match self.open().await {
            Ok(stream) => {
                self.stream = Some(stream);
                self.state.send_replace(ConnectionState::Connected);
                info!(addr = %self.config.addr(), "connected to relay");
                Ok(())
            }
            Err(e) => {
                warn!(addr = %self.config.addr(), error = %e, "connect failed");
                self.cleanup();
                Err(e)
            }
        }
    }

    async fn open(&self) -> Result<TcpStream, ClientError> {
        let relay = &self.config.relay;
        let timing = &self.config.timing;
        let addr = self.config.addr();

        let connect = TcpStream::connect((relay.host.as_str(), relay.port));
        let mut stream = match timeout(timing.connect_timeout(), connect).await {
            Err(_) => {
                return Err(ClientError::Timeout {
                    phase: Phase::Connect,
                    after: timing.connect_timeout(),
                });
            }
            Ok(Err(e)) => {
                return Err(ClientError::Connection {
                    addr,
                    reason: e.to_string(),
                });
            }
            Ok(Ok(s)) => s,
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "set_nodelay failed");
        }

        stream
            .write_all(handshake_line(&relay.device_code).as_bytes())
            .await
            .map_err(|e| ClientError::Connection {
                addr,
                reason: format!("sending device code: {e}"),
            })?;
        debug!("handshake sent");

        // The relay never acknowledges the handshake; give it time instead.
        tokio::time::sleep(timing.handshake_settle()).await;
        Ok(stream)
    }

    /// One request/response exchange: connect if needed, write `frame`,
    /// read exactly one reply.
    pub async fn transact(&mut self, frame: &[u8]) -> Result<Response, ClientError> {
        self.ensure_connected().await?;
        if self.has_stray_input() {
            warn!("stray bytes on idle connection, reconnecting");
            self.cleanup();
            self.ensure_connected().await?;
        }
        let addr = self.config.addr();
        let command_timeout = self.config.timing.command_timeout();
        let Some(stream) = self.stream.as_mut() else {
            return Err(ClientError::Disconnected);
        };

        if let Err(e) = stream.write_all(frame).await {
            warn!(error = %e, "frame write failed");
            self.cleanup();
            return Err(ClientError::Write(e));
        }

        match timeout(command_timeout, read_response(stream)).await {
            Err(_) => {
                warn!(timeout_ms = command_timeout.as_millis() as u64, "no reply");
                self.cleanup();
                Err(ClientError::Timeout {
                    phase: Phase::Command,
                    after: command_timeout,
                })
            }
            Ok(Err(e)) => {
                warn!(error = %e, "read failed");
                self.cleanup();
                Err(ClientError::Connection {
                    addr,
                    reason: e.to_string(),
                })
            }
            Ok(Ok((response, surplus))) => {
                if surplus > 0 {
                    warn!(surplus, "reply overran {RESPONSE_LEN} bytes, dropping connection");
                    self.cleanup();
                }
                Ok(response)
            }
        }
    }

    /// Non-blocking look for bytes nobody asked for. A closed or errored
    /// socket counts too.
    fn has_stray_input(&self) -> bool {
        let Some(stream) = self.stream.as_ref() else {
            return false;
        };
        let mut scratch = [0u8; READ_BUF_LEN];
        match stream.try_read(&mut scratch) {
            Ok(n) => {
                debug!(bytes = n, "unexpected input before write");
                true
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => false,
            Err(e) => {
                debug!(error = %e, "socket error while idle");
                true
            }
        }
    }

    pub fn disconnect(&mut self) {
        if self.stream.is_some() {
            info!("disconnecting from relay");
        }
        self.cleanup();
    }

    fn cleanup(&mut self) {
        // Dropping the stream closes the socket.
        self.stream = None;
        self.state.send_replace(ConnectionState::Disconnected);
    }
}

/// Accumulates until one full reply is present. Returns the reply and the
/// count of surplus bytes that arrived with it.
async fn read_response(stream: &mut TcpStream) -> io::Result<(Response, usize)> {
    let mut buf = [0u8; READ_BUF_LEN];
    let mut filled = 0;
    while filled < RESPONSE_LEN {
        let n = stream.read(&mut buf[filled..]).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "relay closed the connection",
            ));
        }
        filled += n;
    }
    let mut reply = [0u8; RESPONSE_LEN];
    reply.copy_from_slice(&buf[..RESPONSE_LEN]);
    Ok((Response::new(reply), filled - RESPONSE_LEN))
}
