//! Hand driver connection: TCP socket registered with calloop, line framing.

use std::io::{self, Read};
use std::net::{SocketAddr, TcpStream};

use calloop::generic::Generic;
use calloop::{Interest, Mode, PostAction, RegistrationToken};
use tracing::{debug, info, warn};

use crate::state::HandsState;

/// Longest line accepted before the buffer is discarded (64 KiB).
const MAX_LINE_BYTES: usize = 65_536;

/// Read chunk size per `read` call.
const READ_CHUNK: usize = 4096;

// ── Errors ─────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("could not connect to hand driver at {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("could not watch hand driver socket: {0}")]
    Register(String),
    #[error("hand driver closed the connection")]
    Closed,
    #[error("read from hand driver failed: {0}")]
    Read(#[from] io::Error),
}

// ── Line framing ───────────────────────────────────────────

/// Accumulates raw bytes and yields complete `\n`-terminated lines.
///
/// A line longer than [`MAX_LINE_BYTES`] is dropped whole: once the limit is
/// passed, bytes are discarded up to and including the next newline.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buf: Vec<u8>,
    discarding: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Remove and return every complete line, in arrival order.  A trailing
    /// `\r` is stripped; an incomplete last line stays buffered.
    pub fn drain_lines(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(end) = self.buf.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=end).collect();
            if std::mem::take(&mut self.discarding) {
                debug!(len = line.len(), "dropped tail of oversized line");
                continue;
            }
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            if line.len() > MAX_LINE_BYTES {
                warn!(len = line.len(), "line exceeds maximum length, discarding");
                continue;
            }
            lines.push(String::from_utf8_lossy(&line).into_owned());
        }
        if self.buf.len() > MAX_LINE_BYTES {
            warn!(len = self.buf.len(), "line exceeds maximum length, discarding");
            self.buf.clear();
            self.discarding = true;
        } else if self.discarding {
            self.buf.clear();
        }
        lines
    }

    /// Bytes of the incomplete trailing line.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.discarding = false;
    }
}

// ── Connection ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Socket lifecycle for the hand driver stream.
#[derive(Debug)]
pub struct DriverConnection {
    pub state: ConnectionState,
    pub buffer: LineBuffer,
    pub peer: Option<SocketAddr>,
    token: Option<RegistrationToken>,
}

impl Default for DriverConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl DriverConnection {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            buffer: LineBuffer::new(),
            peer: None,
            token: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Connect to the configured driver and watch the socket for input.
    ///
    /// The connect itself blocks; everything after is driven by the event
    /// loop.  An existing connection is dropped first.
    pub fn connect(state: &mut HandsState) -> Result<(), ConnectionError> {
        Self::disconnect(state);

        let address = state.config.address();
        let stream = TcpStream::connect((state.config.host.as_str(), state.config.port))
            .map_err(|source| ConnectionError::Connect {
                address: address.clone(),
                source,
            })?;
        stream.set_nonblocking(true)?;
        let peer = stream.peer_addr().ok();

        let source = Generic::new(stream, Interest::READ, Mode::Level);
        let token = state
            .loop_handle
            .insert_source(source, |_readiness, stream, state| {
                Self::on_readable(state, &**stream)
            })
            .map_err(|e| ConnectionError::Register(e.error.to_string()))?;

        let connection = &mut state.connection;
        connection.token = Some(token);
        connection.peer = peer;
        connection.state = ConnectionState::Connected;
        info!(%address, ?peer, "connected to hand driver");
        Ok(())
    }

    /// Stop watching and close the socket, discarding any partial line.
    /// Safe to call when not connected.
    pub fn disconnect(state: &mut HandsState) {
        let connection = &mut state.connection;
        if let Some(token) = connection.token.take() {
            state.loop_handle.remove(token);
            info!(peer = ?connection.peer, "disconnected from hand driver");
        }
        connection.buffer.clear();
        connection.peer = None;
        connection.state = ConnectionState::Disconnected;
    }

    /// Read-ready callback: drain the socket and feed complete lines.
    ///
    /// Lines are handled after every chunk, so the buffer never holds more
    /// than one partial line plus one chunk.
    fn on_readable(state: &mut HandsState, stream: &TcpStream) -> io::Result<PostAction> {
        let mut reader = stream;
        let mut chunk = [0u8; READ_CHUNK];
        let closed = loop {
            match reader.read(&mut chunk) {
                Ok(0) => break Some(ConnectionError::Closed),
                Ok(n) => {
                    state.connection.buffer.extend(&chunk[..n]);
                    let lines = state.connection.buffer.drain_lines();
                    debug!(
                        count = lines.len(),
                        pending = state.connection.buffer.pending(),
                        "driver lines ready"
                    );
                    for line in lines {
                        state.handle_line(&line).map_err(io::Error::other)?;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break None,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Some(ConnectionError::Read(e)),
            }
        };

        match closed {
            Some(reason) => {
                // The source is dropped by calloop on Remove, closing the socket.
                let connection = &mut state.connection;
                connection.token = None;
                connection.buffer.clear();
                connection.peer = None;
                connection.state = ConnectionState::Disconnected;
                state.connection_lost(&reason);
                Ok(PostAction::Remove)
            }
            None => Ok(PostAction::Continue),
        }
    }
}
