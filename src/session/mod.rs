//! Connection lifecycle and fragment delivery
//!
//! A [`Session`] owns the world snapshot and, while connected, one reader
//! thread. The reader owns the decoder outright: it reads socket chunks,
//! decodes them, writes negotiation replies back to the server, and ships
//! each chunk's fragments as one [`OutputStream`] batch over a channel.
//! Decoder state dies with the reader, so every reconnect starts from a
//! clean stream.
//!
//! Sending and receiving are independent directions; [`Session::send`]
//! writes on a cloned socket handle and never contends with the reader.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, SyncSender, TryRecvError};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;

use crate::decoder::Decoder;
use crate::output::OutputFragment;
use crate::world::World;

const READ_BUFFER_SIZE: usize = 8 * 1024;
/// Bounded so a flooding server blocks its reader instead of growing the
/// queue without limit.
const CHANNEL_DEPTH: usize = 64;

/// Error type for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Failed to connect to {site}:{port}: {source}")]
    Connect {
        site: String,
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to set up connection: {0}")]
    Setup(#[source] std::io::Error),

    #[error("Failed to send to server: {0}")]
    Send(#[source] std::io::Error),

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Connection closed")]
    Closed,
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// One receive batch of decoded fragments, consumed by pulling
#[derive(Debug, Default)]
pub struct OutputStream {
    fragments: VecDeque<OutputFragment>,
}

impl OutputStream {
    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl Iterator for OutputStream {
    type Item = OutputFragment;

    fn next(&mut self) -> Option<OutputFragment> {
        self.fragments.pop_front()
    }
}

impl From<Vec<OutputFragment>> for OutputStream {
    fn from(fragments: Vec<OutputFragment>) -> Self {
        Self {
            fragments: fragments.into(),
        }
    }
}

struct Connection {
    stream: TcpStream,
    receiver: Receiver<OutputStream>,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

/// The bridge between a world configuration and a live server connection
#[derive(Debug)]
pub struct Session {
    world: World,
    connection: Option<Connection>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("stream", &self.stream)
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new(world: World) -> Self {
        Self {
            world,
            connection: None,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Replace the world snapshot wholesale
    ///
    /// The running reader keeps the decoder it was started with; the new
    /// snapshot takes effect on the next `connect`.
    pub fn set_world(&mut self, world: World) {
        self.world = world;
    }

    pub fn connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Open the connection and start the reader thread
    pub fn connect(&mut self) -> SessionResult<()> {
        if self.connection.is_some() {
            return Err(SessionError::AlreadyConnected);
        }
        let stream = TcpStream::connect((self.world.site.as_str(), self.world.port)).map_err(
            |source| SessionError::Connect {
                site: self.world.site.clone(),
                port: self.world.port,
                source,
            },
        )?;
        tracing::info!(site = %self.world.site, port = self.world.port, "connected");

        let reader_stream = stream.try_clone().map_err(SessionError::Setup)?;
        let stop = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::sync_channel(CHANNEL_DEPTH);
        let decoder = Decoder::new(&self.world);
        let reader_stop = Arc::clone(&stop);
        let reader = std::thread::Builder::new()
            .name("session-reader".to_owned())
            .spawn(move || read_loop(reader_stream, decoder, sender, reader_stop))
            .map_err(SessionError::Setup)?;

        self.connection = Some(Connection {
            stream,
            receiver,
            stop,
            reader: Some(reader),
        });
        Ok(())
    }

    /// Transmit one line, CR LF appended
    pub fn send(&mut self, line: &str) -> SessionResult<()> {
        let connection = self.connection.as_mut().ok_or(SessionError::NotConnected)?;
        let mut data = Vec::with_capacity(line.len() + 2);
        data.extend_from_slice(line.as_bytes());
        data.extend_from_slice(b"\r\n");
        connection.stream.write_all(&data).map_err(SessionError::Send)
    }

    /// Block until the next batch of fragments arrives
    ///
    /// Returns [`SessionError::Closed`] exactly once when the connection
    /// ends, after which the session is disconnected.
    pub fn receive(&mut self) -> SessionResult<OutputStream> {
        let connection = self.connection.as_mut().ok_or(SessionError::NotConnected)?;
        match connection.receiver.recv() {
            Ok(batch) => Ok(batch),
            Err(_) => {
                self.teardown();
                Err(SessionError::Closed)
            }
        }
    }

    /// Non-blocking variant of [`receive`](Self::receive)
    pub fn try_receive(&mut self) -> SessionResult<Option<OutputStream>> {
        let connection = self.connection.as_mut().ok_or(SessionError::NotConnected)?;
        match connection.receiver.try_recv() {
            Ok(batch) => Ok(Some(batch)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => {
                self.teardown();
                Err(SessionError::Closed)
            }
        }
    }

    /// Close the connection; returns whether one was open
    pub fn disconnect(&mut self) -> bool {
        if self.connection.is_none() {
            return false;
        }
        self.teardown();
        true
    }

    fn teardown(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.stop.store(true, Ordering::Relaxed);
            let _ = connection.stream.shutdown(Shutdown::Both);
            // Close the channel before joining: a reader blocked on the
            // full bounded channel exits through the send error, since
            // socket shutdown cannot reach it there
            drop(connection.receiver);
            if let Some(reader) = connection.reader.take() {
                let _ = reader.join();
            }
            tracing::info!("disconnected");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Reader thread body: read, decode, reply, ship
fn read_loop(
    mut stream: TcpStream,
    mut decoder: Decoder,
    sender: SyncSender<OutputStream>,
    stop: Arc<AtomicBool>,
) {
    let mut write_half = match stream.try_clone() {
        Ok(stream) => stream,
        Err(err) => {
            tracing::error!(%err, "failed to clone stream for negotiation replies");
            return;
        }
    };
    let mut buffer = [0u8; READ_BUFFER_SIZE];
    loop {
        let count = match stream.read(&mut buffer) {
            Ok(0) => {
                tracing::info!("server closed the connection");
                break;
            }
            Ok(count) => count,
            Err(err) => {
                if !stop.load(Ordering::Relaxed) {
                    tracing::warn!(%err, "read failed");
                }
                break;
            }
        };
        if stop.load(Ordering::Relaxed) {
            break;
        }

        let mut fragments = Vec::new();
        decoder.receive(&buffer[..count], &mut fragments);
        decoder.flush(&mut fragments);

        let responses = decoder.drain_responses();
        if !responses.is_empty() {
            if let Err(err) = write_half.write_all(&responses) {
                tracing::warn!(%err, "failed to write negotiation reply");
                break;
            }
        }

        if !fragments.is_empty() && sender.send(fragments.into()).is_err() {
            // Session dropped the receiver
            break;
        }
    }
}
