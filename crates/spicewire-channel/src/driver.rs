//! Blocking driver: runs one [`Connection`] over a [`WireStream`] on the
//! calling thread.

use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use spicewire_transport::{Target, Transport, TransportError, WireStream};
use tracing::{debug, info, warn};

use crate::builtin::BuiltinHandler;
use crate::connection::Connection;
use crate::error::Result;
use crate::handler::{ChannelEvent, ChannelHandler};

/// Cooperative stop flag, optionally chained to a parent.
///
/// A handle reports a stop request if it or any ancestor was asked to stop.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    parent: Option<Box<ShutdownHandle>>,
}

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_requested())
    }

    /// A handle stopped by this one, but not the other way round.
    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }
}

/// Blocking driver settings.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Bytes requested per socket read.
    pub read_chunk_size: usize,
    /// Read timeout; bounds how late the connect timer and stop requests are seen.
    pub poll_interval: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            read_chunk_size: 64 * 1024,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Work run against the connection on the driver thread.
pub type Command<H> = Box<dyn FnOnce(&mut Connection<H>) -> Result<()> + Send>;

/// Queues commands for a running driver from any thread.
pub struct CommandSender<H = BuiltinHandler> {
    tx: Sender<Command<H>>,
}

impl<H> Clone for CommandSender<H> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<H> std::fmt::Debug for CommandSender<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender").finish_non_exhaustive()
    }
}

impl<H> CommandSender<H> {
    /// Queue `command`. Returns false once the driver has stopped.
    pub fn send<F>(&self, command: F) -> bool
    where
        F: FnOnce(&mut Connection<H>) -> Result<()> + Send + 'static,
    {
        self.tx.send(Box::new(command)).is_ok()
    }
}

/// Drives one connection to completion.
pub struct Driver<H = BuiltinHandler> {
    config: DriverConfig,
    shutdown: ShutdownHandle,
    tx: Sender<Command<H>>,
    commands: Receiver<Command<H>>,
}

impl<H: ChannelHandler> Default for Driver<H> {
    fn default() -> Self {
        Self::new(DriverConfig::default())
    }
}

impl<H: ChannelHandler> Driver<H> {
    pub fn new(config: DriverConfig) -> Self {
        let (tx, commands) = mpsc::channel();
        Self {
            config,
            shutdown: ShutdownHandle::new(),
            tx,
            commands,
        }
    }

    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn command_sender(&self) -> CommandSender<H> {
        CommandSender {
            tx: self.tx.clone(),
        }
    }

    /// Connect to `target` and run until the connection ends.
    pub fn connect_and_run<F>(
        &mut self,
        conn: &mut Connection<H>,
        target: &Target,
        on_event: F,
    ) -> Result<()>
    where
        F: FnMut(&mut Connection<H>, ChannelEvent),
    {
        debug!(channel = %conn.channel(), %target, "connecting");
        match target.connect(Some(conn.config().connect_timeout)) {
            Ok(stream) => self.run(conn, stream, on_event),
            Err(err) => conn.on_transport_error(err),
        }
    }

    /// Run `conn` over an already connected stream until it closes, fails or
    /// is asked to stop.
    pub fn run<F>(
        &mut self,
        conn: &mut Connection<H>,
        mut stream: WireStream,
        mut on_event: F,
    ) -> Result<()>
    where
        F: FnMut(&mut Connection<H>, ChannelEvent),
    {
        let result = self.drive(conn, &mut stream, &mut on_event);
        stream.close();
        info!(channel = %conn.channel(), state = %conn.state(), "channel stopped");
        result
    }

    fn drive<F>(
        &mut self,
        conn: &mut Connection<H>,
        stream: &mut WireStream,
        on_event: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&mut Connection<H>, ChannelEvent),
    {
        if let Err(err) = stream.set_read_timeout(Some(self.config.poll_interval)) {
            return conn.on_transport_error(err);
        }
        conn.on_open()?;

        let mut buf = vec![0u8; self.config.read_chunk_size.max(1)];
        loop {
            self.run_commands(conn);
            conn.flush_to(stream)?;
            while let Some(event) = conn.poll_event() {
                on_event(conn, event);
            }
            // Event callbacks may queue replies.
            conn.flush_to(stream)?;

            if conn.wants_close() {
                return Ok(());
            }
            if self.shutdown.is_requested() {
                conn.close();
                continue;
            }
            conn.poll_timeout(Instant::now())?;
            if conn.wants_close() {
                continue;
            }

            match stream.read(&mut buf) {
                Ok(0) => conn.on_close()?,
                Ok(n) => conn.on_data(Bytes::copy_from_slice(&buf[..n]))?,
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                    ) => {}
                Err(err) => conn.on_transport_error(TransportError::Io(err))?,
            }
        }
    }

    fn run_commands(&mut self, conn: &mut Connection<H>) {
        while let Ok(command) = self.commands.try_recv() {
            if let Err(err) = command(conn) {
                warn!(channel = %conn.channel(), error = %err, "command failed");
            }
        }
    }
}
