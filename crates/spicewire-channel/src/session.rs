//! A SPICE session: the main channel plus one child connection for each
//! channel the server offers.
//!
//! Every connection runs its own [`Driver`] on its own thread. Events from all
//! of them are funnelled back to the thread that called [`Session::run`].

use std::fmt;
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Serialize;
use spicewire_frame::{ChannelId, ChannelType, DEFAULT_MAX_MESSAGE};
use spicewire_transport::Target;
use tracing::{debug, error, info, warn};

use crate::builtin::BuiltinHandler;
use crate::caps::MediaSupport;
use crate::config::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT};
use crate::connection::Connection;
use crate::driver::{CommandSender, Driver, DriverConfig, ShutdownHandle};
use crate::error::{ChannelError, Result};
use crate::handler::ChannelEvent;
use crate::ticket::{default_encryptor, TicketEncryptor};

/// Builds the ticket encryptor for each new connection.
pub type EncryptorFactory = fn() -> Box<dyn TicketEncryptor>;

/// Settings shared by every channel of a session.
#[derive(Clone)]
pub struct SessionConfig {
    pub target: Target,
    /// Ticket password, sent on every channel.
    pub password: Option<String>,
    pub media: MediaSupport,
    pub connect_timeout: Duration,
    pub max_message_size: usize,
    pub driver: DriverConfig,
    pub encryptor: EncryptorFactory,
}

impl SessionConfig {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            password: None,
            media: MediaSupport::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_message_size: DEFAULT_MAX_MESSAGE,
            driver: DriverConfig::default(),
            encryptor: default_encryptor,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn main_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            channel: ChannelId::main(),
            connection_id: 0,
            password: self.password.clone(),
            connect_timeout: self.connect_timeout,
            max_message_size: self.max_message_size,
            media: self.media,
        }
    }

    /// Settings for a child channel; it links with the main channel's session id.
    pub fn child_config(&self, channel: ChannelId, session_id: u32) -> ConnectionConfig {
        self.main_config().child(channel, session_id)
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = self
            .password
            .as_ref()
            .map(|password| format!("<redacted:{} bytes>", password.len()));
        f.debug_struct("SessionConfig")
            .field("target", &self.target)
            .field("password", &password)
            .field("media", &self.media)
            .field("connect_timeout", &self.connect_timeout)
            .field("max_message_size", &self.max_message_size)
            .field("driver", &self.driver)
            .finish_non_exhaustive()
    }
}

/// Why a child channel is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildRole {
    Display,
    Inputs,
    Cursor,
    Playback,
    Port,
    /// No dedicated handling; messages are forwarded as payload events.
    Other,
}

/// Decide which offered channels to open.
///
/// One display (id 0), one inputs, one cursor and one playback channel; every
/// port; anything else is opened with a forwarding handler.
pub fn plan_children(channels: &[ChannelId]) -> Vec<(ChannelId, ChildRole)> {
    let mut plan: Vec<(ChannelId, ChildRole)> = Vec::new();
    for &channel in channels {
        let role = match channel.kind {
            ChannelType::Main => {
                debug!(%channel, "main channel listed; already open");
                continue;
            }
            ChannelType::Display if channel.id != 0 => {
                warn!(%channel, "multiple display heads not supported");
                continue;
            }
            ChannelType::Display => ChildRole::Display,
            ChannelType::Inputs => ChildRole::Inputs,
            ChannelType::Cursor => ChildRole::Cursor,
            ChannelType::Playback => ChildRole::Playback,
            ChannelType::Port => ChildRole::Port,
            other => {
                warn!(%channel, kind = %other, "channel type not implemented; forwarding");
                ChildRole::Other
            }
        };
        let single = !matches!(role, ChildRole::Port | ChildRole::Other);
        if single && plan.iter().any(|(_, planned)| *planned == role) {
            warn!(%channel, "duplicate channel ignored");
            continue;
        }
        plan.push((channel, role));
    }
    plan
}

/// Something that happened on one of the session's channels.
#[derive(Debug)]
pub enum SessionEvent {
    /// A connection was created; `commands` reaches its driver thread.
    Spawned {
        channel: ChannelId,
        commands: CommandSender,
    },
    Channel {
        channel: ChannelId,
        event: ChannelEvent,
    },
    /// A connection ended, with the error that ended it, if any.
    Closed {
        channel: ChannelId,
        error: Option<String>,
    },
}

/// A running or runnable SPICE session.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    shutdown: ShutdownHandle,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            shutdown: ShutdownHandle::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Stops every channel of the session when requested.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run until the main channel ends, delivering events on this thread.
    ///
    /// Returns the main channel's outcome; child failures arrive as
    /// [`SessionEvent::Closed`].
    pub fn run<F>(&self, mut on_event: F) -> Result<()>
    where
        F: FnMut(SessionEvent),
    {
        let (tx, rx) = mpsc::channel();
        let config = self.config.clone();
        let shutdown = self.shutdown.clone();
        let main = thread::Builder::new()
            .name("spice-main".to_string())
            .spawn(move || run_main(config, shutdown, tx))
            .map_err(|err| ChannelError::Worker(format!("failed to start main channel: {err}")))?;

        for event in rx {
            on_event(event);
        }

        main.join()
            .map_err(|_| ChannelError::Worker("main channel thread panicked".to_string()))?
    }
}

fn run_main(config: SessionConfig, shutdown: ShutdownHandle, tx: Sender<SessionEvent>) -> Result<()> {
    let channel = ChannelId::main();
    let mut conn =
        Connection::builtin(config.main_config()).with_boxed_encryptor((config.encryptor)());
    conn.set_on_success(move |what| info!(%channel, "{what}"));

    let mut driver = Driver::new(config.driver.clone()).with_shutdown(shutdown.clone());
    let _ = tx.send(SessionEvent::Spawned {
        channel,
        commands: driver.command_sender(),
    });

    let mut children = Children::new(config.clone(), shutdown.clone(), tx.clone());
    let result = driver.connect_and_run(&mut conn, &config.target, |_, event| {
        children.observe(&event);
        let _ = tx.send(SessionEvent::Channel { channel, event });
    });

    // Children never outlive the main channel.
    shutdown.request();
    children.join();

    let _ = tx.send(SessionEvent::Closed {
        channel,
        error: result.as_ref().err().map(ToString::to_string),
    });
    result
}

/// Child connections spawned from the main channel's channel list.
struct Children {
    config: SessionConfig,
    shutdown: ShutdownHandle,
    tx: Sender<SessionEvent>,
    session_id: Option<u32>,
    mouse_mode: u32,
    inputs: Option<CommandSender>,
    handles: Vec<JoinHandle<()>>,
}

impl Children {
    fn new(config: SessionConfig, shutdown: ShutdownHandle, tx: Sender<SessionEvent>) -> Self {
        Self {
            config,
            shutdown,
            tx,
            session_id: None,
            mouse_mode: spicewire_frame::messages::main::mouse_mode::SERVER,
            inputs: None,
            handles: Vec::new(),
        }
    }

    fn observe(&mut self, event: &ChannelEvent) {
        match event {
            ChannelEvent::MainInit(init) => {
                self.session_id = Some(init.session_id);
                self.mouse_mode = init.current_mouse_mode;
            }
            ChannelEvent::MouseMode(mode) => {
                let current = u32::from(mode.current);
                self.mouse_mode = current;
                if let Some(inputs) = &self.inputs {
                    inputs.send(move |conn| {
                        if let Some(handler) = conn.handler_mut().as_inputs_mut() {
                            handler.session_mut().set_mouse_mode(current);
                        }
                        Ok(())
                    });
                }
            }
            ChannelEvent::ChannelsList(channels) => match self.session_id {
                Some(session_id) => {
                    for (channel, role) in plan_children(channels) {
                        self.spawn(channel, role, session_id);
                    }
                }
                None => warn!("channel list arrived before main init; ignored"),
            },
            _ => {}
        }
    }

    fn spawn(&mut self, channel: ChannelId, role: ChildRole, session_id: u32) {
        info!(%channel, ?role, session_id, "opening channel");
        let mut handler = BuiltinHandler::for_channel(channel);
        if let Some(inputs) = handler.as_inputs_mut() {
            inputs.session_mut().set_mouse_mode(self.mouse_mode);
        }
        let mut conn = Connection::new(self.config.child_config(channel, session_id), handler)
            .with_boxed_encryptor((self.config.encryptor)());
        let mut driver = Driver::new(self.config.driver.clone()).with_shutdown(self.shutdown.child());

        let commands = driver.command_sender();
        if role == ChildRole::Inputs {
            self.inputs = Some(commands.clone());
        }
        let _ = self.tx.send(SessionEvent::Spawned { channel, commands });

        let tx = self.tx.clone();
        let target = self.config.target.clone();
        let spawned = thread::Builder::new()
            .name(format!("spice-{channel}"))
            .spawn(move || {
                let result = driver.connect_and_run(&mut conn, &target, |_, event| {
                    let _ = tx.send(SessionEvent::Channel { channel, event });
                });
                let _ = tx.send(SessionEvent::Closed {
                    channel,
                    error: result.err().map(|err| err.to_string()),
                });
            });

        match spawned {
            Ok(handle) => self.handles.push(handle),
            Err(err) => {
                error!(%channel, error = %err, "failed to start channel thread");
                let _ = self.tx.send(SessionEvent::Closed {
                    channel,
                    error: Some(format!("failed to start channel thread: {err}")),
                });
            }
        }
    }

    fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                error!("channel thread panicked");
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::Read;
    use std::net::TcpListener;

    use spicewire_frame::messages::main::{mouse_mode, ChannelsList, MainInit};
    use spicewire_frame::msg_type::{display, main as main_ty};
    use spicewire_frame::{LinkError, MiniMessage, WireMessage};

    use super::*;
    use crate::testing::{FakeServer, PlainEncryptor};

    fn id(kind: ChannelType, id: u8) -> ChannelId {
        ChannelId::new(kind, id)
    }

    #[test]
    fn plan_opens_one_of_each_and_every_port() {
        let offered = [
            ChannelId::main(),
            id(ChannelType::Display, 0),
            id(ChannelType::Display, 1),
            id(ChannelType::Inputs, 0),
            id(ChannelType::Inputs, 1),
            id(ChannelType::Cursor, 0),
            id(ChannelType::Port, 0),
            id(ChannelType::Port, 1),
            id(ChannelType::Webdav, 0),
        ];
        assert_eq!(
            plan_children(&offered),
            vec![
                (id(ChannelType::Display, 0), ChildRole::Display),
                (id(ChannelType::Inputs, 0), ChildRole::Inputs),
                (id(ChannelType::Cursor, 0), ChildRole::Cursor),
                (id(ChannelType::Port, 0), ChildRole::Port),
                (id(ChannelType::Port, 1), ChildRole::Port),
                (id(ChannelType::Webdav, 0), ChildRole::Other),
            ]
        );
    }

    #[test]
    fn config_debug_redacts_password() {
        let config = SessionConfig::new(Target::tcp("localhost", 5900)).with_password("s3cret");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted:6 bytes>"));

        let child = config.child_config(id(ChannelType::Inputs, 0), 9);
        assert_eq!(child.connection_id, 9);
        assert_eq!(child.password.as_deref(), Some("s3cret"));
    }

    fn channels_list(channels: &[ChannelId]) -> MiniMessage {
        ChannelsList {
            channels: channels.to_vec(),
        }
        .to_message()
    }

    fn plain_config(port: u16) -> SessionConfig {
        SessionConfig {
            encryptor: || Box::new(PlainEncryptor),
            ..SessionConfig::new(Target::tcp("127.0.0.1", port))
        }
    }

    /// Main channel and its children against a scripted server over TCP.
    #[test]
    fn session_opens_children_with_session_id() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let port = listener
            .local_addr()
            .expect("listener should have an address")
            .port();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("main channel should connect");
            let main = std::thread::spawn(move || {
                let mut server = FakeServer::new(stream);
                let link = server.accept();
                assert_eq!(link.channel, ChannelId::main());
                server.send(
                    &MainInit {
                        session_id: 42,
                        supported_mouse_modes: mouse_mode::SERVER,
                        current_mouse_mode: mouse_mode::SERVER,
                        ..MainInit::default()
                    }
                    .to_message(),
                );
                assert_eq!(server.recv().msg_type, main_ty::CLIENT_ATTACH_CHANNELS);
                server.send(&channels_list(&[
                    ChannelId::main(),
                    id(ChannelType::Display, 0),
                    id(ChannelType::Display, 1),
                    id(ChannelType::Inputs, 0),
                    id(ChannelType::Port, 0),
                ]));
                let mut rest = Vec::new();
                let _ = server.stream.read_to_end(&mut rest);
            });

            let mut linked = Vec::new();
            for _ in 0..3 {
                let (stream, _) = listener.accept().expect("child channel should connect");
                let mut server = FakeServer::new(stream);
                let link = server.accept();
                assert_eq!(link.connection_id, 42);
                if link.channel.kind == ChannelType::Display {
                    assert_eq!(server.recv().msg_type, display::CLIENT_INIT);
                }
                linked.push(link.channel);
            }
            main.join().expect("main server thread should finish");
            linked
        });

        let session = Session::new(plain_config(port).with_password("pw"));
        let shutdown = session.shutdown_handle();
        let mut spawned = Vec::new();
        let mut closed = Vec::new();
        session
            .run(|event| match event {
                SessionEvent::Spawned { channel, .. } => spawned.push(channel),
                SessionEvent::Closed { channel, error } => {
                    if channel != ChannelId::main() {
                        assert!(error.is_some(), "server hung up on {channel}");
                    }
                    closed.push(channel);
                    if closed.len() == 3 {
                        shutdown.request();
                    }
                }
                SessionEvent::Channel { .. } => {}
            })
            .expect("session should end cleanly");

        let mut linked = server.join().expect("server thread should finish");
        linked.sort_by_key(|channel| channel.kind.as_u8());
        assert_eq!(
            linked,
            vec![
                id(ChannelType::Display, 0),
                id(ChannelType::Inputs, 0),
                id(ChannelType::Port, 0),
            ]
        );
        assert_eq!(spawned.len(), 4);
        assert_eq!(spawned[0], ChannelId::main());
        assert_eq!(closed.last(), Some(&ChannelId::main()));
    }

    #[test]
    fn main_channel_failure_is_returned() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let port = listener
            .local_addr()
            .expect("listener should have an address")
            .port();
        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().expect("main channel should connect");
            let mut server = FakeServer::new(stream);
            server.read_link();
            server.send_reply(LinkError::OK);
            server.read_ticket();
            server.send_auth(LinkError::PERMISSION_DENIED);
        });

        let session = Session::new(plain_config(port));
        let mut closed = Vec::new();
        let err = session
            .run(|event| {
                if let SessionEvent::Closed { error, .. } = event {
                    closed.push(error);
                }
            })
            .expect_err("refused ticket ends the session");
        server.join().expect("server thread should finish");

        assert!(matches!(err, ChannelError::PermissionDenied));
        assert_eq!(closed.len(), 1);
        assert!(closed[0].is_some());
    }
}
