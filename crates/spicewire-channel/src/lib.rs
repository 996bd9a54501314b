//! SPICE channel state machine, dispatcher and session management.
//!
//! A [`Connection`] is transport-agnostic: feed it bytes with
//! [`Connection::on_data`], collect frames with [`Connection::take_outbox`]
//! and events with [`Connection::poll_event`]. It runs the link handshake,
//! answers the messages every channel shares (ping, ack window, notify) and
//! hands the rest to a [`ChannelHandler`].
//!
//! [`Driver`] runs a connection over a blocking [`spicewire_transport::WireStream`];
//! [`Session`] opens the main channel and one child per offered channel.
//!
//! ```no_run
//! use spicewire_channel::{Session, SessionConfig, SessionEvent};
//! use spicewire_transport::Target;
//!
//! let config = SessionConfig::new(Target::tcp("localhost", 5900)).with_password("secret");
//! Session::new(config).run(|event| {
//!     if let SessionEvent::Channel { channel, event } = event {
//!         println!("{channel}: {event:?}");
//!     }
//! })?;
//! # Ok::<(), spicewire_channel::ChannelError>(())
//! ```

pub mod builtin;
pub mod caps;
pub mod common;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod forward;
pub mod handler;
pub mod inputs;
pub mod main_channel;
pub mod session;
pub mod state;
pub mod ticket;

#[cfg(feature = "async")]
pub mod async_driver;

#[cfg(test)]
mod testing;

pub use builtin::BuiltinHandler;
pub use caps::{CapabilityProbe, MediaSupport, StandardCaps};
pub use common::AckWindow;
pub use config::{ConnectionConfig, DEFAULT_CONNECT_TIMEOUT};
pub use connection::{Connection, ServerCaps};
pub use driver::{CommandSender, Driver, DriverConfig, ShutdownHandle};
pub use error::{ChannelError, Result};
pub use forward::{DisplayHandler, ForwardHandler};
pub use handler::{ChannelEvent, ChannelHandler, Outbound};
pub use inputs::{InputSession, InputsHandler, ModifierState};
pub use main_channel::MainHandler;
pub use session::{plan_children, ChildRole, Session, SessionConfig, SessionEvent};
pub use state::ConnectionState;
pub use ticket::{default_encryptor, TicketEncryptor};

#[cfg(feature = "rsa")]
pub use ticket::RsaOaepEncryptor;

#[cfg(feature = "async")]
pub use async_driver::{connect_and_run_async, run_async};
