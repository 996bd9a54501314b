//! Byte-stream transports for spicewire.
//!
//! Every SPICE channel runs over its own bidirectional stream:
//! - TCP (the usual `host:port` endpoint)
//! - Unix domain sockets (QEMU `unix=on` endpoints)
//!
//! This is the lowest layer of spicewire. Everything else builds on top of
//! [`WireStream`] and the [`Transport`] trait provided here.

pub mod error;
pub mod stream;
pub mod target;
mod tcp;

#[cfg(unix)]
mod uds;

#[cfg(feature = "async")]
pub mod async_stream;

pub use error::{Result, TransportError};
pub use stream::{Transport, WireStream};
pub use target::{Target, DEFAULT_PORT};

#[cfg(feature = "async")]
pub use async_stream::AsyncWireStream;
