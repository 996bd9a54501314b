//! SPICE remote-display client protocol core.
//!
//! spicewire turns a SPICE server's byte streams into typed channel events:
//! link handshake and ticket authentication, message reframing, ack-window
//! flow control and the main/inputs channel logic a client needs to bring a
//! session up.
//!
//! # Crate Structure
//!
//! - [`transport`]: blocking (and, with `async`, tokio) byte streams over TCP and Unix sockets
//! - [`frame`]: wire structures, the mini-header codec and the reframing reader
//! - [`channel`]: connection state machine, channel handlers, drivers and sessions

/// Re-export transport types.
pub mod transport {
    pub use spicewire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use spicewire_frame::*;
}

/// Re-export channel types.
pub mod channel {
    pub use spicewire_channel::*;
}
