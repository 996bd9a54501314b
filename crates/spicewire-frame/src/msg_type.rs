//! Message type numbers.
//!
//! Types below [`FIRST_CHANNEL_MESSAGE`] are shared by every channel; each channel
//! category numbers its own messages from 101 upwards.

/// First message type owned by a specific channel category.
pub const FIRST_CHANNEL_MESSAGE: u16 = 101;

/// Server to client, any channel.
pub mod server {
    pub const MIGRATE: u16 = 1;
    pub const MIGRATE_DATA: u16 = 2;
    pub const SET_ACK: u16 = 3;
    pub const PING: u16 = 4;
    pub const WAIT_FOR_CHANNELS: u16 = 5;
    pub const DISCONNECTING: u16 = 6;
    pub const NOTIFY: u16 = 7;
    pub const LIST: u16 = 8;
}

/// Client to server, any channel.
pub mod client {
    pub const ACK_SYNC: u16 = 1;
    pub const ACK: u16 = 2;
    pub const PONG: u16 = 3;
    pub const MIGRATE_FLUSH_MARK: u16 = 4;
    pub const MIGRATE_DATA: u16 = 5;
    pub const DISCONNECTING: u16 = 6;
}

pub mod main {
    pub const MIGRATE_BEGIN: u16 = 101;
    pub const MIGRATE_CANCEL: u16 = 102;
    pub const INIT: u16 = 103;
    pub const CHANNELS_LIST: u16 = 104;
    pub const MOUSE_MODE: u16 = 105;
    pub const MULTI_MEDIA_TIME: u16 = 106;
    pub const AGENT_CONNECTED: u16 = 107;
    pub const AGENT_DISCONNECTED: u16 = 108;
    pub const AGENT_DATA: u16 = 109;
    pub const AGENT_TOKEN: u16 = 110;
    pub const MIGRATE_SWITCH_HOST: u16 = 111;
    pub const MIGRATE_END: u16 = 112;
    pub const NAME: u16 = 113;
    pub const UUID: u16 = 114;
    pub const AGENT_CONNECTED_TOKENS: u16 = 115;
    pub const MIGRATE_BEGIN_SEAMLESS: u16 = 116;
    pub const MIGRATE_DST_SEAMLESS_ACK: u16 = 117;
    pub const MIGRATE_DST_SEAMLESS_NACK: u16 = 118;

    pub const CLIENT_INFO: u16 = 101;
    pub const CLIENT_MIGRATE_CONNECTED: u16 = 102;
    pub const CLIENT_MIGRATE_CONNECT_ERROR: u16 = 103;
    pub const CLIENT_ATTACH_CHANNELS: u16 = 104;
    pub const CLIENT_MOUSE_MODE_REQUEST: u16 = 105;
    pub const CLIENT_AGENT_START: u16 = 106;
    pub const CLIENT_AGENT_DATA: u16 = 107;
    pub const CLIENT_AGENT_TOKEN: u16 = 108;
}

pub mod display {
    pub const CLIENT_INIT: u16 = 101;
    pub const CLIENT_STREAM_REPORT: u16 = 102;
}

pub mod inputs {
    pub const INIT: u16 = 101;
    pub const KEY_MODIFIERS: u16 = 102;
    pub const MOUSE_MOTION_ACK: u16 = 111;

    pub const CLIENT_KEY_DOWN: u16 = 101;
    pub const CLIENT_KEY_UP: u16 = 102;
    pub const CLIENT_KEY_MODIFIERS: u16 = 103;
    pub const CLIENT_KEY_SCANCODE: u16 = 104;
    pub const CLIENT_MOUSE_MOTION: u16 = 111;
    pub const CLIENT_MOUSE_POSITION: u16 = 112;
    pub const CLIENT_MOUSE_PRESS: u16 = 113;
    pub const CLIENT_MOUSE_RELEASE: u16 = 114;
}
