use bytes::{Buf, BufMut, BytesMut};

use crate::codec::MiniMessage;
use crate::error::{ensure, Result};
use crate::messages::WireMessage;
use crate::msg_type::inputs as ty;

/// Pointer button numbers.
pub mod button {
    pub const LEFT: u8 = 1;
    pub const MIDDLE: u8 = 2;
    pub const RIGHT: u8 = 3;
    pub const UP: u8 = 4;
    pub const DOWN: u8 = 5;
}

/// Pointer button state masks.
pub mod button_mask {
    pub const LEFT: u16 = 1;
    pub const MIDDLE: u16 = 2;
    pub const RIGHT: u16 = 4;
}

/// Keyboard lock flags reported by `INIT` and `KEY_MODIFIERS`.
pub mod lock {
    pub const SCROLL_LOCK: u16 = 1;
    pub const NUM_LOCK: u16 = 2;
    pub const CAPS_LOCK: u16 = 4;
}

/// Unacknowledged motion messages are acked in bunches of this many.
pub const MOTION_ACK_BUNCH: u32 = 4;

/// Server keyboard lock state. Both `INIT` and `KEY_MODIFIERS` carry it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyModifiers {
    pub modifiers: u16,
}

impl WireMessage for KeyModifiers {
    const MSG_TYPE: u16 = ty::KEY_MODIFIERS;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u16_le(self.modifiers);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("key modifiers", src.len(), 2)?;
        Ok(Self {
            modifiers: src.get_u16_le(),
        })
    }
}

/// An encoded PC/AT scancode as sent in `KEY_DOWN`/`KEY_UP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyCode(pub u32);

/// Flag marking a scancode that needs the `0xE0` prefix.
pub const EXTENDED: u16 = 0x100;

impl KeyCode {
    /// Press code for a scancode; set [`EXTENDED`] for prefixed keys.
    pub fn down(scancode: u16) -> Self {
        if scancode & EXTENDED != 0 {
            Self((u32::from(scancode & 0x7f) << 8) | 0xE0)
        } else {
            Self(u32::from(scancode & 0xff))
        }
    }

    /// Release code: the press code with the break bit set.
    pub fn up(scancode: u16) -> Self {
        if scancode & EXTENDED != 0 {
            Self((u32::from((scancode | 0x80) & 0xff) << 8) | 0xE0)
        } else {
            Self(u32::from((scancode | 0x80) & 0xff))
        }
    }
}

/// `KEY_DOWN` or `KEY_UP` depending on `pressed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: KeyCode,
    pub pressed: bool,
}

impl KeyEvent {
    pub fn down(scancode: u16) -> Self {
        Self {
            code: KeyCode::down(scancode),
            pressed: true,
        }
    }

    pub fn up(scancode: u16) -> Self {
        Self {
            code: KeyCode::up(scancode),
            pressed: false,
        }
    }

    pub fn msg_type(&self) -> u16 {
        if self.pressed {
            ty::CLIENT_KEY_DOWN
        } else {
            ty::CLIENT_KEY_UP
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.code.0);
    }

    pub fn to_message(&self) -> MiniMessage {
        let mut payload = BytesMut::with_capacity(4);
        self.encode(&mut payload);
        MiniMessage::new(self.msg_type(), payload.freeze())
    }
}

/// Absolute pointer position (client mouse mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MousePosition {
    pub x: u32,
    pub y: u32,
    pub buttons_state: u16,
    pub display_id: u8,
}

impl WireMessage for MousePosition {
    const MSG_TYPE: u16 = ty::CLIENT_MOUSE_POSITION;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_u32_le(self.x);
        dst.put_u32_le(self.y);
        dst.put_u16_le(self.buttons_state);
        dst.put_u8(self.display_id);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("mouse position", src.len(), 11)?;
        Ok(Self {
            x: src.get_u32_le(),
            y: src.get_u32_le(),
            buttons_state: src.get_u16_le(),
            display_id: src.get_u8(),
        })
    }
}

/// Relative pointer motion (server mouse mode). Same layout as
/// [`MousePosition`] with signed deltas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseMotion {
    pub dx: i32,
    pub dy: i32,
    pub buttons_state: u16,
    pub display_id: u8,
}

impl WireMessage for MouseMotion {
    const MSG_TYPE: u16 = ty::CLIENT_MOUSE_MOTION;

    fn encode(&self, dst: &mut BytesMut) {
        dst.put_i32_le(self.dx);
        dst.put_i32_le(self.dy);
        dst.put_u16_le(self.buttons_state);
        dst.put_u8(self.display_id);
    }

    fn decode(mut src: &[u8]) -> Result<Self> {
        ensure("mouse motion", src.len(), 11)?;
        Ok(Self {
            dx: src.get_i32_le(),
            dy: src.get_i32_le(),
            buttons_state: src.get_u16_le(),
            display_id: src.get_u8(),
        })
    }
}

/// Button press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseButton {
    pub button: u8,
    pub buttons_state: u16,
    pub pressed: bool,
}

impl MouseButton {
    pub fn msg_type(&self) -> u16 {
        if self.pressed {
            ty::CLIENT_MOUSE_PRESS
        } else {
            ty::CLIENT_MOUSE_RELEASE
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.button);
        dst.put_u16_le(self.buttons_state);
    }

    pub fn to_message(&self) -> MiniMessage {
        let mut payload = BytesMut::with_capacity(3);
        self.encode(&mut payload);
        MiniMessage::new(self.msg_type(), payload.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_scancode_sets_break_bit_on_release() {
        assert_eq!(KeyCode::down(0x1E), KeyCode(0x1E));
        assert_eq!(KeyCode::up(0x1E), KeyCode(0x9E));
    }

    #[test]
    fn extended_scancode_is_prefixed() {
        let meta = EXTENDED | 0x5B;
        assert_eq!(KeyCode::down(meta), KeyCode(0x5BE0));
        assert_eq!(KeyCode::up(meta), KeyCode(0xDBE0));
    }

    #[test]
    fn position_layout() {
        let msg = MousePosition {
            x: 10,
            y: 20,
            buttons_state: button_mask::LEFT,
            display_id: 0,
        }
        .to_message();
        assert_eq!(msg.msg_type, 112);
        assert_eq!(
            msg.payload.as_ref(),
            &[10, 0, 0, 0, 20, 0, 0, 0, 1, 0, 0]
        );
    }

    #[test]
    fn motion_deltas_are_twos_complement() {
        let msg = MouseMotion {
            dx: -1,
            dy: 2,
            buttons_state: 0,
            display_id: 0,
        }
        .to_message();
        assert_eq!(msg.payload.len(), 11);
        assert_eq!(&msg.payload[..4], &[0xFF; 4]);
        let decoded = MouseMotion::decode(&msg.payload).expect("motion should decode");
        assert_eq!((decoded.dx, decoded.dy), (-1, 2));
    }

    #[test]
    fn button_message_types() {
        let press = MouseButton {
            button: button::UP,
            buttons_state: 0,
            pressed: true,
        };
        assert_eq!(press.msg_type(), 113);
        let release = MouseButton {
            pressed: false,
            ..press
        };
        assert_eq!(release.msg_type(), 114);

        let mut buf = BytesMut::new();
        press.encode(&mut buf);
        assert_eq!(&buf[..], &[4, 0, 0]);
    }

    #[test]
    fn key_event_uses_down_and_up_types() {
        let mut buf = BytesMut::new();
        let down = KeyEvent::down(0x2A);
        down.encode(&mut buf);
        assert_eq!(down.msg_type(), 101);
        assert_eq!(&buf[..], &[0x2A, 0, 0, 0]);
        assert_eq!(KeyEvent::up(0x2A).msg_type(), 102);

        let msg = KeyEvent::up(0x2A).to_message();
        assert_eq!(msg.msg_type, 102);
        assert_eq!(msg.payload.as_ref(), &[0xAA, 0, 0, 0]);
    }
}
