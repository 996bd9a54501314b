//! Inputs channel: keyboard and pointer events towards the guest.
//!
//! [`InputSession`] holds everything an input device needs to remember between
//! events (pressed buttons, last pointer position, motion credit, latched
//! modifier keys). It lives inside the channel's [`InputsHandler`], one per
//! session.

use serde::Serialize;
use spicewire_frame::messages::inputs::{
    button, button_mask, KeyEvent, KeyModifiers, MouseButton, MouseMotion, MousePosition,
    EXTENDED, MOTION_ACK_BUNCH,
};
use spicewire_frame::messages::main::mouse_mode;
use spicewire_frame::msg_type::inputs as ty;
use spicewire_frame::{MiniMessage, WireMessage};
use tracing::{debug, trace};

use crate::error::Result;
use crate::handler::{ChannelEvent, ChannelHandler, Outbound};

/// PC/AT set 1 scancodes used for modifier handling.
pub mod scancode {
    use super::EXTENDED;

    pub const SHIFT_L: u16 = 0x2A;
    pub const CTRL_L: u16 = 0x1D;
    pub const ALT_L: u16 = 0x38;
    pub const CAPS_LOCK: u16 = 0x3A;
    pub const META_L: u16 = EXTENDED | 0x5B;
    /// Keypad period; the guest reads it as Delete in the Ctrl-Alt-Del chord.
    pub const KP_DECIMAL: u16 = 0x53;
}

/// Most unacknowledged motion messages allowed in flight.
pub const MOTION_CREDIT: u32 = 2 * MOTION_ACK_BUNCH;

/// Modifier keys as last sent to the guest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ModifierState {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub meta: bool,
    pub caps_lock: bool,
}

impl ModifierState {
    /// Record a key transition; non-modifier keys are ignored.
    fn latch(&mut self, code: u16, pressed: bool) {
        let slot = match code {
            scancode::SHIFT_L => &mut self.shift,
            scancode::CTRL_L => &mut self.ctrl,
            scancode::ALT_L => &mut self.alt,
            scancode::META_L => &mut self.meta,
            scancode::CAPS_LOCK => &mut self.caps_lock,
            _ => return,
        };
        *slot = pressed;
    }

    fn entries(&self) -> [(u16, bool); 5] {
        [
            (scancode::SHIFT_L, self.shift),
            (scancode::ALT_L, self.alt),
            (scancode::CTRL_L, self.ctrl),
            (scancode::CAPS_LOCK, self.caps_lock),
            (scancode::META_L, self.meta),
        ]
    }
}

/// Per-session input state.
#[derive(Debug, Clone)]
pub struct InputSession {
    mouse_mode: u32,
    display_id: u8,
    buttons_state: u16,
    position: Option<(u32, u32)>,
    motion_in_flight: u32,
    modifiers: ModifierState,
    server_locks: u16,
}

impl Default for InputSession {
    fn default() -> Self {
        Self {
            mouse_mode: mouse_mode::SERVER,
            display_id: 0,
            buttons_state: 0,
            position: None,
            motion_in_flight: 0,
            modifiers: ModifierState::default(),
            server_locks: 0,
        }
    }
}

impl InputSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mouse_mode(&self) -> u32 {
        self.mouse_mode
    }

    /// Follow the main channel's mouse mode.
    pub fn set_mouse_mode(&mut self, mode: u32) {
        debug!(mode, "inputs mouse mode");
        self.mouse_mode = mode;
    }

    pub fn set_display_id(&mut self, display_id: u8) {
        self.display_id = display_id;
    }

    pub fn buttons_state(&self) -> u16 {
        self.buttons_state
    }

    pub fn position(&self) -> Option<(u32, u32)> {
        self.position
    }

    pub fn motion_in_flight(&self) -> u32 {
        self.motion_in_flight
    }

    pub fn modifiers(&self) -> ModifierState {
        self.modifiers
    }

    /// Keyboard lock flags last reported by the server.
    pub fn server_locks(&self) -> u16 {
        self.server_locks
    }

    pub fn key_down(&mut self, code: u16, out: &mut Outbound) {
        self.modifiers.latch(code, true);
        out.push_message(KeyEvent::down(code).to_message());
    }

    pub fn key_up(&mut self, code: u16, out: &mut Outbound) {
        self.modifiers.latch(code, false);
        out.push_message(KeyEvent::up(code).to_message());
    }

    /// Pointer moved to (`x`, `y`).
    ///
    /// Client mouse mode sends the absolute position; server mode sends the
    /// delta from the last position. Returns false when the motion was
    /// discarded because too many motions are still unacknowledged.
    pub fn mouse_move(&mut self, x: u32, y: u32, out: &mut Outbound) -> bool {
        let previous = self.position.replace((x, y));
        if self.motion_in_flight >= MOTION_CREDIT {
            trace!(in_flight = self.motion_in_flight, "discarding mouse motion");
            return false;
        }

        if self.mouse_mode == mouse_mode::CLIENT {
            out.send(&MousePosition {
                x,
                y,
                buttons_state: self.buttons_state,
                display_id: self.display_id,
            });
        } else {
            let (px, py) = previous.unwrap_or((x, y));
            out.send(&MouseMotion {
                dx: x.wrapping_sub(px) as i32,
                dy: y.wrapping_sub(py) as i32,
                buttons_state: self.buttons_state,
                display_id: self.display_id,
            });
        }
        self.motion_in_flight += 1;
        true
    }

    /// Press or release a pointer button.
    pub fn mouse_button(&mut self, button: u8, pressed: bool, out: &mut Outbound) {
        if let Some(mask) = mask_for(button) {
            if pressed {
                self.buttons_state |= mask;
            } else {
                self.buttons_state &= !mask;
            }
        }
        out.push_message(
            MouseButton {
                button,
                buttons_state: self.buttons_state,
                pressed,
            }
            .to_message(),
        );
    }

    /// One wheel notch: press and release of the wheel button.
    pub fn wheel(&mut self, up: bool, out: &mut Outbound) {
        let button = if up { button::UP } else { button::DOWN };
        for pressed in [true, false] {
            out.push_message(
                MouseButton {
                    button,
                    buttons_state: 0,
                    pressed,
                }
                .to_message(),
            );
        }
    }

    pub fn ctrl_alt_del(&mut self, out: &mut Outbound) {
        self.key_down(scancode::CTRL_L, out);
        self.key_down(scancode::ALT_L, out);
        self.key_down(scancode::KP_DECIMAL, out);
        self.key_up(scancode::KP_DECIMAL, out);
        self.key_up(scancode::CTRL_L, out);
        self.key_up(scancode::ALT_L, out);
    }

    /// Bring the guest's modifiers in line with what the host observes.
    ///
    /// Sends a press or release for every modifier whose latched state differs.
    pub fn sync_modifiers(&mut self, host: ModifierState, out: &mut Outbound) {
        let latched = self.modifiers.entries();
        for ((code, was), (_, now)) in latched.into_iter().zip(host.entries()) {
            if was != now {
                debug!(code, pressed = now, "resyncing modifier");
                if now {
                    self.key_down(code, out);
                } else {
                    self.key_up(code, out);
                }
            }
        }
    }

    /// The server acknowledged a bunch of motion messages.
    pub fn motion_acked(&mut self) {
        self.motion_in_flight = self.motion_in_flight.saturating_sub(MOTION_ACK_BUNCH);
    }
}

fn mask_for(button: u8) -> Option<u16> {
    match button {
        button::LEFT => Some(button_mask::LEFT),
        button::MIDDLE => Some(button_mask::MIDDLE),
        button::RIGHT => Some(button_mask::RIGHT),
        _ => None,
    }
}

/// Handler for the inputs channel.
#[derive(Debug, Default)]
pub struct InputsHandler {
    session: InputSession,
}

impl InputsHandler {
    pub fn new(session: InputSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &InputSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut InputSession {
        &mut self.session
    }
}

impl ChannelHandler for InputsHandler {
    fn handle(&mut self, msg: &MiniMessage, out: &mut Outbound) -> Result<bool> {
        match msg.msg_type {
            ty::INIT | ty::KEY_MODIFIERS => {
                let locks = KeyModifiers::decode(&msg.payload)?.modifiers;
                debug!(locks, "server keyboard locks");
                self.session.server_locks = locks;
                out.emit(ChannelEvent::KeyModifiers(locks));
            }
            ty::MOUSE_MOTION_ACK => {
                self.session.motion_acked();
                out.emit(ChannelEvent::MotionAck);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key_codes(out: &Outbound) -> Vec<(u16, u32)> {
        out.messages()
            .iter()
            .map(|m| {
                let mut code = [0u8; 4];
                code.copy_from_slice(&m.payload[..4]);
                (m.msg_type, u32::from_le_bytes(code))
            })
            .collect()
    }

    #[test]
    fn ctrl_alt_del_sequence() {
        let mut session = InputSession::new();
        let mut out = Outbound::new();
        session.ctrl_alt_del(&mut out);

        assert_eq!(
            key_codes(&out),
            vec![
                (ty::CLIENT_KEY_DOWN, 0x1D),
                (ty::CLIENT_KEY_DOWN, 0x38),
                (ty::CLIENT_KEY_DOWN, 0x53),
                (ty::CLIENT_KEY_UP, 0xD3),
                (ty::CLIENT_KEY_UP, 0x9D),
                (ty::CLIENT_KEY_UP, 0xB8),
            ]
        );
        assert_eq!(session.modifiers(), ModifierState::default());
    }

    #[test]
    fn motion_credit_is_bounded_and_restored_by_acks() {
        let mut session = InputSession::new();
        let mut out = Outbound::new();

        let sent = (0..10)
            .filter(|i| session.mouse_move(*i, *i, &mut out))
            .count();
        assert_eq!(sent, MOTION_CREDIT as usize);
        assert_eq!(out.messages().len(), 8);
        assert_eq!(session.position(), Some((9, 9)));

        let mut handler = InputsHandler::new(session);
        let mut out = Outbound::new();
        assert!(handler
            .handle(&MiniMessage::empty(ty::MOUSE_MOTION_ACK), &mut out)
            .expect("ack"));
        assert_eq!(out.events(), &[ChannelEvent::MotionAck]);
        assert_eq!(handler.session().motion_in_flight(), 4);
        assert!(handler.session_mut().mouse_move(20, 20, &mut out));
    }

    #[test]
    fn server_mode_sends_deltas_client_mode_sends_positions() {
        let mut session = InputSession::new();
        let mut out = Outbound::new();
        session.mouse_move(100, 100, &mut out);
        session.mouse_move(90, 105, &mut out);
        let motion = MouseMotion::decode(&out.messages()[1].payload).expect("motion");
        assert_eq!(out.messages()[1].msg_type, ty::CLIENT_MOUSE_MOTION);
        assert_eq!((motion.dx, motion.dy), (-10, 5));

        session.set_mouse_mode(mouse_mode::CLIENT);
        session.set_display_id(0);
        session.mouse_button(button::LEFT, true, &mut out);
        session.mouse_move(7, 8, &mut out);
        let last = out.messages().last().expect("position");
        assert_eq!(last.msg_type, ty::CLIENT_MOUSE_POSITION);
        let position = MousePosition::decode(&last.payload).expect("position");
        assert_eq!((position.x, position.y), (7, 8));
        assert_eq!(position.buttons_state, button_mask::LEFT);
    }

    #[test]
    fn buttons_track_state_and_wheel_sends_zero_state() {
        let mut session = InputSession::new();
        let mut out = Outbound::new();
        session.mouse_button(button::RIGHT, true, &mut out);
        session.mouse_button(button::LEFT, true, &mut out);
        session.mouse_button(button::RIGHT, false, &mut out);
        assert_eq!(session.buttons_state(), button_mask::LEFT);

        let payloads: Vec<&[u8]> = out.messages().iter().map(|m| m.payload.as_ref()).collect();
        assert_eq!(payloads, vec![&[3, 4, 0][..], &[1, 5, 0][..], &[3, 1, 0][..]]);

        let mut out = Outbound::new();
        session.wheel(false, &mut out);
        let wheel: Vec<(u16, &[u8])> = out
            .messages()
            .iter()
            .map(|m| (m.msg_type, m.payload.as_ref()))
            .collect();
        assert_eq!(
            wheel,
            vec![
                (ty::CLIENT_MOUSE_PRESS, &[5, 0, 0][..]),
                (ty::CLIENT_MOUSE_RELEASE, &[5, 0, 0][..]),
            ]
        );
    }

    #[test]
    fn modifier_resync_sends_only_differences() {
        let mut session = InputSession::new();
        let mut out = Outbound::new();
        session.key_down(scancode::SHIFT_L, &mut out);
        session.key_down(scancode::META_L, &mut out);
        assert!(session.modifiers().shift && session.modifiers().meta);

        let mut out = Outbound::new();
        session.sync_modifiers(
            ModifierState {
                shift: true,
                ctrl: true,
                ..ModifierState::default()
            },
            &mut out,
        );
        assert_eq!(
            key_codes(&out),
            vec![(ty::CLIENT_KEY_DOWN, 0x1D), (ty::CLIENT_KEY_UP, 0xDBE0)]
        );
        assert_eq!(
            session.modifiers(),
            ModifierState {
                shift: true,
                ctrl: true,
                ..ModifierState::default()
            }
        );

        let mut out = Outbound::new();
        session.sync_modifiers(session.modifiers(), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn server_locks_are_recorded() {
        let mut handler = InputsHandler::default();
        let mut out = Outbound::new();
        let init = MiniMessage::new(ty::INIT, vec![0x06, 0x00]);
        assert!(handler.handle(&init, &mut out).expect("init"));
        assert_eq!(handler.session().server_locks(), 6);
        assert_eq!(out.events(), &[ChannelEvent::KeyModifiers(6)]);

        assert!(!handler
            .handle(&MiniMessage::empty(150), &mut out)
            .expect("unknown"));
    }
}
