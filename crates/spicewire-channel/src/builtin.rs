use spicewire_frame::{ChannelId, ChannelType, MiniMessage};

use crate::error::Result;
use crate::forward::{DisplayHandler, ForwardHandler};
use crate::handler::{ChannelHandler, Outbound};
use crate::inputs::InputsHandler;
use crate::main_channel::MainHandler;

/// The handler this client installs for each channel category.
#[derive(Debug)]
pub enum BuiltinHandler {
    Main(MainHandler),
    Inputs(InputsHandler),
    Display(DisplayHandler),
    Forward(ForwardHandler),
}

impl BuiltinHandler {
    /// Pick the handler for `channel`.
    pub fn for_channel(channel: ChannelId) -> Self {
        match channel.kind {
            ChannelType::Main => Self::Main(MainHandler::new()),
            ChannelType::Inputs => Self::Inputs(InputsHandler::default()),
            ChannelType::Display => Self::Display(DisplayHandler::new(channel)),
            _ => Self::Forward(ForwardHandler::new(channel)),
        }
    }

    pub fn as_main(&self) -> Option<&MainHandler> {
        match self {
            Self::Main(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn as_main_mut(&mut self) -> Option<&mut MainHandler> {
        match self {
            Self::Main(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn as_inputs(&self) -> Option<&InputsHandler> {
        match self {
            Self::Inputs(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn as_inputs_mut(&mut self) -> Option<&mut InputsHandler> {
        match self {
            Self::Inputs(handler) => Some(handler),
            _ => None,
        }
    }
}

impl ChannelHandler for BuiltinHandler {
    fn on_linked(&mut self, out: &mut Outbound) -> Result<()> {
        match self {
            Self::Main(handler) => handler.on_linked(out),
            Self::Inputs(handler) => handler.on_linked(out),
            Self::Display(handler) => handler.on_linked(out),
            Self::Forward(handler) => handler.on_linked(out),
        }
    }

    fn handle(&mut self, msg: &MiniMessage, out: &mut Outbound) -> Result<bool> {
        match self {
            Self::Main(handler) => handler.handle(msg, out),
            Self::Inputs(handler) => handler.handle(msg, out),
            Self::Display(handler) => handler.handle(msg, out),
            Self::Forward(handler) => handler.handle(msg, out),
        }
    }
}
