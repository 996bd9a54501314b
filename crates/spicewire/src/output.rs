use std::io::IsTerminal;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;
use spicewire_channel::{ChannelEvent, SessionEvent};
use spicewire_frame::ChannelId;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One printed line of `connect` output.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EventOutput {
    pub channel: ChannelId,
    pub event: &'static str,
    pub detail: String,
    pub timestamp: String,
}

impl EventOutput {
    fn new(channel: ChannelId, event: &'static str, detail: impl Into<String>) -> Self {
        Self {
            channel,
            event,
            detail: detail.into(),
            timestamp: now_unix_seconds(),
        }
    }
}

/// Summarize a session event for printing; `None` for events not shown.
pub fn summarize(event: &SessionEvent, payloads: bool) -> Option<EventOutput> {
    let out = match event {
        SessionEvent::Spawned { channel, .. } => EventOutput::new(*channel, "opening", ""),
        SessionEvent::Closed { channel, error } => EventOutput::new(
            *channel,
            "closed",
            error.clone().unwrap_or_else(|| "clean".to_string()),
        ),
        SessionEvent::Channel { channel, event } => {
            let (name, detail) = match event {
                ChannelEvent::Ready { .. } => ("ready", String::new()),
                ChannelEvent::MainInit(init) => (
                    "main-init",
                    format!(
                        "session_id={} mouse_mode={} agent_connected={} agent_tokens={}",
                        init.session_id,
                        init.current_mouse_mode,
                        init.agent_connected != 0,
                        init.agent_tokens
                    ),
                ),
                ChannelEvent::ChannelsList(channels) => (
                    "channels",
                    channels
                        .iter()
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join(","),
                ),
                ChannelEvent::MouseMode(mode) => (
                    "mouse-mode",
                    format!("current={} supported={}", mode.current, mode.supported),
                ),
                ChannelEvent::AgentConnected { tokens } => {
                    ("agent-connected", format!("tokens={tokens}"))
                }
                ChannelEvent::AgentDisconnected => ("agent-disconnected", String::new()),
                ChannelEvent::AgentMessage { msg_type, data } => (
                    "agent-message",
                    format!("type={msg_type} size={}", data.len()),
                ),
                ChannelEvent::KeyModifiers(locks) => ("key-modifiers", format!("{locks:#06x}")),
                ChannelEvent::MotionAck => return None,
                ChannelEvent::Notify { severity, message } => {
                    ("notify", format!("{severity}: {message}"))
                }
                ChannelEvent::Payload { message, .. } if payloads => (
                    "payload",
                    format!("type={} size={}", message.msg_type, message.payload.len()),
                ),
                ChannelEvent::Payload { .. } => return None,
            };
            EventOutput::new(*channel, name, detail)
        }
    };
    Some(out)
}

pub fn print_event(out: &EventOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["CHANNEL", "EVENT", "DETAIL"])
                .add_row(vec![
                    out.channel.to_string(),
                    out.event.to_string(),
                    out.detail.clone(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            if out.detail.is_empty() {
                println!("{} {}", out.channel, out.event);
            } else {
                println!("{} {} {}", out.channel, out.event, out.detail);
            }
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
