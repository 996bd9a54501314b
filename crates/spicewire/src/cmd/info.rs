use std::thread;

use serde::Serialize;
use spicewire_channel::{ChannelEvent, Connection, ConnectionConfig, Driver, DriverConfig};
use spicewire_frame::messages::main::mouse_mode;
use spicewire_frame::ChannelId;

use crate::cmd::{parse_target, parse_timeout, InfoArgs};
use crate::exit::{channel_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct InfoOutput {
    target: String,
    session_id: u32,
    current_mouse_mode: u32,
    supported_mouse_modes: u32,
    agent_connected: bool,
    agent_tokens: u32,
    common_caps: Vec<u32>,
    main_caps: Vec<u32>,
    channels: Vec<ChannelId>,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let target = parse_target(&args.target)?;
    let timeout = parse_timeout(&args.timeout)?;
    let mut config = ConnectionConfig {
        connect_timeout: timeout,
        ..ConnectionConfig::default()
    };
    if let Some(password) = args.password {
        config = config.with_password(password);
    }

    let mut conn = Connection::builtin(config);
    let mut driver = Driver::new(DriverConfig::default());

    // The connect timeout covers the link only; bound the wait for the list too.
    let stop = driver.shutdown_handle();
    thread::spawn(move || {
        thread::sleep(timeout);
        stop.request();
    });

    let mut listed = false;
    driver
        .connect_and_run(&mut conn, &target, |conn, event| {
            if let ChannelEvent::ChannelsList(_) = event {
                listed = true;
                conn.close();
            }
        })
        .map_err(|err| channel_error("info failed", err))?;

    if !listed {
        return Err(CliError::new(
            TIMEOUT,
            format!("no channel list from {target} within {timeout:?}"),
        ));
    }

    let main = conn
        .handler()
        .as_main()
        .ok_or_else(|| CliError::new(INTERNAL, "main channel handler missing"))?;
    let init = main.init().copied().unwrap_or_default();
    let (common_caps, main_caps) = conn
        .server_caps()
        .map(|caps| (caps.common.bits(), caps.channel.bits()))
        .unwrap_or_default();

    let out = InfoOutput {
        target: target.to_string(),
        session_id: init.session_id,
        current_mouse_mode: main.mouse_mode(),
        supported_mouse_modes: main.supported_mouse_modes(),
        agent_connected: main.agent_connected(),
        agent_tokens: main.agent_tokens(),
        common_caps,
        main_caps,
        channels: main.channels().to_vec(),
    };
    print_info(&out, format);
    Ok(SUCCESS)
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Session Info:");
            println!("  Target:        {}", out.target);
            println!("  Session ID:    {}", out.session_id);
            println!(
                "  Mouse mode:    {} (supported: {})",
                mouse_mode_name(out.current_mouse_mode),
                mouse_modes(out.supported_mouse_modes)
            );
            if out.agent_connected {
                println!("  Agent:         connected ({} tokens)", out.agent_tokens);
            } else {
                println!("  Agent:         not connected");
            }
            println!("  Common caps:   {:?}", out.common_caps);
            println!("  Main caps:     {:?}", out.main_caps);
            let channels = out
                .channels
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            println!("  Channels:      {channels}");
        }
    }
}

fn mouse_mode_name(mode: u32) -> &'static str {
    match mode {
        mouse_mode::SERVER => "server",
        mouse_mode::CLIENT => "client",
        _ => "unknown",
    }
}

fn mouse_modes(flags: u32) -> String {
    let names: Vec<&str> = [mouse_mode::SERVER, mouse_mode::CLIENT]
        .into_iter()
        .filter(|mode| flags & mode != 0)
        .map(mouse_mode_name)
        .collect();
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mouse_modes_are_named() {
        assert_eq!(mouse_modes(mouse_mode::SERVER | mouse_mode::CLIENT), "server, client");
        assert_eq!(mouse_modes(0), "none");
        assert_eq!(mouse_mode_name(7), "unknown");
    }
}
