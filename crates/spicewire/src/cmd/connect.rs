use spicewire_channel::{Session, SessionConfig, ShutdownHandle};

use crate::cmd::{parse_target, parse_timeout, ConnectArgs};
use crate::exit::{channel_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_event, summarize, OutputFormat};

pub fn run(args: ConnectArgs, format: OutputFormat) -> CliResult<i32> {
    let target = parse_target(&args.target)?;
    let mut config = SessionConfig::new(target);
    config.connect_timeout = parse_timeout(&args.timeout)?;
    if let Some(password) = args.password {
        config = config.with_password(password);
    }

    let session = Session::new(config);
    let shutdown = session.shutdown_handle();
    install_ctrlc_handler(shutdown.clone())?;

    let mut printed = 0usize;
    session
        .run(|event| {
            let Some(out) = summarize(&event, args.payloads) else {
                return;
            };
            print_event(&out, format);
            printed = printed.saturating_add(1);
            if args.count.is_some_and(|count| printed >= count) {
                shutdown.request();
            }
        })
        .map_err(|err| channel_error("session failed", err))?;

    Ok(SUCCESS)
}

fn install_ctrlc_handler(shutdown: ShutdownHandle) -> CliResult<()> {
    ctrlc::set_handler(move || shutdown.request())
        .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
