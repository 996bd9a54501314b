use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::WireStream;

/// Connect to `host:port`, trying every resolved address in order.
pub(crate) fn connect(host: &str, port: u16, timeout: Option<Duration>) -> Result<WireStream> {
    let target = format!("{host}:{port}");
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Connect {
            target: target.clone(),
            source,
        })?;

    let mut last_err = None;
    for addr in addrs {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                // Small protocol messages (acks, pongs, input events) must not be delayed.
                stream.set_nodelay(true)?;
                debug!(%addr, "connected over tcp");
                return Ok(WireStream::from_tcp(stream));
            }
            Err(err) => {
                debug!(%addr, error = %err, "tcp connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(TransportError::Connect {
        target,
        source: last_err.unwrap_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "host resolved to no addresses",
            )
        }),
    })
}
