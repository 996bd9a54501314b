use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::debug;

use crate::error::{Result, TransportError};
use crate::stream::WireStream;

/// Maximum socket path length.
/// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
#[cfg(target_os = "linux")]
const MAX_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const MAX_PATH_LEN: usize = 104;

/// Connect to a listening Unix domain socket (blocking).
///
/// QEMU exposes SPICE this way with `-spice unix=on,addr=<path>`.
pub(crate) fn connect(path: &Path) -> Result<WireStream> {
    let len = path.as_os_str().len();
    if len >= MAX_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: MAX_PATH_LEN,
        });
    }

    let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
        target: path.display().to_string(),
        source,
    })?;
    debug!(?path, "connected to unix domain socket");
    Ok(WireStream::from_unix(stream))
}
