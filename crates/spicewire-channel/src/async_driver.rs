//! Tokio counterpart of [`crate::driver`]: runs a [`Connection`] over an
//! [`AsyncWireStream`].

use std::time::Instant;

use bytes::Bytes;
use spicewire_transport::{AsyncWireStream, Target, TransportError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info};

use crate::connection::Connection;
use crate::driver::{DriverConfig, ShutdownHandle};
use crate::error::Result;
use crate::handler::{ChannelEvent, ChannelHandler};

/// Connect to `target` and run `conn` until it ends.
pub async fn connect_and_run_async<H, F>(
    conn: &mut Connection<H>,
    target: &Target,
    config: &DriverConfig,
    shutdown: &ShutdownHandle,
    on_event: F,
) -> Result<()>
where
    H: ChannelHandler,
    F: FnMut(&mut Connection<H>, ChannelEvent),
{
    debug!(channel = %conn.channel(), %target, "connecting (async)");
    let connect = tokio::time::timeout(conn.config().connect_timeout, target.connect_async());
    match connect.await {
        Ok(Ok(stream)) => run_async(conn, stream, config, shutdown, on_event).await,
        Ok(Err(err)) => conn.on_transport_error(err),
        Err(_) => conn.poll_timeout(conn.deadline().unwrap_or_else(Instant::now)),
    }
}

/// Run `conn` over a connected stream until it closes, fails or `shutdown`
/// is requested.
pub async fn run_async<H, F>(
    conn: &mut Connection<H>,
    mut stream: AsyncWireStream,
    config: &DriverConfig,
    shutdown: &ShutdownHandle,
    mut on_event: F,
) -> Result<()>
where
    H: ChannelHandler,
    F: FnMut(&mut Connection<H>, ChannelEvent),
{
    let result = drive(conn, &mut stream, config, shutdown, &mut on_event).await;
    let _ = stream.shutdown().await;
    info!(channel = %conn.channel(), state = %conn.state(), "channel stopped");
    result
}

async fn drive<H, F>(
    conn: &mut Connection<H>,
    stream: &mut AsyncWireStream,
    config: &DriverConfig,
    shutdown: &ShutdownHandle,
    on_event: &mut F,
) -> Result<()>
where
    H: ChannelHandler,
    F: FnMut(&mut Connection<H>, ChannelEvent),
{
    conn.on_open()?;

    let mut buf = vec![0u8; config.read_chunk_size.max(1)];
    let mut tick = tokio::time::interval(config.poll_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        write_outbox(conn, stream).await?;
        while let Some(event) = conn.poll_event() {
            on_event(conn, event);
        }
        write_outbox(conn, stream).await?;

        if conn.wants_close() {
            return Ok(());
        }
        if shutdown.is_requested() {
            conn.close();
            continue;
        }

        let deadline = conn.deadline();
        let expired = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            read = stream.read(&mut buf) => match read {
                Ok(0) => conn.on_close()?,
                Ok(n) => conn.on_data(Bytes::copy_from_slice(&buf[..n]))?,
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => {}
                Err(err) => conn.on_transport_error(TransportError::Io(err))?,
            },
            _ = expired => conn.poll_timeout(Instant::now())?,
            _ = tick.tick() => {}
        }
    }
}

async fn write_outbox<H: ChannelHandler>(
    conn: &mut Connection<H>,
    stream: &mut AsyncWireStream,
) -> Result<()> {
    for frame in conn.take_outbox() {
        if let Err(err) = stream.write_all(&frame).await {
            return conn.on_transport_error(TransportError::Io(err));
        }
    }
    stream
        .flush()
        .await
        .or_else(|err| conn.on_transport_error(TransportError::Io(err)))
}

#[cfg(all(test, unix))]
mod tests {
    use std::net::TcpListener;
    use std::thread;

    use spicewire_frame::msg_type::{client, server};
    use spicewire_frame::{ChannelId, ChannelType, MiniMessage};

    use super::*;
    use crate::config::ConnectionConfig;
    use crate::error::ChannelError;
    use crate::state::ConnectionState;
    use crate::testing::{FakeServer, PlainEncryptor};

    #[tokio::test]
    async fn async_driver_links_and_answers_ping() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let port = listener
            .local_addr()
            .expect("listener should have an address")
            .port();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("client should connect");
            let mut server = FakeServer::new(stream);
            server.accept();
            server.send(&MiniMessage::new(server::PING, vec![9u8; 12]));
            let pong = server.recv();
            assert_eq!(pong.msg_type, client::PONG);
            assert_eq!(pong.payload.as_ref(), &[9u8; 12]);
        });

        let channel = ChannelId::new(ChannelType::Port, 0);
        let mut conn = Connection::builtin(ConnectionConfig::for_channel(channel))
            .with_encryptor(PlainEncryptor);
        let mut events = Vec::new();
        let err = connect_and_run_async(
            &mut conn,
            &Target::tcp("127.0.0.1", port),
            &DriverConfig::default(),
            &ShutdownHandle::new(),
            |_, event| events.push(event),
        )
        .await
        .expect_err("server hang-up after ready is an error");
        server.join().expect("server thread should finish");

        assert!(matches!(
            err,
            ChannelError::Disconnected(ConnectionState::Ready)
        ));
        assert_eq!(events, vec![ChannelEvent::Ready { channel }]);
        assert_eq!(conn.messages_received(), 1);
    }

    #[tokio::test]
    async fn shutdown_stops_a_quiet_channel() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
        let port = listener
            .local_addr()
            .expect("listener should have an address")
            .port();
        let shutdown = ShutdownHandle::new();
        let stopper = shutdown.clone();
        let server = thread::spawn(move || {
            let (stream, _) = listener.accept().expect("client should connect");
            let mut server = FakeServer::new(stream);
            server.accept();
            stopper.request();
            // Hold the socket open until the client leaves.
            let mut rest = Vec::new();
            let _ = std::io::Read::read_to_end(&mut server.stream, &mut rest);
        });

        let mut conn = Connection::builtin(ConnectionConfig::for_channel(ChannelId::new(
            ChannelType::Cursor,
            0,
        )))
        .with_encryptor(PlainEncryptor);
        connect_and_run_async(
            &mut conn,
            &Target::tcp("127.0.0.1", port),
            &DriverConfig::default(),
            &shutdown,
            |_, _| {},
        )
        .await
        .expect("requested shutdown is a clean stop");
        server.join().expect("server thread should finish");
        assert_eq!(conn.state(), ConnectionState::Closing);
    }
}
