#![cfg(feature = "cli")]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::process::Command;
use std::thread;

use bytes::{Bytes, BytesMut};
use rsa::pkcs8::EncodePublicKey;
use rsa::{Oaep, RsaPrivateKey};
use spicewire::frame::caps::common;
use spicewire::frame::link::AUTH_TICKET_SIZE;
use spicewire::frame::messages::main::{mouse_mode, ChannelsList, MainInit};
use spicewire::frame::msg_type::main as main_ty;
use spicewire::frame::{
    AuthReply, AuthTicket, CapabilitySet, ChannelId, ChannelType, LinkError, LinkHeader,
    LinkReply, MiniHeader, MiniMessage, WireMessage, LINK_HEADER_SIZE, MINI_HEADER_SIZE,
};

fn spicewire() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_spicewire"));
    cmd.arg("--log-level").arg("error").env_remove("SPICE_PASSWORD");
    cmd
}

fn read_exact(stream: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    stream
        .read_exact(&mut buf)
        .expect("server should read from client");
    buf
}

/// Link one client over `stream`, accepting only `password`.
fn link(stream: &mut TcpStream, password: &str) -> bool {
    let key =
        RsaPrivateKey::new(&mut rsa::rand_core::OsRng, 1024).expect("test key should generate");

    let header = LinkHeader::decode(&read_exact(stream, LINK_HEADER_SIZE))
        .expect("client should send a link header");
    read_exact(stream, header.size as usize);

    let der = key
        .to_public_key()
        .to_public_key_der()
        .expect("public key should encode");
    let reply = LinkReply {
        error: LinkError::OK,
        pub_key: Bytes::copy_from_slice(der.as_bytes()),
        common_caps: CapabilitySet::new().with(common::AUTH_SPICE),
        channel_caps: CapabilitySet::new(),
    };
    let mut body = BytesMut::new();
    reply.encode(&mut body).expect("reply should encode");
    let mut out = BytesMut::new();
    LinkHeader::new(body.len() as u32).encode(&mut out);
    out.extend_from_slice(&body);
    stream.write_all(&out).expect("server should send link reply");

    let ticket = AuthTicket::decode(&read_exact(stream, AUTH_TICKET_SIZE))
        .expect("client should send a ticket");
    let plaintext = key
        .decrypt(Oaep::new::<sha1::Sha1>(), &ticket.encrypted)
        .expect("ticket should decrypt");
    let accepted = plaintext.strip_suffix(&[0u8]) == Some(password.as_bytes());

    let code = if accepted {
        LinkError::OK
    } else {
        LinkError::PERMISSION_DENIED
    };
    let mut out = BytesMut::new();
    AuthReply { code }.encode(&mut out);
    stream.write_all(&out).expect("server should send auth reply");
    accepted
}

fn send(stream: &mut TcpStream, message: &MiniMessage) {
    let frame = message.to_frame().expect("server frame should encode");
    stream.write_all(&frame).expect("server should send message");
}

fn recv_type(stream: &mut TcpStream) -> u16 {
    let header = MiniHeader::decode(&read_exact(stream, MINI_HEADER_SIZE))
        .expect("client should send a mini header");
    read_exact(stream, header.size as usize);
    header.msg_type
}

fn local_listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("listener should bind");
    let addr = listener
        .local_addr()
        .expect("listener should have an address");
    (listener, format!("spice://{addr}"))
}

#[test]
fn version_prints_name() {
    let output = spicewire()
        .arg("version")
        .output()
        .expect("version should run");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("spicewire "));
}

#[test]
fn invalid_target_is_usage_error() {
    let output = spicewire()
        .args(["info", "host:notaport"])
        .output()
        .expect("info should run");
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn refused_connection_is_transport_error() {
    let (listener, target) = local_listener();
    drop(listener);

    let output = spicewire()
        .args(["info", &target, "--timeout", "2s"])
        .output()
        .expect("info should run");
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn info_reports_session_and_channels() {
    let (listener, target) = local_listener();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("client should connect");
        assert!(link(&mut stream, "s3cret"));
        send(
            &mut stream,
            &MainInit {
                session_id: 1234,
                supported_mouse_modes: mouse_mode::SERVER,
                current_mouse_mode: mouse_mode::SERVER,
                ..MainInit::default()
            }
            .to_message(),
        );
        assert_eq!(recv_type(&mut stream), main_ty::CLIENT_ATTACH_CHANNELS);
        send(
            &mut stream,
            &ChannelsList {
                channels: vec![
                    ChannelId::main(),
                    ChannelId::new(ChannelType::Display, 0),
                    ChannelId::new(ChannelType::Inputs, 0),
                ],
            }
            .to_message(),
        );
        let mut rest = Vec::new();
        let _ = stream.read_to_end(&mut rest);
    });

    let output = spicewire()
        .args(["--format", "json", "info", &target, "--timeout", "10s"])
        .env("SPICE_PASSWORD", "s3cret")
        .output()
        .expect("info should run");
    server.join().expect("server thread should finish");

    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"session_id\":1234"));
    assert!(stdout.contains("\"agent_connected\":false"));
    assert!(stdout.contains("display"));
}

#[test]
fn wrong_password_exits_with_permission_denied() {
    let (listener, target) = local_listener();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("client should connect");
        assert!(!link(&mut stream, "right"));
    });

    let output = spicewire()
        .args(["info", &target, "--password", "wrong"])
        .output()
        .expect("info should run");
    server.join().expect("server thread should finish");

    assert_eq!(output.status.code(), Some(50));
}
