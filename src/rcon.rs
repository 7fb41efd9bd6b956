// src/rcon.rs
//
// Minimal client for the Source RCON protocol as spoken by Minecraft servers.
//
// Every packet on the wire is:
//
//   i32 LE  length   (bytes that follow: id + type + body + 2)
//   i32 LE  request id
//   i32 LE  packet type
//   [u8]    body
//   0x00 0x00
//
// A session authenticates with SERVERDATA_AUTH and then exchanges
// SERVERDATA_EXECCOMMAND / SERVERDATA_RESPONSE_VALUE pairs. A rejected
// password comes back as an auth response with id -1.
use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

const HEADER_LEN: usize = 8;
const TRAILER_LEN: usize = 2;
const MIN_FRAME_LEN: i32 = (HEADER_LEN + TRAILER_LEN) as i32;
/// A 4096-byte body plus header, the largest frame a server emits.
const MAX_FRAME_LEN: i32 = 4096 + MIN_FRAME_LEN;
pub const MAX_COMMAND_LEN: usize = 1446;

const AUTH_FAILED_ID: i32 = -1;

#[derive(Debug, Error)]
pub enum RconError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("authentication rejected")]
    AuthRejected,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("command is {0} bytes, the limit is {max}", max = MAX_COMMAND_LEN)]
    CommandTooLong(usize),
}

#[derive(Debug, Clone, Copy)]
pub struct RconTimeouts {
    pub connect: Duration,
    pub io: Duration,
}

impl Default for RconTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(2),
            io: Duration::from_secs(5),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: Vec<u8>,
}

// Auth packets carry the password; keep it out of debug logs.
impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Serialize including the leading length field.
    pub fn encode(&self) -> Vec<u8> {
        let frame_len = HEADER_LEN + self.body.len() + TRAILER_LEN;
        let mut header = [0u8; 12];
        LittleEndian::write_i32(&mut header[0..4], frame_len as i32);
        LittleEndian::write_i32(&mut header[4..8], self.id);
        LittleEndian::write_i32(&mut header[8..12], self.kind);

        let mut buf = Vec::with_capacity(4 + frame_len);
        buf.extend_from_slice(&header);
        buf.extend_from_slice(&self.body);
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    /// Parse one frame, i.e. everything after the length field.
    pub fn decode(frame: &[u8]) -> Result<Self, RconError> {
        if frame.len() < MIN_FRAME_LEN as usize {
            return Err(RconError::Protocol(format!(
                "frame of {} bytes is shorter than the header",
                frame.len()
            )));
        }
        let id = LittleEndian::read_i32(&frame[0..4]);
        let kind = LittleEndian::read_i32(&frame[4..8]);
        let mut body = &frame[HEADER_LEN..];
        while let [rest @ .., 0] = body {
            body = rest;
        }
        Ok(Self {
            id,
            kind,
            body: body.to_vec(),
        })
    }
}

pub async fn read_packet<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Packet, RconError> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = LittleEndian::read_i32(&len_buf);
    if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&len) {
        return Err(RconError::Protocol(format!("invalid frame length {}", len)));
    }
    let mut frame = vec![0u8; len as usize];
    reader.read_exact(&mut frame).await?;
    Packet::decode(&frame)
}

pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    packet: &Packet,
) -> Result<(), RconError> {
    writer.write_all(&packet.encode()).await?;
    writer.flush().await?;
    Ok(())
}

async fn within<T, F>(limit: Duration, fut: F) -> Result<T, RconError>
where
    F: Future<Output = Result<T, RconError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| RconError::Timeout(limit))?
}

async fn auth_exchange(stream: &mut TcpStream, request: Packet) -> Result<(), RconError> {
    write_packet(stream, &request).await?;
    loop {
        let packet = read_packet(stream).await?;
        match packet.kind {
            SERVERDATA_AUTH_RESPONSE if packet.id == AUTH_FAILED_ID => {
                return Err(RconError::AuthRejected)
            }
            SERVERDATA_AUTH_RESPONSE if packet.id == request.id => return Ok(()),
            SERVERDATA_AUTH_RESPONSE => {
                return Err(RconError::Protocol(format!(
                    "auth response for request {} while waiting for {}",
                    packet.id, request.id
                )))
            }
            // Source servers send an empty value packet ahead of the auth response.
            SERVERDATA_RESPONSE_VALUE => continue,
            other => {
                return Err(RconError::Protocol(format!(
                    "unexpected packet type {} during auth",
                    other
                )))
            }
        }
    }
}

async fn command_exchange(stream: &mut TcpStream, request: Packet) -> Result<String, RconError> {
    write_packet(stream, &request).await?;
    let packet = read_packet(stream).await?;
    if packet.id != request.id || packet.kind != SERVERDATA_RESPONSE_VALUE {
        return Err(RconError::Protocol(format!(
            "expected response to request {}, got {:?}",
            request.id, packet
        )));
    }
    Ok(packet.body_text())
}

/// One authenticated RCON session.
pub struct RconClient {
    stream: TcpStream,
    next_id: i32,
    io_timeout: Duration,
}

impl RconClient {
    pub async fn connect(
        host: &str,
        port: u16,
        password: &str,
        timeouts: RconTimeouts,
    ) -> Result<Self, RconError> {
        let stream = within(timeouts.connect, async {
            TcpStream::connect((host, port))
                .await
                .map_err(RconError::from)
        })
        .await?;
        debug!("RCON connected to {}:{}", host, port);

        let mut client = Self {
            stream,
            next_id: rand::thread_rng().gen_range(1..0x7fff),
            io_timeout: timeouts.io,
        };
        client.authenticate(password).await?;
        Ok(client)
    }

    fn next_request_id(&mut self) -> i32 {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(1).unwrap_or(1);
        id
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        let id = self.next_request_id();
        let request = Packet::new(id, SERVERDATA_AUTH, password);
        within(self.io_timeout, auth_exchange(&mut self.stream, request)).await
    }

    /// Send one command and return the body of its response.
    pub async fn command(&mut self, command: &str) -> Result<String, RconError> {
        if command.len() > MAX_COMMAND_LEN {
            return Err(RconError::CommandTooLong(command.len()));
        }
        let id = self.next_request_id();
        let request = Packet::new(id, SERVERDATA_EXECCOMMAND, command);
        within(self.io_timeout, command_exchange(&mut self.stream, request)).await
    }

    pub async fn close(mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!("RCON shutdown: {}", e);
        }
    }
}

/// Open a fresh session, run exactly one command and tear the session down.
pub async fn execute(
    host: &str,
    port: u16,
    password: &str,
    command: &str,
    timeouts: RconTimeouts,
) -> Result<String, RconError> {
    if command.len() > MAX_COMMAND_LEN {
        return Err(RconError::CommandTooLong(command.len()));
    }
    let mut client = RconClient::connect(host, port, password, timeouts).await?;
    let response = client.command(command).await;
    client.close().await;
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn auth_packet_layout() {
        let bytes = Packet::new(7, SERVERDATA_AUTH, "pw").encode();
        assert_eq!(
            bytes,
            vec![
                12, 0, 0, 0, // length
                7, 0, 0, 0, // id
                3, 0, 0, 0, // type
                b'p', b'w', 0, 0,
            ]
        );
    }

    #[test]
    fn decode_strips_terminators() {
        let frame = [9, 0, 0, 0, 0, 0, 0, 0, b'o', b'k', 0, 0];
        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(packet.id, 9);
        assert_eq!(packet.kind, SERVERDATA_RESPONSE_VALUE);
        assert_eq!(packet.body_text(), "ok");
    }

    #[test]
    fn decode_rejects_truncated_frames() {
        assert!(matches!(
            Packet::decode(&[1, 0, 0, 0]),
            Err(RconError::Protocol(_))
        ));
    }

    #[tokio::test]
    async fn oversized_frame_length_is_rejected() {
        let mut bytes: &[u8] = &[0xff, 0xff, 0x00, 0x00];
        let err = read_packet(&mut bytes).await.unwrap_err();
        assert!(matches!(err, RconError::Protocol(_)));
    }

    #[test]
    fn debug_output_hides_body() {
        let rendered = format!("{:?}", Packet::new(1, SERVERDATA_AUTH, "hunter2"));
        assert!(!rendered.contains("hunter2"));
    }

    /// Accepts one session, answers auth and a single command.
    async fn serve_once(listener: TcpListener, password: &'static str, reply: &'static str) {
        let (mut socket, _) = listener.accept().await.unwrap();
        let auth = read_packet(&mut socket).await.unwrap();
        assert_eq!(auth.kind, SERVERDATA_AUTH);
        write_packet(&mut socket, &Packet::new(auth.id, SERVERDATA_RESPONSE_VALUE, ""))
            .await
            .unwrap();
        let id = if auth.body == password.as_bytes() { auth.id } else { AUTH_FAILED_ID };
        write_packet(&mut socket, &Packet::new(id, SERVERDATA_AUTH_RESPONSE, ""))
            .await
            .unwrap();
        if id == AUTH_FAILED_ID {
            return;
        }
        let cmd = read_packet(&mut socket).await.unwrap();
        assert_eq!(cmd.kind, SERVERDATA_EXECCOMMAND);
        let body = format!("{}: {}", cmd.body_text(), reply);
        write_packet(&mut socket, &Packet::new(cmd.id, SERVERDATA_RESPONSE_VALUE, body))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn executes_one_command() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve_once(listener, "secret", "done"));

        let response = execute("127.0.0.1", port, "secret", "say hi", RconTimeouts::default())
            .await
            .unwrap();
        assert_eq!(response, "say hi: done");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve_once(listener, "secret", "done"));

        let err = execute("127.0.0.1", port, "guess", "list", RconTimeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RconError::AuthRejected));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
            drop(socket);
        });

        let timeouts = RconTimeouts {
            connect: Duration::from_secs(1),
            io: Duration::from_millis(200),
        };
        let err = execute("127.0.0.1", port, "secret", "list", timeouts)
            .await
            .unwrap_err();
        assert!(matches!(err, RconError::Timeout(_)));
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_io_error() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };
        let err = execute("127.0.0.1", port, "secret", "list", RconTimeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RconError::Io(_)));
    }

    #[tokio::test]
    async fn long_command_fails_before_connecting() {
        let command = "x".repeat(MAX_COMMAND_LEN + 1);
        // Port 9 is never contacted.
        let err = execute("127.0.0.1", 9, "secret", &command, RconTimeouts::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RconError::CommandTooLong(n) if n == MAX_COMMAND_LEN + 1));
    }
}
