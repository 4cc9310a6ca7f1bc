//! SOCKS5 handshake state machine (server side).
//!
//! # States
//! ```text
//! AwaitGreeting ──greeting ok──▶ AwaitRequest ──request ok──▶ Ready(target)
//!       │                              │
//!       └──────── violation ───────────┴──────────▶ Rejected
//! ```
//!
//! Greeting violations close silently: the peer has not proven it speaks
//! version 5, so no reply byte is sent. Once the request header is read,
//! unsupported commands and address types get one fixed reply frame.
//!
//! Only `CONNECT` with "no authentication" is supported.

use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::socks::address::{AddressError, TargetAddress};

/// Protocol version byte.
pub const SOCKS_VERSION: u8 = 0x05;
/// "No authentication required" method.
pub const METHOD_NO_AUTH: u8 = 0x00;
/// "Establish a TCP stream" command.
pub const CMD_CONNECT: u8 = 0x01;

/// Reply codes written in the request reply frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    Succeeded = 0x00,
    GeneralFailure = 0x01,
    HostUnreachable = 0x04,
    ConnectionRefused = 0x05,
    CommandNotSupported = 0x07,
    AddressTypeNotSupported = 0x08,
}

impl ReplyCode {
    /// Fixed-format reply: IPv4 type with zeroed address and port.
    pub fn frame(self) -> [u8; 10] {
        [SOCKS_VERSION, self as u8, 0x00, 0x01, 0, 0, 0, 0, 0, 0]
    }
}

/// Why a handshake did not produce a target.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Version byte was not 5.
    #[error("unsupported protocol version 0x{0:02x}")]
    BadVersion(u8),

    /// Greeting offered no methods, or not "no authentication".
    #[error("no acceptable authentication method")]
    NoAcceptableMethod,

    /// Command other than CONNECT; a reply was sent.
    #[error("unsupported command 0x{0:02x}")]
    UnsupportedCommand(u8),

    /// Unknown address type tag; a reply was sent.
    #[error("unsupported address type 0x{0:02x}")]
    UnsupportedAddressType(u8),

    /// Address bytes could not be decoded.
    #[error("malformed address: {0}")]
    MalformedAddress(#[source] AddressError),

    /// The handshake deadline elapsed.
    #[error("handshake timed out")]
    Timeout,

    /// Peer closed the connection mid-handshake.
    #[error("connection closed during handshake")]
    Closed,

    #[error("I/O error during handshake: {0}")]
    Io(#[source] std::io::Error),
}

impl HandshakeError {
    /// Whether a reply frame was written before the failure.
    pub fn reply_sent(&self) -> bool {
        matches!(
            self,
            HandshakeError::UnsupportedCommand(_) | HandshakeError::UnsupportedAddressType(_)
        )
    }

    /// Short label for logs and metrics.
    pub fn reason(&self) -> &'static str {
        match self {
            HandshakeError::BadVersion(_) => "bad_version",
            HandshakeError::NoAcceptableMethod => "no_acceptable_method",
            HandshakeError::UnsupportedCommand(_) => "unsupported_command",
            HandshakeError::UnsupportedAddressType(_) => "unsupported_address_type",
            HandshakeError::MalformedAddress(_) => "malformed_address",
            HandshakeError::Timeout => "timeout",
            HandshakeError::Closed => "closed",
            HandshakeError::Io(_) => "io",
        }
    }
}

impl From<std::io::Error> for HandshakeError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => HandshakeError::Closed,
            std::io::ErrorKind::TimedOut => HandshakeError::Timeout,
            _ => HandshakeError::Io(e),
        }
    }
}

/// Current position in the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    AwaitGreeting,
    AwaitRequest,
    Ready(TargetAddress),
    /// Terminal failure; `reply` is the frame code sent, if any.
    Rejected { reply: Option<ReplyCode> },
}

/// Drives one client connection through the handshake.
pub struct Negotiator<'a, S> {
    stream: &'a mut S,
    state: HandshakeState,
}

impl<'a, S> Negotiator<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: &'a mut S) -> Self {
        Self {
            stream,
            state: HandshakeState::AwaitGreeting,
        }
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// Advance by one state. Terminal states are left unchanged.
    pub async fn step(&mut self) -> Result<(), HandshakeError> {
        let result = match self.state {
            HandshakeState::AwaitGreeting => self.greeting().await,
            HandshakeState::AwaitRequest => self.request().await,
            HandshakeState::Ready(_) | HandshakeState::Rejected { .. } => return Ok(()),
        };

        match result {
            Ok(next) => {
                self.state = next;
                Ok(())
            }
            Err(e) => {
                let reply = match &e {
                    HandshakeError::UnsupportedCommand(_) => Some(ReplyCode::CommandNotSupported),
                    HandshakeError::UnsupportedAddressType(_) => {
                        Some(ReplyCode::AddressTypeNotSupported)
                    }
                    _ => None,
                };
                self.state = HandshakeState::Rejected { reply };
                Err(e)
            }
        }
    }

    /// Run to a terminal state, returning the requested target.
    pub async fn run(mut self) -> Result<TargetAddress, HandshakeError> {
        loop {
            self.step().await?;
            if let HandshakeState::Ready(target) = &self.state {
                return Ok(target.clone());
            }
        }
    }

    async fn greeting(&mut self) -> Result<HandshakeState, HandshakeError> {
        let mut header = [0u8; 2];
        self.stream.read_exact(&mut header).await?;
        let [version, nmethods] = header;

        if version != SOCKS_VERSION {
            return Err(HandshakeError::BadVersion(version));
        }
        if nmethods == 0 {
            return Err(HandshakeError::NoAcceptableMethod);
        }

        let mut methods = vec![0u8; nmethods as usize];
        self.stream.read_exact(&mut methods).await?;
        if !methods.contains(&METHOD_NO_AUTH) {
            return Err(HandshakeError::NoAcceptableMethod);
        }

        self.stream.write_all(&[SOCKS_VERSION, METHOD_NO_AUTH]).await?;
        self.stream.flush().await?;
        Ok(HandshakeState::AwaitRequest)
    }

    async fn request(&mut self) -> Result<HandshakeState, HandshakeError> {
        let mut header = [0u8; 3];
        self.stream.read_exact(&mut header).await?;
        let [version, command, _reserved] = header;

        if version != SOCKS_VERSION {
            return Err(HandshakeError::BadVersion(version));
        }
        if command != CMD_CONNECT {
            send_reply(&mut *self.stream, ReplyCode::CommandNotSupported).await?;
            return Err(HandshakeError::UnsupportedCommand(command));
        }

        match TargetAddress::read_from(&mut *self.stream).await {
            Ok(target) => Ok(HandshakeState::Ready(target)),
            Err(AddressError::UnsupportedType(atyp)) => {
                send_reply(&mut *self.stream, ReplyCode::AddressTypeNotSupported).await?;
                Err(HandshakeError::UnsupportedAddressType(atyp))
            }
            Err(AddressError::Incomplete) => Err(HandshakeError::Closed),
            Err(AddressError::Io(e)) => Err(e.into()),
            Err(e) => Err(HandshakeError::MalformedAddress(e)),
        }
    }
}

/// Run the full handshake under a single deadline.
pub async fn negotiate<S>(stream: &mut S, deadline: Duration) -> Result<TargetAddress, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(deadline, Negotiator::new(stream).run()).await {
        Ok(result) => result,
        Err(_) => Err(HandshakeError::Timeout),
    }
}

/// Write one reply frame.
pub async fn send_reply<S>(stream: &mut S, code: ReplyCode) -> std::io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&code.frame()).await?;
    stream.flush().await
}
