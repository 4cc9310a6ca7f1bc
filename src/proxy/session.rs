//! One accepted connection, from first byte to teardown.
//!
//! # Data Flow
//! ```text
//! socks5:    negotiate ─► dial ─► reply(succeeded) ─► relay(client, target)
//!                 │          └─► reply(mapped code) ─► linger close
//!                 └─► reply already sent? ─► linger close
//!
//! encrypted: CipherStream::new ─► read TargetAddress ─► dial ─► relay(cipher, target)
//! ```

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::Instrument;

use crate::config::TimeoutConfig;
use crate::crypto::{CipherError, CipherStream, MasterKey};
use crate::net::{ConnectionId, DialError, Dialer};
use crate::observability::metrics;
use crate::relay::{relay, RelayReport};
use crate::resilience::timeouts::with_deadline;
use crate::socks::{negotiate, send_reply, AddressError, HandshakeError, ReplyCode, TargetAddress};

/// How long a rejected client gets to read its reply before the socket drops.
const LINGER: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error(transparent)]
    Dial(#[from] DialError),

    #[error("reading target address failed: {0}")]
    Address(#[source] AddressError),

    #[error("cipher setup failed: {0}")]
    Cipher(#[from] CipherError),

    #[error("session I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl SessionError {
    pub fn outcome(&self) -> &'static str {
        match self {
            SessionError::Handshake(_) | SessionError::Address(_) => "handshake_failed",
            SessionError::Dial(_) => "dial_failed",
            SessionError::Cipher(_) | SessionError::Io(_) => "error",
        }
    }
}

/// What the client speaks on this port.
#[derive(Debug, Clone)]
pub enum SessionMode {
    Socks5,
    Encrypted(MasterKey),
}

/// Per-port session logic shared by every connection on that port.
pub struct SessionHandler {
    user: Arc<str>,
    mode: SessionMode,
    handshake_timeout: Duration,
    idle_timeout: Duration,
    dialer: Arc<dyn Dialer>,
}

impl SessionHandler {
    pub fn new(
        user: impl Into<Arc<str>>,
        mode: SessionMode,
        timeouts: &TimeoutConfig,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            user: user.into(),
            mode,
            handshake_timeout: timeouts.handshake(),
            idle_timeout: timeouts.idle(),
            dialer,
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// Drive one connection to completion. Never returns an error; every
    /// failure is logged and counted here.
    pub async fn serve(&self, stream: TcpStream, peer: SocketAddr, id: ConnectionId) {
        let span = tracing::debug_span!(
            "session",
            connection_id = %id,
            user = %self.user,
            peer_addr = %peer
        );

        async {
            let _ = stream.set_nodelay(true);
            let result = match &self.mode {
                SessionMode::Socks5 => self.serve_socks5(stream).await,
                SessionMode::Encrypted(key) => self.serve_encrypted(stream, key.clone()).await,
            };

            match result {
                Ok(report) => {
                    metrics::record_session(&self.user, "relayed");
                    metrics::record_relay_bytes(&self.user, "outbound", report.outbound_bytes);
                    metrics::record_relay_bytes(&self.user, "inbound", report.inbound_bytes);
                    tracing::debug!(
                        outbound_bytes = report.outbound_bytes,
                        inbound_bytes = report.inbound_bytes,
                        initiator = report.initiator.as_str(),
                        cause = ?report.cause,
                        "Session finished"
                    );
                }
                Err(SessionError::Handshake(e)) => {
                    metrics::record_session(&self.user, "handshake_failed");
                    metrics::record_handshake_failure(e.reason());
                    tracing::debug!(error = %e, "Handshake rejected");
                }
                Err(e @ SessionError::Dial(_)) => {
                    metrics::record_session(&self.user, e.outcome());
                    tracing::info!(error = %e, "Dial failed");
                }
                Err(e) => {
                    metrics::record_session(&self.user, e.outcome());
                    tracing::debug!(error = %e, "Session aborted");
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn serve_socks5(&self, mut stream: TcpStream) -> Result<RelayReport, SessionError> {
        let target = match negotiate(&mut stream, self.handshake_timeout).await {
            Ok(target) => target,
            Err(e) => {
                if e.reply_sent() {
                    linger_close(stream).await;
                }
                return Err(e.into());
            }
        };

        tracing::debug!(target = %target, "Dialing target");
        let upstream = match self.dialer.dial(&target).await {
            Ok(upstream) => upstream,
            Err(e) => {
                let code = e.reply_code();
                if with_deadline(self.handshake_timeout, send_reply(&mut stream, code))
                    .await
                    .is_ok()
                {
                    linger_close(stream).await;
                }
                return Err(e.into());
            }
        };

        with_deadline(
            self.handshake_timeout,
            send_reply(&mut stream, ReplyCode::Succeeded),
        )
        .await?;

        Ok(relay(stream, upstream, self.idle_timeout).await?)
    }

    async fn serve_encrypted(
        &self,
        stream: TcpStream,
        key: MasterKey,
    ) -> Result<RelayReport, SessionError> {
        let mut stream = CipherStream::new(stream, key)?;

        let target = match tokio::time::timeout(
            self.handshake_timeout,
            TargetAddress::read_from(&mut stream),
        )
        .await
        {
            Ok(Ok(target)) => target,
            Ok(Err(e)) => return Err(SessionError::Address(e)),
            Err(_) => return Err(HandshakeError::Timeout.into()),
        };

        tracing::debug!(target = %target, "Dialing target");
        let upstream = self.dialer.dial(&target).await?;

        Ok(relay(stream, upstream, self.idle_timeout).await?)
    }
}

/// Send FIN, then drain until the peer closes (bounded), so unread request
/// bytes do not turn the close into a reset that destroys the reply.
async fn linger_close(mut stream: TcpStream) {
    let _ = stream.shutdown().await;
    let mut sink = [0u8; 512];
    let _ = tokio::time::timeout(LINGER, async {
        while let Ok(n) = stream.read(&mut sink).await {
            if n == 0 {
                break;
            }
        }
    })
    .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::TcpDialer;
    use tokio::net::TcpListener;

    async fn accept_one(handler: Arc<SessionHandler>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            handler.serve(stream, peer, ConnectionId::new()).await;
        });
        addr
    }

    fn socks_handler() -> Arc<SessionHandler> {
        let timeouts = TimeoutConfig {
            handshake_secs: 2,
            connect_secs: 2,
            idle_secs: 5,
        };
        Arc::new(SessionHandler::new(
            "user1",
            SessionMode::Socks5,
            &timeouts,
            Arc::new(TcpDialer::new(timeouts.connect())),
        ))
    }

    #[tokio::test]
    async fn test_refused_target_gets_mapped_reply() {
        let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let closed_port = closed.local_addr().unwrap().port();
        drop(closed);

        let addr = accept_one(socks_handler()).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(&[5, 1, 0]).await.unwrap();
        let mut ack = [0u8; 2];
        client.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, [5, 0]);

        let mut request = vec![5, 1, 0, 1, 127, 0, 0, 1];
        request.extend_from_slice(&closed_port.to_be_bytes());
        client.write_all(&request).await.unwrap();

        let mut reply = Vec::new();
        client.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, ReplyCode::ConnectionRefused.frame());
    }

    #[tokio::test]
    async fn test_bad_greeting_closes_silently() {
        let addr = accept_one(socks_handler()).await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(&[4, 1, 0]).await.unwrap();
        let mut reply = Vec::new();
        // Either a clean EOF or a reset; never any reply bytes.
        let _ = client.read_to_end(&mut reply).await;
        assert!(reply.is_empty());
    }

    #[test]
    fn test_outcome_labels() {
        let err = SessionError::from(HandshakeError::Timeout);
        assert_eq!(err.outcome(), "handshake_failed");
        let err = SessionError::from(DialError::Refused {
            target: "127.0.0.1:1".into(),
        });
        assert_eq!(err.outcome(), "dial_failed");
    }
}
