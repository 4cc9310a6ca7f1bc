//! Outbound connections to relay targets.
//!
//! # Responsibilities
//! - Resolve and connect to a `TargetAddress` under the connect deadline
//! - Classify failures so the session can answer with the right reply code

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;

use crate::resilience::timeouts::{is_timeout, with_deadline};
use crate::socks::{ReplyCode, TargetAddress};

#[derive(Debug, Error)]
pub enum DialError {
    #[error("target {target} unreachable: {source}")]
    Unreachable {
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("target {target} refused the connection")]
    Refused { target: String },

    #[error("connect to {target} timed out after {after:?}")]
    Timeout { target: String, after: Duration },
}

impl DialError {
    fn classify(target: &TargetAddress, after: Duration, err: io::Error) -> Self {
        let target = target.to_string();
        if is_timeout(&err) {
            DialError::Timeout { target, after }
        } else if err.kind() == io::ErrorKind::ConnectionRefused {
            DialError::Refused { target }
        } else {
            DialError::Unreachable { target, source: err }
        }
    }

    /// SOCKS5 reply sent to the client for this failure.
    pub fn reply_code(&self) -> ReplyCode {
        match self {
            DialError::Refused { .. } => ReplyCode::ConnectionRefused,
            DialError::Unreachable { .. } | DialError::Timeout { .. } => {
                ReplyCode::HostUnreachable
            }
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            DialError::Unreachable { .. } => "unreachable",
            DialError::Refused { .. } => "refused",
            DialError::Timeout { .. } => "timeout",
        }
    }
}

/// Opens the target leg of a session.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, target: &TargetAddress) -> Result<TcpStream, DialError>;
}

/// Plain TCP dialer with a per-attempt connect deadline.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, target: &TargetAddress) -> Result<TcpStream, DialError> {
        let connect = async {
            match target {
                TargetAddress::Domain(host, port) => TcpStream::connect((host.as_str(), *port)).await,
                _ => match target.socket_addr() {
                    Some(addr) => TcpStream::connect(addr).await,
                    None => Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "address has no socket form",
                    )),
                },
            }
        };

        let stream = with_deadline(self.connect_timeout, connect)
            .await
            .map_err(|e| DialError::classify(target, self.connect_timeout, e))?;

        let _ = stream.set_nodelay(true);
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, SocketAddr};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_dial_reaches_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dialer = TcpDialer::new(Duration::from_secs(2));
        let stream = dialer.dial(&TargetAddress::from(addr)).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), addr);
    }

    #[tokio::test]
    async fn test_dial_domain_name() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let dialer = TcpDialer::new(Duration::from_secs(2));
        let target = TargetAddress::Domain("localhost".to_string(), port);
        // localhost may resolve to ::1 first on some hosts; any outcome other
        // than a timeout shows resolution ran.
        match dialer.dial(&target).await {
            Ok(_) | Err(DialError::Refused { .. }) | Err(DialError::Unreachable { .. }) => {}
            Err(e) => panic!("unexpected dial outcome: {e}"),
        }
    }

    #[tokio::test]
    async fn test_refused_maps_to_reply_code() {
        // Bind then drop to get a port that is very likely closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        drop(listener);

        let dialer = TcpDialer::new(Duration::from_secs(2));
        let err = dialer.dial(&TargetAddress::from(addr)).await.unwrap_err();
        assert!(matches!(err, DialError::Refused { .. }));
        assert_eq!(err.reply_code(), ReplyCode::ConnectionRefused);
    }

    #[test]
    fn test_timeout_classification() {
        let target = TargetAddress::Ipv4(Ipv4Addr::new(10, 255, 255, 1), 80);
        let err = DialError::classify(
            &target,
            Duration::from_secs(10),
            io::Error::new(io::ErrorKind::TimedOut, "deadline"),
        );
        assert!(matches!(err, DialError::Timeout { .. }));
        assert_eq!(err.reply_code(), ReplyCode::HostUnreachable);

        let err = DialError::classify(
            &target,
            Duration::from_secs(10),
            io::Error::new(io::ErrorKind::Other, "no route"),
        );
        assert_eq!(err.reason(), "unreachable");
        assert_eq!(err.reply_code(), ReplyCode::HostUnreachable);
    }
}
