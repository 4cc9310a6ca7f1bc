//! Target address wire codec.
//!
//! Wire layout: one type byte, the address body, then a big-endian port.
//!
//! ```text
//! 0x01 | 4-byte IPv4          | port(2)
//! 0x03 | len(1) | domain(len) | port(2)
//! 0x04 | 16-byte IPv6         | port(2)
//! ```

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Address type tag for IPv4.
pub const ATYP_IPV4: u8 = 0x01;
/// Address type tag for a domain name.
pub const ATYP_DOMAIN: u8 = 0x03;
/// Address type tag for IPv6.
pub const ATYP_IPV6: u8 = 0x04;

/// Longest domain name accepted.
pub const MAX_DOMAIN_LEN: usize = 253;

/// Errors produced while decoding an address.
#[derive(Debug, Error)]
pub enum AddressError {
    /// The type tag is not one of IPv4, domain or IPv6.
    #[error("unsupported address type 0x{0:02x}")]
    UnsupportedType(u8),

    /// Fewer bytes than the type tag implies.
    #[error("truncated address: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    /// Domain length byte is zero or above the limit.
    #[error("invalid domain length {0}")]
    InvalidDomainLength(usize),

    /// The stream ended before the address was complete.
    #[error("stream ended inside address")]
    Incomplete,

    /// Domain bytes are not valid UTF-8.
    #[error("domain is not valid UTF-8")]
    InvalidDomain,

    /// Reading from the stream failed.
    #[error("I/O error reading address: {0}")]
    Io(#[from] std::io::Error),
}

/// A parsed destination: host plus port.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetAddress {
    Ipv4(Ipv4Addr, u16),
    Domain(String, u16),
    Ipv6(Ipv6Addr, u16),
}

impl TargetAddress {
    /// Parse an address from the start of `buf`.
    ///
    /// Returns the address and the number of bytes it occupied.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), AddressError> {
        let atyp = *buf.first().ok_or(AddressError::Truncated {
            needed: 1,
            available: 0,
        })?;

        match atyp {
            ATYP_IPV4 => {
                let end = 1 + 4 + 2;
                require(buf, end)?;
                let ip = Ipv4Addr::new(buf[1], buf[2], buf[3], buf[4]);
                let port = u16::from_be_bytes([buf[5], buf[6]]);
                Ok((TargetAddress::Ipv4(ip, port), end))
            }
            ATYP_DOMAIN => {
                require(buf, 2)?;
                let len = buf[1] as usize;
                if len == 0 || len > MAX_DOMAIN_LEN {
                    return Err(AddressError::InvalidDomainLength(len));
                }
                let end = 2 + len + 2;
                require(buf, end)?;
                let domain = std::str::from_utf8(&buf[2..2 + len])
                    .map_err(|_| AddressError::InvalidDomain)?
                    .to_string();
                let port = u16::from_be_bytes([buf[2 + len], buf[3 + len]]);
                Ok((TargetAddress::Domain(domain, port), end))
            }
            ATYP_IPV6 => {
                let end = 1 + 16 + 2;
                require(buf, end)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&buf[1..17]);
                let port = u16::from_be_bytes([buf[17], buf[18]]);
                Ok((TargetAddress::Ipv6(Ipv6Addr::from(octets), port), end))
            }
            other => Err(AddressError::UnsupportedType(other)),
        }
    }

    /// Read exactly one address from a stream.
    ///
    /// The type byte is consumed first so an unknown tag is reported as
    /// [`AddressError::UnsupportedType`] without waiting for more bytes.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self, AddressError>
    where
        R: AsyncRead + Unpin,
    {
        let atyp = reader.read_u8().await.map_err(truncated_on_eof)?;
        let mut buf = Vec::with_capacity(2 + MAX_DOMAIN_LEN + 2);
        buf.push(atyp);

        let body_len = match atyp {
            ATYP_IPV4 => 4 + 2,
            ATYP_IPV6 => 16 + 2,
            ATYP_DOMAIN => {
                let len = reader.read_u8().await.map_err(truncated_on_eof)?;
                buf.push(len);
                if len == 0 || len as usize > MAX_DOMAIN_LEN {
                    return Err(AddressError::InvalidDomainLength(len as usize));
                }
                len as usize + 2
            }
            other => return Err(AddressError::UnsupportedType(other)),
        };

        let start = buf.len();
        buf.resize(start + body_len, 0);
        reader
            .read_exact(&mut buf[start..])
            .await
            .map_err(truncated_on_eof)?;

        Self::parse(&buf).map(|(addr, _)| addr)
    }

    /// Append the wire encoding of this address to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        match self {
            TargetAddress::Ipv4(ip, port) => {
                out.push(ATYP_IPV4);
                out.extend_from_slice(&ip.octets());
                out.extend_from_slice(&port.to_be_bytes());
            }
            TargetAddress::Domain(domain, port) => {
                out.push(ATYP_DOMAIN);
                out.push(domain.len() as u8);
                out.extend_from_slice(domain.as_bytes());
                out.extend_from_slice(&port.to_be_bytes());
            }
            TargetAddress::Ipv6(ip, port) => {
                out.push(ATYP_IPV6);
                out.extend_from_slice(&ip.octets());
                out.extend_from_slice(&port.to_be_bytes());
            }
        }
    }

    /// Wire encoding as a fresh buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode(&mut out);
        out
    }

    pub fn port(&self) -> u16 {
        match self {
            TargetAddress::Ipv4(_, port)
            | TargetAddress::Domain(_, port)
            | TargetAddress::Ipv6(_, port) => *port,
        }
    }

    /// Socket address for literal IP targets; `None` for domains.
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            TargetAddress::Ipv4(ip, port) => Some(SocketAddr::V4(SocketAddrV4::new(*ip, *port))),
            TargetAddress::Ipv6(ip, port) => {
                Some(SocketAddr::V6(SocketAddrV6::new(*ip, *port, 0, 0)))
            }
            TargetAddress::Domain(..) => None,
        }
    }
}

impl fmt::Display for TargetAddress {
    /// Dial form: `1.2.3.4:80`, `example.com:443`, `[::1]:8080`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetAddress::Domain(domain, port) => write!(f, "{}:{}", domain, port),
            _ => match self.socket_addr() {
                Some(addr) => write!(f, "{}", addr),
                None => Ok(()),
            },
        }
    }
}

impl From<SocketAddr> for TargetAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => TargetAddress::Ipv4(*v4.ip(), v4.port()),
            SocketAddr::V6(v6) => TargetAddress::Ipv6(*v6.ip(), v6.port()),
        }
    }
}

fn require(buf: &[u8], needed: usize) -> Result<(), AddressError> {
    if buf.len() < needed {
        Err(AddressError::Truncated {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

fn truncated_on_eof(e: std::io::Error) -> AddressError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        AddressError::Incomplete
    } else {
        AddressError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        let buf = [0x01, 10, 0, 0, 1, 0x1f, 0x90, 0xff];
        let (addr, used) = TargetAddress::parse(&buf).unwrap();
        assert_eq!(addr, TargetAddress::Ipv4(Ipv4Addr::new(10, 0, 0, 1), 8080));
        assert_eq!(used, 7);
        assert_eq!(addr.to_string(), "10.0.0.1:8080");
    }

    #[test]
    fn test_parse_domain() {
        let mut buf = vec![0x03, 11];
        buf.extend_from_slice(b"example.com");
        buf.extend_from_slice(&443u16.to_be_bytes());
        let (addr, used) = TargetAddress::parse(&buf).unwrap();
        assert_eq!(addr, TargetAddress::Domain("example.com".into(), 443));
        assert_eq!(used, buf.len());
        assert_eq!(addr.to_string(), "example.com:443");
    }

    #[test]
    fn test_ipv6_renders_bracketed() {
        let mut buf = vec![0x04];
        buf.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        buf.extend_from_slice(&8443u16.to_be_bytes());
        let (addr, used) = TargetAddress::parse(&buf).unwrap();
        assert_eq!(used, 19);
        assert_eq!(addr.to_string(), "[::1]:8443");
    }

    #[test]
    fn test_unknown_type() {
        let err = TargetAddress::parse(&[0x7f, 0, 0]).unwrap_err();
        assert!(matches!(err, AddressError::UnsupportedType(0x7f)));
    }

    #[test]
    fn test_truncated_buffers() {
        assert!(matches!(
            TargetAddress::parse(&[0x01, 1, 2, 3]),
            Err(AddressError::Truncated { needed: 7, available: 4 })
        ));
        assert!(matches!(
            TargetAddress::parse(&[0x03, 5, b'a', b'b']),
            Err(AddressError::Truncated { .. })
        ));
        assert!(matches!(
            TargetAddress::parse(&[]),
            Err(AddressError::Truncated { .. })
        ));
    }

    #[test]
    fn test_domain_length_limits() {
        assert!(matches!(
            TargetAddress::parse(&[0x03, 0, 0, 80]),
            Err(AddressError::InvalidDomainLength(0))
        ));
        let mut buf = vec![0x03, 254];
        buf.extend(std::iter::repeat(b'a').take(256));
        assert!(matches!(
            TargetAddress::parse(&buf),
            Err(AddressError::InvalidDomainLength(254))
        ));
    }

    #[test]
    fn test_encode_matches_wire_layout() {
        let addr = TargetAddress::Domain("a.io".into(), 80);
        assert_eq!(addr.to_bytes(), vec![0x03, 4, b'a', b'.', b'i', b'o', 0, 80]);
    }

    #[tokio::test]
    async fn test_read_from_stream() {
        let mut wire: &[u8] = &[0x01, 127, 0, 0, 1, 0, 22, 0xAA];
        let addr = TargetAddress::read_from(&mut wire).await.unwrap();
        assert_eq!(addr, TargetAddress::Ipv4(Ipv4Addr::LOCALHOST, 22));
        assert_eq!(wire, &[0xAA]);
    }

    #[tokio::test]
    async fn test_read_from_reports_unknown_type_immediately() {
        let mut wire: &[u8] = &[0x7f];
        let err = TargetAddress::read_from(&mut wire).await.unwrap_err();
        assert!(matches!(err, AddressError::UnsupportedType(0x7f)));
    }

    #[tokio::test]
    async fn test_read_from_short_stream() {
        let mut wire: &[u8] = &[0x04, 0, 0, 0];
        let err = TargetAddress::read_from(&mut wire).await.unwrap_err();
        assert!(matches!(err, AddressError::Incomplete));
    }
}
