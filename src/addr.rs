//! SOCKS address codec.
//!
//! A [`SocksAddr`] is the `ATYP + addr` portion of request, reply and UDP
//! envelope frames. The port travels next to it on the wire but is kept
//! separate in the API, mirroring the frame layout.

use crate::consts::*;
use crate::error::{Result, SocksError};
use std::fmt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A SOCKS5 address: IPv4, IPv6 or a domain name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocksAddr {
    /// Four-octet IPv4 address.
    V4(Ipv4Addr),
    /// Sixteen-octet IPv6 address.
    V6(Ipv6Addr),
    /// Domain name, 1-255 bytes on the wire.
    Domain(String),
}

impl SocksAddr {
    /// The wildcard address `0.0.0.0`, used in rejection replies.
    pub fn unspecified() -> Self {
        SocksAddr::V4(Ipv4Addr::UNSPECIFIED)
    }

    /// Convert a raw IP, preferring the IPv4 form for IPv4-mapped IPv6
    /// addresses.
    pub fn from_ip(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(v4) => SocksAddr::V4(v4),
            IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
                Some(v4) => SocksAddr::V4(v4),
                None => SocksAddr::V6(v6),
            },
        }
    }

    /// Split a socket address into its SOCKS address and port.
    pub fn from_socket_addr(addr: SocketAddr) -> (Self, u16) {
        (SocksAddr::from_ip(addr.ip()), addr.port())
    }

    /// The `ATYP` tag for this address.
    pub fn atyp(&self) -> u8 {
        match self {
            SocksAddr::V4(_) => ATYP_IPV4,
            SocksAddr::V6(_) => ATYP_IPV6,
            SocksAddr::Domain(_) => ATYP_DOMAIN,
        }
    }

    /// True for the IPv4 or IPv6 wildcard address.
    pub fn is_unspecified(&self) -> bool {
        match self {
            SocksAddr::V4(ip) => ip.is_unspecified(),
            SocksAddr::V6(ip) => ip.is_unspecified(),
            SocksAddr::Domain(_) => false,
        }
    }

    /// Encode as `ATYP + addr` wire bytes.
    ///
    /// # Panics
    ///
    /// Panics if a domain name is longer than 255 bytes; such an address
    /// cannot exist on the wire and reaching this point is a caller bug.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(1 + self.encoded_len());
        data.push(self.atyp());
        match self {
            SocksAddr::V4(ip) => data.extend_from_slice(&ip.octets()),
            SocksAddr::V6(ip) => data.extend_from_slice(&ip.octets()),
            SocksAddr::Domain(domain) => {
                assert!(
                    domain.len() <= MAX_DOMAIN_LEN,
                    "domain name too long: {} bytes",
                    domain.len()
                );
                data.push(domain.len() as u8);
                data.extend_from_slice(domain.as_bytes());
            }
        }
        data
    }

    /// Length of the address body on the wire, excluding the `ATYP` tag.
    pub fn encoded_len(&self) -> usize {
        match self {
            SocksAddr::V4(_) => 4,
            SocksAddr::V6(_) => 16,
            SocksAddr::Domain(domain) => 1 + domain.len(),
        }
    }

    /// Read the address body following an already-consumed `ATYP` tag.
    pub(crate) async fn read_body<R>(atyp: u8, reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        match atyp {
            ATYP_IPV4 => {
                let mut octets = [0u8; 4];
                reader.read_exact(&mut octets).await?;
                Ok(SocksAddr::V4(Ipv4Addr::from(octets)))
            }
            ATYP_IPV6 => {
                let mut octets = [0u8; 16];
                reader.read_exact(&mut octets).await?;
                Ok(SocksAddr::V6(Ipv6Addr::from(octets)))
            }
            ATYP_DOMAIN => {
                let len = reader.read_u8().await?;
                if len == 0 {
                    return Err(SocksError::ZeroLengthDomain);
                }
                let mut buf = vec![0u8; len as usize];
                reader.read_exact(&mut buf).await?;
                let domain = String::from_utf8(buf).map_err(|_| {
                    SocksError::Io(io::Error::new(
                        io::ErrorKind::InvalidData,
                        "domain is not valid UTF-8",
                    ))
                })?;
                Ok(SocksAddr::Domain(domain))
            }
            other => Err(SocksError::BadAddressType(other)),
        }
    }

    /// Resolve to a UDP/TCP endpoint. IP variants convert directly; domain
    /// names go through the OS resolver. IPv4-mapped results are normalized
    /// to their IPv4 form.
    pub async fn resolve(&self, port: u16) -> io::Result<SocketAddr> {
        let addr = match self {
            SocksAddr::V4(ip) => SocketAddr::new(IpAddr::V4(*ip), port),
            SocksAddr::V6(ip) => SocketAddr::new(IpAddr::V6(*ip), port),
            SocksAddr::Domain(domain) => tokio::net::lookup_host((domain.as_str(), port))
                .await?
                .next()
                .ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::NotFound,
                        format!("no addresses found for domain: {}", domain),
                    )
                })?,
        };
        if let IpAddr::V6(v6) = addr.ip() {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return Ok(SocketAddr::new(IpAddr::V4(v4), addr.port()));
            }
        }
        Ok(addr)
    }
}

impl From<IpAddr> for SocksAddr {
    fn from(ip: IpAddr) -> Self {
        SocksAddr::from_ip(ip)
    }
}

impl fmt::Display for SocksAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocksAddr::V4(ip) => write!(f, "{}", ip),
            SocksAddr::V6(ip) => write!(f, "{}", ip),
            SocksAddr::Domain(domain) => f.write_str(domain),
        }
    }
}
