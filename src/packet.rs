//! UDP envelope codec.
//!
//! Datagrams relayed through a UDP association are wrapped in the RFC 1928
//! encapsulation header:
//!
//! ```text
//! +----+------+------+----------+----------+----------+
//! |RSV | FRAG | ATYP | DST.ADDR | DST.PORT |   DATA   |
//! +----+------+------+----------+----------+----------+
//! | 2  |  1   |  1   | Variable |    2     | Variable |
//! +----+------+------+----------+----------+----------+
//! ```
//!
//! Fragmentation is not supported; a nonzero FRAG fails the decode.

use crate::addr::SocksAddr;
use crate::consts::*;
use crate::error::{Result, SocksError};
use bytes::{Buf, BufMut};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Minimum envelope length before the payload: RSV + FRAG + ATYP plus the
/// shortest address form (IPv4) and the port.
const MIN_DATAGRAM_LEN: usize = 4 + 4 + 2;

/// Wrap `payload` in a UDP envelope addressed to `addr:port`.
///
/// # Panics
///
/// Panics if `addr` is a domain longer than 255 bytes.
pub fn encode_datagram(addr: &SocksAddr, port: u16, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + addr.encoded_len() + 2 + payload.len());
    buf.put_u16(0); // RSV
    buf.put_u8(0); // FRAG
    buf.put_slice(&addr.to_bytes());
    buf.put_u16(port);
    buf.put_slice(payload);
    buf
}

/// Parse a UDP envelope, yielding the destination triple and the payload.
///
/// The reserved bytes are ignored. Nonzero FRAG and buffers shorter than
/// the minimum header are rejected.
pub fn parse_datagram(data: &[u8]) -> Result<(SocksAddr, u16, &[u8])> {
    if data.len() < MIN_DATAGRAM_LEN {
        return Err(SocksError::TruncatedDatagram(data.len()));
    }

    let mut buf = data;
    let _rsv = buf.get_u16();
    let frag = buf.get_u8();
    if frag != 0 {
        return Err(SocksError::FragmentNotSupported(frag));
    }

    let atyp = buf.get_u8();
    let addr = match atyp {
        ATYP_IPV4 => {
            // MIN_DATAGRAM_LEN already guarantees 4 address + 2 port bytes
            let mut octets = [0u8; 4];
            buf.copy_to_slice(&mut octets);
            SocksAddr::V4(Ipv4Addr::from(octets))
        }
        ATYP_IPV6 => {
            if buf.remaining() < 16 + 2 {
                return Err(SocksError::TruncatedDatagram(data.len()));
            }
            let mut octets = [0u8; 16];
            buf.copy_to_slice(&mut octets);
            SocksAddr::V6(Ipv6Addr::from(octets))
        }
        ATYP_DOMAIN => {
            let len = buf.get_u8() as usize;
            if len == 0 {
                return Err(SocksError::ZeroLengthDomain);
            }
            if buf.remaining() < len + 2 {
                return Err(SocksError::TruncatedDatagram(data.len()));
            }
            let domain = std::str::from_utf8(&buf[..len])
                .map_err(|_| {
                    SocksError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidData,
                        "domain is not valid UTF-8",
                    ))
                })?
                .to_string();
            buf.advance(len);
            SocksAddr::Domain(domain)
        }
        other => return Err(SocksError::BadAddressType(other)),
    };

    let port = buf.get_u16();
    Ok((addr, port, buf))
}
