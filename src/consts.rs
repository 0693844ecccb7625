//! SOCKS5 protocol constants (RFC 1928).

/// SOCKS protocol version byte, enforced on every message.
pub const SOCKS_VERSION: u8 = 0x05;

// Authentication methods
/// No authentication required.
pub const AUTH_METHOD_NONE: u8 = 0x00;
/// GSSAPI (negotiation framing only; no built-in handler).
pub const AUTH_METHOD_GSSAPI: u8 = 0x01;
/// Username/password (negotiation framing only; no built-in handler).
pub const AUTH_METHOD_USERNAME: u8 = 0x02;
/// No acceptable method; terminates the negotiation.
pub const AUTH_METHOD_REJECT: u8 = 0xFF;

// Commands
/// Establish a TCP connection to the target.
pub const CMD_CONNECT: u8 = 0x01;
/// Wait for an inbound connection (not served).
pub const CMD_BIND: u8 = 0x02;
/// Establish a UDP relay.
pub const CMD_UDP_ASSOCIATE: u8 = 0x03;

// Address types
/// Four-octet IPv4 address.
pub const ATYP_IPV4: u8 = 0x01;
/// Length-prefixed domain name.
pub const ATYP_DOMAIN: u8 = 0x03;
/// Sixteen-octet IPv6 address.
pub const ATYP_IPV6: u8 = 0x04;

// Reply codes
/// Succeeded.
pub const REPLY_SUCCEEDED: u8 = 0x00;
/// General SOCKS server failure.
pub const REPLY_GENERAL_FAILURE: u8 = 0x01;
/// Connection not allowed by ruleset.
pub const REPLY_NOT_ALLOWED: u8 = 0x02;
/// Network unreachable.
pub const REPLY_NETWORK_UNREACHABLE: u8 = 0x03;
/// Host unreachable.
pub const REPLY_HOST_UNREACHABLE: u8 = 0x04;
/// Connection refused.
pub const REPLY_CONNECTION_REFUSED: u8 = 0x05;
/// TTL expired.
pub const REPLY_TTL_EXPIRED: u8 = 0x06;
/// Command not supported.
pub const REPLY_CMD_NOT_SUPPORTED: u8 = 0x07;
/// Address type not supported.
pub const REPLY_ATYP_NOT_SUPPORTED: u8 = 0x08;

/// Reserved byte, written as zero and ignored on read.
pub const RESERVED: u8 = 0x00;

/// Maximum encodable domain name length (one length octet).
pub const MAX_DOMAIN_LEN: usize = 255;

/// Buffer size used by the stream bridge.
pub const BRIDGE_BUFFER_SIZE: usize = 4096;

/// Largest datagram the UDP relay will receive.
pub const MAX_UDP_PACKET: usize = 64 * 1024;
