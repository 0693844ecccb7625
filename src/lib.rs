//! # soxide - SOCKS5 proxy server and client library
//!
//! An RFC 1928 implementation covering the CONNECT command over TCP and
//! the UDP ASSOCIATE command for datagram relaying, usable both as a
//! standalone proxy server and as an embeddable client library.
//!
//! ## Server
//!
//! ```rust,ignore
//! use soxide::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Server::new("0.0.0.0:1080").run().await
//! }
//! ```
//!
//! ## Client
//!
//! ```rust,ignore
//! use soxide::client::Client;
//! use tokio::net::TcpStream;
//!
//! # async fn run() -> Result<(), soxide::SocksError> {
//! let transport = TcpStream::connect("127.0.0.1:1080").await?;
//! let mut tunnel = Client::new(transport).connect("example.com", 80).await?;
//! // tunnel implements AsyncRead + AsyncWrite
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The wire codec lives in [`addr`] and [`packet`]; the sequence-enforced
//! handshake machines in [`protocol`] own the transport until a command
//! exchange completes and then surrender it to a session. Server sessions
//! relay with the paired stream pumps of [`bridge`] (CONNECT) or the
//! two-socket datagram loop of the server module (UDP ASSOCIATE).
//!
//! Authentication is pluggable on both sides: the negotiation framing is
//! fixed, method sub-protocols are handler callbacks. Only NO-AUTH ships
//! built in.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod addr;
pub mod bridge;
pub mod client;
pub mod config;
pub mod consts;
pub mod error;
pub mod net;
pub mod packet;
pub mod protocol;
pub mod server;

pub use addr::SocksAddr;
pub use client::{Client, StreamTunnel, UdpTunnel};
pub use error::{RelayError, SocksError};
pub use server::{NoAuth, Server};

/// Version of the soxide library.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
