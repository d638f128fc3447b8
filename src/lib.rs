//! # Sokken
//!
//! This crate provides a client for dialing through SOCKS5 proxy servers.
//! It covers address handling, session negotiation and UDP relay framing,
//! all asynchronous and free of hidden global state.
//!
//! ## Overview of the SOCKS5 Protocol
//!
//! SOCKS5 is a protocol that routes network traffic between a client and a
//! target server through a proxy. The client opens a TCP connection to the
//! proxy, agrees on an authentication method, and asks the proxy to reach a
//! target on its behalf. From then on the proxy relays bytes or datagrams
//! without looking inside them.
//!
//! ### What This Client Speaks
//!
//! - **Addressing**: Targets can be IPv4, IPv6 or domain names. Domain
//!   names are passed to the proxy as names, so name resolution happens
//!   remotely and the client never needs a resolver of its own.
//! - **Commands**: CONNECT for TCP tunnels and UDP ASSOCIATE for datagram
//!   relays. BIND is not supported.
//! - **Authentication**: Only the "no authentication" method is offered.
//!   Proxies that insist on credentials cannot be used.
//!
//! ### Protocol Flow
//!
//! A dial performs the following steps on a fresh connection to the proxy:
//!
//! 1. **Negotiation**: The client lists the authentication methods it
//!    supports, the proxy picks one.
//! 2. **Request**: The client sends the command and the target address.
//! 3. **Reply**: The proxy answers with a status code and the address it
//!    bound for the request. Any status other than success fails the dial.
//! 4. **Data Transfer**: For CONNECT the same stream now carries the
//!    target's bytes untouched. For UDP ASSOCIATE the client sends and
//!    receives datagrams through the relay endpoint named in the reply,
//!    each one wrapped in a small addressing header, while the TCP
//!    connection stays open to keep the association alive.
//!
//! ## Examples
//!
//! Fetching a page through a local proxy:
//!
//! ```no_run
//! use sokken::SocksDialer;
//! use std::error::Error;
//! use tokio::io::{AsyncReadExt, AsyncWriteExt};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn Error>> {
//!     let dialer = SocksDialer::new("127.0.0.1:1080")?;
//!
//!     let conn = dialer.dial("tcp", "example.com:80").await?;
//!     let mut stream = conn.into_tcp().expect("a tcp dial yields a tcp stream");
//!
//!     stream
//!         .write_all(b"GET / HTTP/1.0\r\nHost: example.com\r\n\r\n")
//!         .await?;
//!     let mut response = Vec::new();
//!     stream.read_to_end(&mut response).await?;
//!     println!("{}", String::from_utf8_lossy(&response));
//!     Ok(())
//! }
//! ```
//!
//! ### Explanation of Non-Obvious Parts
//!
//! 1. **`SocksDialer`**:
//!     - The main struct of this crate, holding the proxy address and the
//!       transport used to reach it.
//!     - One dialer can run any number of dials, each on its own
//!       connection to the proxy.
//!     - `SocksDialer::new` uses the stock tokio transport;
//!       `SocksDialer::with_transport` accepts anything implementing the
//!       `Transport` trait, which is how the tests drive the handshake
//!       over in-memory pipes.
//!
//! 2. **`dial("tcp", ...)` vs `dial("udp", ...)`**:
//!     - `"tcp"` issues a CONNECT request and yields the relayed stream.
//!     - `"udp"` issues a UDP ASSOCIATE request and yields a
//!       [`SocksUdpSocket`], which wraps and unwraps the per-datagram
//!       header and keeps the control connection open for as long as the
//!       association lives.
//!
//! 3. **`SocksConnection`**:
//!     - The result of a dial, one variant per command. `into_tcp` and
//!       `into_udp` take the half you asked for.
//!
//! 4. **`sokken::Result`**:
//!     - A custom result type provided by this crate. Its error names the
//!       handshake stage or datagram field that failed, so a refused
//!       connect reads differently from a proxy speaking the wrong
//!       protocol version.

use std::io;

use thiserror::Error;

pub mod protocol;

mod dialer;
mod transport;
mod udp;

pub use dialer::{SocksConnection, SocksDialer};
pub use protocol::{Command, Host, Reply, SocksAddr};
pub use transport::{DatagramSocket, TokioTransport, Transport};
pub use udp::SocksUdpSocket;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unsupported network type: {0}")]
    UnsupportedNetwork(String),
    #[error("invalid socks address: {0:?}")]
    InvalidAddress(String),
    #[error("invalid port: {0:?}")]
    InvalidPort(String),
    #[error("domain name is empty")]
    EmptyDomain,
    #[error("domain name too long: {0} bytes")]
    DomainTooLong(usize),
    #[error("domain name is not valid UTF-8")]
    InvalidDomainEncoding,
    #[error("cannot use domain address {0:?} without resolving it")]
    UnresolvedDomain(String),
    #[error("{stage} failed: {source}")]
    Transport {
        stage: &'static str,
        source: io::Error,
    },
    #[error("{field} too short")]
    TooShort { field: &'static str },
    #[error("unsupported {stage} version: {version}")]
    UnsupportedVersion { stage: &'static str, version: u8 },
    #[error("{command} failed: {reply}")]
    Rejected {
        command: &'static str,
        reply: Reply,
    },
    #[error("invalid reserved byte in {command} response: {value}")]
    InvalidReserved { command: &'static str, value: u8 },
    #[error("unsupported address type: {0:#04x}")]
    UnsupportedAddressType(u8),
    #[error("invalid reserved field in relay datagram: {0:#06x}")]
    DatagramReserved(u16),
    #[error("fragmented relay datagrams are not supported, got fragment {0}")]
    Fragmented(u8),
    #[error("association has no recorded destination")]
    MissingDestination,
}
