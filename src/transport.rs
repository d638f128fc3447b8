use std::future::Future;
use std::io;
use std::net::{SocketAddrV4, SocketAddrV6};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UdpSocket};
use tokio::time;

use crate::protocol::{Host, SocksAddr};

/// How the dialer reaches the proxy itself.
///
/// The negotiator only ever talks SOCKS5 over the stream and socket this
/// trait hands out, so swapping the implementation swaps the medium: the
/// stock [`TokioTransport`] uses the operating system's network stack, tests
/// drive the same handshake over in-memory pipes.
pub trait Transport {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send;
    type Socket: DatagramSocket + Send;

    /// Opens the TCP stream that will carry the SOCKS5 session.
    fn connect_tcp(
        &self,
        addr: &SocksAddr,
    ) -> impl Future<Output = io::Result<Self::Stream>> + Send;

    /// Opens a datagram socket bound to an ephemeral local port and
    /// connected to `addr`, the relay endpoint named in an associate reply.
    fn connect_udp(
        &self,
        addr: &SocksAddr,
    ) -> impl Future<Output = io::Result<Self::Socket>> + Send;
}

/// A connected datagram socket: one fixed peer, whole datagrams in and out.
pub trait DatagramSocket {
    fn send(&self, buf: &[u8]) -> impl Future<Output = io::Result<usize>> + Send;
    fn recv(&self, buf: &mut [u8]) -> impl Future<Output = io::Result<usize>> + Send;
}

impl DatagramSocket for UdpSocket {
    async fn send(&self, buf: &[u8]) -> io::Result<usize> {
        UdpSocket::send(self, buf).await
    }

    async fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        UdpSocket::recv(self, buf).await
    }
}

/// Stock [`Transport`] backed by tokio's `TcpStream` and `UdpSocket`.
#[derive(Debug, Clone, Default)]
pub struct TokioTransport {
    connect_timeout: Option<Duration>,
}

impl TokioTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds each connect this transport performs. Without one, connects
    /// wait as long as the operating system does.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    async fn bounded<F, T>(&self, fut: F) -> io::Result<T>
    where
        F: Future<Output = io::Result<T>>,
    {
        match self.connect_timeout {
            Some(limit) => match time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connect timed out",
                )),
            },
            None => fut.await,
        }
    }
}

impl Transport for TokioTransport {
    type Stream = TcpStream;
    type Socket = UdpSocket;

    async fn connect_tcp(&self, addr: &SocksAddr) -> io::Result<TcpStream> {
        self.bounded(async {
            match addr.host() {
                Host::Ipv4(ip) => TcpStream::connect(SocketAddrV4::new(*ip, addr.port())).await,
                Host::Ipv6(ip) => {
                    TcpStream::connect(SocketAddrV6::new(*ip, addr.port(), 0, 0)).await
                }
                Host::Domain(domain) => {
                    TcpStream::connect(format!("{}:{}", domain, addr.port())).await
                }
            }
        })
        .await
    }

    async fn connect_udp(&self, addr: &SocksAddr) -> io::Result<UdpSocket> {
        self.bounded(async {
            let socket = match addr.host() {
                Host::Ipv6(_) => UdpSocket::bind("[::]:0").await?,
                _ => UdpSocket::bind("0.0.0.0:0").await?,
            };
            match addr.host() {
                Host::Ipv4(ip) => socket.connect(SocketAddrV4::new(*ip, addr.port())).await?,
                Host::Ipv6(ip) => {
                    socket
                        .connect(SocketAddrV6::new(*ip, addr.port(), 0, 0))
                        .await?
                }
                Host::Domain(domain) => {
                    socket.connect(format!("{}:{}", domain, addr.port())).await?
                }
            }
            Ok(socket)
        })
        .await
    }
}
