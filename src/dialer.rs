use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time;
use tracing::{debug, instrument, trace};

use crate::protocol::{
    read_field, Command, Reply, SocksAddr, METHOD_NO_AUTH, RESERVED, VERSION,
};
use crate::transport::{TokioTransport, Transport};
use crate::udp::SocksUdpSocket;
use crate::{Error, Result};

/// A configured route through one SOCKS5 proxy.
///
/// The dialer owns nothing but the proxy address, a transport and an
/// optional deadline, so it is cheap to clone and a single instance can run
/// any number of concurrent [`dial`] calls. Each call opens its own
/// connection to the proxy and performs the whole exchange on it.
///
/// [`dial`]: SocksDialer::dial
#[derive(Debug, Clone)]
pub struct SocksDialer<T = TokioTransport> {
    transport: T,
    proxy: SocksAddr,
    handshake_timeout: Option<Duration>,
}

impl SocksDialer<TokioTransport> {
    /// Creates a dialer for the proxy at `proxy` (`"host:port"`), reached
    /// over the operating system's network stack.
    pub fn new(proxy: &str) -> Result<Self> {
        Self::with_transport(TokioTransport::new(), proxy)
    }
}

impl<T> SocksDialer<T>
where
    T: Transport,
{
    /// Creates a dialer that reaches the proxy through `transport`.
    pub fn with_transport(transport: T, proxy: &str) -> Result<Self> {
        Ok(SocksDialer {
            transport,
            proxy: proxy.parse()?,
            handshake_timeout: None,
        })
    }

    /// Bounds everything between connecting to the proxy and its final
    /// reply with one deadline. On expiry the connection is dropped and the
    /// dial fails; no half-done session leaks.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    pub fn proxy(&self) -> &SocksAddr {
        &self.proxy
    }

    /// Asks the proxy for a connection to `target` on the given network,
    /// `"tcp"` or `"udp"`.
    ///
    /// For `"tcp"` this runs a CONNECT exchange and returns the stream,
    /// which from then on carries the target's bytes untouched. For `"udp"`
    /// it runs UDP ASSOCIATE, opens a datagram socket towards the relay the
    /// proxy named and returns it wrapped in a [`SocksUdpSocket`]. A
    /// concrete `target` becomes the association's recorded destination; a
    /// wildcard one (zero address or port zero) leaves it unset.
    ///
    /// Dropping the future cancels the dial and closes anything opened so
    /// far. With a [`handshake_timeout`] set, everything after the proxy
    /// connect must finish under a single deadline.
    ///
    /// [`handshake_timeout`]: SocksDialer::handshake_timeout
    #[instrument(skip_all)]
    pub async fn dial(
        &self,
        network: &str,
        target: &str,
    ) -> Result<SocksConnection<T::Stream, T::Socket>> {
        let command = match network {
            "tcp" => Command::Connect,
            "udp" => Command::UdpAssociate,
            other => return Err(Error::UnsupportedNetwork(other.to_string())),
        };
        let target: SocksAddr = target.parse()?;

        let mut stream = self
            .transport
            .connect_tcp(&self.proxy)
            .await
            .map_err(|source| Error::Transport {
                stage: "dial",
                source,
            })?;
        trace!("Connected to proxy: {}", self.proxy);

        let bound = match self.handshake_timeout {
            Some(limit) => {
                match time::timeout(limit, handshake(&mut stream, command, &target)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        return Err(Error::Transport {
                            stage: "handshake",
                            source: io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed"),
                        })
                    }
                }
            }
            None => handshake(&mut stream, command, &target).await?,
        };
        debug!("{} request accepted, proxy bound to: {}", command.label(), bound);

        match command {
            Command::Connect => Ok(SocksConnection::Tcp(stream)),
            Command::UdpAssociate => {
                let socket = self
                    .transport
                    .connect_udp(&bound)
                    .await
                    .map_err(|source| Error::Transport {
                        stage: "dial relay",
                        source,
                    })?;
                let dest = target.is_specified().then_some(target);
                Ok(SocksConnection::Udp(SocksUdpSocket::new(
                    stream, socket, dest,
                )))
            }
        }
    }
}

/// What a successful [`dial`] hands back.
///
/// [`dial`]: SocksDialer::dial
#[derive(Debug)]
pub enum SocksConnection<S, D> {
    /// A stream the proxy relays to the target.
    Tcp(S),
    /// A wrapped UDP association.
    Udp(SocksUdpSocket<S, D>),
}

impl<S, D> SocksConnection<S, D> {
    pub fn into_tcp(self) -> Option<S> {
        match self {
            SocksConnection::Tcp(stream) => Some(stream),
            SocksConnection::Udp(_) => None,
        }
    }

    pub fn into_udp(self) -> Option<SocksUdpSocket<S, D>> {
        match self {
            SocksConnection::Tcp(_) => None,
            SocksConnection::Udp(socket) => Some(socket),
        }
    }
}

/// Runs the post-connect exchange and returns the bind address from the
/// proxy's reply.
async fn handshake<S>(stream: &mut S, command: Command, target: &SocksAddr) -> Result<SocksAddr>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    negotiate(stream).await?;
    send_request(stream, command, target).await?;
    read_reply(stream, command).await
}

async fn negotiate<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream
        .write_all(&[VERSION, 1, METHOD_NO_AUTH])
        .await
        .map_err(|source| Error::Transport {
            stage: "send negotiation request",
            source,
        })?;

    let mut response = [0u8; 2];
    read_field(
        stream,
        &mut response,
        "receive negotiation response",
        "negotiation response",
    )
    .await?;

    if response[0] != VERSION {
        return Err(Error::UnsupportedVersion {
            stage: "negotiation response",
            version: response[0],
        });
    }
    // response[1] is the method the proxy picked. No-auth was the only one
    // offered, so there is nothing to act on.
    trace!("Negotiation done, proxy picked method: {:#04x}", response[1]);
    Ok(())
}

async fn send_request<S>(stream: &mut S, command: Command, target: &SocksAddr) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let mut request = vec![VERSION, command.to_u8(), RESERVED];
    request.extend(target.to_bytes());

    stream
        .write_all(&request)
        .await
        .map_err(|source| Error::Transport {
            stage: send_stage(command),
            source,
        })
}

async fn read_reply<S>(stream: &mut S, command: Command) -> Result<SocksAddr>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    read_field(
        stream,
        &mut header,
        recv_stage(command),
        response_field(command),
    )
    .await?;

    if header[0] != VERSION {
        return Err(Error::UnsupportedVersion {
            stage: response_field(command),
            version: header[0],
        });
    }
    match Reply::from_u8(header[1]) {
        Reply::Success => {}
        reply => {
            return Err(Error::Rejected {
                command: command.label(),
                reply,
            })
        }
    }
    if header[2] != RESERVED {
        return Err(Error::InvalidReserved {
            command: command.label(),
            value: header[2],
        });
    }

    SocksAddr::read_body(header[3], stream).await
}

fn send_stage(command: Command) -> &'static str {
    match command {
        Command::Connect => "send connect request",
        Command::UdpAssociate => "send associate request",
    }
}

fn recv_stage(command: Command) -> &'static str {
    match command {
        Command::Connect => "receive connect response",
        Command::UdpAssociate => "receive associate response",
    }
}

fn response_field(command: Command) -> &'static str {
    match command {
        Command::Connect => "connect response",
        Command::UdpAssociate => "associate response",
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::io::{AsyncReadExt, DuplexStream};

    use super::*;
    use crate::transport::DatagramSocket;

    struct StubTransport {
        stream: Mutex<Option<DuplexStream>>,
    }

    impl StubTransport {
        fn new(stream: DuplexStream) -> Self {
            StubTransport {
                stream: Mutex::new(Some(stream)),
            }
        }
    }

    impl Transport for StubTransport {
        type Stream = DuplexStream;
        type Socket = StubSocket;

        async fn connect_tcp(&self, _addr: &SocksAddr) -> io::Result<DuplexStream> {
            Ok(self
                .stream
                .lock()
                .unwrap()
                .take()
                .expect("dialed more than once"))
        }

        async fn connect_udp(&self, _addr: &SocksAddr) -> io::Result<StubSocket> {
            Ok(StubSocket)
        }
    }

    #[derive(Debug)]
    struct StubSocket;

    impl DatagramSocket for StubSocket {
        async fn send(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        async fn recv(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::WouldBlock, "nothing scripted"))
        }
    }

    /// Transport whose connects must never run.
    struct NoDialTransport;

    impl Transport for NoDialTransport {
        type Stream = DuplexStream;
        type Socket = StubSocket;

        async fn connect_tcp(&self, _addr: &SocksAddr) -> io::Result<DuplexStream> {
            panic!("connect_tcp ran for a dial that must fail first");
        }

        async fn connect_udp(&self, _addr: &SocksAddr) -> io::Result<StubSocket> {
            panic!("connect_udp ran for a dial that must fail first");
        }
    }

    fn dialer(stream: DuplexStream) -> SocksDialer<StubTransport> {
        SocksDialer::with_transport(StubTransport::new(stream), "127.0.0.1:1080").unwrap()
    }

    #[tokio::test]
    async fn connect_speaks_the_wire_protocol() {
        let (client, mut proxy) = tokio::io::duplex(256);

        let script = tokio::spawn(async move {
            let mut greeting = [0u8; 3];
            proxy.read_exact(&mut greeting).await.unwrap();
            assert_eq!(greeting, [0x05, 0x01, 0x00]);
            proxy.write_all(&[0x05, 0x00]).await.unwrap();

            let mut request = [0u8; 10];
            proxy.read_exact(&mut request).await.unwrap();
            assert_eq!(
                request,
                [0x05, 0x01, 0x00, 0x01, 93, 184, 216, 34, 0x01, 0xBB]
            );
            proxy
                .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x04, 0x38])
                .await
                .unwrap();
            proxy
        });

        let conn = dialer(client)
            .dial("tcp", "93.184.216.34:443")
            .await
            .unwrap();
        let mut stream = conn.into_tcp().unwrap();

        // After the handshake the stream is a plain pipe to the target.
        let mut proxy = script.await.unwrap();
        stream.write_all(b"ping").await.unwrap();
        let mut relayed = [0u8; 4];
        proxy.read_exact(&mut relayed).await.unwrap();
        assert_eq!(&relayed, b"ping");
    }

    #[tokio::test]
    async fn connect_sends_domain_targets_verbatim() {
        let (client, mut proxy) = tokio::io::duplex(256);
        proxy.write_all(&[0x05, 0x00]).await.unwrap();
        proxy
            .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x04, 0x38])
            .await
            .unwrap();

        dialer(client)
            .dial("tcp", "example.com:80")
            .await
            .unwrap();

        let mut sent = [0u8; 21];
        proxy.read_exact(&mut sent).await.unwrap();
        assert_eq!(sent[..3], [0x05, 0x01, 0x00]);
        assert_eq!(sent[3..7], [0x05, 0x01, 0x00, 0x03]);
        assert_eq!(sent[7], 11);
        assert_eq!(&sent[8..19], b"example.com");
        assert_eq!(sent[19..], [0x00, 0x50]);
    }

    #[tokio::test]
    async fn rejects_unknown_network_before_any_io() {
        let dialer = SocksDialer::with_transport(NoDialTransport, "127.0.0.1:1080").unwrap();
        assert!(matches!(
            dialer.dial("unix", "example.com:80").await,
            Err(Error::UnsupportedNetwork(_))
        ));
    }

    #[tokio::test]
    async fn rejects_bad_target_before_any_io() {
        let dialer = SocksDialer::with_transport(NoDialTransport, "127.0.0.1:1080").unwrap();
        assert!(matches!(
            dialer.dial("tcp", "no-port").await,
            Err(Error::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn rejects_foreign_negotiation_version() {
        let (client, mut proxy) = tokio::io::duplex(256);
        proxy.write_all(&[0x04, 0x00]).await.unwrap();

        let err = dialer(client)
            .dial("tcp", "example.com:80")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnsupportedVersion {
                stage: "negotiation response",
                version: 0x04,
            }
        ));
    }

    #[tokio::test]
    async fn chosen_method_byte_is_not_second_guessed() {
        let (client, mut proxy) = tokio::io::duplex(256);
        proxy.write_all(&[0x05, 0xFF]).await.unwrap();
        proxy
            .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x04, 0x38])
            .await
            .unwrap();

        assert!(dialer(client).dial("tcp", "example.com:80").await.is_ok());
    }

    #[tokio::test]
    async fn names_short_negotiation_response() {
        let (client, mut proxy) = tokio::io::duplex(256);
        proxy.write_all(&[0x05]).await.unwrap();
        proxy.shutdown().await.unwrap();

        let err = dialer(client)
            .dial("tcp", "example.com:80")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TooShort {
                field: "negotiation response"
            }
        ));
        assert_eq!(err.to_string(), "negotiation response too short");
    }

    #[tokio::test]
    async fn maps_rejection_to_status_table() {
        let (client, mut proxy) = tokio::io::duplex(256);
        proxy.write_all(&[0x05, 0x00]).await.unwrap();
        proxy.write_all(&[0x05, 0x05, 0x00, 0x01]).await.unwrap();

        let err = dialer(client)
            .dial("tcp", "example.com:80")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Rejected {
                command: "connect",
                reply: Reply::ConnectionRefused,
            }
        ));
        assert_eq!(err.to_string(), "connect failed: connection refused");
    }

    #[tokio::test]
    async fn rejects_nonzero_reserved_byte() {
        let (client, mut proxy) = tokio::io::duplex(256);
        proxy.write_all(&[0x05, 0x00]).await.unwrap();
        proxy.write_all(&[0x05, 0x00, 0x01, 0x01]).await.unwrap();

        let err = dialer(client)
            .dial("tcp", "example.com:80")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidReserved {
                command: "connect",
                value: 0x01,
            }
        ));
    }

    #[tokio::test]
    async fn rejects_unknown_bind_address_type() {
        let (client, mut proxy) = tokio::io::duplex(256);
        proxy.write_all(&[0x05, 0x00]).await.unwrap();
        proxy.write_all(&[0x05, 0x00, 0x00, 0x02]).await.unwrap();

        let err = dialer(client)
            .dial("tcp", "example.com:80")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAddressType(0x02)));
    }

    #[tokio::test]
    async fn names_truncated_bind_address() {
        let (client, mut proxy) = tokio::io::duplex(256);
        proxy.write_all(&[0x05, 0x00]).await.unwrap();
        proxy.write_all(&[0x05, 0x00, 0x00, 0x01, 10, 0]).await.unwrap();
        proxy.shutdown().await.unwrap();

        let err = dialer(client)
            .dial("tcp", "example.com:80")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::TooShort {
                field: "ipv4 address"
            }
        ));
    }

    #[tokio::test]
    async fn associate_records_concrete_destination() {
        let (client, mut proxy) = tokio::io::duplex(256);
        proxy.write_all(&[0x05, 0x00]).await.unwrap();
        proxy
            .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x10, 0x00])
            .await
            .unwrap();

        let conn = dialer(client).dial("udp", "192.0.2.7:53").await.unwrap();
        let relay = conn.into_udp().unwrap();

        let want: SocksAddr = "192.0.2.7:53".parse().unwrap();
        assert_eq!(relay.destination(), Some(&want));

        let mut sent = [0u8; 13];
        proxy.read_exact(&mut sent).await.unwrap();
        assert_eq!(sent[..3], [0x05, 0x01, 0x00]);
        assert_eq!(sent[3..], [0x05, 0x03, 0x00, 0x01, 192, 0, 2, 7, 0x00, 0x35]);
    }

    #[tokio::test]
    async fn associate_skips_wildcard_destination() {
        let (client, mut proxy) = tokio::io::duplex(256);
        proxy.write_all(&[0x05, 0x00]).await.unwrap();
        proxy
            .write_all(&[0x05, 0x00, 0x00, 0x01, 127, 0, 0, 1, 0x10, 0x00])
            .await
            .unwrap();

        let conn = dialer(client).dial("udp", "0.0.0.0:0").await.unwrap();
        let relay = conn.into_udp().unwrap();
        assert_eq!(relay.destination(), None);
    }

    #[tokio::test]
    async fn handshake_deadline_cuts_off_a_stalled_proxy() {
        let (client, _proxy) = tokio::io::duplex(256);

        let err = dialer(client)
            .handshake_timeout(Duration::from_millis(50))
            .dial("tcp", "example.com:80")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Transport { stage: "handshake", .. }));
    }
}
