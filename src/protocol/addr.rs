use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::str::FromStr;

use tokio::io::AsyncRead;

use crate::{Error, Result};

use super::read_field;

/// Longest host name the wire format can carry, since its length field is a
/// single byte.
pub const MAX_DOMAIN_LEN: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Ipv4 = 0x01,
    DomainName = 0x03,
    Ipv6 = 0x04,
}

impl AddressType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(AddressType::Ipv4),
            0x03 => Some(AddressType::DomainName),
            0x04 => Some(AddressType::Ipv6),
            _ => None,
        }
    }

    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// An endpoint in the three forms SOCKS5 can carry on the wire: IPv4, IPv6
/// or a domain name, always paired with a port.
///
/// Domain names are kept as names. Nothing here resolves them; the proxy is
/// the one that gets to pick an IP for them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocksAddr {
    host: Host,
    port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Host {
    Ipv4(Ipv4Addr),
    Ipv6(Ipv6Addr),
    Domain(String),
}

impl Host {
    pub fn addr_type(&self) -> AddressType {
        match self {
            Host::Ipv4(_) => AddressType::Ipv4,
            Host::Ipv6(_) => AddressType::Ipv6,
            Host::Domain(_) => AddressType::DomainName,
        }
    }
}

impl SocksAddr {
    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn is_domain(&self) -> bool {
        matches!(self.host, Host::Domain(_))
    }

    /// Whether this names a concrete peer: neither the wildcard address nor
    /// port zero. Domain names always count as concrete.
    pub fn is_specified(&self) -> bool {
        if self.port == 0 {
            return false;
        }
        match &self.host {
            Host::Ipv4(ip) => !ip.is_unspecified(),
            Host::Ipv6(ip) => !ip.is_unspecified(),
            Host::Domain(_) => true,
        }
    }

    /// Number of bytes `to_bytes` will produce.
    pub fn serialized_len(&self) -> usize {
        match &self.host {
            Host::Ipv4(_) => 1 + 4 + 2,
            Host::Ipv6(_) => 1 + 16 + 2,
            Host::Domain(domain) => 1 + 1 + domain.len() + 2,
        }
    }

    /// Turns `Self` into: ATYP+ADDR+PORT.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.serialized_len());

        bytes.push(self.host.addr_type().to_u8());

        match &self.host {
            Host::Ipv4(ip) => bytes.extend_from_slice(&ip.octets()[..]),
            Host::Ipv6(ip) => bytes.extend_from_slice(&ip.octets()[..]),
            Host::Domain(domain) => {
                assert!(domain.len() <= MAX_DOMAIN_LEN);
                bytes.push(domain.len() as u8);
                bytes.extend_from_slice(domain.as_bytes());
            }
        }
        bytes.extend_from_slice(&self.port.to_be_bytes());

        bytes
    }

    /// Reads ATYP+ADDR+PORT from `reader`.
    pub async fn read_from<R>(reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut atyp = [0u8; 1];
        read_field(reader, &mut atyp, "read address", "address type").await?;
        Self::read_body(atyp[0], reader).await
    }

    /// Reads ADDR+PORT from `reader`, the ATYP byte having already been
    /// consumed as part of an enclosing header.
    pub async fn read_body<R>(atyp: u8, reader: &mut R) -> Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let host = match AddressType::from_u8(atyp) {
            Some(AddressType::Ipv4) => {
                let mut octets = [0u8; 4];
                read_field(reader, &mut octets, "read address", "ipv4 address").await?;
                Host::Ipv4(Ipv4Addr::from(octets))
            }
            Some(AddressType::Ipv6) => {
                let mut octets = [0u8; 16];
                read_field(reader, &mut octets, "read address", "ipv6 address").await?;
                let ip = Ipv6Addr::from(octets);
                match ip.to_ipv4_mapped() {
                    Some(mapped) => Host::Ipv4(mapped),
                    None => Host::Ipv6(ip),
                }
            }
            Some(AddressType::DomainName) => {
                let mut len = [0u8; 1];
                read_field(reader, &mut len, "read address", "domain length").await?;
                if len[0] == 0 {
                    return Err(Error::EmptyDomain);
                }
                let mut domain = vec![0u8; len[0] as usize];
                read_field(reader, &mut domain, "read address", "domain").await?;
                let domain = String::from_utf8(domain).map_err(|_| Error::InvalidDomainEncoding)?;
                Host::Domain(domain)
            }
            None => return Err(Error::UnsupportedAddressType(atyp)),
        };

        let mut port = [0u8; 2];
        read_field(reader, &mut port, "read address", "port").await?;

        Ok(SocksAddr {
            host,
            port: u16::from_be_bytes(port),
        })
    }

    /// Concrete endpoint for the transport layer. Domain forms have no
    /// socket address without resolving, so converting one is an error.
    pub fn to_socket_addr(&self) -> Result<SocketAddr> {
        match &self.host {
            Host::Ipv4(ip) => Ok(SocketAddr::V4(SocketAddrV4::new(*ip, self.port))),
            Host::Ipv6(ip) => Ok(SocketAddr::V6(SocketAddrV6::new(*ip, self.port, 0, 0))),
            Host::Domain(domain) => Err(Error::UnresolvedDomain(domain.clone())),
        }
    }
}

impl fmt::Display for SocksAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Host::Ipv4(ip) => write!(f, "{}:{}", ip, self.port),
            Host::Ipv6(ip) => write!(f, "[{}]:{}", ip, self.port),
            Host::Domain(domain) => write!(f, "{}:{}", domain, self.port),
        }
    }
}

impl FromStr for SocksAddr {
    type Err = Error;

    /// Parses `"host:port"`. IPv6 hosts take the usual bracketed form,
    /// anything that is not an IP literal is kept as a domain name.
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(addr) = s.parse::<SocketAddr>() {
            return Ok(addr.into());
        }

        let Some((host, port)) = s.split_once(':') else {
            return Err(Error::InvalidAddress(s.to_string()));
        };
        if host.is_empty() {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| Error::InvalidPort(port.to_string()))?;

        Self::try_from((host.to_string(), port))
    }
}

impl From<SocketAddr> for SocksAddr {
    fn from(value: SocketAddr) -> Self {
        match value {
            SocketAddr::V4(ipv4) => SocksAddr {
                port: ipv4.port(),
                host: Host::Ipv4(*ipv4.ip()),
            },
            // IPv4-mapped addresses are collapsed to their IPv4 form so they
            // hit the four byte encoding on the wire.
            SocketAddr::V6(ipv6) => match ipv6.ip().to_ipv4_mapped() {
                Some(mapped) => SocksAddr {
                    port: ipv6.port(),
                    host: Host::Ipv4(mapped),
                },
                None => SocksAddr {
                    port: ipv6.port(),
                    host: Host::Ipv6(*ipv6.ip()),
                },
            },
        }
    }
}

impl From<SocketAddrV4> for SocksAddr {
    fn from(value: SocketAddrV4) -> Self {
        SocketAddr::V4(value).into()
    }
}

impl From<SocketAddrV6> for SocksAddr {
    fn from(value: SocketAddrV6) -> Self {
        SocketAddr::V6(value).into()
    }
}

impl From<(IpAddr, u16)> for SocksAddr {
    fn from((ip, port): (IpAddr, u16)) -> Self {
        SocketAddr::new(ip, port).into()
    }
}

impl From<(Ipv4Addr, u16)> for SocksAddr {
    fn from((ip, port): (Ipv4Addr, u16)) -> Self {
        (IpAddr::V4(ip), port).into()
    }
}

impl From<(Ipv6Addr, u16)> for SocksAddr {
    fn from((ip, port): (Ipv6Addr, u16)) -> Self {
        (IpAddr::V6(ip), port).into()
    }
}

impl TryFrom<(String, u16)> for SocksAddr {
    type Error = Error;

    fn try_from((host, port): (String, u16)) -> Result<Self> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok((ip, port).into());
        }
        if host.is_empty() {
            return Err(Error::EmptyDomain);
        }
        if host.len() > MAX_DOMAIN_LEN {
            return Err(Error::DomainTooLong(host.len()));
        }
        Ok(SocksAddr {
            host: Host::Domain(host),
            port,
        })
    }
}

impl TryFrom<(&str, u16)> for SocksAddr {
    type Error = Error;

    fn try_from((host, port): (&str, u16)) -> Result<Self> {
        (host.to_string(), port).try_into()
    }
}
