use std::fmt;

/// Status byte of a SOCKS5 reply.
///
/// The proxy answers every request with one of these. `0x09` and up are
/// unassigned by the RFC, except that some servers use `0x09` as a second
/// host-unreachable code, so it is folded into [`Reply::HostUnreachable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Success,
    GeneralFailure,
    ConnectionNotAllowedByRuleset,
    NetworkUnreachable,
    HostUnreachable,
    ConnectionRefused,
    TTLExpired,
    CommandNotSupported,
    AddressTypeNotSupported,
    Unassigned(u8),
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let description = match self {
            Reply::Success => "succeeded",
            Reply::GeneralFailure => "general SOCKS server failure",
            Reply::ConnectionNotAllowedByRuleset => "connection not allowed by ruleset",
            Reply::NetworkUnreachable => "network unreachable",
            Reply::HostUnreachable => "host unreachable",
            Reply::ConnectionRefused => "connection refused",
            Reply::TTLExpired => "TTL expired",
            Reply::CommandNotSupported => "command not supported",
            Reply::AddressTypeNotSupported => "address type not supported",
            Reply::Unassigned(_) => "unassigned",
        };
        write!(f, "{}", description)
    }
}

impl Reply {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0x00 => Reply::Success,
            0x01 => Reply::GeneralFailure,
            0x02 => Reply::ConnectionNotAllowedByRuleset,
            0x03 => Reply::NetworkUnreachable,
            0x04 | 0x09 => Reply::HostUnreachable,
            0x05 => Reply::ConnectionRefused,
            0x06 => Reply::TTLExpired,
            0x07 => Reply::CommandNotSupported,
            0x08 => Reply::AddressTypeNotSupported,
            value => Reply::Unassigned(value),
        }
    }
}
