#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect = 0x01,
    UdpAssociate = 0x03,
}

impl Command {
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Short name used in stage labels and log lines.
    pub(crate) fn label(self) -> &'static str {
        match self {
            Command::Connect => "connect",
            Command::UdpAssociate => "associate",
        }
    }
}
