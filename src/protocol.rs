use std::io;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::Error;

mod addr;
mod command;
mod reply;

pub use addr::AddressType;
pub use addr::Host;
pub use addr::SocksAddr;
pub use command::Command;
pub use reply::Reply;

pub const VERSION: u8 = 0x05;
pub const RESERVED: u8 = 0x00;
pub const RESERVED_16: u16 = 0x00;
pub const METHOD_NO_AUTH: u8 = 0x00;

/// Fills `buf` from `reader`, translating a premature end of input into the
/// "too short" error for `field` and any other failure into a transport
/// error labeled with `stage`.
pub(crate) async fn read_field<R>(
    reader: &mut R,
    buf: &mut [u8],
    stage: &'static str,
    field: &'static str,
) -> crate::Result<()>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(source) if source.kind() == io::ErrorKind::UnexpectedEof => {
            Err(Error::TooShort { field })
        }
        Err(source) => Err(Error::Transport { stage, source }),
    }
}
