use std::io::Cursor;

use tokio::io::AsyncReadExt;

use crate::protocol::{SocksAddr, RESERVED_16};
use crate::{Error, Result};

/// One relay datagram: RSV+FRAG+ATYP+ADDR+PORT header, then the payload.
#[derive(Debug)]
pub struct UdpFrame<'a> {
    pub fragment: u8,
    pub addr: SocksAddr,
    pub payload: &'a [u8],
}

impl<'a> UdpFrame<'a> {
    pub fn as_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(3 + self.addr.serialized_len() + self.payload.len());

        bytes.extend_from_slice(&RESERVED_16.to_be_bytes());
        bytes.push(self.fragment);
        bytes.extend(self.addr.to_bytes());
        bytes.extend_from_slice(self.payload);

        bytes
    }

    /// Splits a raw datagram into header and payload. Fragmented datagrams
    /// are not supported and fail here, as does a nonzero reserved field.
    pub async fn parse(buf: &'a [u8]) -> Result<Self> {
        let mut cursor = Cursor::new(buf);

        let reserved = cursor.read_u16().await.map_err(|_| Error::TooShort {
            field: "datagram header",
        })?;
        if reserved != RESERVED_16 {
            return Err(Error::DatagramReserved(reserved));
        }

        let fragment = cursor.read_u8().await.map_err(|_| Error::TooShort {
            field: "datagram header",
        })?;
        if fragment != 0 {
            return Err(Error::Fragmented(fragment));
        }

        let addr = SocksAddr::read_from(&mut cursor).await?;
        let payload = &buf[cursor.position() as usize..];

        Ok(UdpFrame {
            fragment,
            addr,
            payload,
        })
    }
}
