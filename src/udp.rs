use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::protocol::SocksAddr;
use crate::transport::DatagramSocket;
use crate::{Error, Result};

mod frame;

use frame::UdpFrame;

const MAX_DATAGRAM_SIZE: usize = 65535;

/// A live UDP association.
///
/// Pairs the relay socket with the TCP control connection the association's
/// lifetime is tied to: the proxy may release the relay port as soon as that
/// stream closes, so this type keeps it open until [`close`] or drop.
///
/// Every datagram in and out carries the SOCKS5 UDP header; sends wrap the
/// payload, receives strip the header off again.
///
/// [`close`]: SocksUdpSocket::close
#[derive(Debug)]
pub struct SocksUdpSocket<S, D> {
    control: S,
    socket: D,
    recv_buf: Vec<u8>,
    dest: Option<SocksAddr>,
}

impl<S, D> SocksUdpSocket<S, D>
where
    S: AsyncWrite + Unpin,
    D: DatagramSocket,
{
    pub(crate) fn new(control: S, socket: D, dest: Option<SocksAddr>) -> Self {
        SocksUdpSocket {
            control,
            socket,
            recv_buf: vec![0u8; MAX_DATAGRAM_SIZE],
            dest,
        }
    }

    /// Destination recorded at dial time, if the associate target named a
    /// concrete peer.
    pub fn destination(&self) -> Option<&SocksAddr> {
        self.dest.as_ref()
    }

    /// Sends `payload` to the destination recorded at dial time. Fails with
    /// [`Error::MissingDestination`] when there is none.
    pub async fn send(&mut self, payload: &[u8]) -> Result<usize> {
        let dest = self.dest.clone().ok_or(Error::MissingDestination)?;
        self.send_to(payload, &dest).await
    }

    /// Sends `payload` through the relay to `dest`, which wins over any
    /// recorded destination. The returned count is payload bytes, not the
    /// framed size.
    pub async fn send_to(&mut self, payload: &[u8], dest: &SocksAddr) -> Result<usize> {
        let frame = UdpFrame {
            fragment: 0,
            addr: dest.clone(),
            payload,
        };
        self.socket
            .send(&frame.as_bytes())
            .await
            .map_err(|source| Error::Transport {
                stage: "send datagram",
                source,
            })?;
        Ok(payload.len())
    }

    /// Receives one datagram, strips its header and copies the payload into
    /// `buf`, returning the payload length and the apparent source address.
    /// Payload beyond `buf` is cut off.
    pub async fn recv_from(&mut self, buf: &mut [u8]) -> Result<(usize, SocksAddr)> {
        let n = self
            .socket
            .recv(&mut self.recv_buf)
            .await
            .map_err(|source| Error::Transport {
                stage: "receive datagram",
                source,
            })?;

        let frame = UdpFrame::parse(&self.recv_buf[..n]).await?;
        let len = frame.payload.len().min(buf.len());
        buf[..len].copy_from_slice(&frame.payload[..len]);
        Ok((len, frame.addr))
    }

    /// Ends the association by shutting the control connection down, after
    /// which the proxy is free to release the relay port.
    pub async fn close(mut self) -> Result<()> {
        self.control
            .shutdown()
            .await
            .map_err(|source| Error::Transport {
                stage: "close association",
                source,
            })
    }
}
