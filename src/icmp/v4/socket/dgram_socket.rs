use super::TSocket;
use crate::icmp::v4::Ttl;
use socket2::{Domain, Protocol, Type};
use std::net::IpAddr;
use std::{io, time::Duration};

pub struct DgramSocket {
    socket: socket2::Socket,
}

impl DgramSocket {
    pub(crate) fn new() -> Result<Self, io::Error> {
        tracing::trace!("creating DgramSocket");
        let socket = socket2::Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4))?;
        Ok(DgramSocket { socket })
    }
}

impl TSocket for DgramSocket {
    fn set_ttl(&self, ttl: Ttl) -> io::Result<()> {
        self.socket.set_ttl(ttl.into())
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.socket.set_read_timeout(Some(timeout))
    }

    fn send_to(&self, buf: &[u8], addr: &socket2::SockAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    // Linux delivers the bare ICMP message on datagram sockets.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        let (n_bytes, socket_addr) = self.socket.recv_from(unsafe {
            &mut *(std::ptr::addr_of_mut!(*buf) as *mut [std::mem::MaybeUninit<u8>])
        })?;
        let ip = socket_addr
            .as_socket_ipv4()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "sender is not an IPv4 address"))?;
        Ok((n_bytes, IpAddr::V4(*ip.ip())))
    }

    // The kernel keeps ICMP errors for datagram sockets in the error queue, which is only
    // filled with IP_RECVERR and read with MSG_ERRQUEUE. Neither is used here, so on this
    // socket Destination-Unreachable and Time-Exceeded never arrive and those rounds end as
    // timeouts.
    fn rewrites_identifier(&self) -> bool {
        true
    }
}
