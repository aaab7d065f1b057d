use super::TSocket;
use crate::icmp::v4::Ttl;
use pnet_packet::ipv4::Ipv4Packet;
use socket2::{Domain, Protocol, Type};
use std::net::IpAddr;
use std::{io, time::Duration};

const RECV_BUFFER_SIZE: usize = 1500;

pub struct RawSocket {
    socket: socket2::Socket,
}

impl RawSocket {
    pub(crate) fn new() -> Result<Self, io::Error> {
        tracing::trace!("creating RawSocket");
        let socket = socket2::Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))?;
        Ok(RawSocket { socket })
    }
}

impl TSocket for RawSocket {
    fn set_ttl(&self, ttl: Ttl) -> io::Result<()> {
        self.socket.set_ttl(ttl.into())
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        self.socket.set_read_timeout(Some(timeout))
    }

    fn send_to(&self, buf: &[u8], addr: &socket2::SockAddr) -> io::Result<usize> {
        self.socket.send_to(buf, addr)
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        let mut recv_buf = [0u8; RECV_BUFFER_SIZE];

        // Socket2 gives a safety guaranty which allows us to do an unsafe cast from `&mut [u8]`
        // to `&mut [std::mem::MaybeUninit<u8>]`.
        // https://docs.rs/socket2/0.4.7/socket2/struct.Socket.html#method.recv
        //
        // On a RAW socket we get an IP packet.
        let (n_bytes, socket_addr) = self.socket.recv_from(unsafe {
            &mut *(std::ptr::addr_of_mut!(recv_buf) as *mut [u8] as *mut [std::mem::MaybeUninit<u8>])
        })?;
        let received = &recv_buf[..n_bytes];
        let ipv4_packet = Ipv4Packet::new(received)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "received datagram shorter than an IPv4 header"))?;
        // The total length field is not reliable across platforms, the header length is.
        let header_size = usize::from(ipv4_packet.get_header_length()) * 4;
        let icmp_bytes = received
            .get(header_size..)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "IPv4 header length exceeds datagram"))?;
        if buf.len() < icmp_bytes.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "buffer too small for ICMP message"));
        }
        buf[..icmp_bytes.len()].copy_from_slice(icmp_bytes);

        let ip = socket_addr
            .as_socket_ipv4()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "sender is not an IPv4 address"))?;
        Ok((icmp_bytes.len(), IpAddr::V4(*ip.ip())))
    }
}
