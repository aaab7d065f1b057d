use crate::icmp::v4::Ttl;
use std::net::IpAddr;
use std::str::FromStr;
use std::{io, time::Duration};

pub(crate) mod dgram_socket;
pub(crate) mod raw_socket;

use dgram_socket::DgramSocket;
use raw_socket::RawSocket;

pub trait TSocket: Send {
    fn set_ttl(&self, ttl: Ttl) -> io::Result<()>;
    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()>;
    fn send_to(&self, buf: &[u8], addr: &socket2::SockAddr) -> io::Result<usize>;
    /// Receives one ICMP message into `buf`, without any IP header.
    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)>;

    /// Whether the kernel replaces the echo identifier we send.
    fn rewrites_identifier(&self) -> bool {
        false
    }
}

/// Produces a fresh socket for every probe round.
pub trait OpenSocket: Send + Sync {
    type Socket: TSocket;

    fn open(&self) -> io::Result<Self::Socket>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SocketType {
    /// Unprivileged `SOCK_DGRAM` ICMP socket (needs `net.ipv4.ping_group_range` on Linux).
    /// ICMP errors are not delivered on it, so unreachable and TTL-exceeded rounds time out.
    Dgram,
    /// `SOCK_RAW` ICMP socket, needs root or `CAP_NET_RAW`.
    Raw,
}

impl FromStr for SocketType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dgram" => Ok(SocketType::Dgram),
            "raw" => Ok(SocketType::Raw),
            other => Err(format!("unknown socket type '{other}', expected 'raw' or 'dgram'")),
        }
    }
}

impl OpenSocket for SocketType {
    type Socket = Socket;

    fn open(&self) -> io::Result<Socket> {
        Socket::new(*self)
    }
}

pub enum Socket {
    Raw(RawSocket),
    Dgram(DgramSocket),
}

impl Socket {
    pub(crate) fn new(socket_type: SocketType) -> Result<Self, io::Error> {
        match socket_type {
            SocketType::Dgram => Ok(Socket::Dgram(DgramSocket::new()?)),
            SocketType::Raw => Ok(Socket::Raw(RawSocket::new()?)),
        }
    }
}

impl TSocket for Socket {
    fn set_ttl(&self, ttl: Ttl) -> io::Result<()> {
        match self {
            Socket::Dgram(socket) => socket.set_ttl(ttl),
            Socket::Raw(socket) => socket.set_ttl(ttl),
        }
    }

    fn set_read_timeout(&self, timeout: Duration) -> io::Result<()> {
        match self {
            Socket::Dgram(socket) => socket.set_read_timeout(timeout),
            Socket::Raw(socket) => socket.set_read_timeout(timeout),
        }
    }

    fn send_to(&self, buf: &[u8], addr: &socket2::SockAddr) -> io::Result<usize> {
        match self {
            Socket::Dgram(socket) => socket.send_to(buf, addr),
            Socket::Raw(socket) => socket.send_to(buf, addr),
        }
    }

    fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, IpAddr)> {
        match self {
            Socket::Dgram(socket) => socket.recv_from(buf),
            Socket::Raw(socket) => socket.recv_from(buf),
        }
    }

    fn rewrites_identifier(&self) -> bool {
        match self {
            Socket::Dgram(socket) => socket.rewrites_identifier(),
            Socket::Raw(socket) => socket.rewrites_identifier(),
        }
    }
}
