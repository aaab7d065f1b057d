use crate::icmp::v4::{codec, DecodedMessage, EchoIdentifier, OpenSocket, SequenceNumber, TSocket, Ttl};
use crate::probe_runner::Probe;
use crate::{PingError, PingResult};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

const RECV_BUFFER_SIZE: usize = 1500;

// socket2 truncates read timeouts to whole microseconds and 0 disables the timeout.
const MIN_READ_TIMEOUT: Duration = Duration::from_micros(1);

#[derive(Debug)]
pub enum ProbeOutcome {
    /// A matching echo reply, or a matching time-exceeded message.
    Reply(Duration),
    Timeout,
    Unreachable,
    Error(PingError),
}

impl ProbeOutcome {
    #[must_use]
    pub fn rtt(&self) -> Option<Duration> {
        match self {
            ProbeOutcome::Reply(rtt) => Some(*rtt),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    Sent,
    Replied,
    TimedOut,
    Unreachable,
    Failed,
}

/// One echo request and the wait for its answer, on a socket of its own.
pub struct ProbeSession<'a, O> {
    opener: &'a O,
    echo: EchoIdentifier,
    state: SessionState,
}

impl<'a, O> ProbeSession<'a, O>
where
    O: OpenSocket,
{
    pub fn new(opener: &'a O, echo: EchoIdentifier) -> Self {
        ProbeSession { opener, echo, state: SessionState::Idle }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn echo(&self) -> EchoIdentifier {
        self.echo
    }

    /// Sends the echo request to `target` and waits at most `timeout` for the matching reply.
    ///
    /// Packets that do not belong to this session are dropped and the wait goes on.
    pub fn send(&mut self, target: Ipv4Addr, ttl: Ttl, timeout: Duration) -> ProbeOutcome {
        if self.state != SessionState::Idle {
            return ProbeOutcome::Error(PingError::SessionReused);
        }

        let outcome = match self.converse(target, ttl, timeout) {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!("probe to {} (seq {}) failed: {}", target, self.echo.sequence_number, e);
                ProbeOutcome::Error(e)
            }
        };
        self.state = match outcome {
            ProbeOutcome::Reply(_) => SessionState::Replied,
            ProbeOutcome::Timeout => SessionState::TimedOut,
            ProbeOutcome::Unreachable => SessionState::Unreachable,
            ProbeOutcome::Error(_) => SessionState::Failed,
        };
        outcome
    }

    // The socket lives in this frame and is closed on every return.
    fn converse(&mut self, target: Ipv4Addr, ttl: Ttl, timeout: Duration) -> PingResult<ProbeOutcome> {
        let socket = self.opener.open()?;
        socket.set_ttl(ttl)?;

        let request = codec::encode_echo_request(self.echo);
        let addr: socket2::SockAddr = SocketAddr::new(IpAddr::V4(target), 0).into();
        let send_time = Instant::now();
        socket.send_to(&request, &addr)?;
        self.state = SessionState::Sent;
        tracing::trace!("echo request sent to {} ({:?})", target, self.echo);

        let deadline = send_time + timeout;
        let compare_identifier = !socket.rewrites_identifier();
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining < MIN_READ_TIMEOUT {
                return Ok(ProbeOutcome::Timeout);
            }
            socket.set_read_timeout(remaining)?;

            let n_bytes = match socket.recv_from(&mut buf) {
                Ok((n_bytes, _from)) => n_bytes,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    return Ok(ProbeOutcome::Timeout);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            match codec::decode(&buf[..n_bytes]) {
                Ok(DecodedMessage::EchoReply(echo)) if self.echo.matches(&echo, compare_identifier) => {
                    return Ok(ProbeOutcome::Reply(send_time.elapsed()));
                }
                Ok(DecodedMessage::TimeExceeded { original: Some(echo), .. })
                    if self.echo.matches(&echo, compare_identifier) =>
                {
                    tracing::trace!("time exceeded on the way to {}, counted as reply", target);
                    return Ok(ProbeOutcome::Reply(send_time.elapsed()));
                }
                Ok(DecodedMessage::DestinationUnreachable { code, original: Some(echo) })
                    if self.echo.matches(&echo, compare_identifier) =>
                {
                    tracing::trace!("{} unreachable (code {})", target, code);
                    return Ok(ProbeOutcome::Unreachable);
                }
                Ok(message) => tracing::trace!("discarding unrelated {:?}", message),
                Err(e) => tracing::trace!("discarding packet: {}", e),
            }
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ProbeConfig {
    pub timeout: Duration,
    pub ttl: Ttl,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig { timeout: Duration::from_secs(3), ttl: Ttl::default() }
    }
}

/// Runs every probe in its own `ProbeSession` with a random identifier.
pub struct IcmpProber<O> {
    opener: O,
    config: ProbeConfig,
}

impl<O> IcmpProber<O>
where
    O: OpenSocket,
{
    pub fn new(opener: O, config: ProbeConfig) -> Self {
        IcmpProber { opener, config }
    }
}

impl<O> Probe for IcmpProber<O>
where
    O: OpenSocket,
{
    fn probe(&self, target: Ipv4Addr, sequence_number: SequenceNumber) -> ProbeOutcome {
        let echo = EchoIdentifier::new(rand::random::<u16>(), sequence_number);
        ProbeSession::new(&self.opener, echo).send(target, self.config.ttl, self.config.timeout)
    }
}
