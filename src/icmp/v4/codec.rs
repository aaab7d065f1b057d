use crate::icmp::v4::SequenceNumber;
use crate::{PingError, PingResult};
use pnet_packet::icmp::{
    echo_reply::EchoReplyPacket,
    echo_request::{EchoRequestPacket, MutableEchoRequestPacket},
    IcmpCode, IcmpPacket, IcmpType, IcmpTypes,
};
use pnet_packet::ip::IpNextHeaderProtocols;
use pnet_packet::ipv4::Ipv4Packet;
use pnet_packet::Packet;

pub const PAYLOAD_SIZE: usize = 56;

// ICMP header: type, code, checksum, then 4 bytes of rest-of-header.
const ICMP_HEADER_SIZE: usize = 8;
const IPV4_MIN_HEADER_SIZE: usize = 20;

/// Identifier and sequence number of one echo request.
#[derive(Copy, Clone, Debug, Eq, Hash, PartialEq)]
pub struct EchoIdentifier {
    pub identifier: u16,
    pub sequence_number: SequenceNumber,
}

impl EchoIdentifier {
    #[must_use]
    pub fn new(identifier: u16, sequence_number: SequenceNumber) -> Self {
        EchoIdentifier { identifier, sequence_number }
    }

    /// Datagram ICMP sockets get their identifier rewritten by the kernel, so only the
    /// sequence number can be compared there.
    #[must_use]
    pub fn matches(&self, other: &EchoIdentifier, compare_identifier: bool) -> bool {
        self.sequence_number == other.sequence_number && (!compare_identifier || self.identifier == other.identifier)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DecodedMessage {
    EchoReply(EchoIdentifier),
    EchoRequest(EchoIdentifier),
    /// `original` is `None` when the embedded datagram was not one of our echo requests.
    DestinationUnreachable { code: u8, original: Option<EchoIdentifier> },
    TimeExceeded { code: u8, original: Option<EchoIdentifier> },
    Other { icmp_type: u8, code: u8 },
}

fn payload() -> [u8; PAYLOAD_SIZE] {
    let mut payload = [0u8; PAYLOAD_SIZE];
    for (byte, value) in payload.iter_mut().zip(0u8..) {
        *byte = value;
    }
    payload
}

/// Builds an ICMPv4 echo request with a fixed payload and a valid checksum.
#[must_use]
pub fn encode_echo_request(echo: EchoIdentifier) -> Vec<u8> {
    let payload = payload();
    let buf = vec![0u8; EchoRequestPacket::minimum_packet_size() + payload.len()];
    let mut package = MutableEchoRequestPacket::owned(buf).expect("buffer sized for echo request");
    package.set_icmp_type(IcmpTypes::EchoRequest);
    package.set_icmp_code(IcmpCode::new(0));
    package.set_identifier(echo.identifier);
    package.set_sequence_number(echo.sequence_number.into());
    package.set_payload(&payload);

    package.set_checksum(0_u16);
    let checksum = pnet_packet::icmp::checksum(&IcmpPacket::new(package.packet()).expect("buffer sized for icmp header"));
    package.set_checksum(checksum);
    package.packet().to_vec()
}

/// Decodes an ICMPv4 message (without IP header).
pub fn decode(buf: &[u8]) -> PingResult<DecodedMessage> {
    if buf.len() < ICMP_HEADER_SIZE {
        return Err(PingError::malformed(format!(
            "need at least {ICMP_HEADER_SIZE} bytes for an ICMP header, got {}",
            buf.len()
        )));
    }
    let icmp_packet = IcmpPacket::new(buf).ok_or_else(|| PingError::malformed("could not read ICMP header"))?;
    let icmp_type: IcmpType = icmp_packet.get_icmp_type();
    let code = icmp_packet.get_icmp_code().0;

    match icmp_type {
        IcmpTypes::EchoReply => {
            let reply = EchoReplyPacket::new(buf).ok_or_else(|| PingError::malformed("could not read echo reply"))?;
            Ok(DecodedMessage::EchoReply(EchoIdentifier::new(
                reply.get_identifier(),
                reply.get_sequence_number().into(),
            )))
        }
        IcmpTypes::EchoRequest => {
            let request =
                EchoRequestPacket::new(buf).ok_or_else(|| PingError::malformed("could not read echo request"))?;
            Ok(DecodedMessage::EchoRequest(EchoIdentifier::new(
                request.get_identifier(),
                request.get_sequence_number().into(),
            )))
        }
        IcmpTypes::DestinationUnreachable => {
            Ok(DecodedMessage::DestinationUnreachable { code, original: decode_embedded_echo(buf)? })
        }
        IcmpTypes::TimeExceeded => Ok(DecodedMessage::TimeExceeded { code, original: decode_embedded_echo(buf)? }),
        other => Ok(DecodedMessage::Other { icmp_type: other.0, code }),
    }
}

// Error messages carry the IP header plus the first 8 bytes of the datagram that
// triggered them, right after the ICMP header.
fn decode_embedded_echo(buf: &[u8]) -> PingResult<Option<EchoIdentifier>> {
    let embedded = &buf[ICMP_HEADER_SIZE..];
    if embedded.len() < IPV4_MIN_HEADER_SIZE {
        return Err(PingError::malformed(format!(
            "need at least {IPV4_MIN_HEADER_SIZE} bytes of embedded IPv4 header, got {}",
            embedded.len()
        )));
    }
    let ip_packet = Ipv4Packet::new(embedded).ok_or_else(|| PingError::malformed("could not read embedded IPv4 header"))?;
    let header_size = usize::from(ip_packet.get_header_length()) * 4;
    if header_size < IPV4_MIN_HEADER_SIZE {
        return Err(PingError::malformed(format!("embedded IPv4 header length {header_size} is too small")));
    }
    if embedded.len() < header_size + ICMP_HEADER_SIZE {
        return Err(PingError::malformed(format!(
            "need {} bytes of embedded datagram, got {}",
            header_size + ICMP_HEADER_SIZE,
            embedded.len()
        )));
    }
    if ip_packet.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
        return Ok(None);
    }

    let original = &embedded[header_size..];
    let request =
        EchoRequestPacket::new(original).ok_or_else(|| PingError::malformed("could not read embedded echo request"))?;
    if request.get_icmp_type() != IcmpTypes::EchoRequest {
        return Ok(None);
    }
    Ok(Some(EchoIdentifier::new(request.get_identifier(), request.get_sequence_number().into())))
}
