pub mod codec;
pub use codec::{DecodedMessage, EchoIdentifier};

mod sequence_number;
pub use sequence_number::SequenceNumber;

mod ttl;
pub use ttl::Ttl;

pub mod socket;
pub use socket::{OpenSocket, SocketType, TSocket};
