use std::{error::Error, io};

pub type GenericError = Box<dyn Error + Send + Sync + 'static>;

pub type PingResult<T> = std::result::Result<T, PingError>;

#[derive(Debug, thiserror::Error)]
pub enum PingError {
    /// The buffer is too short for the ICMP type it claims.
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    #[error("socket error: {0}")]
    Socket(#[from] io::Error),

    #[error("could not resolve {name}: {message}")]
    Resolution { name: String, message: String },

    /// A probe session is single use.
    #[error("probe session already used")]
    SessionReused,
}

impl PingError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        PingError::MalformedPacket(message.into())
    }
}
