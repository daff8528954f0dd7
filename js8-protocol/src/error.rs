use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("message must be exactly 12 characters, got {0}")]
    InvalidLength(usize),

    #[error("character {0:?} is not in the frame alphabet")]
    InvalidCharacter(char),

    #[error("frame type out of range: {0} (must fit in 3 bits)")]
    InvalidFrameType(u8),

    #[error("invalid tone frame: {0}")]
    InvalidFrame(String),

    #[error("frame checksum mismatch")]
    ChecksumMismatch,

    #[error("unknown sub-mode: {0}")]
    UnknownSubMode(String),

    #[error("invalid parity matrix: {0}")]
    InvalidParityMatrix(String),
}
