//! Decoder error taxonomy.
//!
//! Every variant maps to a non-fatal outcome at the call site: the caller
//! drops the offending packet and keeps the connection open. Only
//! construction failures ([`DecodeError::Init`]) are handled as fatal by
//! callers, since they mean the decoder never became usable.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to initialize decoder: {0}")]
    Init(String),

    #[error("decoder rejected packet: {0}")]
    InvalidData(String),

    #[error("decoder reported end of stream")]
    Eof,
}

impl From<ffmpeg_the_third::Error> for DecodeError {
    fn from(err: ffmpeg_the_third::Error) -> Self {
        match err {
            ffmpeg_the_third::Error::Eof => DecodeError::Eof,
            other => DecodeError::InvalidData(other.to_string()),
        }
    }
}
